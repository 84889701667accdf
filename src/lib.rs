//! A two-layer fully-connected network trained by hand-written backpropagation.
//!
//! Forward and backward passes are plain matrix algebra on `ndarray` arrays;
//! there is no computational graph and no automatic differentiation.

pub mod activation;
pub mod config;
pub mod data;
pub mod error;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;

pub use config::{NetworkConfig, Verbosity};
pub use data::Normalization;
pub use error::{Error, Result};
pub use layer::{ErrorAccumulation, Mode};
pub use network::{History, Network};
pub use optimizer::OptimizerKind;

#[macro_export]
macro_rules! assert_rel_eq_arr2 {
    ($actual:expr, $expected:expr) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w);
            });
    };
    ($actual:expr, $expected:expr, $($opt:tt)+) => {
        assert_eq!($actual.shape(), $expected.shape());
        ndarray::Zip::from(&$actual)
            .and(&$expected)
            .for_each(|v, w| {
                assert_relative_eq!(v, w, $($opt)+);
            });
    };
}
