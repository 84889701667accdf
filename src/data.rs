use ndarray::{Array2, ArrayBase, ArrayView2, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frobenius norm of `x`.
pub fn l2_norm<S>(x: &ArrayBase<S, Ix2>) -> f64
where
    S: Data<Elem = f64>,
{
    x.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Split `x` into contiguous minibatches along `Axis(0)`.
/// Every batch has `batch_size` rows except possibly the last one.
pub fn batches(x: ArrayView2<f64>, batch_size: usize) -> Result<Vec<Array2<f64>>> {
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch size must be at least 1".to_string()));
    }
    Ok(x.axis_chunks_iter(Axis(0), batch_size)
        .map(|chunk| chunk.to_owned())
        .collect())
}

/// Optional rescaling applied to the inputs before batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    /// Divide by the Frobenius norm of the whole training input.
    L2,
    /// Map the training input onto [0, 1] with `(x - min) / (max - min)`.
    MinMax,
}

/// Statistics of a normalization fitted on training inputs.
/// Validation inputs are rescaled with the same statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scaler {
    Identity,
    L2 { norm: f64 },
    MinMax { min: f64, max: f64 },
}

impl Scaler {
    pub fn fit(x: ArrayView2<f64>, normalization: Normalization) -> Result<Self> {
        match normalization {
            Normalization::None => Ok(Self::Identity),
            Normalization::L2 => {
                let norm = l2_norm(&x);
                if norm == 0.0 || !norm.is_finite() {
                    return Err(Error::Numeric(format!(
                        "cannot normalize by an L2 norm of {}",
                        norm
                    )));
                }
                Ok(Self::L2 { norm })
            }
            Normalization::MinMax => {
                let min = x.iter().cloned().fold(f64::INFINITY, f64::min);
                let max = x.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
                if !(max > min) {
                    return Err(Error::Numeric(format!(
                        "cannot min-max scale when max ({}) equals min ({})",
                        max, min
                    )));
                }
                Ok(Self::MinMax { min, max })
            }
        }
    }

    pub fn apply(&self, x: ArrayView2<f64>) -> Array2<f64> {
        match *self {
            Self::Identity => x.to_owned(),
            Self::L2 { norm } => x.mapv(|v| v / norm),
            Self::MinMax { min, max } => x.mapv(|v| (v - min) / (max - min)),
        }
    }
}
