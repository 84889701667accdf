mod gradient_descent;

use std::str::FromStr;

use ndarray::Array2;

use crate::error::{Error, Result};

pub use gradient_descent::GradientDescent;

/// Trait to abstract update rules, turning a raw gradient into the delta subtracted from a weight.
pub trait Optimizer {
    fn delta(&self, gradient: &Array2<f64>) -> Array2<f64>;
}

/// Update rules selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sgd" => Ok(Self::Sgd),
            _ => Err(Error::UnknownOptimizer(s.to_string())),
        }
    }
}

/// Create the optimizer for `kind`.
/// Fails if `learning_rate` is not a positive finite number or `clip_grad_l2` is not positive.
pub fn build(
    kind: OptimizerKind,
    learning_rate: f64,
    clip_grad_l2: Option<f64>,
) -> Result<Box<dyn Optimizer>> {
    if !(learning_rate.is_finite() && learning_rate > 0.0) {
        return Err(Error::InvalidConfig(format!(
            "learning rate must be positive, got {}",
            learning_rate
        )));
    }
    if let Some(threshold) = clip_grad_l2 {
        if !(threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "gradient clip threshold must be positive, got {}",
                threshold
            )));
        }
    }

    match kind {
        OptimizerKind::Sgd => Ok(Box::new(GradientDescent::new(learning_rate, clip_grad_l2))),
    }
}
