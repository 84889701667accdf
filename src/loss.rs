use ndarray::{ArrayView2, Zip};

use crate::error::{ensure_shape, Result};

/// Mean of the squared differences over every element of the batch.
/// Only used to report progress; gradients never go through it.
pub fn mean_squared_error(input: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<f64> {
    ensure_shape("mean squared error", target.shape(), input.shape())?;

    let n = input.len();
    let loss = Zip::from(&input)
        .and(&target)
        .fold(0.0, |loss, &input, &target| loss + (input - target).powi(2));
    Ok(loss / n as f64)
}
