use ndarray::Array2;

/// Elementwise squashing applied between layers.
pub trait Activation {
    fn compute(&self, x: &Array2<f64>) -> Array2<f64>;
}

/// Logistic function squashing every element into (0, 1).
pub struct Sigmoid;

impl Sigmoid {
    fn compute_one(x: &f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }
}

impl Activation for Sigmoid {
    fn compute(&self, x: &Array2<f64>) -> Array2<f64> {
        x.map(Sigmoid::compute_one)
    }
}

/// Shorthand for `Sigmoid.compute(x)`.
pub fn sigmoid(x: &Array2<f64>) -> Array2<f64> {
    Sigmoid.compute(x)
}
