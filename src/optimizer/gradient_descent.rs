use crate::{data::l2_norm, optimizer::Optimizer};

use ndarray::Array2;

/// Plain stochastic gradient descent with an optional L2 norm clip.
pub struct GradientDescent {
    learning_rate: f64,
    clip_grad_l2: Option<f64>,
}

impl GradientDescent {
    pub fn new(learning_rate: f64, clip_grad_l2: Option<f64>) -> Self {
        Self {
            learning_rate,
            clip_grad_l2,
        }
    }
}

impl Optimizer for GradientDescent {
    fn delta(&self, gradient: &Array2<f64>) -> Array2<f64> {
        let scale = match self.clip_grad_l2 {
            Some(threshold) => {
                let norm = l2_norm(gradient);
                if norm > threshold {
                    threshold / norm
                } else {
                    1.0
                }
            }
            None => 1.0,
        };
        gradient.mapv(|g| self.learning_rate * scale * g)
    }
}
