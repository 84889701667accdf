use ndarray::{Array, Array2, ArrayView2};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_shape, Error, Result};
use crate::optimizer::Optimizer;

/// Whether a forward pass belongs to a training step.
/// Only `Train` passes replace the input cached for the next backward pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// What a layer receives at the start of its backward pass.
pub enum Signal<'a> {
    /// Ground truth for the batch, consumed by the output layer.
    Target(ArrayView2<'a, f64>),
    /// Error signal propagated from the layer above.
    Upstream(Array2<f64>),
}

/// Result of one backward pass.
#[derive(Debug)]
pub struct Step {
    /// Amount subtracted from the weights.
    pub delta: Array2<f64>,
    /// Signal for the layer below, `None` for the last layer of the backward chain.
    pub downstream: Option<Array2<f64>>,
}

/// How the hidden layer treats its error signal between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAccumulation {
    /// Recompute the error signal from scratch every step.
    #[default]
    Reset,
    /// Keep adding every step's error signal into one persistent buffer.
    /// All batches must then have the same number of rows.
    Accumulate,
}

pub trait Layer {
    fn forward(&mut self, inputs: ArrayView2<f64>, mode: Mode) -> Result<Array2<f64>>;

    /// `outputs` is the activated output of this layer for the cached batch.
    fn backward(&mut self, outputs: ArrayView2<f64>, signal: Signal<'_>) -> Result<Step>;

    fn weights(&self) -> &Array2<f64>;

    fn cached_inputs(&self) -> Option<&Array2<f64>>;

    fn input_dim(&self) -> usize {
        self.weights().nrows()
    }

    fn output_dim(&self) -> usize {
        self.weights().ncols()
    }
}

/// Bias-free linear transformation shared by both layer roles.
pub struct Linear {
    inputs: Option<Array2<f64>>,
    weights: Array2<f64>,
    optimizer: Box<dyn Optimizer>,
    traced: bool,
}

impl Linear {
    pub fn new<R>(
        input_dim: usize,
        output_dim: usize,
        optimizer: Box<dyn Optimizer>,
        rng: &mut R,
    ) -> Self
    where
        R: Rng + ?Sized,
    {
        let weights = Array::random_using((input_dim, output_dim), Uniform::new(0.0, 1.0), rng);
        Linear::with_weights(weights, optimizer)
    }

    pub fn with_weights(weights: Array2<f64>, optimizer: Box<dyn Optimizer>) -> Self {
        Self {
            inputs: None,
            weights,
            optimizer,
            traced: false,
        }
    }

    /// Emit `trace` events for every forward and backward pass.
    pub fn traced(mut self, traced: bool) -> Self {
        self.traced = traced;
        self
    }

    pub fn forward(&mut self, inputs: ArrayView2<f64>, mode: Mode) -> Result<Array2<f64>> {
        ensure_shape(
            "linear forward",
            &[inputs.nrows(), self.weights.nrows()],
            inputs.shape(),
        )?;
        if self.traced {
            tracing::trace!(
                inputs = ?inputs.shape(),
                weights = ?self.weights.shape(),
                ?mode,
                "linear forward"
            );
        }

        if mode == Mode::Train {
            self.inputs = Some(inputs.to_owned());
        }
        Ok(inputs.dot(&self.weights))
    }

    /// Check that `outputs` belongs to the cached batch.
    fn check_outputs(&self, outputs: &ArrayView2<f64>) -> Result<()> {
        let inputs = self.inputs.as_ref().ok_or(Error::MissingForward)?;
        ensure_shape(
            "linear backward",
            &[inputs.nrows(), self.weights.ncols()],
            outputs.shape(),
        )
    }

    /// Apply `x_in^T @ errors` as the gradient and return the delta taken off the weights.
    fn update(&mut self, errors: &Array2<f64>) -> Result<Array2<f64>> {
        let inputs = self.inputs.as_ref().ok_or(Error::MissingForward)?;
        let gradient = inputs.t().dot(errors);
        let delta = self.optimizer.delta(&gradient);
        self.weights -= &delta;
        Ok(delta)
    }
}

/// Last layer of the network, driven by the ground truth.
pub struct OutputLayer {
    linear: Linear,
}

impl OutputLayer {
    pub fn new(linear: Linear) -> Self {
        Self { linear }
    }
}

impl Layer for OutputLayer {
    fn forward(&mut self, inputs: ArrayView2<f64>, mode: Mode) -> Result<Array2<f64>> {
        self.linear.forward(inputs, mode)
    }

    fn backward(&mut self, outputs: ArrayView2<f64>, signal: Signal<'_>) -> Result<Step> {
        let target = match signal {
            Signal::Target(target) => target,
            Signal::Upstream(_) => {
                return Err(Error::UnexpectedSignal {
                    layer: "output",
                    expected: "target",
                })
            }
        };
        self.linear.check_outputs(&outputs)?;
        ensure_shape("output layer target", outputs.shape(), target.shape())?;

        // (y - t) @ y^T @ (1 - y): MSE and sigmoid derivatives folded into matrix products.
        let complement = outputs.mapv(|v| 1.0 - v);
        let errors = (&outputs - &target).dot(&outputs.t()).dot(&complement);
        let delta = self.linear.update(&errors)?;
        let downstream = errors.dot(&self.linear.weights.t());
        if self.linear.traced {
            tracing::trace!(errors = ?errors.shape(), downstream = ?downstream.shape(), "output backward");
        }

        Ok(Step {
            delta,
            downstream: Some(downstream),
        })
    }

    fn weights(&self) -> &Array2<f64> {
        &self.linear.weights
    }

    fn cached_inputs(&self) -> Option<&Array2<f64>> {
        self.linear.inputs.as_ref()
    }
}

/// Layer between the inputs and the output layer.
/// Terminates the backward chain.
pub struct HiddenLayer {
    linear: Linear,
    errors: Option<Array2<f64>>,
    accumulation: ErrorAccumulation,
}

impl HiddenLayer {
    pub fn new(linear: Linear, accumulation: ErrorAccumulation) -> Self {
        Self {
            linear,
            errors: None,
            accumulation,
        }
    }

    /// Error signal used by the most recent update.
    pub fn error_signal(&self) -> Option<&Array2<f64>> {
        self.errors.as_ref()
    }
}

impl Layer for HiddenLayer {
    fn forward(&mut self, inputs: ArrayView2<f64>, mode: Mode) -> Result<Array2<f64>> {
        self.linear.forward(inputs, mode)
    }

    fn backward(&mut self, outputs: ArrayView2<f64>, signal: Signal<'_>) -> Result<Step> {
        let upstream = match signal {
            Signal::Upstream(upstream) => upstream,
            Signal::Target(_) => {
                return Err(Error::UnexpectedSignal {
                    layer: "hidden",
                    expected: "upstream",
                })
            }
        };
        self.linear.check_outputs(&outputs)?;
        ensure_shape("hidden layer upstream", outputs.shape(), upstream.shape())?;

        let complement = outputs.mapv(|v| 1.0 - v);
        let local = upstream.dot(&outputs.t().dot(&complement));
        let errors = match (self.accumulation, self.errors.take()) {
            (ErrorAccumulation::Accumulate, Some(mut accumulated)) => {
                if accumulated.shape() != local.shape() {
                    let err = Error::ShapeMismatch {
                        context: "hidden layer error accumulation",
                        expected: accumulated.shape().to_vec(),
                        actual: local.shape().to_vec(),
                    };
                    self.errors = Some(accumulated);
                    return Err(err);
                }
                accumulated += &local;
                accumulated
            }
            _ => local,
        };

        let delta = self.linear.update(&errors)?;
        if self.linear.traced {
            tracing::trace!(errors = ?errors.shape(), delta = ?delta.shape(), "hidden backward");
        }
        self.errors = Some(errors);

        Ok(Step {
            delta,
            downstream: None,
        })
    }

    fn weights(&self) -> &Array2<f64> {
        &self.linear.weights
    }

    fn cached_inputs(&self) -> Option<&Array2<f64>> {
        self.linear.inputs.as_ref()
    }
}
