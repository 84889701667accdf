use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::data::Normalization;
use crate::error::{Error, Result};
use crate::layer::ErrorAccumulation;

/// How much the training loop reports through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Off,
    /// One `info` event per training iteration.
    Progress,
    /// `Progress` plus a `debug` event with the shapes of every step.
    Debug,
}

/// Hyperparameters of a [`Network`](crate::Network).
///
/// Every field except the three dimensions has a default, so a JSON
/// configuration may be as small as
///
/// ```json
/// { "input_dim": 2, "hidden_dim": 4, "output_dim": 1 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub output_dim: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Name of the update rule, parsed when the network is built.
    #[serde(default = "default_optimizer")]
    pub optimizer: String,
    /// Rescale gradients whose L2 norm exceeds this value.
    #[serde(default)]
    pub clip_grad_l2: Option<f64>,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub accumulation: ErrorAccumulation,
    #[serde(default)]
    pub verbosity: Verbosity,
    /// Seed for weight initialization. Entropy is used when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_epochs() -> usize {
    100
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_batch_size() -> usize {
    32
}

fn default_optimizer() -> String {
    "sgd".to_string()
}

impl NetworkConfig {
    pub fn new(input_dim: usize, hidden_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            hidden_dim,
            output_dim,
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            batch_size: default_batch_size(),
            optimizer: default_optimizer(),
            clip_grad_l2: None,
            normalization: Normalization::default(),
            accumulation: ErrorAccumulation::default(),
            verbosity: Verbosity::default(),
            seed: None,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn epochs(self, epochs: usize) -> Self {
        Self { epochs, ..self }
    }

    pub fn learning_rate(self, learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..self
        }
    }

    pub fn batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn optimizer(self, optimizer: impl Into<String>) -> Self {
        Self {
            optimizer: optimizer.into(),
            ..self
        }
    }

    pub fn clip_grad_l2(self, threshold: f64) -> Self {
        Self {
            clip_grad_l2: Some(threshold),
            ..self
        }
    }

    pub fn normalization(self, normalization: Normalization) -> Self {
        Self {
            normalization,
            ..self
        }
    }

    pub fn accumulation(self, accumulation: ErrorAccumulation) -> Self {
        Self {
            accumulation,
            ..self
        }
    }

    pub fn verbosity(self, verbosity: Verbosity) -> Self {
        Self { verbosity, ..self }
    }

    pub fn seed(self, seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..self
        }
    }

    /// Reject dimensions and batch sizes the network cannot be built with.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("input_dim", self.input_dim),
            ("hidden_dim", self.hidden_dim),
            ("output_dim", self.output_dim),
            ("batch_size", self.batch_size),
        ];
        match sizes.iter().find(|(_, size)| *size == 0) {
            Some((name, _)) => Err(Error::InvalidConfig(format!("{} must be at least 1", name))),
            None => Ok(()),
        }
    }
}
