use ndarray::{Array2, ArrayView2};
use ndarray_rand::rand::{rngs::StdRng, SeedableRng};

use crate::activation::sigmoid;
use crate::config::{NetworkConfig, Verbosity};
use crate::data::{batches, Normalization, Scaler};
use crate::error::{ensure_shape, Error, Result};
use crate::layer::{HiddenLayer, Layer, Linear, Mode, OutputLayer, Signal};
use crate::loss::mean_squared_error;
use crate::optimizer::{self, OptimizerKind};

/// Losses recorded by [`Network::train`], one entry per training iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    pub train: Vec<f64>,
    /// Present only when validation data took part in training.
    pub validation: Option<Vec<f64>>,
}

/// Fully-connected network with one hidden layer and sigmoid activations.
///
/// Layers are stored in forward order and walked in reverse for the backward
/// pass. The activations of the last training forward pass are kept in a
/// scratch buffer that evaluation passes never touch.
pub struct Network {
    layers: Vec<Box<dyn Layer>>,
    activations: Vec<Array2<f64>>,
    epochs: usize,
    remaining_epochs: usize,
    batch_size: usize,
    normalization: Normalization,
    verbosity: Verbosity,
}

impl Network {
    pub fn new(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;
        let kind: OptimizerKind = config.optimizer.parse()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let hidden = Linear::new(
            config.input_dim,
            config.hidden_dim,
            optimizer::build(kind, config.learning_rate, config.clip_grad_l2)?,
            &mut rng,
        );
        let output = Linear::new(
            config.hidden_dim,
            config.output_dim,
            optimizer::build(kind, config.learning_rate, config.clip_grad_l2)?,
            &mut rng,
        );
        Ok(Self::from_linear(config, hidden, output))
    }

    /// Build a network starting from the given weights instead of random ones.
    /// `hidden_weights` must be (input_dim, hidden_dim) and `output_weights`
    /// (hidden_dim, output_dim).
    pub fn with_weights(
        config: &NetworkConfig,
        hidden_weights: Array2<f64>,
        output_weights: Array2<f64>,
    ) -> Result<Self> {
        config.validate()?;
        ensure_shape(
            "hidden weights",
            &[config.input_dim, config.hidden_dim],
            hidden_weights.shape(),
        )?;
        ensure_shape(
            "output weights",
            &[config.hidden_dim, config.output_dim],
            output_weights.shape(),
        )?;
        let kind: OptimizerKind = config.optimizer.parse()?;

        let hidden = Linear::with_weights(
            hidden_weights,
            optimizer::build(kind, config.learning_rate, config.clip_grad_l2)?,
        );
        let output = Linear::with_weights(
            output_weights,
            optimizer::build(kind, config.learning_rate, config.clip_grad_l2)?,
        );
        Ok(Self::from_linear(config, hidden, output))
    }

    fn from_linear(config: &NetworkConfig, hidden: Linear, output: Linear) -> Self {
        let traced = config.verbosity >= Verbosity::Debug;
        let layers: Vec<Box<dyn Layer>> = vec![
            Box::new(HiddenLayer::new(hidden.traced(traced), config.accumulation)),
            Box::new(OutputLayer::new(output.traced(traced))),
        ];
        Self {
            layers,
            activations: Vec::new(),
            epochs: config.epochs,
            remaining_epochs: config.epochs,
            batch_size: config.batch_size,
            normalization: config.normalization,
            verbosity: config.verbosity,
        }
    }

    /// Weight matrices in forward order.
    pub fn weights(&self) -> Vec<&Array2<f64>> {
        self.layers.iter().map(|layer| layer.weights()).collect()
    }

    /// Epochs left to run. `train` counts this down and never restores it.
    pub fn remaining_epochs(&self) -> usize {
        self.remaining_epochs
    }

    /// Run every layer followed by the sigmoid and return the network output.
    /// In `Mode::Train` the per-layer activations are kept for the next backward pass.
    pub fn fit(&mut self, x: ArrayView2<f64>, mode: Mode) -> Result<Array2<f64>> {
        let mut activations = Vec::with_capacity(self.layers.len());
        let mut current = x.to_owned();
        for layer in self.layers.iter_mut() {
            current = sigmoid(&layer.forward(current.view(), mode)?);
            if mode == Mode::Train {
                activations.push(current.clone());
            }
        }

        if mode == Mode::Train {
            self.activations = activations;
        }
        Ok(current)
    }

    pub fn predict(&mut self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.fit(x, Mode::Eval)
    }

    /// Propagate the error of the last training forward pass from the output
    /// layer back to the hidden layer, updating weights on the way.
    fn backward(&mut self, target: ArrayView2<f64>) -> Result<()> {
        if self.activations.len() != self.layers.len() {
            return Err(Error::MissingForward);
        }

        let mut signal = Signal::Target(target);
        for (layer, outputs) in self.layers.iter_mut().zip(&self.activations).rev() {
            let step = layer.backward(outputs.view(), signal)?;
            match step.downstream {
                Some(downstream) => signal = Signal::Upstream(downstream),
                None => break,
            }
        }
        Ok(())
    }

    /// Split `x` into minibatches of the configured size.
    pub fn batch(&self, x: ArrayView2<f64>) -> Result<Vec<Array2<f64>>> {
        batches(x, self.batch_size)
    }

    /// Train on `x`/`y` for the remaining epochs.
    ///
    /// When `validation` is given and neither of its arrays is entirely NaN,
    /// the `n`-th validation batch is evaluated after the `n`-th training
    /// step of every epoch.
    pub fn train(
        &mut self,
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
        validation: Option<(ArrayView2<f64>, ArrayView2<f64>)>,
    ) -> Result<History> {
        // Everything is checked up front so a rejected call leaves the network untouched.
        let validation =
            validation.filter(|(x_valid, y_valid)| !all_nan(*x_valid) && !all_nan(*y_valid));
        self.check_data(("training inputs", "training targets"), x, y)?;
        if let Some((x_valid, y_valid)) = validation {
            self.check_data(("validation inputs", "validation targets"), x_valid, y_valid)?;
        }

        let scaler = Scaler::fit(x, self.normalization)?;
        let x_batches = self.batch(scaler.apply(x).view())?;
        let y_batches = self.batch(y)?;
        let validation = match validation {
            Some((x_valid, y_valid)) => Some((
                self.batch(scaler.apply(x_valid).view())?,
                self.batch(y_valid)?,
            )),
            None => None,
        };

        let mut history = History {
            train: Vec::new(),
            validation: validation.as_ref().map(|_| Vec::new()),
        };

        while self.remaining_epochs > 0 {
            let epoch = self.epochs - self.remaining_epochs;
            for (iteration, (x_batch, y_batch)) in x_batches.iter().zip(&y_batches).enumerate() {
                let outputs = self.fit(x_batch.view(), Mode::Train)?;
                let loss = mean_squared_error(outputs.view(), y_batch.view())?;
                if self.verbosity >= Verbosity::Debug {
                    tracing::debug!(
                        epoch,
                        iteration,
                        batch = ?x_batch.shape(),
                        activations = ?self.activations.iter().map(|a| a.shape()).collect::<Vec<_>>(),
                        "training step"
                    );
                }
                self.backward(y_batch.view())?;
                history.train.push(loss);

                let val_loss = match &validation {
                    Some((x_valid, y_valid)) => {
                        match (x_valid.get(iteration), y_valid.get(iteration)) {
                            (Some(x_valid), Some(y_valid)) => {
                                let outputs = self.fit(x_valid.view(), Mode::Eval)?;
                                Some(mean_squared_error(outputs.view(), y_valid.view())?)
                            }
                            _ => None,
                        }
                    }
                    None => None,
                };
                if let (Some(val_loss), Some(losses)) = (val_loss, history.validation.as_mut()) {
                    losses.push(val_loss);
                }

                self.report(epoch, iteration, loss, val_loss);
            }
            self.remaining_epochs -= 1;
        }

        Ok(history)
    }

    /// Inputs must be (rows, input_dim) and targets (rows, output_dim).
    fn check_data(
        &self,
        contexts: (&'static str, &'static str),
        x: ArrayView2<f64>,
        y: ArrayView2<f64>,
    ) -> Result<()> {
        let (input_dim, output_dim) = match (self.layers.first(), self.layers.last()) {
            (Some(first), Some(last)) => (first.input_dim(), last.output_dim()),
            _ => return Ok(()),
        };
        ensure_shape(contexts.0, &[x.nrows(), input_dim], x.shape())?;
        ensure_shape(contexts.1, &[x.nrows(), output_dim], y.shape())
    }

    fn report(&self, epoch: usize, iteration: usize, loss: f64, val_loss: Option<f64>) {
        if self.verbosity == Verbosity::Off {
            return;
        }
        match val_loss {
            Some(val_loss) => {
                tracing::info!(epoch, iteration, loss, val_loss, "training iteration")
            }
            None => tracing::info!(epoch, iteration, loss, "training iteration"),
        }
    }
}

fn all_nan(x: ArrayView2<f64>) -> bool {
    x.iter().all(|v| v.is_nan())
}

#[cfg(test)]
mod tests {
    use crate::{assert_rel_eq_arr2, layer::ErrorAccumulation};

    use super::*;

    use approx::assert_relative_eq;
    use ndarray::arr2;

    fn and_gate() -> (Array2<f64>, Array2<f64>) {
        (
            arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]]),
            arr2(&[[0.0], [0.0], [0.0], [1.0]]),
        )
    }

    fn config() -> NetworkConfig {
        NetworkConfig::new(2, 3, 1)
            .epochs(5)
            .batch_size(2)
            .learning_rate(0.1)
            .seed(3)
    }

    #[test]
    fn new_network_has_matching_layers() {
        let network = Network::new(&NetworkConfig::new(4, 6, 2)).unwrap();
        let weights = network.weights();
        assert_eq!(2, weights.len());
        assert_eq!(&[4, 6], weights[0].shape());
        assert_eq!(&[6, 2], weights[1].shape());
    }

    #[test]
    fn unknown_optimizer_fails_at_construction() {
        let err = Network::new(&config().optimizer("adagrad")).err().unwrap();
        assert!(matches!(err, Error::UnknownOptimizer(kind) if kind == "adagrad"));
    }

    #[test]
    fn seeded_networks_start_identical() {
        let a = Network::new(&config()).unwrap();
        let b = Network::new(&config()).unwrap();
        assert_eq!(a.weights(), b.weights());
    }

    #[test]
    fn with_weights_checks_shapes() {
        let err = Network::with_weights(&config(), arr2(&[[1.0, 2.0]]), arr2(&[[1.0]]))
            .err()
            .unwrap();
        assert!(matches!(err, Error::ShapeMismatch { context: "hidden weights", .. }));
    }

    #[test]
    fn fit_applies_sigmoid_after_each_layer() {
        let hidden = arr2(&[[1.0, -1.0, 0.0], [0.5, 0.5, 2.0]]);
        let output = arr2(&[[1.0], [2.0], [-1.0]]);
        let mut network = Network::with_weights(&config(), hidden.clone(), output.clone()).unwrap();

        let x = arr2(&[[1.0, 2.0]]);
        let expected = sigmoid(&sigmoid(&x.dot(&hidden)).dot(&output));
        let actual = network.predict(x.view()).unwrap();
        assert_rel_eq_arr2!(actual, expected);
    }

    #[test]
    fn eval_fit_leaves_training_scratch_alone() {
        let (x, _) = and_gate();
        let mut network = Network::new(&config()).unwrap();

        network.fit(x.view(), Mode::Train).unwrap();
        let scratch = network.activations.clone();
        network.fit(arr2(&[[5.0, -5.0]]).view(), Mode::Eval).unwrap();

        assert_eq!(scratch, network.activations);
        for layer in &network.layers {
            assert_eq!(4, layer.cached_inputs().unwrap().nrows());
        }
    }

    #[test]
    fn one_step_matches_manual_layers() {
        let hidden_weights = arr2(&[[0.2, 0.4, 0.6], [0.8, 0.1, 0.3]]);
        let output_weights = arr2(&[[0.5], [0.7], [0.9]]);
        let config = config().epochs(1).batch_size(4);
        let (x, y) = and_gate();

        let mut network =
            Network::with_weights(&config, hidden_weights.clone(), output_weights.clone()).unwrap();
        let history = network.train(x.view(), y.view(), None).unwrap();
        assert_eq!(1, history.train.len());

        let sgd = || optimizer::build(OptimizerKind::Sgd, 0.1, None).unwrap();
        let mut hidden = HiddenLayer::new(
            Linear::with_weights(hidden_weights, sgd()),
            ErrorAccumulation::Reset,
        );
        let mut output = OutputLayer::new(Linear::with_weights(output_weights, sgd()));
        let h = sigmoid(&hidden.forward(x.view(), Mode::Train).unwrap());
        let o = sigmoid(&output.forward(h.view(), Mode::Train).unwrap());
        assert_relative_eq!(history.train[0], mean_squared_error(o.view(), y.view()).unwrap());

        let step = output.backward(o.view(), Signal::Target(y.view())).unwrap();
        hidden
            .backward(h.view(), Signal::Upstream(step.downstream.unwrap()))
            .unwrap();

        let weights = network.weights();
        assert_rel_eq_arr2!(weights[0].view(), hidden.weights().view());
        assert_rel_eq_arr2!(weights[1].view(), output.weights().view());
    }

    #[test]
    fn zero_epochs_does_nothing() {
        let (x, y) = and_gate();
        let mut network = Network::new(&config().epochs(0)).unwrap();
        let before = network.weights().into_iter().cloned().collect::<Vec<_>>();

        let history = network.train(x.view(), y.view(), None).unwrap();
        assert!(history.train.is_empty());
        assert!(history.validation.is_none());
        let after = network.weights().into_iter().cloned().collect::<Vec<_>>();
        assert_eq!(before, after);
    }

    #[test]
    fn second_train_call_is_a_no_op() {
        let (x, y) = and_gate();
        let mut network = Network::new(&config()).unwrap();

        let history = network.train(x.view(), y.view(), None).unwrap();
        assert_eq!(5 * 2, history.train.len());
        assert_eq!(0, network.remaining_epochs());

        let history = network.train(x.view(), y.view(), None).unwrap();
        assert_eq!(History::default(), history);
    }

    #[test]
    fn validation_does_not_change_training() {
        let (x, y) = and_gate();
        let x_valid = arr2(&[[0.9, 0.1], [0.1, 0.9], [0.9, 0.9]]);
        let y_valid = arr2(&[[0.0], [0.0], [1.0]]);

        let mut plain = Network::new(&config()).unwrap();
        let mut validated = Network::new(&config()).unwrap();
        let plain_history = plain.train(x.view(), y.view(), None).unwrap();
        let history = validated
            .train(x.view(), y.view(), Some((x_valid.view(), y_valid.view())))
            .unwrap();

        assert_eq!(plain.weights(), validated.weights());
        assert_eq!(plain_history.train, history.train);

        let losses = history.validation.unwrap();
        assert_eq!(history.train.len(), losses.len());
        assert!(losses.iter().all(|loss| loss.is_finite()));
    }

    #[test]
    fn short_validation_set_is_paired_by_batch_index() {
        let (x, y) = and_gate();
        let x_valid = arr2(&[[0.9, 0.1]]);
        let y_valid = arr2(&[[0.0]]);

        let mut network = Network::new(&config()).unwrap();
        let history = network
            .train(x.view(), y.view(), Some((x_valid.view(), y_valid.view())))
            .unwrap();
        assert_eq!(10, history.train.len());
        assert_eq!(5, history.validation.unwrap().len());
    }

    #[test]
    fn all_nan_validation_is_ignored() {
        let (x, y) = and_gate();
        let x_valid = Array2::from_elem((2, 2), f64::NAN);
        let y_valid = arr2(&[[0.0], [1.0]]);

        let mut network = Network::new(&config()).unwrap();
        let history = network
            .train(x.view(), y.view(), Some((x_valid.view(), y_valid.view())))
            .unwrap();
        assert!(history.validation.is_none());
        assert_eq!(10, history.train.len());
    }

    #[test]
    fn mismatched_rows_are_rejected() {
        let (x, _) = and_gate();
        let y = arr2(&[[0.0], [1.0]]);
        let mut network = Network::new(&config()).unwrap();
        let err = network.train(x.view(), y.view(), None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { context: "training targets", .. }));
        assert_eq!(5, network.remaining_epochs());
    }

    #[test]
    fn wrong_widths_are_rejected_before_training() {
        let (x, y) = and_gate();
        let mut network = Network::new(&config()).unwrap();

        let wide_x = arr2(&[[0.0, 0.0, 1.0], [1.0, 1.0, 0.0]]);
        let err = network.train(wide_x.view(), arr2(&[[0.0], [1.0]]).view(), None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { context: "training inputs", .. }));

        let wide_y = arr2(&[[0.0, 1.0], [0.0, 1.0], [0.0, 1.0], [1.0, 0.0]]);
        let err = network.train(x.view(), wide_y.view(), None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { context: "training targets", .. }));

        let before = network.weights().into_iter().cloned().collect::<Vec<_>>();
        let x_valid = arr2(&[[0.5, 0.5, 0.5]]);
        let y_valid = arr2(&[[1.0]]);
        let err = network
            .train(x.view(), y.view(), Some((x_valid.view(), y_valid.view())))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { context: "validation inputs", .. }));

        let after = network.weights().into_iter().cloned().collect::<Vec<_>>();
        assert_eq!(before, after);
        assert_eq!(5, network.remaining_epochs());
    }

    #[test]
    fn mismatched_validation_rows_are_rejected() {
        let (x, y) = and_gate();
        let x_valid = arr2(&[[0.9, 0.1], [0.1, 0.9]]);
        let y_valid = arr2(&[[0.0]]);

        let mut network = Network::new(&config()).unwrap();
        let before = network.weights().into_iter().cloned().collect::<Vec<_>>();
        let err = network
            .train(x.view(), y.view(), Some((x_valid.view(), y_valid.view())))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { context: "validation targets", .. }));

        let after = network.weights().into_iter().cloned().collect::<Vec<_>>();
        assert_eq!(before, after);
        assert_eq!(5, network.remaining_epochs());
    }

    #[test]
    fn constant_inputs_cannot_be_min_max_scaled() {
        let x = Array2::from_elem((4, 2), 1.0);
        let (_, y) = and_gate();
        let mut network = Network::new(&config().normalization(Normalization::MinMax)).unwrap();
        let err = network.train(x.view(), y.view(), None).unwrap_err();
        assert!(matches!(err, Error::Numeric(_)));
    }

    #[test]
    fn accumulation_requires_even_batches() {
        let x = arr2(&[[0.0, 0.0], [0.0, 1.0], [1.0, 0.0]]);
        let y = arr2(&[[0.0], [0.0], [0.0]]);
        let config = config().accumulation(ErrorAccumulation::Accumulate);

        let mut network = Network::new(&config).unwrap();
        let err = network.train(x.view(), y.view(), None).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));

        let mut network = Network::new(&config).unwrap();
        let (x, y) = and_gate();
        assert_eq!(10, network.train(x.view(), y.view(), None).unwrap().train.len());
    }

    #[test]
    fn batch_uses_configured_size() {
        let (x, _) = and_gate();
        let network = Network::new(&config().batch_size(3)).unwrap();
        let batches = network.batch(x.view()).unwrap();
        assert_eq!(2, batches.len());
        assert_eq!(3, batches[0].nrows());
        assert_eq!(1, batches[1].nrows());
    }
}
