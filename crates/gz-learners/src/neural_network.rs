//! Feed-forward neural network classifier.
//!
//! `n_hidden + 1` dense ReLU layers followed by a softmax output, trained with
//! mini-batch SGD and momentum. Training reports a checkpoint after every
//! epoch through [`CheckpointSink`], which is how the ensembler ranks the
//! network's intermediate states by training loss.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use gz_types::{
    check_xy, unique_classes, CheckpointSink, Estimator, EstimatorInfo, Features, Labels,
    ModelError, ParamError, ParamSet, ParamValue,
};

use crate::util::{
    check_features, column_means, cross_entropy, from_state, gather_rows, labels_from_proba,
    one_hot, softmax_rows, to_state,
};

pub const NAME: &str = "neuralnet";

/// Units per dense layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LayerUnits {
    /// Same width for every layer (halved layer to layer with `decay_units`).
    Uniform(usize),
    /// One width per layer; length must be `n_hidden + 1`.
    PerLayer(Vec<usize>),
}

impl LayerUnits {
    fn to_param(&self) -> ParamValue {
        match self {
            Self::Uniform(units) => ParamValue::from(*units),
            Self::PerLayer(units) => ParamValue::List(units.iter().map(|&u| u.into()).collect()),
        }
    }
}

/// Network architecture and training schedule.
///
/// Never mutated in place: `set_params` builds a new config and swaps it in
/// only once every parameter validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub n_hidden: usize,
    pub units: LayerUnits,
    pub decay_units: bool,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            n_hidden: 2,
            units: LayerUnits::Uniform(64),
            decay_units: false,
            epochs: 10,
            batch_size: 16,
            learning_rate: 0.01,
            momentum: 0.9,
            seed: 42,
        }
    }
}

impl NetworkConfig {
    /// Width of each dense layer before the softmax output.
    pub fn layer_widths(&self) -> Vec<usize> {
        match &self.units {
            LayerUnits::PerLayer(units) => units.clone(),
            LayerUnits::Uniform(units) if self.decay_units => (0..=self.n_hidden)
                .map(|i| (units >> i.min(63)).max(1))
                .collect(),
            LayerUnits::Uniform(units) => vec![*units; self.n_hidden + 1],
        }
    }

    fn validate(&self) -> Result<(), ParamError> {
        if let LayerUnits::PerLayer(units) = &self.units {
            if units.len() != self.n_hidden + 1 {
                return Err(ParamError::invalid(
                    "units",
                    format!(
                        "expected {} layer widths for n_hidden={}, got {}",
                        self.n_hidden + 1,
                        self.n_hidden,
                        units.len()
                    ),
                ));
            }
            if units.contains(&0) {
                return Err(ParamError::invalid("units", "layer widths must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Dense {
    weights: Array2<f64>,
    bias: Array1<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fitted {
    classes: Vec<i64>,
    mean: Array1<f64>,
    scale: Array1<f64>,
    layers: Vec<Dense>,
    epochs_trained: usize,
}

impl Fitted {
    /// Activations of every layer, input first, softmax output last.
    fn forward(&self, x: &Array2<f64>) -> Vec<Array2<f64>> {
        let mut activations = vec![x.clone()];
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let mut z = activations[i].dot(&layer.weights) + &layer.bias;
            if i == last {
                softmax_rows(&mut z);
            } else {
                z.mapv_inplace(|v| v.max(0.0));
            }
            activations.push(z);
        }
        activations
    }

    fn standardize(&self, x: &Features) -> Array2<f64> {
        (x - &self.mean) / &self.scale
    }

    fn proba(&self, x: &Features) -> Array2<f64> {
        let activations = self.forward(&self.standardize(x));
        activations.into_iter().last().unwrap_or_default()
    }
}

struct NoCheckpoints;

impl CheckpointSink for NoCheckpoints {
    fn on_checkpoint(&mut self, _: usize, _: &dyn Estimator, _: f64) -> Result<(), ModelError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NeuralNetwork {
    config: NetworkConfig,
    fitted: Option<Fitted>,
}

impl NeuralNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            fitted: None,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn epochs_trained(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.epochs_trained)
    }

    fn init_layers(&self, n_inputs: usize, n_outputs: usize, rng: &mut StdRng) -> Vec<Dense> {
        let mut sizes = vec![n_inputs];
        sizes.extend(self.config.layer_widths());
        sizes.push(n_outputs);

        sizes
            .windows(2)
            .map(|pair| {
                // He-uniform
                let limit = (6.0 / pair[0] as f64).sqrt();
                Dense {
                    weights: Array2::from_shape_fn((pair[0], pair[1]), |_| {
                        rng.random_range(-limit..limit)
                    }),
                    bias: Array1::zeros(pair[1]),
                }
            })
            .collect()
    }

    fn train(
        &mut self,
        x: &Features,
        y: &Labels,
        sink: &mut dyn CheckpointSink,
    ) -> Result<(), ModelError> {
        check_xy(x, y)?;
        let classes = unique_classes(y);
        let n_samples = x.nrows();
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mean = column_means(x);
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let layers = self.init_layers(x.ncols(), classes.len(), &mut rng);
        let mut velocities: Vec<Dense> = layers
            .iter()
            .map(|l| Dense {
                weights: Array2::zeros(l.weights.raw_dim()),
                bias: Array1::zeros(l.bias.len()),
            })
            .collect();

        let mut model = Fitted {
            classes,
            mean,
            scale,
            layers,
            epochs_trained: 0,
        };
        let xs = model.standardize(x);
        let targets = one_hot(y, &model.classes);
        let batch_size = self.config.batch_size.max(1);
        let mut order: Vec<usize> = (0..n_samples).collect();

        for epoch in 1..=self.config.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                let xb = gather_rows(&xs, batch);
                let yb = gather_rows(&targets, batch);
                let activations = model.forward(&xb);

                // softmax + cross-entropy gradient
                let mut delta = (&activations[activations.len() - 1] - &yb) / batch.len() as f64;
                for i in (0..model.layers.len()).rev() {
                    let grad_w = activations[i].t().dot(&delta);
                    let grad_b = delta.sum_axis(Axis(0));
                    if i > 0 {
                        let mut upstream = delta.dot(&model.layers[i].weights.t());
                        upstream.zip_mut_with(&activations[i], |g, &a| {
                            if a <= 0.0 {
                                *g = 0.0;
                            }
                        });
                        delta = upstream;
                    }

                    let velocity = &mut velocities[i];
                    velocity.weights = &velocity.weights * self.config.momentum
                        - grad_w * self.config.learning_rate;
                    velocity.bias =
                        &velocity.bias * self.config.momentum - grad_b * self.config.learning_rate;
                    model.layers[i].weights += &velocity.weights;
                    model.layers[i].bias += &velocity.bias;
                }
            }

            let loss = cross_entropy(&model.forward(&xs).into_iter().last().unwrap_or_default(), &targets);
            if !loss.is_finite() {
                return Err(ModelError::TrainingFailed {
                    message: format!("loss diverged at epoch {epoch}"),
                });
            }
            model.epochs_trained = epoch;
            self.fitted = Some(model.clone());
            sink.on_checkpoint(epoch, &*self, loss)?;
        }

        self.fitted = Some(model);
        Ok(())
    }

    fn proba(&self, x: &Features) -> Result<Array2<f64>, ModelError> {
        let fitted = self.fitted.as_ref().ok_or(ModelError::NotFitted)?;
        check_features(x.ncols(), fitted.mean.len())?;
        Ok(fitted.proba(x))
    }
}

impl Estimator for NeuralNetwork {
    fn algorithm(&self) -> &str {
        NAME
    }

    fn info(&self) -> EstimatorInfo {
        EstimatorInfo {
            standard_ensemble: false,
            checkpointed: true,
            predict_proba: true,
            does_multiclass: true,
        }
    }

    fn params(&self) -> ParamSet {
        ParamSet::new()
            .with("n_hidden", self.config.n_hidden)
            .with("units", self.config.units.to_param())
            .with("decay_units", self.config.decay_units)
            .with("epochs", self.config.epochs)
            .with("batch_size", self.config.batch_size)
            .with("learning_rate", self.config.learning_rate)
            .with("momentum", self.config.momentum)
            .with("seed", self.config.seed as usize)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<(), ParamError> {
        let mut config = self.config.clone();
        for (name, value) in params.iter() {
            match name.as_str() {
                "n_hidden" => config.n_hidden = value.to_usize(name)?,
                "units" | "input_units" => {
                    config.units = match value.as_list() {
                        Some(list) => LayerUnits::PerLayer(
                            list.iter()
                                .map(|v| v.to_positive_usize("units"))
                                .collect::<Result<_, _>>()?,
                        ),
                        None => LayerUnits::Uniform(value.to_positive_usize(name)?),
                    }
                }
                "decay_units" => config.decay_units = value.to_bool(name)?,
                "epochs" => config.epochs = value.to_positive_usize(name)?,
                "batch_size" => config.batch_size = value.to_positive_usize(name)?,
                "learning_rate" => config.learning_rate = value.to_positive_f64(name)?,
                "momentum" => {
                    let momentum = value.to_f64(name)?;
                    if !(0.0..1.0).contains(&momentum) {
                        return Err(ParamError::invalid(name, "must lie in [0, 1)"));
                    }
                    config.momentum = momentum;
                }
                "seed" => config.seed = value.to_usize(name)? as u64,
                _ => return Err(ParamError::unknown(name)),
            }
        }
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn fit(&mut self, x: &Features, y: &Labels) -> Result<(), ModelError> {
        self.train(x, y, &mut NoCheckpoints)
    }

    fn fit_with_checkpoints(
        &mut self,
        x: &Features,
        y: &Labels,
        sink: &mut dyn CheckpointSink,
    ) -> Result<(), ModelError> {
        self.train(x, y, sink)
    }

    fn predict(&self, x: &Features) -> Result<Labels, ModelError> {
        let proba = self.proba(x)?;
        let classes = &self.fitted.as_ref().ok_or(ModelError::NotFitted)?.classes;
        Ok(labels_from_proba(&proba, classes))
    }

    fn predict_proba(&self, x: &Features) -> Result<Option<Array2<f64>>, ModelError> {
        self.proba(x).map(Some)
    }

    fn snapshot(&self) -> Result<serde_json::Value, ModelError> {
        to_state(&self.fitted)
    }

    fn restore(&mut self, state: &serde_json::Value) -> Result<(), ModelError> {
        self.fitted = from_state(state)?;
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn Estimator> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[derive(Default)]
    struct Recorder {
        epochs: Vec<usize>,
        losses: Vec<f64>,
        snapshots: usize,
    }

    impl CheckpointSink for Recorder {
        fn on_checkpoint(&mut self, epoch: usize, model: &dyn Estimator, loss: f64) -> Result<(), ModelError> {
            self.epochs.push(epoch);
            self.losses.push(loss);
            if model.snapshot()?.is_object() {
                self.snapshots += 1;
            }
            Ok(())
        }
    }

    fn create_classification_data() -> (Features, Labels) {
        let x = array![
            [0.0, 0.0],
            [0.2, 0.1],
            [0.1, 0.3],
            [0.3, 0.2],
            [3.0, 3.0],
            [3.2, 2.9],
            [2.8, 3.1],
            [3.1, 3.3],
        ];
        let y = array![0, 0, 0, 0, 1, 1, 1, 1];
        (x, y)
    }

    fn small_network(epochs: usize) -> NeuralNetwork {
        NeuralNetwork::new(NetworkConfig {
            n_hidden: 1,
            units: LayerUnits::Uniform(8),
            epochs,
            batch_size: 4,
            learning_rate: 0.05,
            ..Default::default()
        })
    }

    #[test]
    fn test_checkpoint_every_epoch() {
        let (x, y) = create_classification_data();
        let mut net = small_network(5);
        let mut recorder = Recorder::default();
        net.fit_with_checkpoints(&x, &y, &mut recorder).unwrap();

        assert_eq!(recorder.epochs, vec![1, 2, 3, 4, 5]);
        assert_eq!(recorder.snapshots, 5);
        assert!(recorder.losses.iter().all(|l| l.is_finite() && *l >= 0.0));
        assert_eq!(net.epochs_trained(), Some(5));
    }

    #[test]
    fn test_learns_separable_clusters() {
        let (x, y) = create_classification_data();
        let mut net = small_network(60);
        net.fit(&x, &y).unwrap();
        assert_eq!(net.predict(&x).unwrap(), y);
    }

    #[test]
    fn test_same_seed_same_weights() {
        let (x, y) = create_classification_data();
        let mut a = small_network(3);
        let mut b = small_network(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.snapshot().unwrap(), b.snapshot().unwrap());
    }

    #[test]
    fn test_units_list_must_match_depth() {
        let mut net = NeuralNetwork::default();
        let err = net
            .set_params(&ParamSet::new().with("n_hidden", 1).with("units", vec![16, 8, 4]))
            .unwrap_err();
        assert_eq!(err.parameter(), "units");
        assert_eq!(net.config().n_hidden, 2);

        net.set_params(&ParamSet::new().with("n_hidden", 1)).unwrap();
        net.set_params(&ParamSet::new().with("units", vec![16, 8])).unwrap();
        assert_eq!(net.config().layer_widths(), vec![16, 8]);
    }

    #[test]
    fn test_decay_units_halves_widths() {
        let config = NetworkConfig {
            n_hidden: 2,
            units: LayerUnits::Uniform(32),
            decay_units: true,
            ..Default::default()
        };
        assert_eq!(config.layer_widths(), vec![32, 16, 8]);
    }
}
