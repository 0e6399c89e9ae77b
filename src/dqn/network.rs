//! Two-layer perceptron estimating one value per gameplay action

use std::{
    collections::HashMap,
    fmt,
    sync::{MutexGuard, PoisonError},
};

use candle_core::{D, DType, Device, Tensor, Var};
use candle_nn::{AdamW, Linear, Module, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    Error, Result,
    game::{ActionValues, NUM_ACTIONS},
};

const HIDDEN_WEIGHT: &str = "hidden.weight";
const HIDDEN_BIAS: &str = "hidden.bias";
const OUTPUT_WEIGHT: &str = "output.weight";
const OUTPUT_BIAS: &str = "output.bias";

/// One regression target for a single action's output.
#[derive(Debug, Clone, Copy)]
pub struct TrainingSample<'a> {
    pub features: &'a [f64],
    pub action: usize,
    pub target: f64,
}

/// Plain-data copy of a network's parameters, as persisted.
///
/// Weight matrices are row-major with one row per output unit:
/// `hidden_weight` is `hidden_dim × input_dim` and `output_weight` is
/// `NUM_ACTIONS × hidden_dim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub hidden_weight: Vec<f32>,
    pub hidden_bias: Vec<f32>,
    pub output_weight: Vec<f32>,
    pub output_bias: Vec<f32>,
}

impl NetworkWeights {
    /// Glorot-uniform weights, zero biases.
    pub fn glorot<R: Rng>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Self {
        let limit1 = (6.0 / (input_dim + hidden_dim) as f32).sqrt();
        let limit2 = (6.0 / (hidden_dim + NUM_ACTIONS) as f32).sqrt();
        Self {
            input_dim,
            hidden_dim,
            hidden_weight: (0..input_dim * hidden_dim)
                .map(|_| rng.random_range(-limit1..limit1))
                .collect(),
            hidden_bias: vec![0.0; hidden_dim],
            output_weight: (0..hidden_dim * NUM_ACTIONS)
                .map(|_| rng.random_range(-limit2..limit2))
                .collect(),
            output_bias: vec![0.0; NUM_ACTIONS],
        }
    }

    /// Every buffer must match the declared dimensions and hold finite values.
    pub fn validate(&self) -> Result<()> {
        if self.input_dim == 0 || self.hidden_dim == 0 {
            return Err(Error::config(format!(
                "network dimensions {}x{} must be positive",
                self.input_dim, self.hidden_dim
            )));
        }
        for (name, values, shape) in self.tensors() {
            let expected: usize = shape.iter().product();
            if values.len() != expected {
                return Err(Error::config(format!(
                    "network parameter '{name}' has {} values, expected {expected}",
                    values.len()
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::config(format!(
                    "network parameter '{name}' holds non-finite values"
                )));
            }
        }
        Ok(())
    }

    fn tensors(&self) -> [(&'static str, &[f32], Vec<usize>); 4] {
        [
            (
                HIDDEN_WEIGHT,
                self.hidden_weight.as_slice(),
                vec![self.hidden_dim, self.input_dim],
            ),
            (HIDDEN_BIAS, self.hidden_bias.as_slice(), vec![self.hidden_dim]),
            (
                OUTPUT_WEIGHT,
                self.output_weight.as_slice(),
                vec![NUM_ACTIONS, self.hidden_dim],
            ),
            (OUTPUT_BIAS, self.output_bias.as_slice(), vec![NUM_ACTIONS]),
        ]
    }
}

/// `input → hidden (ReLU) → NUM_ACTIONS` network over a candle [`VarMap`].
///
/// Cloning a `VarMap` shares its storage, so networks are duplicated through
/// [`QNetwork::duplicate`] or synced with [`QNetwork::copy_from`].
pub struct QNetwork {
    varmap: VarMap,
    hidden: Linear,
    output: Linear,
    input_dim: usize,
    hidden_dim: usize,
    device: Device,
}

impl fmt::Debug for QNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QNetwork")
            .field("input_dim", &self.input_dim)
            .field("hidden_dim", &self.hidden_dim)
            .finish_non_exhaustive()
    }
}

impl QNetwork {
    pub fn new<R: Rng>(input_dim: usize, hidden_dim: usize, rng: &mut R) -> Result<Self> {
        Self::from_weights(&NetworkWeights::glorot(input_dim, hidden_dim, rng))
    }

    /// Build a network holding exactly `weights`.
    pub fn from_weights(weights: &NetworkWeights) -> Result<Self> {
        weights.validate()?;
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let hidden = candle_nn::linear(weights.input_dim, weights.hidden_dim, vb.pp("hidden"))?;
        let output = candle_nn::linear(weights.hidden_dim, NUM_ACTIONS, vb.pp("output"))?;
        let network = Self {
            varmap,
            hidden,
            output,
            input_dim: weights.input_dim,
            hidden_dim: weights.hidden_dim,
            device,
        };
        network.load(weights)?;
        Ok(network)
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_dim
    }

    /// Overwrite every parameter in place. Optimizers built over this
    /// network's variables stay attached.
    pub fn load(&self, weights: &NetworkWeights) -> Result<()> {
        weights.validate()?;
        if weights.input_dim != self.input_dim || weights.hidden_dim != self.hidden_dim {
            return Err(Error::config(format!(
                "weights are {}x{}, network is {}x{}",
                weights.input_dim, weights.hidden_dim, self.input_dim, self.hidden_dim
            )));
        }
        let data = self.vars();
        for (name, values, shape) in weights.tensors() {
            let tensor = Tensor::from_slice(values, shape.as_slice(), &self.device)?;
            var(&data, name)?.set(&tensor)?;
        }
        Ok(())
    }

    /// Read every parameter back out of the tensors.
    pub fn weights(&self) -> Result<NetworkWeights> {
        let data = self.vars();
        let read = |name: &str| -> Result<Vec<f32>> {
            Ok(var(&data, name)?
                .as_tensor()
                .flatten_all()?
                .to_vec1::<f32>()?)
        };
        Ok(NetworkWeights {
            input_dim: self.input_dim,
            hidden_dim: self.hidden_dim,
            hidden_weight: read(HIDDEN_WEIGHT)?,
            hidden_bias: read(HIDDEN_BIAS)?,
            output_weight: read(OUTPUT_WEIGHT)?,
            output_bias: read(OUTPUT_BIAS)?,
        })
    }

    /// A network with its own storage and the same parameters.
    pub fn duplicate(&self) -> Result<Self> {
        Self::from_weights(&self.weights()?)
    }

    /// AdamW over this network's variables, without weight decay.
    pub fn optimizer(&self, learning_rate: f64) -> Result<AdamW> {
        let params = ParamsAdamW {
            lr: learning_rate,
            weight_decay: 0.0,
            ..ParamsAdamW::default()
        };
        Ok(AdamW::new(self.varmap.all_vars(), params)?)
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let hidden = self.hidden.forward(input)?.relu()?;
        Ok(self.output.forward(&hidden)?)
    }

    fn batch(&self, inputs: &[&[f64]]) -> Result<Tensor> {
        let flat: Vec<f32> = inputs
            .iter()
            .flat_map(|input| input.iter().map(|&x| x as f32))
            .collect();
        Ok(Tensor::from_vec(
            flat,
            (inputs.len(), self.input_dim),
            &self.device,
        )?)
    }

    pub fn predict(&self, input: &[f64]) -> Result<ActionValues> {
        let mut values = self.predict_batch(&[input])?;
        values
            .pop()
            .ok_or_else(|| Error::config("network produced no output"))
    }

    /// One [`ActionValues`] per input row.
    pub fn predict_batch(&self, inputs: &[&[f64]]) -> Result<Vec<ActionValues>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self.forward(&self.batch(inputs)?)?.to_vec2::<f32>()?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut values = [0.0; NUM_ACTIONS];
                for (value, q) in values.iter_mut().zip(row) {
                    *value = f64::from(q);
                }
                ActionValues(values)
            })
            .collect())
    }

    /// Index of the largest output for each row, without leaving the tensor.
    pub fn best_actions(&self, inputs: &[&[f64]]) -> Result<Vec<u32>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .forward(&self.batch(inputs)?)?
            .argmax(D::Minus1)?
            .to_vec1::<u32>()?)
    }

    /// One optimizer step on the mean squared error of the selected outputs.
    ///
    /// Gradient components are clipped to `[-clip, clip]` before the step.
    /// Returns the loss before the step.
    pub fn train(
        &self,
        optimizer: &mut AdamW,
        samples: &[TrainingSample<'_>],
        clip: f64,
    ) -> Result<f64> {
        if samples.is_empty() {
            return Ok(0.0);
        }
        let inputs: Vec<&[f64]> = samples.iter().map(|s| s.features).collect();
        let actions: Vec<u32> = samples.iter().map(|s| s.action as u32).collect();
        let targets: Vec<f32> = samples.iter().map(|s| s.target as f32).collect();
        let n = samples.len();

        let actions = Tensor::from_vec(actions, (n, 1), &self.device)?;
        let targets = Tensor::from_vec(targets, n, &self.device)?;
        let predicted = self
            .forward(&self.batch(&inputs)?)?
            .gather(&actions, 1)?
            .squeeze(1)?;
        let loss = candle_nn::loss::mse(&predicted, &targets)?;

        let mut grads = loss.backward()?;
        let clip = clip as f32;
        for var in self.varmap.all_vars() {
            if let Some(grad) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), grad.clamp(-clip, clip)?);
            }
        }
        optimizer.step(&grads)?;
        Ok(f64::from(loss.to_scalar::<f32>()?))
    }

    /// Hard copy of another network's parameters into this one's storage.
    pub fn copy_from(&self, other: &QNetwork) -> Result<()> {
        if other.input_dim != self.input_dim || other.hidden_dim != self.hidden_dim {
            return Err(Error::config(format!(
                "cannot copy a {}x{} network into a {}x{} one",
                other.input_dim, other.hidden_dim, self.input_dim, self.hidden_dim
            )));
        }
        let source = other.vars();
        let target = self.vars();
        for (name, parameter) in target.iter() {
            parameter.set(&var(&source, name)?.as_tensor().detach())?;
        }
        Ok(())
    }

    fn vars(&self) -> MutexGuard<'_, HashMap<String, Var>> {
        self.varmap
            .data()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn var<'a>(data: &'a HashMap<String, Var>, name: &str) -> Result<&'a Var> {
    data.get(name)
        .ok_or_else(|| Error::config(format!("network has no parameter '{name}'")))
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn network() -> QNetwork {
        QNetwork::new(3, 8, &mut StdRng::seed_from_u64(1)).unwrap()
    }

    #[test]
    fn test_predict_has_one_value_per_action() {
        let net = network();
        let values = net.predict(&[0.1, -0.2, 0.3]).unwrap();
        assert!(values.0.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_seeded_networks_are_identical() {
        let a = network().weights().unwrap();
        let b = network().weights().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hidden_weight.len(), 24);
        assert_eq!(a.output_bias, vec![0.0; NUM_ACTIONS]);
    }

    #[test]
    fn test_training_moves_prediction_toward_target() {
        let net = network();
        let mut optimizer = net.optimizer(0.01).unwrap();
        let input = [0.5, 0.25, -0.5];
        let sample = TrainingSample {
            features: &input,
            action: 2,
            target: 1.0,
        };
        let before = (net.predict(&input).unwrap().0[2] - 1.0).abs();
        for _ in 0..300 {
            net.train(&mut optimizer, &[sample], 1.0).unwrap();
        }
        let after = (net.predict(&input).unwrap().0[2] - 1.0).abs();
        assert!(after < before);
        assert!(after < 0.1);
    }

    #[test]
    fn test_batch_prediction_matches_single_rows() {
        let net = network();
        let a = [0.1, 0.2, 0.3];
        let b = [-0.4, 0.0, 0.9];
        let batch = net.predict_batch(&[&a, &b]).unwrap();
        assert_eq!(batch.len(), 2);
        for (single, batched) in [net.predict(&a).unwrap(), net.predict(&b).unwrap()]
            .iter()
            .zip(&batch)
        {
            for (x, y) in single.0.iter().zip(&batched.0) {
                assert!((x - y).abs() < 1e-6);
            }
        }
        let best = net.best_actions(&[&a, &b]).unwrap();
        assert_eq!(best[0] as usize, batch[0].best().index().unwrap());
    }

    #[test]
    fn test_copy_from_makes_identical_networks() {
        let target = QNetwork::new(3, 8, &mut StdRng::seed_from_u64(99)).unwrap();
        let online = network();
        assert_ne!(target.weights().unwrap(), online.weights().unwrap());
        target.copy_from(&online).unwrap();
        assert_eq!(target.weights().unwrap(), online.weights().unwrap());
    }

    #[test]
    fn test_duplicate_does_not_share_storage() {
        let online = network();
        let copy = online.duplicate().unwrap();
        let mut optimizer = online.optimizer(0.05).unwrap();
        let input = [1.0, 1.0, 1.0];
        let sample = TrainingSample {
            features: &input,
            action: 0,
            target: 5.0,
        };
        online.train(&mut optimizer, &[sample], 1.0).unwrap();
        assert_ne!(copy.weights().unwrap(), online.weights().unwrap());
    }

    #[test]
    fn test_empty_batch_is_a_no_op() {
        let net = network();
        let mut optimizer = net.optimizer(0.1).unwrap();
        let before = net.weights().unwrap();
        assert_eq!(net.train(&mut optimizer, &[], 1.0).unwrap(), 0.0);
        assert_eq!(net.weights().unwrap(), before);
    }

    #[test]
    fn test_truncated_weights_are_rejected() {
        let mut weights = network().weights().unwrap();
        weights.output_weight.truncate(5);
        assert!(matches!(
            QNetwork::from_weights(&weights),
            Err(Error::InvalidConfiguration { .. })
        ));

        let mut weights = network().weights().unwrap();
        weights.hidden_bias.clear();
        assert!(network().load(&weights).is_err());

        let mut weights = network().weights().unwrap();
        weights.hidden_weight[0] = f32::NAN;
        assert!(weights.validate().is_err());
    }
}
