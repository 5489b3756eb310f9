//! Small fully-connected network: dense layers, ReLU hidden activations,
//! softmax output, sparse categorical cross-entropy and Adam.
//!
//! Weights are plain `Vec<f64>` in row-major `outputs x inputs` order so the
//! whole network serializes straight to JSON.

use crate::error::{MoodError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Hidden layer widths of the mood network.
pub const HIDDEN_LAYERS: [usize; 2] = [64, 32];

/// Floor for probabilities fed to `ln`.
const PROB_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Softmax,
}

/// Fully connected layer; `weights` is row-major, `outputs` rows of
/// `inputs` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    inputs: usize,
    outputs: usize,
    weights: Vec<f64>,
    biases: Vec<f64>,
    activation: Activation,
}

impl Dense {
    /// Glorot-uniform weights, zero biases.
    fn new<R: Rng + ?Sized>(inputs: usize, outputs: usize, activation: Activation, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            inputs,
            outputs,
            weights: (0..inputs * outputs)
                .map(|_| rng.gen_range(-limit..limit))
                .collect(),
            biases: vec![0.0; outputs],
            activation,
        }
    }

    /// Pre-activation `W x + b`.
    fn affine(&self, x: &[f64]) -> Vec<f64> {
        self.weights
            .chunks_exact(self.inputs)
            .zip(&self.biases)
            .map(|(row, b)| row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect()
    }

    fn activate(&self, z: &[f64]) -> Vec<f64> {
        match self.activation {
            Activation::Relu => z.iter().map(|v| v.max(0.0)).collect(),
            Activation::Softmax => softmax(z),
        }
    }
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; first one wins ties.
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
        .0
}

/// Stack of dense layers, serialised as-is into the weights file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    layers: Vec<Dense>,
}

impl Network {
    /// Build `sizes[0] -> sizes[1] -> ... -> sizes[n]`; ReLU between, softmax last.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for fewer than two sizes or a zero width.
    pub fn new<R: Rng + ?Sized>(sizes: &[usize], rng: &mut R) -> Result<Self> {
        if sizes.len() < 2 || sizes.contains(&0) {
            return Err(MoodError::InvalidConfig(format!(
                "invalid layer sizes {sizes:?}"
            )));
        }
        let last = sizes.len() - 2;
        let layers = sizes
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let activation = if i == last {
                    Activation::Softmax
                } else {
                    Activation::Relu
                };
                Dense::new(w[0], w[1], activation, rng)
            })
            .collect();
        Ok(Self { layers })
    }

    /// `inputs -> 64 -> 32 -> classes`.
    pub fn mood_net<R: Rng + ?Sized>(inputs: usize, classes: usize, rng: &mut R) -> Result<Self> {
        let mut sizes = vec![inputs];
        sizes.extend(HIDDEN_LAYERS);
        sizes.push(classes);
        Self::new(&sizes, rng)
    }

    /// Layer widths including the input.
    #[must_use]
    pub fn architecture(&self) -> Vec<usize> {
        std::iter::once(self.input_width())
            .chain(self.layers.iter().map(|l| l.outputs))
            .collect()
    }

    #[must_use]
    pub fn input_width(&self) -> usize {
        self.layers.first().map_or(0, |l| l.inputs)
    }

    #[must_use]
    pub fn output_width(&self) -> usize {
        self.layers.last().map_or(0, |l| l.outputs)
    }

    /// Check shapes after deserializing weights from disk.
    pub fn validate(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(MoodError::ArtifactMismatch("network has no layers".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.weights.len() != layer.inputs * layer.outputs
                || layer.biases.len() != layer.outputs
                || layer.inputs == 0
            {
                return Err(MoodError::ArtifactMismatch(format!(
                    "layer {i} has inconsistent weight shapes"
                )));
            }
            if i > 0 && self.layers[i - 1].outputs != layer.inputs {
                return Err(MoodError::ArtifactMismatch(format!(
                    "layer {i} expects {} inputs but the previous layer emits {}",
                    layer.inputs,
                    self.layers[i - 1].outputs
                )));
            }
        }
        if self.layers.last().map(|l| l.activation) != Some(Activation::Softmax) {
            return Err(MoodError::ArtifactMismatch("output layer is not softmax".into()));
        }
        Ok(())
    }

    /// Class probabilities for one (already scaled) row.
    #[must_use]
    pub fn forward(&self, x: &[f64]) -> Vec<f64> {
        self.layers
            .iter()
            .fold(x.to_vec(), |a, layer| layer.activate(&layer.affine(&a)))
    }

    #[must_use]
    pub fn predict_class(&self, x: &[f64]) -> usize {
        argmax(&self.forward(x))
    }

    /// Fraction of rows whose argmax equals the target.
    #[must_use]
    pub fn accuracy(&self, x: &[Vec<f64>], y: &[usize]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let hits = x
            .iter()
            .zip(y)
            .filter(|(row, t)| self.predict_class(row) == **t)
            .count();
        hits as f64 / x.len() as f64
    }

    /// Mean cross-entropy over `x`.
    #[must_use]
    pub fn loss(&self, x: &[Vec<f64>], y: &[usize]) -> f64 {
        if x.is_empty() {
            return 0.0;
        }
        let total: f64 = x
            .iter()
            .zip(y)
            .map(|(row, &t)| -self.forward(row)[t].max(PROB_FLOOR).ln())
            .sum();
        total / x.len() as f64
    }

    /// Accumulate gradients of one sample into `grads`; returns its loss.
    fn backprop(&self, x: &[f64], target: usize, grads: &mut [Gradient]) -> f64 {
        // activations[0] is the input, activations[i + 1] the output of layer i
        let mut activations = vec![x.to_vec()];
        for layer in &self.layers {
            let a = layer.activate(&layer.affine(activations.last().map_or(&[][..], Vec::as_slice)));
            activations.push(a);
        }
        let probs = &activations[self.layers.len()];
        let loss = -probs[target].max(PROB_FLOOR).ln();

        // softmax + cross-entropy: dL/dz = p - onehot
        let mut delta: Vec<f64> = probs.clone();
        delta[target] -= 1.0;

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let input = &activations[i];
            let grad = &mut grads[i];
            for (o, d) in delta.iter().enumerate() {
                grad.biases[o] += d;
                let row = &mut grad.weights[o * layer.inputs..(o + 1) * layer.inputs];
                for (g, a) in row.iter_mut().zip(input) {
                    *g += d * a;
                }
            }
            if i == 0 {
                break;
            }
            // propagate through W^T, then the previous layer's ReLU
            let mut prev = vec![0.0; layer.inputs];
            for (o, d) in delta.iter().enumerate() {
                let row = &layer.weights[o * layer.inputs..(o + 1) * layer.inputs];
                for (p, w) in prev.iter_mut().zip(row) {
                    *p += w * d;
                }
            }
            for (p, a) in prev.iter_mut().zip(input) {
                if *a <= 0.0 {
                    *p = 0.0;
                }
            }
            delta = prev;
        }
        loss
    }

    /// One pass over `x` in shuffled mini-batches. Returns the mean loss.
    pub fn train_epoch<R: Rng + ?Sized>(
        &mut self,
        optimizer: &mut Adam,
        x: &[Vec<f64>],
        y: &[usize],
        batch_size: usize,
        rng: &mut R,
    ) -> f64 {
        let mut order: Vec<usize> = (0..x.len()).collect();
        order.shuffle(rng);

        let mut total = 0.0;
        for batch in order.chunks(batch_size.max(1)) {
            let mut grads: Vec<Gradient> = self.layers.iter().map(Gradient::zeros).collect();
            for &i in batch {
                total += self.backprop(&x[i], y[i], &mut grads);
            }
            let scale = 1.0 / batch.len() as f64;
            for g in &mut grads {
                g.scale(scale);
            }
            optimizer.step(&mut self.layers, &grads);
        }
        if x.is_empty() {
            0.0
        } else {
            total / x.len() as f64
        }
    }
}

/// Gradient buffers shaped like one [`Dense`] layer.
#[derive(Debug, Clone)]
struct Gradient {
    weights: Vec<f64>,
    biases: Vec<f64>,
}

impl Gradient {
    fn zeros(layer: &Dense) -> Self {
        Self {
            weights: vec![0.0; layer.weights.len()],
            biases: vec![0.0; layer.biases.len()],
        }
    }

    fn scale(&mut self, factor: f64) {
        self.weights.iter_mut().chain(self.biases.iter_mut()).for_each(|g| *g *= factor);
    }
}

/// Adam optimizer state for one network.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    step: i32,
    m: Vec<Gradient>,
    v: Vec<Gradient>,
}

impl Adam {
    /// Zeroed moment estimates shaped like `network`; betas 0.9 and 0.999,
    /// epsilon 1e-7.
    #[must_use]
    pub fn new(network: &Network, learning_rate: f64) -> Self {
        let zeros: Vec<Gradient> = network.layers.iter().map(Gradient::zeros).collect();
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            step: 0,
            m: zeros.clone(),
            v: zeros,
        }
    }

    fn step(&mut self, layers: &mut [Dense], grads: &[Gradient]) {
        self.step += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let correction1 = 1.0 - b1.powi(self.step);
        let correction2 = 1.0 - b2.powi(self.step);
        let lr = self.learning_rate;
        let eps = self.epsilon;

        let update = |param: &mut f64, g: f64, m: &mut f64, v: &mut f64| {
            *m = b1 * *m + (1.0 - b1) * g;
            *v = b2 * *v + (1.0 - b2) * g * g;
            let m_hat = *m / correction1;
            let v_hat = *v / correction2;
            *param -= lr * m_hat / (v_hat.sqrt() + eps);
        };

        for (((layer, g), m), v) in layers.iter_mut().zip(grads).zip(&mut self.m).zip(&mut self.v) {
            for (((w, &gw), mw), vw) in layer
                .weights
                .iter_mut()
                .zip(&g.weights)
                .zip(&mut m.weights)
                .zip(&mut v.weights)
            {
                update(w, gw, mw, vw);
            }
            for (((b, &gb), mb), vb) in layer
                .biases
                .iter_mut()
                .zip(&g.biases)
                .zip(&mut m.biases)
                .zip(&mut v.biases)
            {
                update(b, gb, mb, vb);
            }
        }
    }
}
