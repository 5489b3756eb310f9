//! # Mood Classifier Module
//!
//! Training, inference and persistence of the mood network.
//!
//! ## Trained artifact
//!
//! The scaler, the label encoder and the network weights only make sense
//! together: weights are fitted against one exact scaling and one exact
//! class order. [`TrainedArtifact`] holds all three, is built only by
//! [`MoodClassifier::fit`] or [`MoodClassifier::load`], and has no setters.
//! Retraining produces a new artifact.
//!
//! ## Files
//!
//! `save("model/moodnet.json")` writes two files sharing a base name:
//!
//! - `model/moodnet.json`: architecture and weights
//! - `model/moodnet.meta`: feature names, scaler parameters, label vocabulary
//!
//! Both are required to load.
//!
//! ## Training
//!
//! 1. Validate the table before any compute: at least two labels, at least
//!    two rows per label, finite features only.
//! 2. Fit the scaler on the feature columns and the encoder on the labels.
//! 3. Stratified 80/20 split, so rare moods show up on both sides.
//! 4. Fit `9 -> 64 -> 32 -> K` with Adam on cross-entropy.
//! 5. Report accuracy on both partitions and per-class metrics on the
//!    validation partition.

use crate::dataset::Dataset;
use crate::error::{MoodError, Result};
use crate::network::{Adam, Network};
use crate::preprocess::{LabelEncoder, MinMaxScaler};
use crate::track::{normalize_mood, FeatureVector, FEATURE_NAMES};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Bumped whenever the on-disk layout changes.
pub const ARTIFACT_VERSION: u32 = 1;

/// Extension of the scaler/encoder file that sits next to the weights.
pub const META_EXTENSION: &str = "meta";

/// Training hyperparameters. The topology itself is fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Share of each label held out for validation.
    pub validation_fraction: f64,
    /// Fixed seed for reproducible runs; entropy otherwise.
    pub seed: Option<u64>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 25,
            batch_size: 4,
            learning_rate: 0.01,
            validation_fraction: 0.2,
            seed: None,
        }
    }
}

impl TrainConfig {
    fn validate(&self) -> Result<()> {
        if self.epochs == 0 || self.batch_size == 0 {
            return Err(MoodError::InvalidConfig(
                "epochs and batch size must be at least 1".into(),
            ));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(MoodError::InvalidConfig(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(MoodError::InvalidConfig(format!(
                "validation fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        Ok(())
    }
}

/// Precision / recall / F1 of one class on the validation partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Summary of one training run, printed by `moodify train`.
///
/// Accuracies are fractions in `[0, 1]`; `per_class` follows the label
/// order of the trained encoder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub final_loss: f64,
    pub train_accuracy: f64,
    pub validation_accuracy: f64,
    pub per_class: Vec<ClassMetrics>,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|c| c.label.len())
            .max()
            .unwrap_or(0)
            .max(8);
        writeln!(
            f,
            "{:>width$}  {:>9}  {:>6}  {:>8}  {:>7}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for c in &self.per_class {
            writeln!(
                f,
                "{:>width$}  {:>9.2}  {:>6.2}  {:>8.2}  {:>7}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Training accuracy  : {:.3}", self.train_accuracy)?;
        write!(f, "Validation accuracy: {:.3}", self.validation_accuracy)
    }
}

/// Scaler, encoder and weights as one immutable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifact {
    feature_names: Vec<String>,
    scaler: MinMaxScaler,
    encoder: LabelEncoder,
    network: Network,
}

impl TrainedArtifact {
    fn new(
        feature_names: Vec<String>,
        scaler: MinMaxScaler,
        encoder: LabelEncoder,
        network: Network,
    ) -> Result<Self> {
        network.validate()?;
        scaler.validate()?;
        if feature_names.len() != scaler.n_features() || scaler.n_features() != network.input_width() {
            return Err(MoodError::ArtifactMismatch(format!(
                "{} feature names, scaler for {}, network input {}",
                feature_names.len(),
                scaler.n_features(),
                network.input_width()
            )));
        }
        if encoder.n_classes() != network.output_width() {
            return Err(MoodError::ArtifactMismatch(format!(
                "{} labels but the network has {} outputs",
                encoder.n_classes(),
                network.output_width()
            )));
        }
        Ok(Self {
            feature_names,
            scaler,
            encoder,
            network,
        })
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    #[must_use]
    pub fn encoder(&self) -> &LabelEncoder {
        &self.encoder
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }
}

#[derive(Serialize, Deserialize)]
struct WeightsFile {
    format_version: u32,
    architecture: Vec<usize>,
    network: Network,
}

#[derive(Serialize, Deserialize)]
struct MetaFile {
    format_version: u32,
    feature_names: Vec<String>,
    scaler: MinMaxScaler,
    labels: Vec<String>,
}

/// Path of the scaler/encoder file paired with `weights`.
#[must_use]
pub fn meta_path(weights: &Path) -> PathBuf {
    weights.with_extension(META_EXTENSION)
}

/// Split row indices per class so every class lands on both sides.
///
/// Each class of `n` rows sends `round(n * fraction)` rows to validation,
/// at least one and never all of them. Callers guarantee `n >= 2`.
pub fn stratified_split<R: rand::Rng + ?Sized>(
    labels: &[usize],
    fraction: f64,
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        by_class.entry(label).or_default().push(i);
    }

    let mut train = Vec::new();
    let mut validation = Vec::new();
    for (_, mut indices) in by_class {
        indices.shuffle(rng);
        let n = indices.len();
        let held_out = ((n as f64 * fraction).round() as usize).clamp(1, n.saturating_sub(1).max(1));
        validation.extend_from_slice(&indices[..held_out]);
        train.extend_from_slice(&indices[held_out..]);
    }
    (train, validation)
}

fn class_metrics(
    network: &Network,
    encoder: &LabelEncoder,
    x: &[Vec<f64>],
    y: &[usize],
) -> Vec<ClassMetrics> {
    let predicted: Vec<usize> = x.iter().map(|row| network.predict_class(row)).collect();
    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    encoder
        .classes()
        .iter()
        .enumerate()
        .map(|(c, label)| {
            let tp = predicted.iter().zip(y).filter(|(p, t)| **p == c && **t == c).count();
            let fp = predicted.iter().zip(y).filter(|(p, t)| **p == c && **t != c).count();
            let support = y.iter().filter(|t| **t == c).count();
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, support);
            let f1 = if precision + recall == 0.0 {
                0.0
            } else {
                2.0 * precision * recall / (precision + recall)
            };
            ClassMetrics {
                label: label.clone(),
                precision,
                recall,
                f1,
                support,
            }
        })
        .collect()
}

/// Trained mood classifier. Cheap to share: inference takes `&self`.
#[derive(Debug, Clone, PartialEq)]
pub struct MoodClassifier {
    artifact: TrainedArtifact,
}

impl MoodClassifier {
    /// Everything that must hold before training starts.
    ///
    /// # Errors
    ///
    /// `TooFewLabels`, `TooFewExamples` or `NonFiniteFeature`.
    pub fn check_training_set(dataset: &Dataset) -> Result<()> {
        let counts = dataset.label_counts();
        if counts.len() < 2 {
            return Err(MoodError::TooFewLabels { found: counts.len() });
        }
        if let Some((label, &count)) = counts.iter().find(|(_, c)| **c < 2) {
            return Err(MoodError::TooFewExamples {
                label: (*label).to_string(),
                count,
            });
        }
        for (i, row) in dataset.rows().iter().enumerate() {
            row.features.check_finite(i + 1)?;
        }
        Ok(())
    }

    /// Fit scaler, encoder and network on `dataset`.
    ///
    /// # Errors
    ///
    /// Configuration errors from [`Self::check_training_set`] and
    /// [`TrainConfig`], raised before any training happens.
    pub fn fit(dataset: &Dataset, config: &TrainConfig) -> Result<(Self, TrainingReport)> {
        config.validate()?;
        Self::check_training_set(dataset)?;

        let raw = dataset.feature_matrix();
        let scaler = MinMaxScaler::fit(&raw)?;
        let x = scaler.transform_all(&raw)?;
        let encoder = LabelEncoder::fit(&dataset.labels());
        let y = encoder.encode_all(&dataset.labels())?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (train_idx, val_idx) = stratified_split(&y, config.validation_fraction, &mut rng);
        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<usize>) {
            idx.iter().map(|&i| (x[i].clone(), y[i])).unzip()
        };
        let (x_train, y_train) = pick(&train_idx);
        let (x_val, y_val) = pick(&val_idx);

        info!(
            "training on {} rows, validating on {} rows, {} classes: {}",
            x_train.len(),
            x_val.len(),
            encoder.n_classes(),
            encoder.classes().join(", ")
        );

        let mut network = Network::mood_net(FEATURE_NAMES.len(), encoder.n_classes(), &mut rng)?;
        let mut optimizer = Adam::new(&network, config.learning_rate);
        let mut final_loss = 0.0;
        for epoch in 1..=config.epochs {
            final_loss =
                network.train_epoch(&mut optimizer, &x_train, &y_train, config.batch_size, &mut rng);
            debug!(
                "epoch {epoch}/{}: loss {final_loss:.4}, accuracy {:.3}, val_accuracy {:.3}",
                config.epochs,
                network.accuracy(&x_train, &y_train),
                network.accuracy(&x_val, &y_val)
            );
        }

        let report = TrainingReport {
            epochs: config.epochs,
            train_rows: x_train.len(),
            validation_rows: x_val.len(),
            final_loss,
            train_accuracy: network.accuracy(&x_train, &y_train),
            validation_accuracy: network.accuracy(&x_val, &y_val),
            per_class: class_metrics(&network, &encoder, &x_val, &y_val),
        };

        let feature_names = FEATURE_NAMES.iter().map(|n| (*n).to_string()).collect();
        let artifact = TrainedArtifact::new(feature_names, scaler, encoder, network)?;
        Ok((Self { artifact }, report))
    }

    /// Scaler, encoder and network as one unit.
    #[must_use]
    pub fn artifact(&self) -> &TrainedArtifact {
        &self.artifact
    }

    /// Label vocabulary in class-index order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        self.artifact.encoder.classes()
    }

    /// The stored spelling of a user-typed mood, ignoring case and padding.
    ///
    /// # Errors
    ///
    /// `UnknownMood` if no label matches.
    pub fn resolve_mood(&self, mood: &str) -> Result<&str> {
        let wanted = normalize_mood(mood);
        self.labels()
            .iter()
            .find(|l| normalize_mood(l) == wanted)
            .map(String::as_str)
            .ok_or_else(|| MoodError::UnknownMood {
                mood: mood.to_string(),
                known: self.labels().to_vec(),
            })
    }

    /// Predict a label per raw (unscaled) numeric row.
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` if any row's width differs from the trained
    /// feature count; rows are never truncated or padded.
    pub fn predict_matrix(&self, rows: &[Vec<f64>]) -> Result<Vec<String>> {
        let artifact = &self.artifact;
        rows.par_iter()
            .map(|row| {
                let scaled = artifact.scaler.transform(row)?;
                let class = artifact.network.predict_class(&scaled);
                artifact.encoder.decode(class).map(str::to_string)
            })
            .collect()
    }

    /// Predict a label per feature vector, same order as the input.
    ///
    /// Rows are scaled with the scaler fitted at training time and scored in
    /// parallel.
    ///
    /// # Returns
    ///
    /// One label from [`labels`](Self::labels) per input row.
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` if the loaded artifact was built for another
    /// feature width.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use moodify::model::MoodClassifier;
    /// use moodify::track::FeatureVector;
    /// use std::path::Path;
    ///
    /// let classifier = MoodClassifier::load(Path::new("moodnet.json"))?;
    /// let track = FeatureVector::from_slice(&[0.1, 0.7, 0.8, 0.0, 0.1, -5.0, 0.04, 120.0, 0.9])?;
    /// let moods = classifier.predict(&[track])?;
    /// println!("{}", moods[0]);
    /// # Ok::<(), moodify::error::MoodError>(())
    /// ```
    pub fn predict(&self, rows: &[FeatureVector]) -> Result<Vec<String>> {
        let matrix: Vec<Vec<f64>> = rows.iter().map(|r| r.to_array().to_vec()).collect();
        self.predict_matrix(&matrix)
    }

    /// [`predict`](Self::predict) for a single track.
    ///
    /// # Errors
    ///
    /// As for [`predict`](Self::predict).
    pub fn predict_one(&self, features: &FeatureVector) -> Result<String> {
        self.predict(std::slice::from_ref(features))?
            .pop()
            .ok_or_else(|| MoodError::ArtifactMismatch("empty prediction".into()))
    }

    /// Write weights to `path` and scaler/encoder to its `.meta` sibling.
    ///
    /// Parent directories are created. Both files carry
    /// [`ARTIFACT_VERSION`] and are replaced if they exist.
    ///
    /// # Errors
    ///
    /// `Io` if either file cannot be written; `Json` if serialisation fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let artifact = &self.artifact;
        let weights = WeightsFile {
            format_version: ARTIFACT_VERSION,
            architecture: artifact.network.architecture(),
            network: artifact.network.clone(),
        };
        let meta = MetaFile {
            format_version: ARTIFACT_VERSION,
            feature_names: artifact.feature_names.clone(),
            scaler: artifact.scaler.clone(),
            labels: artifact.encoder.classes().to_vec(),
        };
        fs::write(path, serde_json::to_vec(&weights)?)?;
        fs::write(meta_path(path), serde_json::to_vec_pretty(&meta)?)?;
        info!("saved model to {} (+ .{META_EXTENSION})", path.display());
        Ok(())
    }

    /// Load a classifier saved by [`Self::save`].
    ///
    /// # Errors
    ///
    /// `MissingArtifactMeta` without the `.meta` sibling; `ArtifactMismatch`
    /// when the two files disagree with each other or with this build's
    /// feature vocabulary.
    pub fn load(path: &Path) -> Result<Self> {
        let meta_file = meta_path(path);
        let weights_raw = fs::read(path)?;
        if !meta_file.is_file() {
            return Err(MoodError::MissingArtifactMeta(meta_file));
        }
        let meta: MetaFile = serde_json::from_slice(&fs::read(&meta_file)?)?;
        let weights: WeightsFile = serde_json::from_slice(&weights_raw)?;

        if weights.format_version != ARTIFACT_VERSION || meta.format_version != ARTIFACT_VERSION {
            return Err(MoodError::ArtifactMismatch(format!(
                "format versions {}/{} (expected {ARTIFACT_VERSION})",
                weights.format_version, meta.format_version
            )));
        }
        if weights.architecture != weights.network.architecture() {
            return Err(MoodError::ArtifactMismatch(
                "declared architecture does not match the stored layers".into(),
            ));
        }
        if meta.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(MoodError::ArtifactMismatch(format!(
                "model was trained on features [{}]",
                meta.feature_names.join(", ")
            )));
        }

        let encoder = LabelEncoder::from_classes(meta.labels)?;
        let artifact = TrainedArtifact::new(meta.feature_names, meta.scaler, encoder, weights.network)?;
        debug!(
            "loaded model {} with labels {}",
            path.display(),
            artifact.encoder.classes().join(", ")
        );
        Ok(Self { artifact })
    }
}
