//! # Error Module
//!
//! One error enum for the whole library. Variants are grouped the way the
//! pipeline reports them:
//!
//! - **Configuration** errors are raised before any expensive or
//!   outward-facing work starts (bad source selection, missing columns,
//!   too few labels).
//! - **Per-item** errors (`NoFeatures`, `Catalog`) are recovered locally by
//!   the dataset builder and only surface when a caller asks for one track.
//! - **Partial completion** (`PartialAppend`) carries how far a batched
//!   append got before failing; nothing is rolled back.
//! - **Artifact** errors guard the scaler / encoder / weights triple.
//!
//! The binary wraps these in `anyhow::Error` with extra context.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MoodError>;

/// Everything the library can fail with.
///
/// Configuration errors are raised before any side effect;
/// [`MoodError::is_configuration`] picks them out.
#[derive(Debug, Error)]
pub enum MoodError {
    /// Curation needs exactly one track source.
    #[error("exactly one track source is required (got {0})")]
    SourceConflict(&'static str),

    /// A tabular file lacks required columns.
    #[error("{} is missing required columns: {}", path.display(), columns.join(", "))]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    /// A cell could not be parsed as the type its column requires.
    #[error("row {row}, column `{column}`: invalid value {value:?}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("training needs at least 2 distinct labels, found {found}")]
    TooFewLabels { found: usize },

    #[error("label `{label}` has {count} example(s); stratified splitting needs at least 2")]
    TooFewExamples { label: String, count: usize },

    #[error("row {row} has a non-finite value for `{feature}`")]
    NonFiniteFeature { row: usize, feature: &'static str },

    #[error("mood `{mood}` is not known to the model (known: {})", known.join(", "))]
    UnknownMood { mood: String, known: Vec<String> },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The catalog returned nothing for this track (withdrawn, region-locked, ...).
    #[error("no audio features available for track {track_id}")]
    NoFeatures { track_id: String },

    /// The external catalog collaborator failed.
    #[error("catalog request failed: {context}")]
    Catalog {
        context: String,
        #[source]
        source: anyhow::Error,
    },

    /// A batched append stopped part-way. Earlier batches stay in place.
    #[error("appended {appended} of {requested} tracks to {collection_id} before failing")]
    PartialAppend {
        collection_id: String,
        appended: usize,
        requested: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("dataset is empty: {0}")]
    EmptyDataset(String),

    /// Weights were found without the paired scaler/encoder file.
    #[error("model metadata {} not found next to the weights file", .0.display())]
    MissingArtifactMeta(PathBuf),

    #[error("model artifact mismatch: {0}")]
    ArtifactMismatch(String),

    #[error("label `{0}` is not in the encoder vocabulary")]
    UnknownLabel(String),

    #[error("class index {index} is out of range for {classes} classes")]
    UnknownClass { index: usize, classes: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MoodError {
    /// Wrap a collaborator failure with a short description of the call.
    pub fn catalog(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Catalog {
            context: context.into(),
            source,
        }
    }

    /// True for errors that mean "the caller asked for something invalid",
    /// as opposed to a runtime failure.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::SourceConflict(_)
                | Self::MissingColumns { .. }
                | Self::TooFewLabels { .. }
                | Self::TooFewExamples { .. }
                | Self::NonFiniteFeature { .. }
                | Self::InvalidValue { .. }
                | Self::UnknownMood { .. }
                | Self::InvalidConfig(_)
        )
    }
}
