//! Track, feature and row types shared by every stage of the pipeline.

use crate::error::{MoodError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of audio features per track.
pub const FEATURE_COUNT: usize = 9;

/// Feature vocabulary, in the column order the model is trained on.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "acousticness",
    "danceability",
    "energy",
    "instrumentalness",
    "liveness",
    "loudness",
    "speechiness",
    "tempo",
    "valence",
];

/// Strip a `spotify:track:` style URI down to its bare id.
#[must_use]
pub fn bare_track_id(uri: &str) -> &str {
    uri.rsplit(':').next().unwrap_or(uri).trim()
}

/// How a track is identified and displayed. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Opaque catalog id, without any URI prefix.
    pub id: String,
    pub name: String,
    /// Primary artist only.
    pub artist: String,
    pub duration: Option<Duration>,
}

impl TrackRecord {
    pub fn new(id: impl AsRef<str>, name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: bare_track_id(id.as_ref()).to_string(),
            name: name.into(),
            artist: artist.into(),
            duration: None,
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// The nine service-defined audio descriptors of one track, un-normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub acousticness: f64,
    pub danceability: f64,
    pub energy: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub tempo: f64,
    pub valence: f64,
}

impl FeatureVector {
    /// Build from values ordered like [`FEATURE_NAMES`].
    ///
    /// # Errors
    ///
    /// `InvalidConfig` on a wrong length, `NonFiniteFeature` on NaN/inf.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != FEATURE_COUNT {
            return Err(MoodError::InvalidConfig(format!(
                "expected {FEATURE_COUNT} feature values, got {}",
                values.len()
            )));
        }
        let v = Self {
            acousticness: values[0],
            danceability: values[1],
            energy: values[2],
            instrumentalness: values[3],
            liveness: values[4],
            loudness: values[5],
            speechiness: values[6],
            tempo: values[7],
            valence: values[8],
        };
        v.check_finite(0)?;
        Ok(v)
    }

    #[must_use]
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.acousticness,
            self.danceability,
            self.energy,
            self.instrumentalness,
            self.liveness,
            self.loudness,
            self.speechiness,
            self.tempo,
            self.valence,
        ]
    }

    /// Reject NaN and infinities; `row` only feeds the error message.
    pub fn check_finite(&self, row: usize) -> Result<()> {
        match self
            .to_array()
            .iter()
            .zip(FEATURE_NAMES)
            .find(|(v, _)| !v.is_finite())
        {
            Some((_, feature)) => Err(MoodError::NonFiniteFeature { row, feature }),
            None => Ok(()),
        }
    }
}

/// A track with its features, no label. What the curator predicts over.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRow {
    pub track: TrackRecord,
    pub features: FeatureVector,
}

/// A track, its features and the mood of the collection it was harvested from.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub track: TrackRecord,
    pub features: FeatureVector,
    pub label: String,
}

impl LabeledRow {
    pub fn new(row: TrackRow, label: impl Into<String>) -> Self {
        Self {
            track: row.track,
            features: row.features,
            label: label.into(),
        }
    }
}

/// Title-case a user-typed mood word: `"  sAD "` becomes `"Sad"`.
#[must_use]
pub fn title_case(mood: &str) -> String {
    mood.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical form used when comparing mood names typed by users.
#[must_use]
pub fn normalize_mood(mood: &str) -> String {
    mood.trim().to_lowercase()
}
