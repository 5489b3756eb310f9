//! Min-max feature scaling and label encoding.
//!
//! Both are fitted once on the training table and then travel with the
//! network weights. Inference always reuses the fitted parameters.

use crate::error::{MoodError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Per-feature min-max scaler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl MinMaxScaler {
    /// Fit on the columns of `rows`.
    ///
    /// # Errors
    ///
    /// `EmptyDataset` without rows, `InvalidConfig` on ragged rows,
    /// `NonFiniteFeature` on NaN or infinities.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let width = rows
            .first()
            .map(Vec::len)
            .ok_or_else(|| MoodError::EmptyDataset("cannot fit a scaler on zero rows".into()))?;

        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];
        for (r, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(MoodError::InvalidConfig(format!(
                    "row {r} has {} columns, expected {width}",
                    row.len()
                )));
            }
            for (c, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(MoodError::NonFiniteFeature {
                        row: r,
                        feature: crate::track::FEATURE_NAMES.get(c).copied().unwrap_or("?"),
                    });
                }
                min[c] = min[c].min(v);
                max[c] = max[c].max(v);
            }
        }
        Ok(Self { min, max })
    }

    /// Check that bounds loaded from disk describe a usable scaler.
    ///
    /// A fitted scaler always passes; this exists for parameters that came
    /// back through deserialisation.
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` if `min` and `max` differ in length or any bound
    /// is NaN or infinite.
    pub fn validate(&self) -> Result<()> {
        if self.min.len() != self.max.len() {
            return Err(MoodError::ArtifactMismatch(format!(
                "scaler has {} minimums but {} maximums",
                self.min.len(),
                self.max.len()
            )));
        }
        if let Some(c) = self
            .min
            .iter()
            .zip(&self.max)
            .position(|(lo, hi)| !lo.is_finite() || !hi.is_finite())
        {
            return Err(MoodError::ArtifactMismatch(format!(
                "scaler bounds for column {c} are not finite"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    #[must_use]
    pub fn min(&self) -> &[f64] {
        &self.min
    }

    #[must_use]
    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Constant columns scale by 1 so they map to 0 instead of dividing by zero.
    fn range(&self, c: usize) -> f64 {
        let r = self.max[c] - self.min[c];
        if r == 0.0 {
            1.0
        } else {
            r
        }
    }

    fn check_width(&self, row: &[f64]) -> Result<()> {
        if row.len() == self.n_features() {
            Ok(())
        } else {
            Err(MoodError::ArtifactMismatch(format!(
                "scaler expects {} features, row has {}",
                self.n_features(),
                row.len()
            )))
        }
    }

    /// Scale one row. Values outside the fitted range land outside [0, 1].
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` if the row width differs from the fitted width.
    ///
    /// # Examples
    ///
    /// ```
    /// use moodify::preprocess::MinMaxScaler;
    ///
    /// let scaler = MinMaxScaler::fit(&[vec![0.0, 60.0], vec![1.0, 180.0]])?;
    /// assert_eq!(scaler.transform(&[0.5, 120.0])?, vec![0.5, 0.5]);
    /// # Ok::<(), moodify::error::MoodError>(())
    /// ```
    pub fn transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row)?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(c, v)| (v - self.min[c]) / self.range(c))
            .collect())
    }

    /// Scale every row of a feature matrix.
    ///
    /// # Returns
    ///
    /// The scaled rows in input order.
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` on the first row with the wrong width.
    pub fn transform_all(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        rows.iter().map(|r| self.transform(r)).collect()
    }

    /// Map scaled values back to feature units.
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` if the row width differs from the fitted width.
    pub fn inverse_transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row)?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(c, v)| v * self.range(c) + self.min[c])
            .collect())
    }
}

/// Bijection between label strings and class indices `0..K`.
///
/// Classes are the sorted distinct labels; the order is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    /// Vocabulary of the distinct `labels`, sorted.
    ///
    /// # Examples
    ///
    /// ```
    /// use moodify::preprocess::LabelEncoder;
    ///
    /// let encoder = LabelEncoder::fit(&["Sad", "Happy", "Sad"]);
    /// assert_eq!(encoder.classes(), &["Happy", "Sad"]);
    /// ```
    pub fn fit<S: AsRef<str>>(labels: &[S]) -> Self {
        let classes: BTreeSet<&str> = labels.iter().map(AsRef::as_ref).collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    /// Rebuild from a persisted vocabulary.
    ///
    /// # Errors
    ///
    /// `ArtifactMismatch` on duplicates or an empty vocabulary.
    pub fn from_classes(classes: Vec<String>) -> Result<Self> {
        let distinct: BTreeSet<&String> = classes.iter().collect();
        if classes.is_empty() || distinct.len() != classes.len() {
            return Err(MoodError::ArtifactMismatch(
                "label vocabulary is empty or has duplicates".into(),
            ));
        }
        Ok(Self { classes })
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Class index of `label`. Matching is exact.
    ///
    /// # Errors
    ///
    /// `UnknownLabel` if `label` is not in the vocabulary.
    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .iter()
            .position(|c| c == label)
            .ok_or_else(|| MoodError::UnknownLabel(label.to_string()))
    }

    /// Encode a column of labels.
    ///
    /// # Returns
    ///
    /// One class index per label, in input order.
    ///
    /// # Errors
    ///
    /// `UnknownLabel` on the first label outside the vocabulary.
    pub fn encode_all<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    /// # Errors
    ///
    /// `UnknownClass` if `index` is not below [`n_classes`](Self::n_classes).
    pub fn decode(&self, index: usize) -> Result<&str> {
        self.classes
            .get(index)
            .map(String::as_str)
            .ok_or(MoodError::UnknownClass {
                index,
                classes: self.classes.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<f64>> {
        vec![
            vec![0.0, -20.0, 60.0],
            vec![0.5, -10.0, 120.0],
            vec![1.0, -5.0, 180.0],
        ]
    }

    #[test]
    fn scales_into_unit_range() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        assert_eq!(scaler.transform(&[0.5, -20.0, 180.0]).unwrap(), vec![0.5, 0.0, 1.0]);
    }

    #[test]
    fn inverse_round_trips_within_bounds() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        for v in [vec![0.25, -7.5, 90.0], vec![0.0, -20.0, 60.0], vec![1.0, -5.0, 180.0]] {
            let back = scaler.inverse_transform(&scaler.transform(&v).unwrap()).unwrap();
            for (a, b) in v.iter().zip(&back) {
                assert!((a - b).abs() < 1e-9, "{a} vs {b}");
            }
            let scaled = scaler.transform(&v).unwrap();
            let again = scaler.transform(&scaler.inverse_transform(&scaled).unwrap()).unwrap();
            for (a, b) in scaled.iter().zip(&again) {
                assert!((a - b).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn out_of_range_values_extrapolate() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        let scaled = scaler.transform(&[2.0, -30.0, 240.0]).unwrap();
        assert_eq!(scaled[0], 2.0);
        assert!(scaled[1] < 0.0);
        assert_eq!(scaled[2], 1.5);
    }

    #[test]
    fn constant_column_maps_to_zero() {
        let scaler = MinMaxScaler::fit(&[vec![3.0], vec![3.0]]).unwrap();
        assert_eq!(scaler.transform(&[3.0]).unwrap(), vec![0.0]);
        assert_eq!(scaler.inverse_transform(&[0.0]).unwrap(), vec![3.0]);
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let scaler = MinMaxScaler::fit(&rows()).unwrap();
        assert!(matches!(
            scaler.transform(&[1.0, 2.0]),
            Err(MoodError::ArtifactMismatch(_))
        ));
        assert!(MinMaxScaler::fit(&[vec![f64::NAN]]).is_err());
        assert!(MinMaxScaler::fit(&[]).is_err());
    }

    #[test]
    fn ragged_or_non_finite_bounds_fail_validation() {
        assert!(MinMaxScaler::fit(&rows()).unwrap().validate().is_ok());

        let ragged = MinMaxScaler {
            min: vec![0.0, 0.0, 0.0],
            max: vec![1.0, 1.0],
        };
        assert!(matches!(ragged.validate(), Err(MoodError::ArtifactMismatch(_))));

        let infinite = MinMaxScaler {
            min: vec![0.0, f64::NEG_INFINITY],
            max: vec![1.0, 1.0],
        };
        assert!(matches!(infinite.validate(), Err(MoodError::ArtifactMismatch(_))));
    }

    #[test]
    fn encoder_is_a_sorted_bijection() {
        let encoder = LabelEncoder::fit(&["Sad", "Happy", "Calm", "Happy", "Party"]);
        assert_eq!(encoder.classes(), &["Calm", "Happy", "Party", "Sad"]);
        for label in ["Calm", "Happy", "Party", "Sad"] {
            let idx = encoder.encode(label).unwrap();
            assert_eq!(encoder.decode(idx).unwrap(), label);
        }
    }

    #[test]
    fn unseen_labels_and_indices_are_errors() {
        let encoder = LabelEncoder::fit(&["Happy", "Sad"]);
        assert!(matches!(encoder.encode("happy"), Err(MoodError::UnknownLabel(_))));
        assert!(matches!(
            encoder.decode(2),
            Err(MoodError::UnknownClass { index: 2, classes: 2 })
        ));
        assert!(LabelEncoder::from_classes(vec!["A".into(), "A".into()]).is_err());
    }
}
