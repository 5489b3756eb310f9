//! Harvest labeled datasets from mood-titled collections.

use crate::catalog::{self, Catalog, TRACK_PAGE_SIZE};
use crate::dataset::Dataset;
use crate::error::{MoodError, Result};
use crate::features::FeatureExtractor;
use crate::track::{title_case, LabeledRow, TrackRow};
use log::{info, warn};

/// One collection to harvest and the label its tracks receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSource {
    pub label: String,
    pub collection_id: String,
}

impl LabelSource {
    pub fn new(label: impl Into<String>, collection_id: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            collection_id: collection_id.into(),
        }
    }
}

/// A label that ended up with no rows, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFailure {
    pub label: String,
    pub reasons: Vec<String>,
}

/// The harvested dataset plus the labels that came up empty.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub dataset: Dataset,
    pub failed_labels: Vec<LabelFailure>,
}

/// Pick every collection whose title contains one of `moods`
/// (case-insensitive). The label is the title-cased mood word.
///
/// A collection matching two moods is harvested under both.
///
/// # Errors
///
/// `Catalog` if the collections cannot be listed.
pub fn sources_for_moods(catalog: &dyn Catalog, moods: &[String]) -> Result<Vec<LabelSource>> {
    let collections = catalog
        .list_collections(false)
        .map_err(|e| MoodError::catalog("listing collections", e))?;

    let mut sources = Vec::new();
    for mood in moods {
        let needle = mood.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let label = title_case(mood);
        for c in collections.iter().filter(|c| c.name.to_lowercase().contains(&needle)) {
            info!("`{}` -> {label}", c.name);
            sources.push(LabelSource::new(label.clone(), c.id.clone()));
        }
    }
    Ok(sources)
}

/// Turns [`LabelSource`]s into a labeled [`Dataset`].
///
/// # Examples
///
/// ```
/// use moodify::builder::{DatasetBuilder, LabelSource};
/// use moodify::catalog::memory::InMemoryCatalog;
/// use moodify::features::FeatureExtractor;
/// use moodify::track::{FeatureVector, TrackRecord};
///
/// let mut catalog = InMemoryCatalog::new("me");
/// catalog
///     .add_collection("p1", "happy mix", "me", vec![TrackRecord::new("t1", "Song", "Band")])
///     .set_features("t1", FeatureVector::from_slice(&[0.1, 0.7, 0.8, 0.0, 0.1, -5.0, 0.04, 120.0, 0.9])?);
///
/// let report = DatasetBuilder::new(&catalog)
///     .with_extractor(FeatureExtractor::new(&catalog).with_batch_size(50))
///     .build(&[LabelSource::new("Happy", "p1")])?;
/// assert_eq!(report.dataset.len(), 1);
/// # Ok::<(), moodify::error::MoodError>(())
/// ```
pub struct DatasetBuilder<'a> {
    catalog: &'a dyn Catalog,
    extractor: FeatureExtractor<'a>,
    page_size: usize,
}

impl<'a> DatasetBuilder<'a> {
    /// Full-size pages and feature batches.
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            extractor: FeatureExtractor::new(catalog),
            page_size: TRACK_PAGE_SIZE,
        }
    }

    /// Replace the default extractor, e.g. one with smaller lookup batches.
    #[must_use]
    pub fn with_extractor(mut self, extractor: FeatureExtractor<'a>) -> Self {
        self.extractor = extractor;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every track of one collection that has features. Unlabeled.
    ///
    /// # Errors
    ///
    /// `Catalog` if the collection cannot be listed. Per-track failures
    /// are logged and skipped.
    pub fn harvest(&self, collection_id: &str) -> Result<Vec<TrackRow>> {
        let tracks = catalog::collection_tracks(self.catalog, collection_id, self.page_size)?;
        let rows = self.extractor.extract_rows(&tracks);
        info!(
            "{collection_id}: {} of {} tracks have features",
            rows.len(),
            tracks.len()
        );
        Ok(rows)
    }

    /// Harvest each source and tag its rows with the source's label.
    ///
    /// Rows keep source order and are not de-duplicated. A collection that
    /// cannot be listed is skipped; a label left with zero rows is reported
    /// in [`BuildReport::failed_labels`] while the other labels carry on.
    ///
    /// # Errors
    ///
    /// `EmptyDataset` if no label produced any row.
    pub fn build(&self, sources: &[LabelSource]) -> Result<BuildReport> {
        // (label, rows, reasons) in first-seen order
        let mut per_label: Vec<(String, usize, Vec<String>)> = Vec::new();
        let mut dataset = Dataset::default();

        for source in sources {
            let slot = match per_label.iter().position(|(l, _, _)| *l == source.label) {
                Some(i) => i,
                None => {
                    per_label.push((source.label.clone(), 0, Vec::new()));
                    per_label.len() - 1
                }
            };

            match self.harvest(&source.collection_id) {
                Ok(rows) if rows.is_empty() => {
                    per_label[slot]
                        .2
                        .push(format!("{}: no usable tracks", source.collection_id));
                }
                Ok(rows) => {
                    per_label[slot].1 += rows.len();
                    dataset.extend(rows.into_iter().map(|r| LabeledRow::new(r, &source.label)));
                }
                Err(e) => {
                    warn!("skipping {} for {}: {e}", source.collection_id, source.label);
                    per_label[slot].2.push(format!("{}: {e}", source.collection_id));
                }
            }
        }

        let failed_labels: Vec<LabelFailure> = per_label
            .into_iter()
            .filter(|(_, rows, _)| *rows == 0)
            .map(|(label, _, reasons)| LabelFailure { label, reasons })
            .collect();
        for failure in &failed_labels {
            warn!("label {} produced no rows", failure.label);
        }

        if dataset.is_empty() {
            return Err(MoodError::EmptyDataset(format!(
                "none of {} source collections yielded usable tracks",
                sources.len()
            )));
        }

        let conflicts = dataset.conflicting_tracks().len();
        if conflicts > 0 {
            warn!("{conflicts} tracks appear under more than one label; keeping every row");
        }
        info!("built dataset with {} rows", dataset.len());

        Ok(BuildReport {
            dataset,
            failed_labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;
    use crate::track::{FeatureVector, TrackRecord};

    fn fv(valence: f64) -> FeatureVector {
        FeatureVector::from_slice(&[0.3, 0.5, 0.5, 0.0, 0.1, -8.0, 0.04, 100.0, valence]).unwrap()
    }

    fn catalog() -> InMemoryCatalog {
        let mut c = InMemoryCatalog::new("me");
        let happy: Vec<TrackRecord> = (0..3)
            .map(|i| TrackRecord::new(format!("h{i}"), format!("Happy {i}"), "A"))
            .collect();
        let sad: Vec<TrackRecord> = (0..2)
            .map(|i| TrackRecord::new(format!("s{i}"), format!("Sad {i}"), "B"))
            .collect();
        c.add_collection("p-happy", "My HAPPY songs", "me", happy)
            .add_collection("p-sad", "sad vibes", "me", sad)
            .add_collection("p-calm", "Calm evening", "me", Vec::new())
            .add_collection("p-work", "Work", "me", Vec::new());
        for id in ["h0", "h1", "h2"] {
            c.set_features(id, fv(0.9));
        }
        c.set_features("s0", fv(0.1));
        c
    }

    #[test]
    fn moods_match_titles_case_insensitively() {
        let c = catalog();
        let sources =
            sources_for_moods(&c, &["happy".to_string(), "SAD".to_string(), "party".to_string()])
                .unwrap();
        assert_eq!(
            sources,
            vec![LabelSource::new("Happy", "p-happy"), LabelSource::new("Sad", "p-sad")]
        );
    }

    #[test]
    fn build_skips_tracks_without_features() {
        let c = catalog();
        let report = DatasetBuilder::new(&c)
            .build(&[LabelSource::new("Happy", "p-happy"), LabelSource::new("Sad", "p-sad")])
            .unwrap();
        assert_eq!(report.dataset.len(), 4);
        assert_eq!(report.dataset.label_counts().get("Sad"), Some(&1));
        assert!(report.failed_labels.is_empty());
    }

    #[test]
    fn empty_collection_fails_only_its_label() {
        let mut c = catalog();
        c.fail_listing_for("p-sad");
        let report = DatasetBuilder::new(&c)
            .with_page_size(2)
            .build(&[
                LabelSource::new("Happy", "p-happy"),
                LabelSource::new("Calm", "p-calm"),
                LabelSource::new("Sad", "p-sad"),
            ])
            .unwrap();
        assert_eq!(report.dataset.len(), 3);
        let failed: Vec<&str> = report.failed_labels.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(failed, vec!["Calm", "Sad"]);
    }

    #[test]
    fn custom_extractor_sets_lookup_batches() {
        let c = catalog();
        let report = DatasetBuilder::new(&c)
            .with_extractor(FeatureExtractor::new(&c).with_batch_size(1))
            .build(&[LabelSource::new("Happy", "p-happy")])
            .unwrap();
        assert_eq!(report.dataset.len(), 3);
        assert_eq!(c.lookup_calls(), 3);
    }

    #[test]
    fn all_labels_empty_is_an_error() {
        let c = catalog();
        assert!(matches!(
            DatasetBuilder::new(&c).build(&[LabelSource::new("Calm", "p-calm")]),
            Err(MoodError::EmptyDataset(_))
        ));
    }

    #[test]
    fn same_track_under_two_labels_keeps_both_rows() {
        let c = catalog();
        let report = DatasetBuilder::new(&c)
            .build(&[LabelSource::new("Happy", "p-happy"), LabelSource::new("Party", "p-happy")])
            .unwrap();
        assert_eq!(report.dataset.len(), 6);
        assert_eq!(report.dataset.conflicting_tracks().len(), 3);
    }
}
