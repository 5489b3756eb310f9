//! Audio-feature extraction on top of the catalog's batched lookup.

use crate::catalog::{Catalog, FEATURE_BATCH_LIMIT};
use crate::error::{MoodError, Result};
use crate::track::{FeatureVector, TrackRecord, TrackRow};
use log::{debug, warn};

/// Outcome of extracting one track: its features or why there are none.
pub type Extraction = (TrackRecord, Result<FeatureVector>);

/// Turns track identities into [`FeatureVector`]s.
///
/// Absent features are reported as [`MoodError::NoFeatures`]; nothing is
/// ever filled with zeros. Callers decide whether to skip or fail.
pub struct FeatureExtractor<'a> {
    catalog: &'a dyn Catalog,
    batch_size: usize,
}

impl<'a> FeatureExtractor<'a> {
    /// Extractor using the largest batch the catalog accepts.
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            batch_size: FEATURE_BATCH_LIMIT,
        }
    }

    /// Use smaller lookup batches. Clamped to `1..=FEATURE_BATCH_LIMIT`.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, FEATURE_BATCH_LIMIT);
        self
    }

    /// Extract features for every track, preserving input order.
    ///
    /// A failing batch is retried one track at a time, so a single bad id
    /// only costs itself.
    pub fn extract(&self, tracks: &[TrackRecord]) -> Vec<Extraction> {
        let mut out = Vec::with_capacity(tracks.len());

        for chunk in tracks.chunks(self.batch_size) {
            let ids: Vec<String> = chunk.iter().map(|t| t.id.clone()).collect();
            match self.lookup(&ids) {
                Ok(found) => {
                    out.extend(
                        chunk
                            .iter()
                            .zip(found)
                            .map(|(track, f)| (track.clone(), present(&track.id, f))),
                    );
                }
                Err(e) if chunk.len() > 1 => {
                    warn!("feature batch of {} failed ({e}), retrying per track", chunk.len());
                    out.extend(chunk.iter().map(|t| (t.clone(), self.extract_one(&t.id))));
                }
                Err(e) => out.push((chunk[0].clone(), Err(e))),
            }
        }

        out
    }

    /// Extract and keep only the tracks that produced features.
    pub fn extract_rows(&self, tracks: &[TrackRecord]) -> Vec<TrackRow> {
        self.extract(tracks)
            .into_iter()
            .filter_map(|(track, features)| match features {
                Ok(features) => Some(TrackRow { track, features }),
                Err(e) => {
                    warn!("skipping {} ({}): {e}", track.id, track.name);
                    None
                }
            })
            .collect()
    }

    /// Features of a single track.
    ///
    /// # Errors
    ///
    /// `NoFeatures` when the service has none, `Catalog` when the lookup fails.
    pub fn extract_one(&self, track_id: &str) -> Result<FeatureVector> {
        let found = self.lookup(&[track_id.to_string()])?;
        present(track_id, found.into_iter().next().flatten())
    }

    fn lookup(&self, ids: &[String]) -> Result<Vec<Option<FeatureVector>>> {
        debug!("looking up features for {} tracks", ids.len());
        let found = self
            .catalog
            .lookup_features(ids)
            .map_err(|e| MoodError::catalog(format!("feature lookup for {} tracks", ids.len()), e))?;
        if found.len() != ids.len() {
            return Err(MoodError::catalog(
                "feature lookup",
                anyhow::anyhow!("asked for {} tracks, got {} results", ids.len(), found.len()),
            ));
        }
        Ok(found)
    }
}

fn present(track_id: &str, features: Option<FeatureVector>) -> Result<FeatureVector> {
    let features = features.ok_or_else(|| MoodError::NoFeatures {
        track_id: track_id.to_string(),
    })?;
    features.check_finite(0).map_err(|_| MoodError::NoFeatures {
        track_id: track_id.to_string(),
    })?;
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::memory::InMemoryCatalog;

    fn fv(valence: f64) -> FeatureVector {
        FeatureVector::from_slice(&[0.1, 0.5, 0.5, 0.0, 0.1, -7.0, 0.04, 120.0, valence]).unwrap()
    }

    fn catalog_with(n: usize) -> (InMemoryCatalog, Vec<TrackRecord>) {
        let mut catalog = InMemoryCatalog::new("me");
        let tracks: Vec<TrackRecord> = (0..n)
            .map(|i| TrackRecord::new(format!("t{i}"), format!("Track {i}"), "Artist"))
            .collect();
        for t in &tracks {
            catalog.set_features(&t.id, fv(0.5));
        }
        (catalog, tracks)
    }

    #[test]
    fn batches_respect_the_cap() {
        let (catalog, tracks) = catalog_with(250);
        let extracted = FeatureExtractor::new(&catalog).extract(&tracks);
        assert_eq!(extracted.len(), 250);
        assert!(extracted.iter().all(|(_, f)| f.is_ok()));
        assert_eq!(catalog.lookup_calls(), 3);
    }

    #[test]
    fn missing_features_are_explicit() {
        let (catalog, mut tracks) = catalog_with(2);
        tracks.push(TrackRecord::new("gone", "Withdrawn", "Nobody"));

        let extracted = FeatureExtractor::new(&catalog).extract(&tracks);
        match &extracted[2].1 {
            Err(MoodError::NoFeatures { track_id }) => assert_eq!(track_id, "gone"),
            other => panic!("expected NoFeatures, got {other:?}"),
        }
        assert_eq!(FeatureExtractor::new(&catalog).extract_rows(&tracks).len(), 2);
    }

    #[test]
    fn failing_batch_falls_back_to_single_lookups() {
        let (mut catalog, tracks) = catalog_with(5);
        catalog.fail_lookup_for("t3");

        let rows = FeatureExtractor::new(&catalog).extract_rows(&tracks);
        let ids: Vec<&str> = rows.iter().map(|r| r.track.id.as_str()).collect();
        assert_eq!(ids, vec!["t0", "t1", "t2", "t4"]);
    }

    #[test]
    fn extract_one_reports_absent_track() {
        let (catalog, _) = catalog_with(1);
        let extractor = FeatureExtractor::new(&catalog).with_batch_size(0);
        assert_eq!(extractor.extract_one("t0").unwrap(), fv(0.5));
        assert!(matches!(
            extractor.extract_one("nope"),
            Err(MoodError::NoFeatures { .. })
        ));
    }
}
