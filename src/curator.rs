//! # Curator Module
//!
//! Applies a trained [`MoodClassifier`] to a set of tracks and writes the
//! ones predicted as the target mood into a new collection.
//!
//! ## Sources
//!
//! Tracks come from exactly one of:
//!
//! - a live collection, harvested through the catalog
//! - a pre-built CSV holding `uri` and the nine feature columns
//!
//! ## Ordering of checks
//!
//! Everything that can be rejected without side effects is rejected first:
//! source selection, target mood, CSV schema. The destination collection is
//! only created once the keep-list is known.
//!
//! ## Appends
//!
//! The keep-list is appended in order, [`APPEND_BATCH_LIMIT`] ids per call.
//! A failing call stops the loop; batches already written stay written and
//! the error says how many ids made it.

use crate::builder::DatasetBuilder;
use crate::catalog::{Catalog, Visibility, APPEND_BATCH_LIMIT};
use crate::dataset::read_tracks;
use crate::error::{MoodError, Result};
use crate::features::FeatureExtractor;
use crate::model::MoodClassifier;
use crate::track::{bare_track_id, normalize_mood, TrackRow};
use log::{debug, info};
use std::path::PathBuf;

/// Brand used in generated collection names.
pub const DEFAULT_BRAND: &str = "Moodify";

/// Where the tracks to classify come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    /// Harvest this collection id through the catalog.
    Live(String),
    /// Read a CSV with `uri` and the feature columns.
    Prebuilt(PathBuf),
}

impl TrackSource {
    /// Pick the single source out of two optional arguments.
    ///
    /// # Errors
    ///
    /// `SourceConflict` when both or neither are given.
    pub fn from_options(collection: Option<String>, csv: Option<PathBuf>) -> Result<Self> {
        match (collection, csv) {
            (Some(id), None) => Ok(Self::Live(id)),
            (None, Some(path)) => Ok(Self::Prebuilt(path)),
            (Some(_), Some(_)) => Err(MoodError::SourceConflict("both a collection and a CSV")),
            (None, None) => Err(MoodError::SourceConflict("neither a collection nor a CSV")),
        }
    }
}

/// Where curated tracks go. New collections are public unless asked
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOptions {
    /// Explicit collection name; generated from the brand and mood otherwise.
    pub name: Option<String>,
    pub visibility: Visibility,
    pub brand: String,
}

impl Default for DestinationOptions {
    fn default() -> Self {
        Self {
            name: None,
            visibility: Visibility::Public,
            brand: DEFAULT_BRAND.to_string(),
        }
    }
}

impl DestinationOptions {
    /// The explicit name if one was given, else `"<brand> – <mood> mix"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use moodify::curator::DestinationOptions;
    ///
    /// assert_eq!(DestinationOptions::default().collection_name("Sad"), "Moodify – Sad mix");
    /// ```
    #[must_use]
    pub fn collection_name(&self, mood: &str) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} – {mood} mix", self.brand))
    }

    #[must_use]
    pub fn description(mood: &str) -> String {
        format!("Auto-generated {mood} tracks")
    }
}

/// One curation run: which mood, read from where, written to what.
#[derive(Debug, Clone)]
pub struct CurationRequest {
    /// Target mood; case and surrounding whitespace are ignored.
    pub mood: String,
    pub source: TrackSource,
    pub destination: DestinationOptions,
}

/// Result of a successful [`Curator::curate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurationOutcome {
    /// Id of the collection that was created.
    pub collection_id: String,
    /// Number of ids requested for append; equals `kept_ids.len()`.
    pub kept: usize,
    /// Kept track ids in source order.
    pub kept_ids: Vec<String>,
}

/// Classifies tracks with a trained model and writes one mood's tracks to
/// the catalog.
///
/// Borrows both collaborators, so one catalog and one model can serve any
/// number of curators.
pub struct Curator<'a> {
    catalog: &'a dyn Catalog,
    classifier: &'a MoodClassifier,
}

impl<'a> Curator<'a> {
    /// Pair a catalog with a classifier.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Reads source collections and features, creates and
    ///   fills the destination.
    /// * `classifier` - Trained model whose labels define the valid moods.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use moodify::curator::{CurationRequest, Curator, DestinationOptions, TrackSource};
    /// use moodify::model::MoodClassifier;
    /// use moodify::spotify::SpotifyCatalog;
    /// use std::path::Path;
    ///
    /// let classifier = MoodClassifier::load(Path::new("moodnet.json"))?;
    /// let catalog = SpotifyCatalog::new("token")?;
    /// let curator = Curator::new(&catalog, &classifier);
    /// let outcome = curator.curate(&CurationRequest {
    ///     mood: "happy".into(),
    ///     source: TrackSource::Prebuilt("candidates.csv".into()),
    ///     destination: DestinationOptions::default(),
    /// })?;
    /// println!("kept {}", outcome.kept);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(catalog: &'a dyn Catalog, classifier: &'a MoodClassifier) -> Self {
        Self {
            catalog,
            classifier,
        }
    }

    fn load_rows(&self, source: &TrackSource) -> Result<Vec<TrackRow>> {
        match source {
            TrackSource::Live(id) => DatasetBuilder::new(self.catalog).harvest(id),
            TrackSource::Prebuilt(path) => read_tracks(path),
        }
    }

    /// Ids of the rows predicted as `mood`, in source order.
    ///
    /// # Errors
    ///
    /// `UnknownMood` if the model has never seen `mood`.
    pub fn select(&self, mood: &str, rows: &[TrackRow]) -> Result<Vec<String>> {
        let target = normalize_mood(self.classifier.resolve_mood(mood)?);
        let features: Vec<_> = rows.iter().map(|r| r.features).collect();
        let predicted = self.classifier.predict(&features)?;

        Ok(rows
            .iter()
            .zip(predicted)
            .filter(|(_, label)| normalize_mood(label) == target)
            .map(|(row, _)| row.track.id.clone())
            .collect())
    }

    /// Classify the source, create the destination and fill it.
    ///
    /// The target mood is resolved before the source is read, and the source
    /// is fully classified before anything is written. An empty keep-list
    /// still creates an empty collection.
    ///
    /// # Returns
    ///
    /// The new collection's id and the ids appended to it.
    ///
    /// # Errors
    ///
    /// Configuration errors (`UnknownMood`, `MissingColumns`, ...) before
    /// any collection is created; `Catalog` if creation fails;
    /// `PartialAppend` if an append batch fails.
    pub fn curate(&self, request: &CurationRequest) -> Result<CurationOutcome> {
        let mood = self.classifier.resolve_mood(&request.mood)?.to_string();
        let rows = self.load_rows(&request.source)?;
        let kept_ids = self.select(&mood, &rows)?;
        info!("{} of {} tracks predicted as {mood}", kept_ids.len(), rows.len());

        let name = request.destination.collection_name(&mood);
        let collection_id = self
            .catalog
            .create_collection(
                &name,
                &DestinationOptions::description(&mood),
                request.destination.visibility,
            )
            .map_err(|e| MoodError::catalog(format!("creating collection `{name}`"), e))?;
        info!("created `{name}` ({collection_id})");

        let mut appended = 0;
        for batch in kept_ids.chunks(APPEND_BATCH_LIMIT) {
            self.catalog
                .append_tracks(&collection_id, batch)
                .map_err(|source| MoodError::PartialAppend {
                    collection_id: collection_id.clone(),
                    appended,
                    requested: kept_ids.len(),
                    source,
                })?;
            appended += batch.len();
            debug!("{collection_id}: appended {appended}/{}", kept_ids.len());
        }

        Ok(CurationOutcome {
            collection_id,
            kept: kept_ids.len(),
            kept_ids,
        })
    }

    /// Predicted mood of a single catalog track, by id or URI.
    ///
    /// # Errors
    ///
    /// `NoFeatures` when the catalog has no features for the track.
    pub fn mood_of_track(&self, track_id: &str) -> Result<String> {
        let features = FeatureExtractor::new(self.catalog).extract_one(bare_track_id(track_id))?;
        self.classifier.predict_one(&features)
    }
}
