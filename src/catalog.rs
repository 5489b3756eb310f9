//! # Catalog Module
//!
//! The contract with the external music service. Everything the pipeline
//! needs from the outside world goes through [`Catalog`]: listing
//! collections and their tracks, looking up audio features, creating a
//! destination collection and appending tracks to it.
//!
//! Authentication is the implementor's concern. Components receive the
//! catalog as an explicit `&dyn Catalog` handle, so tests can swap in
//! [`memory::InMemoryCatalog`].

use crate::error::{MoodError, Result};
use crate::track::{FeatureVector, TrackRecord};
use log::debug;
use serde::{Deserialize, Serialize};

/// Page size used when listing collection tracks.
pub const TRACK_PAGE_SIZE: usize = 100;

/// Per-request cap on feature lookups.
pub const FEATURE_BATCH_LIMIT: usize = 100;

/// Per-request cap on appends to a collection.
pub const APPEND_BATCH_LIMIT: usize = 100;

/// Public or private destination collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    #[must_use]
    pub fn is_public(self) -> bool {
        self == Self::Public
    }
}

/// One entry of a user's collection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSummary {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub collaborative: bool,
}

/// One page of a collection's tracks plus the collection's total size.
///
/// `items` holds only the playable tracks of the page, while `returned`
/// counts every entry the service sent, removed and local tracks included.
/// Paging decisions use `returned`.
#[derive(Debug, Clone, Default)]
pub struct TrackPage {
    pub items: Vec<TrackRecord>,
    pub returned: usize,
    pub total: usize,
}

/// External music-service collaborator.
///
/// Implementations may block; callers issue one request at a time.
pub trait Catalog {
    /// Collections visible to the user. `owned_only` keeps those the user
    /// owns or collaborates on.
    fn list_collections(&self, owned_only: bool) -> anyhow::Result<Vec<CollectionSummary>>;

    fn list_collection_tracks(
        &self,
        collection_id: &str,
        limit: usize,
        offset: usize,
    ) -> anyhow::Result<TrackPage>;

    /// Features for up to [`FEATURE_BATCH_LIMIT`] ids, aligned with the
    /// input. `None` marks a track the service has no features for.
    fn lookup_features(&self, track_ids: &[String]) -> anyhow::Result<Vec<Option<FeatureVector>>>;

    /// Create a collection and return its id.
    fn create_collection(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> anyhow::Result<String>;

    /// Append up to [`APPEND_BATCH_LIMIT`] tracks.
    fn append_tracks(&self, collection_id: &str, track_ids: &[String]) -> anyhow::Result<()>;
}

/// Walk a collection page by page.
///
/// Stops when a page comes back short or the offset reaches the reported
/// total, whichever happens first. A page is short when the service sent
/// fewer entries than `page_size`; entries that were dropped as unplayable
/// still count towards the page.
///
/// # Errors
///
/// `Catalog` if any page request fails.
pub fn collection_tracks(
    catalog: &dyn Catalog,
    collection_id: &str,
    page_size: usize,
) -> Result<Vec<TrackRecord>> {
    let page_size = page_size.max(1);
    let mut tracks = Vec::new();
    let mut offset = 0;

    loop {
        let page = catalog
            .list_collection_tracks(collection_id, page_size, offset)
            .map_err(|e| {
                MoodError::catalog(format!("listing {collection_id} at offset {offset}"), e)
            })?;
        let returned = page.returned;
        debug!(
            "{collection_id}: {} of {returned} entries playable at offset {offset} of {}",
            page.items.len(),
            page.total
        );
        tracks.extend(page.items);
        offset += page_size;

        if returned < page_size || offset >= page.total {
            break;
        }
    }

    Ok(tracks)
}

pub mod memory {
    //! In-process catalog backed by plain collections.
    //!
    //! Records every append call so batching can be asserted on, and can be
    //! told to fail specific lookups or appends.

    use super::{Catalog, CollectionSummary, TrackPage, Visibility};
    use crate::track::{FeatureVector, TrackRecord};
    use anyhow::{anyhow, bail};
    use std::cell::{Cell, RefCell};
    use std::collections::{HashMap, HashSet};

    /// A collection created through [`Catalog::create_collection`].
    #[derive(Debug, Clone)]
    pub struct CreatedCollection {
        pub id: String,
        pub name: String,
        pub description: String,
        pub visibility: Visibility,
        pub tracks: Vec<String>,
    }

    #[derive(Debug, Default)]
    pub struct InMemoryCatalog {
        user_id: String,
        collections: Vec<CollectionSummary>,
        tracks: HashMap<String, Vec<TrackRecord>>,
        features: HashMap<String, FeatureVector>,
        failing_lookups: HashSet<String>,
        failing_collections: HashSet<String>,
        unplayable: HashSet<String>,
        fail_append_call: Option<usize>,
        created: RefCell<Vec<CreatedCollection>>,
        append_calls: RefCell<Vec<usize>>,
        lookup_calls: Cell<usize>,
    }

    impl InMemoryCatalog {
        pub fn new(user_id: impl Into<String>) -> Self {
            Self {
                user_id: user_id.into(),
                ..Default::default()
            }
        }

        /// Register a collection owned by `owner_id` with its tracks.
        pub fn add_collection(
            &mut self,
            id: &str,
            name: &str,
            owner_id: &str,
            tracks: Vec<TrackRecord>,
        ) -> &mut Self {
            self.collections.push(CollectionSummary {
                id: id.to_string(),
                name: name.to_string(),
                owner_id: owner_id.to_string(),
                collaborative: false,
            });
            self.tracks.insert(id.to_string(), tracks);
            self
        }

        pub fn set_features(&mut self, track_id: &str, features: FeatureVector) -> &mut Self {
            self.features.insert(track_id.to_string(), features);
            self
        }

        /// `track_id` stays in its collection's listing count but is left out
        /// of page items, like a removed or local track.
        pub fn mark_unplayable(&mut self, track_id: &str) -> &mut Self {
            self.unplayable.insert(track_id.to_string());
            self
        }

        /// Any lookup batch containing `track_id` fails as a whole.
        pub fn fail_lookup_for(&mut self, track_id: &str) -> &mut Self {
            self.failing_lookups.insert(track_id.to_string());
            self
        }

        /// Listing `collection_id` fails.
        pub fn fail_listing_for(&mut self, collection_id: &str) -> &mut Self {
            self.failing_collections.insert(collection_id.to_string());
            self
        }

        /// The `call`-th append (zero-based) fails.
        pub fn fail_append_call(&mut self, call: usize) -> &mut Self {
            self.fail_append_call = Some(call);
            self
        }

        /// Sizes of every append call, in order.
        pub fn append_calls(&self) -> Vec<usize> {
            self.append_calls.borrow().clone()
        }

        pub fn lookup_calls(&self) -> usize {
            self.lookup_calls.get()
        }

        pub fn created(&self) -> Vec<CreatedCollection> {
            self.created.borrow().clone()
        }
    }

    impl Catalog for InMemoryCatalog {
        fn list_collections(&self, owned_only: bool) -> anyhow::Result<Vec<CollectionSummary>> {
            Ok(self
                .collections
                .iter()
                .filter(|c| !owned_only || c.owner_id == self.user_id || c.collaborative)
                .cloned()
                .collect())
        }

        fn list_collection_tracks(
            &self,
            collection_id: &str,
            limit: usize,
            offset: usize,
        ) -> anyhow::Result<TrackPage> {
            if self.failing_collections.contains(collection_id) {
                bail!("collection {collection_id} is unavailable");
            }
            let all = self
                .tracks
                .get(collection_id)
                .ok_or_else(|| anyhow!("no such collection: {collection_id}"))?;
            let page: Vec<&TrackRecord> = all.iter().skip(offset).take(limit).collect();
            Ok(TrackPage {
                returned: page.len(),
                items: page
                    .into_iter()
                    .filter(|t| !self.unplayable.contains(&t.id))
                    .cloned()
                    .collect(),
                total: all.len(),
            })
        }

        fn lookup_features(
            &self,
            track_ids: &[String],
        ) -> anyhow::Result<Vec<Option<FeatureVector>>> {
            self.lookup_calls.set(self.lookup_calls.get() + 1);
            if track_ids.len() > super::FEATURE_BATCH_LIMIT {
                bail!("feature lookup of {} ids exceeds the cap", track_ids.len());
            }
            if let Some(bad) = track_ids.iter().find(|id| self.failing_lookups.contains(*id)) {
                bail!("lookup failed for {bad}");
            }
            Ok(track_ids.iter().map(|id| self.features.get(id).copied()).collect())
        }

        fn create_collection(
            &self,
            name: &str,
            description: &str,
            visibility: Visibility,
        ) -> anyhow::Result<String> {
            let mut created = self.created.borrow_mut();
            let id = format!("created-{}", created.len() + 1);
            created.push(CreatedCollection {
                id: id.clone(),
                name: name.to_string(),
                description: description.to_string(),
                visibility,
                tracks: Vec::new(),
            });
            Ok(id)
        }

        fn append_tracks(&self, collection_id: &str, track_ids: &[String]) -> anyhow::Result<()> {
            let call = self.append_calls.borrow().len();
            self.append_calls.borrow_mut().push(track_ids.len());
            if track_ids.len() > super::APPEND_BATCH_LIMIT {
                bail!("append of {} ids exceeds the cap", track_ids.len());
            }
            if self.fail_append_call == Some(call) {
                bail!("append call {call} rejected");
            }
            let mut created = self.created.borrow_mut();
            let target = created
                .iter_mut()
                .find(|c| c.id == collection_id)
                .ok_or_else(|| anyhow!("no such collection: {collection_id}"))?;
            target.tracks.extend_from_slice(track_ids);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryCatalog;
    use super::*;

    fn tracks(n: usize) -> Vec<TrackRecord> {
        (0..n)
            .map(|i| TrackRecord::new(format!("t{i}"), format!("Track {i}"), "Artist"))
            .collect()
    }

    #[test]
    fn pagination_collects_every_page() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog.add_collection("pl", "Happy Hits", "me", tracks(250));

        let all = collection_tracks(&catalog, "pl", 100).unwrap();
        assert_eq!(all.len(), 250);
        assert_eq!(all[249].id, "t249");
    }

    #[test]
    fn pagination_stops_on_exact_multiple() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog.add_collection("pl", "Calm", "me", tracks(200));
        assert_eq!(collection_tracks(&catalog, "pl", 100).unwrap().len(), 200);
    }

    #[test]
    fn unplayable_entries_do_not_end_pagination() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog
            .add_collection("pl", "Happy Hits", "me", tracks(250))
            .mark_unplayable("t5");

        let all = collection_tracks(&catalog, "pl", 100).unwrap();
        assert_eq!(all.len(), 249);
        assert!(all.iter().all(|t| t.id != "t5"));
        assert_eq!(all[248].id, "t249");
    }

    #[test]
    fn short_raw_page_ends_pagination() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog
            .add_collection("pl", "Calm", "me", tracks(150))
            .mark_unplayable("t120");
        let all = collection_tracks(&catalog, "pl", 100).unwrap();
        assert_eq!(all.len(), 149);
    }

    #[test]
    fn empty_collection_yields_no_tracks() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog.add_collection("pl", "Sad", "me", Vec::new());
        assert!(collection_tracks(&catalog, "pl", 100).unwrap().is_empty());
    }

    #[test]
    fn owned_only_filters_foreign_collections() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog
            .add_collection("a", "Mine", "me", Vec::new())
            .add_collection("b", "Theirs", "someone", Vec::new());
        assert_eq!(catalog.list_collections(false).unwrap().len(), 2);
        let owned = catalog.list_collections(true).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, "a");
    }

    #[test]
    fn listing_failure_is_a_catalog_error() {
        let mut catalog = InMemoryCatalog::new("me");
        catalog
            .add_collection("pl", "Party", "me", tracks(3))
            .fail_listing_for("pl");
        assert!(matches!(
            collection_tracks(&catalog, "pl", 100),
            Err(MoodError::Catalog { .. })
        ));
    }
}
