//! [`Catalog`] over the Spotify Web API.
//!
//! Blocking client with a caller-supplied bearer token. Token acquisition
//! and refresh happen elsewhere; an expired token surfaces as a failed
//! request.

use crate::catalog::{Catalog, CollectionSummary, TrackPage, Visibility};
use crate::track::{FeatureVector, TrackRecord};
use anyhow::{bail, Context, Result};
use log::debug;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

/// Public Web API root.
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Largest page `/me/playlists` accepts.
const PLAYLIST_PAGE_SIZE: usize = 50;

/// Blocking Spotify Web API client implementing [`Catalog`].
///
/// The current user's id is fetched lazily on first need and cached.
pub struct SpotifyCatalog {
    client: Client,
    api_base: String,
    token: String,
    user_id: OnceLock<String>,
}

#[derive(Deserialize)]
struct Me {
    id: String,
}

#[derive(Deserialize)]
struct Owner {
    id: String,
}

#[derive(Deserialize)]
struct Playlist {
    id: String,
    name: String,
    owner: Owner,
    #[serde(default)]
    collaborative: bool,
}

#[derive(Deserialize)]
struct Paging<T> {
    items: Vec<T>,
    total: usize,
    next: Option<String>,
}

#[derive(Deserialize)]
struct Artist {
    name: String,
}

#[derive(Deserialize)]
struct Track {
    /// `None` for local files.
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    duration_ms: Option<u64>,
}

#[derive(Deserialize)]
struct PlaylistItem {
    /// `None` for removed or unavailable tracks.
    track: Option<Track>,
}

#[derive(Deserialize)]
struct AudioFeatures {
    audio_features: Vec<Option<FeatureVector>>,
}

#[derive(Serialize)]
struct NewPlaylist<'a> {
    name: &'a str,
    description: &'a str,
    public: bool,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Serialize)]
struct AddTracks {
    uris: Vec<String>,
}

impl Track {
    fn into_record(self) -> Option<TrackRecord> {
        let id = self.id?;
        let artist = self
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_default();
        let record = TrackRecord::new(id, self.name, artist);
        Some(match self.duration_ms {
            Some(ms) => record.with_duration(Duration::from_millis(ms)),
            None => record,
        })
    }
}

/// Keep the playable tracks of a playlist page. The raw entry count is
/// carried along so a page with removed or local tracks still reads as full.
fn track_page(page: Paging<PlaylistItem>) -> TrackPage {
    TrackPage {
        returned: page.items.len(),
        items: page
            .items
            .into_iter()
            .filter_map(|item| item.track.and_then(Track::into_record))
            .collect(),
        total: page.total,
    }
}

fn track_uri(id: &str) -> String {
    format!("spotify:track:{id}")
}

impl SpotifyCatalog {
    /// Client for the public API with a bearer `token`.
    ///
    /// No request is made here; a bad token shows up on the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (for example, no
    /// TLS backend is available).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use moodify::catalog::Catalog;
    /// use moodify::spotify::SpotifyCatalog;
    ///
    /// let catalog = SpotifyCatalog::new("BQD...")?;
    /// for playlist in catalog.list_collections(true)? {
    ///     println!("{} {}", playlist.id, playlist.name);
    /// }
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn new(token: &str) -> Result<Self> {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    /// Point at another API root, e.g. a local mock.
    pub fn with_base(token: &str, api_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_id: OnceLock::new(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .with_context(|| format!("{what}: request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{what}: Spotify API returned {status}: {body}");
        }
        Ok(response)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        debug!("GET {path} {query:?}");
        let request = self.client.get(self.url(path)).query(query);
        self.send(request, path)?
            .json()
            .with_context(|| format!("{path}: unexpected response body"))
    }

    /// Id of the token's owner, fetched once.
    pub fn user_id(&self) -> Result<&str> {
        if let Some(id) = self.user_id.get() {
            return Ok(id.as_str());
        }
        let me: Me = self.get_json("/me", &[])?;
        Ok(self.user_id.get_or_init(|| me.id).as_str())
    }
}

impl Catalog for SpotifyCatalog {
    fn list_collections(&self, owned_only: bool) -> Result<Vec<CollectionSummary>> {
        let user = if owned_only { Some(self.user_id()?.to_string()) } else { None };
        let mut collections = Vec::new();
        let mut offset = 0;
        loop {
            let page: Paging<Playlist> = self.get_json(
                "/me/playlists",
                &[
                    ("limit", PLAYLIST_PAGE_SIZE.to_string()),
                    ("offset", offset.to_string()),
                ],
            )?;
            let returned = page.items.len();
            collections.extend(page.items.into_iter().map(|p| CollectionSummary {
                id: p.id,
                name: p.name,
                owner_id: p.owner.id,
                collaborative: p.collaborative,
            }));
            offset += returned;
            if page.next.is_none() || returned == 0 || offset >= page.total {
                break;
            }
        }

        if let Some(user) = user {
            collections.retain(|c| c.owner_id == user || c.collaborative);
        }
        Ok(collections)
    }

    fn list_collection_tracks(
        &self,
        collection_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<TrackPage> {
        let page: Paging<PlaylistItem> = self.get_json(
            &format!("/playlists/{collection_id}/tracks"),
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )?;
        Ok(track_page(page))
    }

    fn lookup_features(&self, track_ids: &[String]) -> Result<Vec<Option<FeatureVector>>> {
        if track_ids.is_empty() {
            return Ok(Vec::new());
        }
        let body: AudioFeatures =
            self.get_json("/audio-features", &[("ids", track_ids.join(","))])?;
        Ok(body.audio_features)
    }

    fn create_collection(
        &self,
        name: &str,
        description: &str,
        visibility: Visibility,
    ) -> Result<String> {
        let path = format!("/users/{}/playlists", self.user_id()?);
        let request = self.client.post(self.url(&path)).json(&NewPlaylist {
            name,
            description,
            public: visibility.is_public(),
        });
        let created: Created = self
            .send(request, &path)?
            .json()
            .context("playlist creation: unexpected response body")?;
        Ok(created.id)
    }

    fn append_tracks(&self, collection_id: &str, track_ids: &[String]) -> Result<()> {
        let path = format!("/playlists/{collection_id}/tracks");
        let request = self.client.post(self.url(&path)).json(&AddTracks {
            uris: track_ids.iter().map(|id| track_uri(id)).collect(),
        });
        self.send(request, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playlist_items_skip_local_and_missing_tracks() {
        let json = r#"{
            "items": [
                {"track": {"id": "abc", "name": "Song", "artists": [{"name": "A"}, {"name": "B"}], "duration_ms": 215000}},
                {"track": null},
                {"track": {"id": null, "name": "Local file", "artists": []}}
            ],
            "total": 3,
            "next": null
        }"#;
        let page = track_page(serde_json::from_str(json).unwrap());
        assert_eq!(page.returned, 3);
        assert_eq!(page.total, 3);
        let records = page.items;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "abc");
        assert_eq!(records[0].artist, "A");
        assert_eq!(records[0].duration, Some(Duration::from_secs(215)));
    }

    #[test]
    fn full_page_with_a_removed_track_keeps_paging() {
        let mut items: Vec<serde_json::Value> = (0..100)
            .map(|i| serde_json::json!({"track": {"id": format!("t{i}"), "name": "Song", "artists": []}}))
            .collect();
        items[5] = serde_json::json!({"track": null});
        let json = serde_json::json!({"items": items, "total": 250, "next": "more"});

        let page = track_page(serde_json::from_value(json).unwrap());
        assert_eq!(page.items.len(), 99);
        assert_eq!(page.returned, 100);
    }

    #[test]
    fn audio_features_keep_nulls_aligned() {
        let json = r#"{"audio_features": [
            {"id": "a", "key": 5, "mode": 1, "acousticness": 0.1, "danceability": 0.7,
             "energy": 0.8, "instrumentalness": 0.0, "liveness": 0.1, "loudness": -5.2,
             "speechiness": 0.04, "tempo": 121.0, "valence": 0.9, "time_signature": 4},
            null
        ]}"#;
        let body: AudioFeatures = serde_json::from_str(json).unwrap();
        assert_eq!(body.audio_features.len(), 2);
        assert_eq!(body.audio_features[0].map(|f| f.tempo), Some(121.0));
        assert!(body.audio_features[1].is_none());
    }

    #[test]
    fn append_body_uses_track_uris() {
        let body = AddTracks {
            uris: vec![track_uri("abc")],
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"uris":["spotify:track:abc"]}"#
        );
    }

    #[test]
    fn base_url_is_normalised() {
        let catalog = SpotifyCatalog::with_base("token", "http://localhost:8080/v1/").unwrap();
        assert_eq!(catalog.url("/me"), "http://localhost:8080/v1/me");
    }
}
