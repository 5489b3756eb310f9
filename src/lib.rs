//! Mood classification and playlist curation from audio features.
//!
//! Core modules:
//! - [`features`] - Feature lookup with batch and per-track fallback
//! - [`builder`] - Labeled dataset harvesting from mood-titled playlists
//! - [`preprocess`] - Min-max scaling and label encoding
//! - [`model`] - The mood classifier: training, inference, persistence
//! - [`curator`] - Filter a track source by predicted mood into a new playlist
//!
//! ### Supporting Modules
//!
//! - [`catalog`] - The music-service contract and an in-memory implementation
//! - [`spotify`] - Spotify Web API catalog
//! - [`dataset`] - CSV reading, writing and column harmonisation
//! - [`network`] - Dense layers, softmax and Adam
//! - [`track`] - Track identity and feature vectors
//! - [`error`] - The library error type
//! - [`config`], [`cli`], [`completion`] - Binary plumbing
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use moodify::catalog::Visibility;
//! use moodify::curator::{CurationRequest, Curator, DestinationOptions, TrackSource};
//! use moodify::dataset::read_dataset;
//! use moodify::model::{MoodClassifier, TrainConfig};
//! use moodify::spotify::SpotifyCatalog;
//! use std::path::Path;
//!
//! let dataset = read_dataset(Path::new("data/moods.csv"))?;
//! let (classifier, report) = MoodClassifier::fit(&dataset, &TrainConfig::default())?;
//! println!("{report}");
//!
//! let catalog = SpotifyCatalog::new("token")?;
//! let outcome = Curator::new(&catalog, &classifier).curate(&CurationRequest {
//!     mood: "sad".into(),
//!     source: TrackSource::Live("37i9dQZF1DX3rxVfibe1L0".into()),
//!     destination: DestinationOptions {
//!         visibility: Visibility::Private,
//!         ..DestinationOptions::default()
//!     },
//! })?;
//! println!("{} tracks in {}", outcome.kept, outcome.collection_id);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Model
//!
//! A `9 -> 64 -> 32 -> K` network with ReLU hidden layers and a softmax
//! output, trained with Adam on sparse categorical cross-entropy. Features
//! are min-max scaled with bounds fitted on the training table; labels are
//! the sorted distinct moods of that table. The three travel together as
//! one [`model::TrainedArtifact`].
//!
//! ## Error Handling
//!
//! Library functions return [`error::Result`]. Errors that mean the request
//! itself is invalid (both sources given, missing CSV columns, a single
//! training label, an unknown target mood) are raised before any catalog
//! write or training step.

pub mod builder;
pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod curator;
pub mod dataset;
pub mod error;
pub mod features;
pub mod model;
pub mod network;
pub mod preprocess;
pub mod spotify;
pub mod track;
