//! # Moodify
//!
//! Classifies tracks by mood from their audio features and curates
//! playlists of one mood.
//!
//! ## Usage
//!
//! ```bash
//! export MOODIFY_TOKEN=...
//!
//! # Harvest playlists titled "... happy ...", "... sad ..." into a CSV
//! moodify build-dataset happy sad --out data/moods.csv
//!
//! # Train and save to the data directory
//! moodify train data/moods.csv
//!
//! # Curate
//! moodify curate sad --playlist 37i9dQZF1DX3rxVfibe1L0
//! moodify curate happy --csv data/candidates.csv --name "Sunny"
//! ```

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use log::info;
use moodify::builder::{sources_for_moods, DatasetBuilder};
use moodify::catalog::{Catalog, Visibility};
use moodify::cli::{self, Command};
use moodify::completion;
use moodify::config::RuntimeConfig;
use moodify::curator::{CurationRequest, Curator, DestinationOptions, TrackSource};
use moodify::dataset::{read_dataset, read_tracks, write_dataset, write_tracks};
use moodify::features::FeatureExtractor;
use moodify::model::{MoodClassifier, TrainConfig};
use moodify::spotify::SpotifyCatalog;
use std::path::PathBuf;

fn connect(config: &RuntimeConfig) -> Result<SpotifyCatalog> {
    SpotifyCatalog::with_base(config.require_token()?, &config.api_base)
        .context("Failed to set up the HTTP client")
}

fn load_model(config: &RuntimeConfig) -> Result<MoodClassifier> {
    MoodClassifier::load(&config.model_path).with_context(|| {
        format!(
            "Failed to load model from {}. Run `moodify train` first or pass --model.",
            config.model_path.display()
        )
    })
}

/// Main entry point.
///
/// Logging is controlled through `RUST_LOG`:
/// - `RUST_LOG=info moodify build-dataset ...` - per-playlist progress
/// - `RUST_LOG=debug moodify train ...` - per-epoch loss and accuracy
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let resolve = |model: Option<PathBuf>| {
        RuntimeConfig::resolve(model, args.api_base.clone(), args.token.clone())
    };

    match args.command {
        Command::Playlists { mine } => {
            let config = resolve(None)?;
            let catalog = connect(&config)?;
            for c in catalog.list_collections(mine).context("Failed to list playlists")? {
                println!("{}\t{}\t({})", c.id, c.name, c.owner_id);
            }
        }
        Command::BuildDataset {
            ref moods,
            ref out,
            lookup_batch,
        } => {
            let config = resolve(None)?;
            let catalog = connect(&config)?;
            let sources = sources_for_moods(&catalog, moods)?;
            if sources.is_empty() {
                bail!("No playlist title contains any of: {}", moods.join(", "));
            }

            let extractor =
                FeatureExtractor::new(&catalog).with_batch_size(usize::from(lookup_batch));
            let report = DatasetBuilder::new(&catalog)
                .with_extractor(extractor)
                .build(&sources)?;
            for failure in &report.failed_labels {
                eprintln!("warning: no tracks for {}: {}", failure.label, failure.reasons.join("; "));
            }
            write_dataset(&report.dataset, out)
                .with_context(|| format!("Failed to write {}", out.display()))?;

            println!("Wrote {} rows to {}", report.dataset.len(), out.display());
            for (label, count) in report.dataset.label_counts() {
                println!("  {label}: {count}");
            }
        }
        Command::Train {
            ref dataset,
            epochs,
            batch_size,
            learning_rate,
            seed,
            ref save,
        } => {
            let config = resolve(save.clone())?;
            let data = read_dataset(dataset)
                .with_context(|| format!("Failed to read {}", dataset.display()))?;
            info!("loaded {} rows from {}", data.len(), dataset.display());

            let train_config = TrainConfig {
                epochs,
                batch_size,
                learning_rate,
                seed,
                ..TrainConfig::default()
            };
            let (classifier, report) = MoodClassifier::fit(&data, &train_config)?;
            println!("{report}");

            classifier.save(&config.model_path)?;
            println!("Model saved to {}", config.model_path.display());
        }
        Command::Curate {
            ref mood,
            ref playlist,
            ref csv,
            ref name,
            public: _,
            private,
            ref brand,
            ref model,
        } => {
            let source = TrackSource::from_options(playlist.clone(), csv.clone())?;
            let config = resolve(model.clone())?;
            let classifier = load_model(&config)?;
            let catalog = connect(&config)?;

            let request = CurationRequest {
                mood: mood.clone(),
                source,
                destination: DestinationOptions {
                    name: name.clone(),
                    visibility: if private { Visibility::Private } else { Visibility::Public },
                    brand: brand.clone(),
                },
            };
            let outcome = Curator::new(&catalog, &classifier).curate(&request)?;
            println!(
                "Created playlist {} with {} tracks",
                outcome.collection_id, outcome.kept
            );
        }
        Command::Mood { ref track, ref model } => {
            let config = resolve(model.clone())?;
            let classifier = load_model(&config)?;
            let catalog = connect(&config)?;
            let mood = Curator::new(&catalog, &classifier).mood_of_track(track)?;
            println!("{mood}");
        }
        Command::Clean {
            ref infile,
            ref outfile,
            unlabeled,
        } => {
            let rows = if unlabeled {
                let tracks = read_tracks(infile)?;
                write_tracks(&tracks, outfile)?;
                tracks.len()
            } else {
                let data = read_dataset(infile)?;
                write_dataset(&data, outfile)?;
                data.len()
            };
            println!("Wrote {rows} rows to {}", outfile.display());
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
    }

    Ok(())
}
