//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `moodify` binary.
//!
//! ## Commands
//!
//! - `playlists`: list the user's playlists
//! - `build-dataset`: harvest mood-titled playlists into a labeled CSV
//! - `train`: fit the mood classifier on a labeled CSV
//! - `curate`: build a playlist of tracks predicted as one mood
//! - `mood`: predict the mood of a single track
//! - `clean`: rewrite a CSV with canonical column names and order
//!
//! ## Examples
//!
//! ```bash
//! moodify build-dataset happy sad calm --out data/moods.csv
//! moodify train data/moods.csv --epochs 40
//! moodify curate sad --playlist 37i9dQZF1DX3rxVfibe1L0 --private
//! ```

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

/// Top-level arguments. `--token` and `--api-base` apply to every command.
#[derive(Parser, Debug)]
#[command(name = "moodify")]
#[command(about = "Moodify: mood classification and playlist curation")]
#[command(version)]
pub struct Args {
    /// Bearer token for the music service
    #[arg(long, global = true, env = "MOODIFY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// API root of the music service
    #[arg(long, global = true, env = "MOODIFY_API_BASE")]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands of the `moodify` binary.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List playlists visible to the user
    Playlists {
        /// Only playlists you own or collaborate on
        #[arg(long)]
        mine: bool,
    },

    /// Build a labeled dataset from playlists whose titles contain a mood
    ///
    /// Every playlist whose title contains one of MOODS (case-insensitive)
    /// contributes its tracks under that mood. Tracks without audio features
    /// are skipped.
    BuildDataset {
        /// Mood words to look for in playlist titles
        #[arg(required = true)]
        moods: Vec<String>,

        /// Where to write the CSV
        #[arg(short, long, default_value = "data/dataset.csv", value_hint = clap::ValueHint::FilePath)]
        out: PathBuf,

        /// Tracks per audio-feature request (1-100)
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u16).range(1..=100))]
        lookup_batch: u16,
    },

    /// Train the mood classifier on a labeled CSV
    Train {
        /// Labeled dataset (name, uri, features, mood)
        #[arg(value_hint = clap::ValueHint::FilePath)]
        dataset: PathBuf,

        #[arg(long, default_value_t = 25)]
        epochs: usize,

        #[arg(long, default_value_t = 4)]
        batch_size: usize,

        #[arg(long, default_value_t = 0.01)]
        learning_rate: f64,

        /// Fixed seed for a reproducible split and initialisation
        #[arg(long)]
        seed: Option<u64>,

        /// Where to save the model (defaults to the data directory)
        #[arg(long, env = "MOODIFY_MODEL", value_hint = clap::ValueHint::FilePath)]
        save: Option<PathBuf>,
    },

    /// Create a playlist of tracks predicted as MOOD
    ///
    /// Reads tracks from exactly one of --playlist or --csv.
    #[command(group(ArgGroup::new("visibility").args(["public", "private"])))]
    Curate {
        /// Target mood, matched case-insensitively against the model's labels
        mood: String,

        /// Source playlist id
        #[arg(long)]
        playlist: Option<String>,

        /// Pre-built CSV with uri and feature columns
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        csv: Option<PathBuf>,

        /// Name of the new playlist
        #[arg(long)]
        name: Option<String>,

        /// Default
        #[arg(long)]
        public: bool,

        #[arg(long)]
        private: bool,

        /// Prefix of generated playlist names
        #[arg(long, default_value = "Moodify")]
        brand: String,

        #[arg(long, env = "MOODIFY_MODEL", value_hint = clap::ValueHint::FilePath)]
        model: Option<PathBuf>,
    },

    /// Predict the mood of one track
    Mood {
        /// Track id or spotify:track: URI
        track: String,

        #[arg(long, env = "MOODIFY_MODEL", value_hint = clap::ValueHint::FilePath)]
        model: Option<PathBuf>,
    },

    /// Rewrite a dataset CSV with canonical column names and order
    ///
    /// Accepts duration_ms / length aliases and H:MM:SS durations.
    Clean {
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        infile: PathBuf,

        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        outfile: PathBuf,

        /// Input has no mood column
        #[arg(long)]
        unlabeled: bool,
    },

    /// Generate shell completions
    ///
    /// Usage: moodify completion bash > ~/.local/share/bash-completion/completions/moodify
    Completion {
        shell: Shell,
    },
}
