//! # Integration Tests for Moodify
//!
//! End-to-end flows over the in-memory catalog (harvest, train, persist,
//! curate) and a few runs of the compiled binary that need no network.

use anyhow::Result;
use moodify::builder::{sources_for_moods, DatasetBuilder};
use moodify::catalog::memory::InMemoryCatalog;
use moodify::catalog::Visibility;
use moodify::curator::{CurationRequest, Curator, DestinationOptions, TrackSource};
use moodify::dataset::{read_dataset, write_dataset, write_tracks};
use moodify::error::MoodError;
use moodify::model::{meta_path, MoodClassifier, TrainConfig};
use moodify::track::{FeatureVector, TrackRecord, TrackRow};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Features of a track with the given mood-ish valence and energy.
fn features(valence: f64, energy: f64) -> FeatureVector {
    FeatureVector::from_slice(&[
        1.0 - energy,
        0.2 + 0.6 * valence,
        energy,
        0.02,
        0.12,
        -22.0 + 16.0 * energy,
        0.04,
        72.0 + 58.0 * energy,
        valence,
    ])
    .expect("finite features")
}

/// A user with one "happy" and one "sad" playlist, a mixed playlist to
/// curate from, and someone else's playlist.
fn music_service() -> InMemoryCatalog {
    let mut catalog = InMemoryCatalog::new("me");

    let mut happy = Vec::new();
    let mut sad = Vec::new();
    for i in 0..12 {
        let step = f64::from(i) / 12.0;
        let h = format!("happy{i}");
        let s = format!("sad{i}");
        catalog.set_features(&h, features(0.78 + 0.2 * step, 0.7 + 0.25 * step));
        catalog.set_features(&s, features(0.05 + 0.2 * step, 0.1 + 0.25 * step));
        happy.push(TrackRecord::new(format!("spotify:track:{h}"), format!("Sunny {i}"), "Band"));
        sad.push(TrackRecord::new(format!("spotify:track:{s}"), format!("Rain {i}"), "Band"));
    }
    // no features for this one
    happy.push(TrackRecord::new("withdrawn", "Gone", "Band"));

    let mut mixed = Vec::new();
    for i in 0..130 {
        let id = format!("mix{i}");
        if i % 2 == 0 {
            catalog.set_features(&id, features(0.1, 0.2));
        } else {
            catalog.set_features(&id, features(0.9, 0.85));
        }
        mixed.push(TrackRecord::new(&id, format!("Mixed {i}"), "Various"));
    }

    catalog
        .add_collection("pl-happy", "Happy Days", "me", happy)
        .add_collection("pl-sad", "so sad", "me", sad)
        .add_collection("pl-mixed", "Everything", "me", mixed)
        .add_collection("pl-other", "Their happy list", "someone", Vec::new());
    catalog
}

fn trained(catalog: &InMemoryCatalog) -> Result<MoodClassifier> {
    let sources = sources_for_moods(catalog, &["happy".to_string(), "sad".to_string()])?;
    let report = DatasetBuilder::new(catalog).build(&sources)?;
    let config = TrainConfig {
        epochs: 40,
        seed: Some(21),
        ..TrainConfig::default()
    };
    Ok(MoodClassifier::fit(&report.dataset, &config)?.0)
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[test]
    fn test_build_dataset_from_mood_titles() -> Result<()> {
        let catalog = music_service();
        let sources = sources_for_moods(&catalog, &["HAPPY".to_string(), "sad".to_string()])?;
        let ids: Vec<&str> = sources.iter().map(|s| s.collection_id.as_str()).collect();
        assert_eq!(ids, vec!["pl-happy", "pl-other", "pl-sad"]);

        let report = DatasetBuilder::new(&catalog).build(&sources)?;
        let counts = report.dataset.label_counts();
        assert_eq!(counts.get("Happy"), Some(&12));
        assert_eq!(counts.get("Sad"), Some(&12));
        assert_eq!(report.failed_labels.len(), 0);
        assert!(report
            .dataset
            .rows()
            .iter()
            .all(|r| !r.track.id.starts_with("spotify:")));
        Ok(())
    }

    #[test]
    fn test_removed_track_in_full_page_does_not_cut_harvest() -> Result<()> {
        let mut catalog = music_service();
        catalog.mark_unplayable("mix3");

        let rows = DatasetBuilder::new(&catalog)
            .with_page_size(50)
            .harvest("pl-mixed")?;
        assert_eq!(rows.len(), 129);
        assert_eq!(rows.last().map(|r| r.track.id.as_str()), Some("mix129"));
        Ok(())
    }

    #[test]
    fn test_harvest_train_save_load_curate() -> Result<()> {
        let dir = TempDir::new()?;
        let catalog = music_service();

        let sources = sources_for_moods(&catalog, &["happy".to_string(), "sad".to_string()])?;
        let report = DatasetBuilder::new(&catalog).build(&sources)?;
        let csv = dir.path().join("data/moods.csv");
        write_dataset(&report.dataset, &csv)?;

        let dataset = read_dataset(&csv)?;
        assert_eq!(dataset.len(), 24);
        let config = TrainConfig {
            epochs: 40,
            seed: Some(21),
            ..TrainConfig::default()
        };
        let (classifier, training) = MoodClassifier::fit(&dataset, &config)?;
        assert!(training.train_accuracy >= 0.9, "{training}");

        let model_path = dir.path().join("model/moodnet.json");
        classifier.save(&model_path)?;
        assert!(meta_path(&model_path).is_file());
        let loaded = MoodClassifier::load(&model_path)?;
        assert_eq!(loaded.labels(), classifier.labels());

        let request = CurationRequest {
            mood: " Sad".to_string(),
            source: TrackSource::Live("pl-mixed".to_string()),
            destination: DestinationOptions {
                visibility: Visibility::Public,
                ..DestinationOptions::default()
            },
        };
        let outcome = Curator::new(&catalog, &loaded).curate(&request)?;
        assert_eq!(outcome.kept, 65);
        assert!(outcome
            .kept_ids
            .iter()
            .all(|id| id.trim_start_matches("mix").parse::<usize>().unwrap() % 2 == 0));
        assert_eq!(catalog.append_calls(), vec![65]);

        let created = catalog.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "Moodify – Sad mix");
        assert_eq!(created[0].description, "Auto-generated Sad tracks");
        assert_eq!(created[0].visibility, Visibility::Public);
        Ok(())
    }

    #[test]
    fn test_curate_from_prebuilt_csv_with_large_keep_list() -> Result<()> {
        let dir = TempDir::new()?;
        let catalog = music_service();
        let classifier = trained(&catalog)?;

        let rows: Vec<TrackRow> = (0..250)
            .map(|i| TrackRow {
                track: TrackRecord::new(format!("spotify:track:c{i}"), format!("C {i}"), "X"),
                features: features(0.92, 0.9),
            })
            .collect();
        let csv = dir.path().join("candidates.csv");
        write_tracks(&rows, &csv)?;

        let request = CurationRequest {
            mood: "happy".to_string(),
            source: TrackSource::Prebuilt(csv),
            destination: DestinationOptions {
                name: Some("Sunshine".to_string()),
                ..DestinationOptions::default()
            },
        };
        let outcome = Curator::new(&catalog, &classifier).curate(&request)?;
        assert_eq!(outcome.kept, 250);
        assert_eq!(catalog.append_calls(), vec![100, 100, 50]);
        assert_eq!(catalog.created()[0].name, "Sunshine");
        assert_eq!(catalog.created()[0].tracks, outcome.kept_ids);
        Ok(())
    }

    #[test]
    fn test_csv_without_tempo_is_rejected_before_any_write() -> Result<()> {
        let dir = TempDir::new()?;
        let csv = dir.path().join("broken.csv");
        std::fs::write(
            &csv,
            "name,uri,acousticness,danceability,energy,instrumentalness,liveness,loudness,speechiness,valence\n\
             A,spotify:track:a,0.1,0.5,0.5,0,0.1,-6,0.05,0.4\n",
        )?;

        let catalog = music_service();
        let classifier = trained(&catalog)?;
        let request = CurationRequest {
            mood: "sad".to_string(),
            source: TrackSource::Prebuilt(csv),
            destination: DestinationOptions::default(),
        };
        let err = Curator::new(&catalog, &classifier)
            .curate(&request)
            .expect_err("missing column must fail");
        assert!(err.is_configuration());
        assert!(err.to_string().contains("tempo"));
        assert!(catalog.created().is_empty());
        Ok(())
    }

    #[test]
    fn test_single_mood_dataset_cannot_train() -> Result<()> {
        let catalog = music_service();
        let sources = sources_for_moods(&catalog, &["sad".to_string()])?;
        let report = DatasetBuilder::new(&catalog).build(&sources)?;
        assert!(matches!(
            MoodClassifier::fit(&report.dataset, &TrainConfig::default()),
            Err(MoodError::TooFewLabels { found: 1 })
        ));
        Ok(())
    }

    #[test]
    fn test_mood_of_single_track() -> Result<()> {
        let catalog = music_service();
        let classifier = trained(&catalog)?;
        let curator = Curator::new(&catalog, &classifier);
        assert_eq!(curator.mood_of_track("spotify:track:mix1")?, "Happy");
        assert_eq!(curator.mood_of_track("mix0")?, "Sad");
        assert!(matches!(
            curator.mood_of_track("withdrawn"),
            Err(MoodError::NoFeatures { .. })
        ));
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn moodify(args: &[&str]) -> std::process::Output {
        Command::new(env!("CARGO_BIN_EXE_moodify"))
            .args(args)
            .env_remove("MOODIFY_TOKEN")
            .env_remove("MOODIFY_MODEL")
            .output()
            .expect("Failed to run moodify")
    }

    fn path_str(p: &Path) -> &str {
        p.to_str().expect("utf-8 temp path")
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = moodify(&["--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        for sub in ["build-dataset", "train", "curate", "mood", "clean"] {
            assert!(stdout.contains(sub), "help lacks {sub}");
        }
    }

    #[test]
    fn test_completion_generation() {
        let output = moodify(&["completion", "bash"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("_moodify"));
        assert!(stdout.contains("complete"));
    }

    #[test]
    fn test_curate_rejects_two_sources() {
        let output = moodify(&["curate", "sad", "--playlist", "p", "--csv", "x.csv"]);
        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("exactly one track source"), "{stderr}");
    }

    #[test]
    fn test_clean_harmonises_columns() -> Result<()> {
        let dir = TempDir::new()?;
        let infile = dir.path().join("raw.csv");
        let outfile: PathBuf = dir.path().join("clean/out.csv");
        std::fs::write(
            &infile,
            "Name,URI,Artist,Acousticness,Danceability,Energy,Instrumentalness,Liveness,Loudness,Speechiness,Tempo,Valence,Mood,Length,Popularity\n\
             Song,spotify:track:abc,Band,0.1,0.6,0.7,0,0.1,-5,0.04,120,0.8,Happy,0 days 00:03:25,55\n",
        )?;

        let output = moodify(&["clean", "--infile", path_str(&infile), "--outfile", path_str(&outfile)]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let written = std::fs::read_to_string(&outfile)?;
        let mut lines = written.lines();
        assert_eq!(
            lines.next(),
            Some("name,uri,artist,acousticness,danceability,energy,instrumentalness,liveness,loudness,speechiness,tempo,valence,mood,duration")
        );
        let row = lines.next().unwrap_or_default();
        assert!(row.starts_with("Song,abc,Band,"));
        assert!(row.ends_with(",Happy,205000"));
        Ok(())
    }

    #[test]
    fn test_clean_drops_oversized_duration() -> Result<()> {
        let dir = TempDir::new()?;
        let infile = dir.path().join("raw.csv");
        let outfile = dir.path().join("out.csv");
        std::fs::write(
            &infile,
            "name,uri,artist,acousticness,danceability,energy,instrumentalness,liveness,loudness,speechiness,tempo,valence,duration\n\
             Song,spotify:track:abc,Band,0.1,0.6,0.7,0,0.1,-5,0.04,120,0.8,1e30\n",
        )?;

        let output = moodify(&[
            "clean",
            "--infile",
            path_str(&infile),
            "--outfile",
            path_str(&outfile),
            "--unlabeled",
        ]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let written = std::fs::read_to_string(&outfile)?;
        let row = written.lines().nth(1).unwrap_or_default();
        assert!(row.starts_with("Song,abc,Band,"));
        assert!(row.ends_with(','), "duration should be blank: {row}");
        Ok(())
    }

    #[test]
    fn test_train_writes_model_pair() -> Result<()> {
        let dir = TempDir::new()?;
        let catalog = music_service();
        let sources = sources_for_moods(&catalog, &["happy".to_string(), "sad".to_string()])?;
        let dataset = DatasetBuilder::new(&catalog).build(&sources)?.dataset;
        let csv = dir.path().join("moods.csv");
        write_dataset(&dataset, &csv)?;
        let model = dir.path().join("out/net.json");

        let output = moodify(&[
            "train",
            path_str(&csv),
            "--seed",
            "3",
            "--save",
            path_str(&model),
        ]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(String::from_utf8_lossy(&output.stdout).contains("Validation accuracy"));
        assert!(model.is_file());
        assert!(meta_path(&model).is_file());
        Ok(())
    }
}
