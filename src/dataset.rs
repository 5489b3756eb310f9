//! # Dataset Module
//!
//! The labeled training table and its CSV form.
//!
//! ## File layout
//!
//! ```text
//! name,uri,artist,acousticness,danceability,energy,instrumentalness,liveness,loudness,speechiness,tempo,valence,mood,duration
//! ```
//!
//! `duration` is written in milliseconds. Readers are lenient about
//! everything that is not a model input: unknown columns (genre lists, row
//! indices) are ignored, `duration_ms` and `length` are accepted as
//! aliases, and durations may also be `MM:SS`, `H:MM:SS` or
//! `0 days 00:03:45`. They are strict about model inputs: a required column
//! that is absent fails the whole read with every missing name listed, and
//! an empty or non-numeric feature cell fails with its row and column.

use crate::error::{MoodError, Result};
use crate::track::{bare_track_id, FeatureVector, LabeledRow, TrackRecord, TrackRow, FEATURE_NAMES};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Name of the label column.
pub const LABEL_COLUMN: &str = "mood";

const NAME_COLUMN: &str = "name";
const URI_COLUMN: &str = "uri";
const ARTIST_COLUMN: &str = "artist";
const DURATION_COLUMN: &str = "duration";
const DURATION_ALIASES: [&str; 3] = ["duration", "duration_ms", "length"];

/// Ordered sequence of labeled rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<LabeledRow>,
}

impl Dataset {
    #[must_use]
    pub fn new(rows: Vec<LabeledRow>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn rows(&self) -> &[LabeledRow] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = LabeledRow>) {
        self.rows.extend(rows);
    }

    /// Rows per label, sorted by label.
    #[must_use]
    pub fn label_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// Track ids that appear under more than one label.
    ///
    /// Happens when a track sits in differently-named collections. Those
    /// rows are kept as they are; this only reports them.
    #[must_use]
    pub fn conflicting_tracks(&self) -> Vec<&str> {
        let mut labels: HashMap<&str, Vec<&str>> = HashMap::new();
        for row in &self.rows {
            let seen = labels.entry(row.track.id.as_str()).or_default();
            if !seen.contains(&row.label.as_str()) {
                seen.push(row.label.as_str());
            }
        }
        let mut ids: Vec<&str> = labels
            .into_iter()
            .filter(|(_, l)| l.len() > 1)
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Feature matrix in [`FEATURE_NAMES`] column order.
    #[must_use]
    pub fn feature_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|r| r.features.to_array().to_vec()).collect()
    }

    #[must_use]
    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }
}

/// Column name → index for one CSV header.
struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();
        Self { index }
    }

    fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    fn require(&self, path: &Path, required: &[&str]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|c| self.get(c).is_none())
            .map(|c| (*c).to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(MoodError::MissingColumns {
                path: path.to_path_buf(),
                columns: missing,
            })
        }
    }

    fn duration(&self) -> Option<(usize, &'static str)> {
        DURATION_ALIASES
            .iter()
            .find_map(|alias| self.get(alias).map(|i| (i, *alias)))
    }
}

fn text(record: &StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i)).unwrap_or("").trim().to_string()
}

fn parse_features(record: &StringRecord, columns: &Columns, row: usize) -> Result<FeatureVector> {
    let mut values = [0.0; FEATURE_NAMES.len()];
    for (slot, name) in values.iter_mut().zip(FEATURE_NAMES) {
        let raw = text(record, columns.get(name));
        *slot = raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| MoodError::InvalidValue {
                row,
                column: name.to_string(),
                value: raw.clone(),
            })?;
    }
    FeatureVector::from_slice(&values)
}

/// Parse a duration cell.
///
/// Accepts integer or decimal milliseconds, `M:SS`, `H:MM:SS` and the
/// `"N days HH:MM:SS.ffffff"` form written by dataframe exports.
///
/// # Returns
///
/// `None` for blank cells, unrecognised text, negative values and durations
/// too large to represent.
///
/// # Examples
///
/// ```
/// use moodify::dataset::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("3:45"), Some(Duration::from_secs(225)));
/// assert_eq!(parse_duration("1e30"), None);
/// ```
#[must_use]
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ms) = raw.parse::<u64>() {
        return Some(Duration::from_millis(ms));
    }
    if let Ok(ms) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(ms / 1000.0).ok();
    }

    // "0 days 00:03:45.500000"
    let (days, clock) = match raw.split_once(" days ").or_else(|| raw.split_once(" day ")) {
        Some((d, rest)) => (d.trim().parse::<u64>().ok()?, rest),
        None => (0, raw),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [m, s] => (0, m.parse::<u64>().ok()?, s.parse::<f64>().ok()?),
        [h, m, s] => (h.parse::<u64>().ok()?, m.parse::<u64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    let fraction = Duration::try_from_secs_f64(s).ok()?;
    let whole = days
        .checked_mul(86_400)?
        .checked_add(h.checked_mul(3_600)?)?
        .checked_add(m.checked_mul(60)?)?;
    Duration::from_secs(whole).checked_add(fraction)
}

fn parse_track(record: &StringRecord, columns: &Columns, row: usize) -> Result<TrackRecord> {
    let uri = text(record, columns.get(URI_COLUMN));
    if uri.is_empty() {
        return Err(MoodError::InvalidValue {
            row,
            column: URI_COLUMN.to_string(),
            value: uri,
        });
    }
    let mut track = TrackRecord::new(
        bare_track_id(&uri),
        text(record, columns.get(NAME_COLUMN)),
        text(record, columns.get(ARTIST_COLUMN)),
    );
    if let Some((idx, alias)) = columns.duration() {
        let raw = text(record, Some(idx));
        match parse_duration(&raw) {
            Some(d) => track.duration = Some(d),
            None if raw.is_empty() => {}
            None => warn!("row {row}: ignoring unparseable {alias} {raw:?}"),
        }
    }
    Ok(track)
}

fn open(path: &Path) -> Result<csv::Reader<fs::File>> {
    Ok(ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(path)?)
}

/// Read a labeled training dataset.
///
/// Header names are matched case-insensitively and extra columns are
/// skipped. Blank labels are kept as written; training rejects them later
/// through the label checks.
///
/// # Examples
///
/// ```no_run
/// use moodify::dataset::read_dataset;
/// use std::path::Path;
///
/// let dataset = read_dataset(Path::new("data/moods.csv"))?;
/// for (label, count) in dataset.label_counts() {
///     println!("{label}: {count}");
/// }
/// # Ok::<(), moodify::error::MoodError>(())
/// ```
///
/// # Errors
///
/// `MissingColumns` lists every absent column of `name`, `uri`, the nine
/// features and `mood`. `InvalidValue` points at the first bad cell.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let mut reader = open(path)?;
    let columns = Columns::new(reader.headers()?);
    let mut required = vec![NAME_COLUMN, URI_COLUMN];
    required.extend(FEATURE_NAMES);
    required.push(LABEL_COLUMN);
    columns.require(path, &required)?;

    let label_idx = columns.get(LABEL_COLUMN);
    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let label = text(&record, label_idx);
        if label.is_empty() {
            return Err(MoodError::InvalidValue {
                row,
                column: LABEL_COLUMN.to_string(),
                value: label,
            });
        }
        rows.push(LabeledRow {
            track: parse_track(&record, &columns, row)?,
            features: parse_features(&record, &columns, row)?,
            label,
        });
    }

    debug!("read {} labeled rows from {}", rows.len(), path.display());
    Ok(Dataset::new(rows))
}

/// Read an unlabeled track table, e.g. a pre-built curation source.
///
/// Only `uri` and the nine features are required.
///
/// # Errors
///
/// `MissingColumns` before any row is read; `InvalidValue` for bad cells.
pub fn read_tracks(path: &Path) -> Result<Vec<TrackRow>> {
    let mut reader = open(path)?;
    let columns = Columns::new(reader.headers()?);
    let mut required = vec![URI_COLUMN];
    required.extend(FEATURE_NAMES);
    columns.require(path, &required)?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        rows.push(TrackRow {
            track: parse_track(&record, &columns, row)?,
            features: parse_features(&record, &columns, row)?,
        });
    }

    debug!("read {} tracks from {}", rows.len(), path.display());
    Ok(rows)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn track_fields(track: &TrackRecord, features: &FeatureVector) -> Vec<String> {
    let mut fields = vec![track.name.clone(), track.id.clone(), track.artist.clone()];
    fields.extend(features.to_array().iter().map(f64::to_string));
    fields
}

fn duration_field(track: &TrackRecord) -> String {
    track
        .duration
        .map(|d| d.as_millis().to_string())
        .unwrap_or_default()
}

/// Write a labeled dataset in canonical column order.
///
/// Columns are `name`, `uri`, `artist`, the nine features, `mood` and
/// `duration` in milliseconds. Missing parent directories are created and
/// an existing file is replaced. The output reads back with
/// [`read_dataset`].
///
/// # Errors
///
/// `Io` if the directory or file cannot be created; `Csv` if a record
/// cannot be written.
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;

    let mut header = vec![NAME_COLUMN, URI_COLUMN, ARTIST_COLUMN];
    header.extend(FEATURE_NAMES);
    header.extend([LABEL_COLUMN, DURATION_COLUMN]);
    writer.write_record(&header)?;

    for row in dataset.rows() {
        let mut fields = track_fields(&row.track, &row.features);
        fields.push(row.label.clone());
        fields.push(duration_field(&row.track));
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write unlabeled tracks in canonical column order.
///
/// Same layout as [`write_dataset`] without the `mood` column, readable by
/// [`read_tracks`].
///
/// # Errors
///
/// `Io` or `Csv` as for [`write_dataset`].
pub fn write_tracks(rows: &[TrackRow], path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new().from_path(path)?;

    let mut header = vec![NAME_COLUMN, URI_COLUMN, ARTIST_COLUMN];
    header.extend(FEATURE_NAMES);
    header.push(DURATION_COLUMN);
    writer.write_record(&header)?;

    for row in rows {
        let mut fields = track_fields(&row.track, &row.features);
        fields.push(duration_field(&row.track));
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}
