//! Session log: one `;`-delimited row per presented trial.

use crate::error::PresentationError;
use chrono::{DateTime, TimeZone};
use presac_core::TrialRecord;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct ResultRow<'a> {
    trial: usize,
    stim_left: &'a str,
    stim_center: &'a str,
    stim_right: &'a str,
    probe_word: Option<&'a str>,
    fix_dur: f64,
    stim_onset: Option<f64>,
    resp: Option<&'a str>,
    rt: Option<f64>,
}

impl<'a> From<&'a TrialRecord> for ResultRow<'a> {
    fn from(r: &'a TrialRecord) -> Self {
        Self {
            trial: r.trial.index,
            stim_left: r.trial.stim_left.as_str(),
            stim_center: r.trial.stim_center.as_str(),
            stim_right: r.trial.stim_right.as_str(),
            probe_word: r.trial.probe_word.as_deref(),
            fix_dur: r.trial.fix_dur,
            stim_onset: r.stim_onset,
            resp: r.response.as_ref().map(|x| x.key.as_str()),
            rt: r.response.as_ref().map(|x| x.rt),
        }
    }
}

pub fn write_results<W: Write>(records: &[TrialRecord], writer: W) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
    for record in records {
        wtr.serialize(ResultRow::from(record))?;
    }
    wtr.flush()?;
    Ok(())
}

/// File stem of a session log, from the session start time.
pub fn session_stamp<Tz: TimeZone>(start: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    start.format("%Y-%m-%d-%H%M").to_string()
}

/// `path` itself when free, otherwise the first free `<stem>_<n>.<ext>`.
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    (1..)
        .map(|n| {
            let name = match &ext {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            path.with_file_name(name)
        })
        .find(|p| !p.exists())
        .unwrap_or_else(|| path.to_path_buf())
}

/// Writes the session log to `<log_dir>/<stamp>.csv` without ever replacing
/// an existing file.
pub fn save_results(
    records: &[TrialRecord],
    log_dir: &Path,
    stamp: &str,
) -> Result<PathBuf, PresentationError> {
    let path = unique_path(&log_dir.join(format!("{stamp}.csv")));
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| PresentationError::Io {
            path: path.clone(),
            source,
        })?;
    write_results(records, file)?;
    info!(path = %path.display(), trials = records.len(), "saved results");
    Ok(path)
}
