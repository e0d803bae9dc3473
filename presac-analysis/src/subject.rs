//! The subject table and the per-subject file layout under the data root.

use crate::error::AnalysisError;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubjectRow {
    /// Session directory under `raw/`, may contain `/`
    pub meg_dir: String,
    pub meg_fname: String,
    /// Stem of the EyeLink ASCII export
    pub eyelink: String,
    /// Stem of the session results log
    pub behav: String,
}

impl SubjectRow {
    /// File stem for per-subject outputs.
    pub fn stem(&self) -> String {
        self.meg_dir.replace('/', "_")
    }
}

pub fn read_subject_table<P: AsRef<Path>>(path: P) -> Result<Vec<SubjectRow>, AnalysisError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let rows = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file)
        .deserialize()
        .collect::<Result<Vec<SubjectRow>, _>>()?;
    Ok(rows)
}

/// Row `index` of `<data_dir>/subject_info.csv`.
pub fn subject(data_dir: &Path, index: usize) -> Result<SubjectRow, AnalysisError> {
    let rows = read_subject_table(data_dir.join("subject_info.csv"))?;
    let n = rows.len();
    rows.into_iter()
        .nth(index)
        .ok_or(AnalysisError::UnknownSubject { index, rows: n })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectPaths {
    pub recording: PathBuf,
    pub annotations: PathBuf,
    pub ica: PathBuf,
    pub eyelink: PathBuf,
    pub behavior: PathBuf,
    pub fixation_table: PathBuf,
    pub fixation_events: PathBuf,
}

impl SubjectPaths {
    pub fn new(data_dir: &Path, row: &SubjectRow) -> Self {
        let stem = row.stem();
        Self {
            recording: data_dir.join("raw").join(&row.meg_dir).join(&row.meg_fname),
            annotations: data_dir.join("annotations").join(format!("{stem}.csv")),
            ica: data_dir.join("ica").join(format!("{stem}-ica.json")),
            eyelink: data_dir
                .join("eyelink")
                .join("ascii")
                .join(format!("{}.asc", row.eyelink)),
            behavior: data_dir.join("logfiles").join(format!("{}.csv", row.behav)),
            fixation_table: data_dir.join("fixations").join(format!("{stem}-fix.csv")),
            fixation_events: data_dir.join("fixations").join(format!("{stem}-fix.eve")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn layout_follows_the_data_root() {
        let row = SubjectRow {
            meg_dir: "191104/s01".into(),
            meg_fname: "run1_raw.csv".into(),
            eyelink: "19110415".into(),
            behav: "2019-11-04-1527".into(),
        };
        let p = SubjectPaths::new(Path::new("/data"), &row);
        assert_eq!(p.recording, Path::new("/data/raw/191104/s01/run1_raw.csv"));
        assert_eq!(p.annotations, Path::new("/data/annotations/191104_s01.csv"));
        assert_eq!(p.ica, Path::new("/data/ica/191104_s01-ica.json"));
        assert_eq!(p.eyelink, Path::new("/data/eyelink/ascii/19110415.asc"));
        assert_eq!(p.behavior, Path::new("/data/logfiles/2019-11-04-1527.csv"));
    }

    #[test]
    fn numeric_directories_read_as_text() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("subject_info.csv"),
            "meg_dir,meg_fname,eyelink,behav\n191104,run1.csv,19110415,2019-11-04-1527\n",
        )
        .unwrap();
        let row = subject(dir.path(), 0).unwrap();
        assert_eq!(row.meg_dir, "191104");
        assert!(matches!(
            subject(dir.path(), 1),
            Err(AnalysisError::UnknownSubject { index: 1, rows: 1 })
        ));
    }
}
