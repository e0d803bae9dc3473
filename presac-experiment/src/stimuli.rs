//! Session inputs kept next to the presentation binary: the stimulus list,
//! probe words and instruction screens.

use crate::error::PresentationError;
use presac_core::StimulusId;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

fn read(path: &Path) -> Result<String, PresentationError> {
    std::fs::read_to_string(path).map_err(|source| PresentationError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Flattens a `category: [image, ...]` mapping into one pool, keeping the
/// order of the file.
pub fn parse_stimulus_pool(text: &str) -> Result<Vec<StimulusId>, PresentationError> {
    let categories: Mapping = serde_yaml::from_str(text)?;
    let mut pool = Vec::new();
    for (category, images) in categories {
        let images: Vec<String> = serde_yaml::from_value(images).map_err(|e| {
            PresentationError::Config(format!(
                "category {} is not a list of names: {e}",
                describe(&category)
            ))
        })?;
        pool.extend(images.into_iter().map(StimulusId::from));
    }
    Ok(pool)
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

pub fn load_stimulus_pool<P: AsRef<Path>>(path: P) -> Result<Vec<StimulusId>, PresentationError> {
    parse_stimulus_pool(&read(path.as_ref())?)
}

/// Non-empty lines of a text file, trimmed.
pub fn load_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>, PresentationError> {
    Ok(read(path.as_ref())?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Image file for a stimulus.
pub fn stimulus_path(stim_dir: &Path, id: &StimulusId) -> PathBuf {
    stim_dir.join(format!("{id}.jpg"))
}
