use crate::error::AnalysisError;
use presac_core::{Slot, StimulusId};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// One row of the presentation log, in trial order. Other columns of the
/// log are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BehaviorRow {
    pub stim_left: StimulusId,
    pub stim_center: StimulusId,
    pub stim_right: StimulusId,
}

impl BehaviorRow {
    pub fn stimulus(&self, slot: Slot) -> &StimulusId {
        match slot {
            Slot::Left => &self.stim_left,
            Slot::Center => &self.stim_center,
            Slot::Right => &self.stim_right,
        }
    }
}

pub fn read_behavior<R: Read>(reader: R, delimiter: u8) -> Result<Vec<BehaviorRow>, AnalysisError> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(reader);
    let rows = rdr.deserialize().collect::<Result<Vec<BehaviorRow>, _>>()?;
    Ok(rows)
}

/// Loads a `;`-delimited session log.
pub fn load_behavior<P: AsRef<Path>>(path: P) -> Result<Vec<BehaviorRow>, AnalysisError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let rows = read_behavior(file, b';')?;
    info!(path = %path.display(), trials = rows.len(), "loaded behavioral log");
    Ok(rows)
}
