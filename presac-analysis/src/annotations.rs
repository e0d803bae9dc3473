//! Bad-segment annotations, stored as `onset,duration,description` CSV with
//! times in seconds from the first recorded sample.

use crate::error::AnalysisError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::info;

pub const OUT_OF_TRIAL: &str = "BAD_out_of_trial";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub onset: f64,
    pub duration: f64,
    pub description: String,
}

/// Marks everything outside `[onset - pre_stim_dur, onset + stim_dur]` of
/// each stimulus onset as bad, so that ICA only sees in-trial data.
/// Gaps that vanish because trials overlap are left out.
pub fn out_of_trial(
    onsets: &[i64],
    first_sample: i64,
    last_sample: i64,
    sfreq: f64,
    pre_stim_dur: f64,
    stim_dur: f64,
) -> Vec<Annotation> {
    let starts = std::iter::once(first_sample as f64)
        .chain(onsets.iter().map(|&t| t as f64 + stim_dur * sfreq));
    let ends = onsets
        .iter()
        .map(|&t| t as f64 - pre_stim_dur * sfreq)
        .chain(std::iter::once(last_sample as f64));
    starts
        .zip(ends)
        .filter(|(start, end)| end > start)
        .map(|(start, end)| Annotation {
            onset: (start - first_sample as f64) / sfreq,
            duration: (end - start) / sfreq,
            description: OUT_OF_TRIAL.to_string(),
        })
        .collect()
}

pub fn read_annotations<P: AsRef<Path>>(path: P) -> Result<Vec<Annotation>, AnalysisError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| AnalysisError::io(path, e))?;
    let annotations = csv::Reader::from_reader(file)
        .deserialize()
        .collect::<Result<Vec<Annotation>, _>>()?;
    info!(path = %path.display(), count = annotations.len(), "loaded annotations");
    Ok(annotations)
}

pub fn write_annotations<P: AsRef<Path>>(
    annotations: &[Annotation],
    path: P,
) -> Result<(), AnalysisError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    let mut wtr = csv::Writer::from_writer(file);
    for a in annotations {
        wtr.serialize(a)?;
    }
    wtr.flush().map_err(|e| AnalysisError::io(path, e))?;
    info!(path = %path.display(), count = annotations.len(), "saved annotations");
    Ok(())
}
