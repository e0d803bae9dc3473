use crate::align::{AlignConfig, Alignment, TargetClassifier, align};
use crate::annotations::{Annotation, read_annotations};
use crate::artifacts::IcaModel;
use crate::behavior::{BehaviorRow, load_behavior};
use crate::error::AnalysisError;
use crate::eyelink::EyelinkData;
use crate::meg::MegRecording;
use crate::subject::{SubjectPaths, SubjectRow, subject};
use presac_core::{ExptInfo, MegEvent};
use std::path::Path;
use tracing::info;

/// Everything known about one subject.
#[derive(Debug, Clone)]
pub struct SubjectData {
    pub index: usize,
    pub subject: SubjectRow,
    pub paths: SubjectPaths,
    pub recording: MegRecording,
    pub meg_events: Vec<MegEvent>,
    pub annotations: Vec<Annotation>,
    pub ica: IcaModel,
    pub eye: EyelinkData,
    pub behavior: Vec<BehaviorRow>,
    pub alignment: Alignment,
}

fn require(path: &Path) -> Result<(), AnalysisError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(AnalysisError::MissingFile(path.to_path_buf()))
    }
}

/// Loads subject `index` of the subject table under `data_dir` and aligns
/// its fixations. Every input file, including the artifact definitions,
/// has to exist.
pub fn load_subject<C: TargetClassifier + ?Sized>(
    data_dir: &Path,
    info: &ExptInfo,
    index: usize,
    classifier: &C,
) -> Result<SubjectData, AnalysisError> {
    let row = subject(data_dir, index)?;
    let paths = SubjectPaths::new(data_dir, &row);
    for p in [
        &paths.recording,
        &paths.annotations,
        &paths.ica,
        &paths.eyelink,
        &paths.behavior,
    ] {
        require(p)?;
    }

    info!(subject = index, meg_dir = %row.meg_dir, "finding MEG events");
    let recording = MegRecording::load_csv(&paths.recording, &info.stim_channel, info.fsample_meg)?;
    let meg_events = recording.events(info.stim_mask);

    info!("loading artifact definitions");
    let annotations = read_annotations(&paths.annotations)?;
    let ica = IcaModel::load(&paths.ica)?;

    info!("loading eye-tracker data");
    let eye = EyelinkData::load(&paths.eyelink)?;

    info!("loading behavioral data");
    let behavior = load_behavior(&paths.behavior)?;

    info!("aligning fixations");
    let config = AlignConfig::from_expt_info(info)?;
    let alignment = align(&meg_events, &eye, &behavior, &config, classifier)?;

    Ok(SubjectData {
        index,
        subject: row,
        paths,
        recording,
        meg_events,
        annotations,
        ica,
        eye,
        behavior,
        alignment,
    })
}
