use anyhow::{Context, Result};
use presac_analysis::align::save_fixation_table;
use presac_analysis::artifacts::{CommandIca, FileAnnotator};
use presac_analysis::behavior::load_behavior;
use presac_analysis::meg::{read_events, save_events};
use presac_analysis::subject::{SubjectPaths, subject};
use presac_analysis::{
    AlignConfig, Alignment, ArtifactOutcome, ArtifactPaths, EyelinkData, MegRecording, Prompt,
    TargetClassifier, Unresolved, WithinDistance, align, identify_artifacts, load_subject,
};
use presac_core::{ExptInfo, TrialRecord};
use presac_experiment::results::write_results;
use presac_experiment::stimuli::{load_lines, load_stimulus_pool};
use presac_experiment::{ExperimentConfig, build_trials};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

fn load_info(path: &Path) -> Result<ExptInfo> {
    ExptInfo::load(path).with_context(|| format!("loading {}", path.display()))
}

fn classifier(on_target_px: Option<f64>) -> Box<dyn TargetClassifier> {
    match on_target_px {
        Some(max_px) => Box::new(WithinDistance { max_px }),
        None => Box::new(Unresolved),
    }
}

fn write_outputs(alignment: &Alignment, table: &Path, events: &Path) -> Result<()> {
    if let Some(dir) = table.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    save_fixation_table(&alignment.fixations, table)?;
    save_events(&alignment.events, events)?;
    info!(
        table = %table.display(),
        events = %events.display(),
        "wrote fixation outputs"
    );
    Ok(())
}

pub fn align_files(
    expt_info: &Path,
    meg: &Path,
    eyelink: &Path,
    behav: &Path,
    out_dir: &Path,
    on_target_px: Option<f64>,
) -> Result<()> {
    let info = load_info(expt_info)?;
    let meg_events = if meg.extension().is_some_and(|e| e == "csv") {
        MegRecording::load_csv(meg, &info.stim_channel, info.fsample_meg)?.events(info.stim_mask)
    } else {
        read_events(meg)?
    };
    let eye = EyelinkData::load(eyelink)?;
    let behavior = load_behavior(behav)?;

    let config = AlignConfig::from_expt_info(&info)?;
    let alignment = align(&meg_events, &eye, &behavior, &config, &*classifier(on_target_px))?;

    let stem = eyelink
        .file_stem()
        .map_or_else(|| "fixations".into(), |s| s.to_string_lossy());
    write_outputs(
        &alignment,
        &out_dir.join(format!("{stem}-fix.csv")),
        &out_dir.join(format!("{stem}-fix.eve")),
    )
}

pub fn load(
    expt_info: &Path,
    profile: &str,
    index: usize,
    on_target_px: Option<f64>,
) -> Result<()> {
    let info = load_info(expt_info)?;
    let data_dir = info.existing_data_dir(profile)?;
    let data = load_subject(data_dir, &info, index, &*classifier(on_target_px))
        .with_context(|| format!("loading subject {index}"))?;

    let assigned = data
        .alignment
        .fixations
        .iter()
        .filter(|f| f.trial_number.is_some())
        .count();
    info!(
        subject = index,
        meg_events = data.meg_events.len(),
        annotations = data.annotations.len(),
        ica_excluded = ?data.ica.exclude,
        fixations = data.alignment.fixations.len(),
        assigned,
        "subject loaded"
    );
    write_outputs(
        &data.alignment,
        &data.paths.fixation_table,
        &data.paths.fixation_events,
    )
}

pub fn artifacts(
    expt_info: &Path,
    profile: &str,
    index: usize,
    ica_program: PathBuf,
    ica_args: Vec<String>,
) -> Result<()> {
    let info = load_info(expt_info)?;
    let data_dir = info.existing_data_dir(profile)?;
    let row = subject(data_dir, index)?;
    let paths = SubjectPaths::new(data_dir, &row);

    let recording = MegRecording::load_csv(&paths.recording, &info.stim_channel, info.fsample_meg)?;

    let work_dir = data_dir.join("ica");
    fs::create_dir_all(&work_dir).with_context(|| format!("creating {}", work_dir.display()))?;
    let mut annotator = FileAnnotator {
        scratch: data_dir.join("annotations").join(format!("{}-edit.csv", row.stem())),
        prompt: Prompt::stdio(),
    };
    if let Some(dir) = annotator.scratch.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let mut ica = CommandIca {
        program: ica_program,
        args: ica_args,
        work_dir,
    };

    let outcome = identify_artifacts(
        &recording,
        &info,
        &ArtifactPaths {
            annotations: paths.annotations.clone(),
            ica: paths.ica.clone(),
        },
        &mut annotator,
        &mut ica,
        &mut Prompt::stdio(),
    )?;
    match outcome {
        ArtifactOutcome::Completed { annotations, ica } => info!(
            annotations = annotations.len(),
            excluded = ?ica.exclude,
            "artifact definitions saved"
        ),
        ArtifactOutcome::Aborted => warn!("option not recognized, nothing saved"),
    }
    Ok(())
}

pub fn trials(expt_info: &Path, seed: Option<u64>, out: Option<&Path>) -> Result<()> {
    let config = ExperimentConfig::from_expt_file(expt_info)?;
    let pool = load_stimulus_pool(&config.stimuli_file)?;
    let probe_words = load_lines(&config.probes_file)?;

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let records: Vec<TrialRecord> = build_trials(&pool, &probe_words, &config, &mut rng)?
        .into_iter()
        .map(TrialRecord::new)
        .collect();

    match out {
        Some(path) => {
            let file =
                fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
            write_results(&records, file)?;
            info!(path = %path.display(), trials = records.len(), "wrote trial list");
        }
        None => write_results(&records, std::io::stdout().lock())?,
    }
    Ok(())
}

pub fn convert(expt_info: &Path, recording: &Path, events: &Path) -> Result<()> {
    let info = load_info(expt_info)?;
    let rec = MegRecording::load_csv(recording, &info.stim_channel, info.fsample_meg)?;
    let decoded = rec.events(info.stim_mask);
    save_events(&decoded, events)?;
    info!(events = decoded.len(), path = %events.display(), "wrote events");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const EXPT_INFO: &str = r#"{
        "event_dict": {"response": 1, "fixation": 2, "stimuli": 4, "probe": 8,
                       "drift_correct_start": 16, "drift_correct_end": 32,
                       "fix_on": 100, "fix_off": 101},
        "data_dir": {"standard": "."},
        "pre_stim_dur": 0.5,
        "stim_dur": 2.0,
        "fsample_eyelink": 1000,
        "stim_dist_deg": 5.0
    }"#;

    #[test]
    fn aligns_named_files_from_an_events_file() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("expt_info.json"), EXPT_INFO).unwrap();
        fs::write(root.join("run1.eve"), "1000 0 4\n5000 0 4\n").unwrap();
        fs::write(
            root.join("19110415.asc"),
            "MSG\t200 Trigger 4\n\
             EFIX R   250\t300\t51\t  960.0\t  540.0\t 1000\n\
             MSG\t4200 Trigger 4\n\
             EFIX R   4300\t4400\t101\t  1312.0\t  540.0\t 1000\n",
        )
        .unwrap();
        fs::write(
            root.join("behav.csv"),
            "trial;stim_left;stim_center;stim_right;probe_word;fix_dur;stim_onset;resp;rt\n\
             0;cat;dog;cow;;0.7;10.0;;\n\
             1;dog;cow;cat;;0.6;14.0;;\n",
        )
        .unwrap();

        let out = root.join("out");
        align_files(
            &root.join("expt_info.json"),
            &root.join("run1.eve"),
            &root.join("19110415.asc"),
            &root.join("behav.csv"),
            &out,
            None,
        )
        .unwrap();

        let table = fs::read_to_string(out.join("19110415-fix.csv")).unwrap();
        assert_eq!(table.lines().count(), 3);
        let events = read_events(out.join("19110415-fix.eve")).unwrap();
        let samples: Vec<i64> = events.iter().map(|e| e.sample).collect();
        assert_eq!(samples, vec![1050, 5100, 1100, 5200]);
    }

    #[test]
    fn missing_config_names_the_file() {
        let err = load_info(Path::new("no/such/expt_info.json")).unwrap_err();
        assert!(format!("{err:#}").contains("no/such/expt_info.json"));
    }
}
