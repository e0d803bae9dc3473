use presac_analysis::annotations::write_annotations;
use presac_analysis::{AnalysisError, Annotation, IcaModel, Unresolved, load_subject};
use presac_core::ExptInfo;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn info(data_dir: &Path) -> ExptInfo {
    let json = format!(
        r#"{{
        "event_dict": {{"response": 1, "fixation": 2, "stimuli": 4, "probe": 8,
                       "drift_correct_start": 16, "drift_correct_end": 32,
                       "fix_on": 100, "fix_off": 101}},
        "data_dir": {{"standard": {:?}}},
        "pre_stim_dur": 0.5,
        "stim_dur": 2.0,
        "fsample_eyelink": 1000,
        "stim_dist_deg": 5.0
    }}"#,
        data_dir.display().to_string()
    );
    ExptInfo::from_json_str(&json).unwrap()
}

/// A two-trial subject `191104/s01` under `root`.
fn write_subject(root: &Path) {
    let mkdir = |p: &str| fs::create_dir_all(root.join(p)).unwrap();
    mkdir("raw/191104/s01");
    mkdir("annotations");
    mkdir("ica");
    mkdir("eyelink/ascii");
    mkdir("logfiles");

    fs::write(
        root.join("subject_info.csv"),
        "meg_dir,meg_fname,eyelink,behav\n191104/s01,run1.csv,19110415,2019-11-04-1527\n",
    )
    .unwrap();

    // stimulus channel, onsets at 1000 and 5000; 64 is a button press
    let mut raw = String::from("sample,value\n");
    for s in 900..5200 {
        let v = match s {
            1000..=1009 | 5000..=5009 => 4,
            3000..=3020 => 64,
            _ => 0,
        };
        raw.push_str(&format!("{s},{v}\n"));
    }
    fs::write(root.join("raw/191104/s01/run1.csv"), raw).unwrap();

    write_annotations(
        &[Annotation {
            onset: 0.0,
            duration: 0.05,
            description: "BAD_out_of_trial".into(),
        }],
        root.join("annotations/191104_s01.csv"),
    )
    .unwrap();
    IcaModel {
        n_components: 1,
        sfreq: 100.0,
        channel_names: vec!["MEG0111".into()],
        unmixing: vec![vec![1.0]],
        mixing: vec![vec![1.0]],
        exclude: vec![],
    }
    .save(root.join("ica/191104_s01-ica.json"))
    .unwrap();

    fs::write(
        root.join("eyelink/ascii/19110415.asc"),
        "MSG\t200 Trigger 4\n\
         EFIX R   250\t300\t51\t  960.0\t  540.0\t 1000\n\
         MSG\t4200 Trigger 4\n\
         EFIX R   4300\t4400\t101\t  1312.0\t  540.0\t 1000\n",
    )
    .unwrap();
    fs::write(
        root.join("logfiles/2019-11-04-1527.csv"),
        "trial;stim_left;stim_center;stim_right;probe_word;fix_dur;stim_onset;resp;rt\n\
         0;cat;dog;cow;;0.7;10.0;;\n\
         1;dog;cow;cat;;0.6;14.0;;\n",
    )
    .unwrap();
}

#[test]
fn loads_and_aligns_a_subject() {
    let dir = tempdir().unwrap();
    write_subject(dir.path());
    let data = load_subject(dir.path(), &info(dir.path()), 0, &Unresolved).unwrap();

    assert_eq!(data.subject.meg_dir, "191104/s01");
    assert_eq!(data.meg_events.len(), 2);
    assert_eq!(data.recording.first_sample(), 900);
    assert_eq!(data.annotations.len(), 1);
    assert_eq!(data.behavior.len(), 2);

    let starts: Vec<Option<i64>> = data.alignment.fixations.iter().map(|f| f.start_meg).collect();
    assert_eq!(starts, vec![Some(1050), Some(5100)]);
    assert_eq!(
        data.alignment.fixations[1].closest_stim.as_ref().map(|s| s.as_str()),
        Some("cat")
    );
}

#[test]
fn missing_annotations_are_fatal() {
    let dir = tempdir().unwrap();
    write_subject(dir.path());
    let annotations = dir.path().join("annotations/191104_s01.csv");
    fs::remove_file(&annotations).unwrap();

    match load_subject(dir.path(), &info(dir.path()), 0, &Unresolved) {
        Err(AnalysisError::MissingFile(p)) => assert_eq!(p, annotations),
        other => panic!("expected a missing file error, got {other:?}"),
    }
}

#[test]
fn unknown_subject_index() {
    let dir = tempdir().unwrap();
    write_subject(dir.path());
    assert!(matches!(
        load_subject(dir.path(), &info(dir.path()), 3, &Unresolved),
        Err(AnalysisError::UnknownSubject { index: 3, rows: 1 })
    ));
}
