use presac_core::{ExptInfo, Screen, SessionPhase, StimulusId, TrialDescriptor, TrialState};
use presac_experiment::{
    DummyEyeTracker, ExperimentConfig, ExperimentEvent, ExperimentStateMachine, Key, NullPort,
    PresentationError, SessionPlan,
};
use presac_timing::{CalibrationStats, Timer};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Clock that only moves when told to (or when the session sleeps).
#[derive(Clone, Default)]
struct FakeTimer {
    now: Arc<AtomicU64>,
    frames: Vec<Duration>,
}

impl FakeTimer {
    fn advance(&self, d: Duration) {
        self.now.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Timer for FakeTimer {
    type Timestamp = u64;
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }
    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
    fn record_frame(&mut self, d: Duration) {
        self.frames.push(d);
    }
    fn frame_count(&self) -> usize {
        self.frames.len()
    }
    fn calibration_stats(&self) -> CalibrationStats {
        CalibrationStats::from_frame_times(&self.frames)
    }
}

type Session = ExperimentStateMachine<FakeTimer, DummyEyeTracker, NullPort>;

const INFO: &str = r#"{
    "event_dict": {"response": 1, "fixation": 2, "stimuli": 4, "probe": 8,
                   "drift_correct_start": 16, "drift_correct_end": 32,
                   "fix_on": 100, "fix_off": 101},
    "data_dir": {"standard": "/data/presac/"},
    "pre_stim_dur": 0.5,
    "stim_dur": 2.0,
    "fsample_eyelink": 1000,
    "stim_dist_deg": 5.0
}"#;

const FRAME: Duration = Duration::from_millis(10);

fn descriptor(index: usize, probe: Option<&str>) -> TrialDescriptor {
    TrialDescriptor {
        index,
        stim_left: StimulusId::new("ant"),
        stim_center: StimulusId::new("bee"),
        stim_right: StimulusId::new("cat"),
        probe_word: probe.map(str::to_string),
        fix_dur: 0.5,
    }
}

fn session(trials: Vec<TrialDescriptor>, log_dir: &std::path::Path) -> Session {
    session_with(trials, log_dir, |_| {})
}

fn session_with(
    trials: Vec<TrialDescriptor>,
    log_dir: &std::path::Path,
    tweak: impl FnOnce(&mut ExperimentConfig),
) -> Session {
    let info = ExptInfo::from_json_str(INFO).unwrap();
    let mut config = ExperimentConfig {
        expected_refresh_hz: Some(100.0),
        refresh_check_frames: 3,
        log_dir: log_dir.to_path_buf(),
        ..ExperimentConfig::default()
    };
    tweak(&mut config);
    let plan = SessionPlan {
        trials,
        instructions: vec!["Look at the dot.".to_string()],
        stamp: "2021-04-09-1405".to_string(),
    };
    let center = info.screen.origin_centered_to_eyelink((0.0, 0.0));
    ExperimentStateMachine::new(
        config,
        &info,
        plan,
        FakeTimer::default(),
        DummyEyeTracker::new(center),
        NullPort::default(),
    )
    .unwrap()
}

/// One frame: keys, then the time-driven events, then the flip.
fn step(s: &mut Session, keys: &[Key]) {
    s.timer.advance(FRAME);
    for &key in keys {
        s.handle_event(ExperimentEvent::KeyPressed(key));
    }
    for event in s.update() {
        s.handle_event(event);
    }
    s.frame_presented(FRAME);
}

fn run_until(s: &mut Session, max_frames: usize, done: impl Fn(&Session) -> bool) -> bool {
    for _ in 0..max_frames {
        if done(s) {
            return true;
        }
        step(s, &[]);
    }
    done(s)
}

/// Passes the refresh check and the single instruction screen.
fn start(s: &mut Session) {
    assert!(run_until(s, 10, |s| s.phase == SessionPhase::Instructions));
    assert_eq!(s.current_screen(), Screen::Text("Look at the dot.".to_string()));
    step(s, &[Key::Accept]);
    assert_eq!(s.phase, SessionPhase::Trials);
}

#[test]
fn wrong_refresh_rate_aborts_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session_with(vec![descriptor(0, None)], dir.path(), |c| {
        c.expected_refresh_hz = Some(120.0)
    });
    assert!(run_until(&mut s, 10, |s| s.is_finished()));
    assert!(matches!(s.take_failure(), Some(PresentationError::FrameRate(_))));
    assert!(s.saved_path().is_none());
}

#[test]
fn full_session_saves_every_trial() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None), descriptor(1, None)], dir.path());
    start(&mut s);
    assert_eq!(s.current_screen(), Screen::Fixation);

    assert!(run_until(&mut s, 1000, |s| s.phase == SessionPhase::Goodbye));
    assert_eq!(s.records().len(), 2);
    assert!(s.records().iter().all(|r| r.stim_onset.is_some()));
    assert_eq!(s.eye().triggers, vec![2, 4, 2, 4]);
    assert_eq!(s.port().last, 0);

    let path = s.saved_path().unwrap().to_path_buf();
    assert_eq!(path.file_name().unwrap(), "2021-04-09-1405.csv");
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 3);

    s.handle_event(ExperimentEvent::KeyPressed(Key::Break));
    assert!(s.is_finished());
}

#[test]
fn stimuli_are_shown_at_the_three_slots() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None)], dir.path());
    start(&mut s);
    assert!(run_until(&mut s, 200, |s| s.current_trial_state() == Some(TrialState::Stimuli)));
    match s.current_screen() {
        Screen::Stimuli { stimuli, positions } => {
            assert_eq!(stimuli[1].as_str(), "bee");
            assert_eq!(positions[0], (-352.0, 0.0));
            assert_eq!(positions[1], (0.0, 0.0));
            assert_eq!(positions[2], (352.0, 0.0));
        }
        other => panic!("expected stimuli, got {other:?}"),
    }
}

#[test]
fn looking_away_restarts_the_fixation_hold() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None)], dir.path());
    start(&mut s);
    let center = s.eye().gaze;
    s.eye_mut().gaze = Some((1500.0, 540.0));
    for _ in 0..150 {
        step(&mut s, &[]);
    }
    assert_eq!(s.current_trial_state(), Some(TrialState::Fixation));

    s.eye_mut().gaze = None;
    for _ in 0..100 {
        step(&mut s, &[]);
    }
    assert_eq!(s.current_trial_state(), Some(TrialState::Fixation));

    s.eye_mut().gaze = center;
    for _ in 0..40 {
        step(&mut s, &[]);
    }
    assert_eq!(s.current_trial_state(), Some(TrialState::Fixation));
    assert!(run_until(&mut s, 20, |s| s.current_trial_state() == Some(TrialState::Stimuli)));
}

#[test]
fn probe_response_is_recorded_with_reaction_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, Some("lamp"))], dir.path());
    start(&mut s);
    assert!(run_until(&mut s, 500, |s| s.current_trial_state() == Some(TrialState::Probe)));
    assert_eq!(s.current_screen(), Screen::Text("lamp".to_string()));

    for _ in 0..30 {
        step(&mut s, &[]);
    }
    step(&mut s, &[Key::Yes]);
    assert_eq!(s.current_trial_state(), Some(TrialState::InterTrial));

    assert!(run_until(&mut s, 100, |s| s.phase == SessionPhase::Goodbye));
    let response = s.records()[0].response.clone().unwrap();
    assert_eq!(response.key, "7");
    assert!(response.rt > 0.3 && response.rt < 0.4, "rt = {}", response.rt);
    assert_eq!(s.eye().triggers, vec![2, 4, 8, 1]);
}

#[test]
fn unanswered_probe_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, Some("lamp"))], dir.path());
    start(&mut s);
    assert!(run_until(&mut s, 500, |s| s.current_trial_state() == Some(TrialState::Probe)));
    for _ in 0..390 {
        step(&mut s, &[]);
    }
    assert_eq!(s.current_trial_state(), Some(TrialState::Probe));
    assert!(run_until(&mut s, 20, |s| s.current_trial_state() == Some(TrialState::InterTrial)));
    assert!(run_until(&mut s, 100, |s| s.phase == SessionPhase::Goodbye));
    assert_eq!(s.records()[0].response, None);
}

#[test]
fn confirmed_break_ends_the_session_early() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None), descriptor(1, None)], dir.path());
    start(&mut s);
    step(&mut s, &[Key::Break]);
    // Not acted on until the fixation has settled.
    assert!(run_until(&mut s, 30, |s| s.phase == SessionPhase::ConfirmQuit));
    assert_eq!(s.current_screen(), Screen::Text("End experiment? (y/n)".to_string()));

    // Too early: the answer is discarded.
    step(&mut s, &[Key::ConfirmYes]);
    assert_eq!(s.phase, SessionPhase::ConfirmQuit);

    for _ in 0..100 {
        step(&mut s, &[]);
    }
    step(&mut s, &[Key::ConfirmYes]);
    assert_eq!(s.phase, SessionPhase::Goodbye);
    assert!(s.records().is_empty());
    assert!(s.saved_path().unwrap().exists());

    assert!(run_until(&mut s, 3100, |s| s.is_finished()));
}

#[test]
fn declined_break_returns_to_the_same_trial() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None)], dir.path());
    start(&mut s);
    step(&mut s, &[Key::Break]);
    assert!(run_until(&mut s, 30, |s| s.phase == SessionPhase::ConfirmQuit));
    for _ in 0..101 {
        step(&mut s, &[]);
    }
    step(&mut s, &[Key::ConfirmNo]);
    assert_eq!(s.phase, SessionPhase::Trials);
    assert_eq!(s.current_trial_state(), Some(TrialState::Fixation));
    assert_eq!(s.trial_progress(), (0, 1));
    assert!(run_until(&mut s, 1000, |s| s.phase == SessionPhase::Goodbye));
    assert_eq!(s.records().len(), 1);
}

#[test]
fn drift_key_runs_a_bracketed_drift_correction() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None)], dir.path());
    start(&mut s);
    step(&mut s, &[Key::Drift]);
    assert!(run_until(&mut s, 30, |s| s.phase == SessionPhase::DriftCorrect));
    assert_eq!(s.current_screen(), Screen::DriftFixation);
    step(&mut s, &[]);
    assert_eq!(s.phase, SessionPhase::Trials);
    assert_eq!(s.eye().drift_corrections, 1);
    step(&mut s, &[]);
    assert_eq!(s.eye().triggers, vec![2, 16, 32]);
}

#[test]
fn block_break_waits_for_the_experimenter() {
    let dir = tempfile::tempdir().unwrap();
    let trials = (0..3).map(|i| descriptor(i, None)).collect();
    let mut s = session_with(trials, dir.path(), |c| c.block_length = 1);
    start(&mut s);

    assert!(run_until(&mut s, 1000, |s| s.phase == SessionPhase::BlockBreak));
    // The first break follows the second trial.
    assert_eq!(s.records().len(), 2);
    assert!(matches!(s.current_screen(), Screen::Text(t) if t.starts_with("Take a brief break")));

    step(&mut s, &[Key::Accept]);
    assert_eq!(s.phase, SessionPhase::BlockBreak);
    step(&mut s, &[Key::Drift]);
    assert_eq!(s.current_screen(), Screen::Text("Ready?".to_string()));
    step(&mut s, &[Key::Drift]);
    assert_eq!(s.phase, SessionPhase::DriftCorrect);
    step(&mut s, &[]);
    assert_eq!(s.phase, SessionPhase::Trials);
    assert_eq!(s.trial_progress(), (2, 3));
    assert_eq!(s.eye().drift_corrections, 1);
}

#[test]
fn experimenter_keys_are_ignored_during_instructions() {
    let dir = tempfile::tempdir().unwrap();
    let mut s = session(vec![descriptor(0, None)], dir.path());
    assert!(run_until(&mut s, 10, |s| s.phase == SessionPhase::Instructions));
    assert!(!s.handle_event(ExperimentEvent::KeyPressed(Key::Break)));
    assert!(!s.handle_event(ExperimentEvent::KeyPressed(Key::Drift)));
    assert_eq!(s.phase, SessionPhase::Instructions);

    step(&mut s, &[Key::Accept]);
    assert!(s.handle_event(ExperimentEvent::KeyPressed(Key::Break)));
}
