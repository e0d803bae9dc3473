use crate::config::ExperimentConfig;
use crate::devices::{EyeTracker, TriggerPort};
use crate::error::PresentationError;
use crate::results::save_results;
use crate::trial::RunningTrial;
use presac_core::geometry::euclidean;
use presac_core::{
    ConfigError, EventDict, ExptInfo, Point, Response, Screen, ScreenGeometry, SessionPhase,
    TrialDescriptor, TrialRecord, TrialState, triggers,
};
use presac_timing::{CalibrationStats, Timer, check_refresh_rate};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info};

const REST_TEXT: &str =
    "Take a brief break and let the experimenter know when you're ready to go on.";
const READY_TEXT: &str = "Ready?";
const CONFIRM_TEXT: &str = "End experiment? (y/n)";
const GOODBYE_TEXT: &str = "That was it -- thanks!";

/// Keys the session reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Space: next instruction screen
    Accept,
    /// Return: drift correction, or continue after a block break
    Drift,
    /// Escape: ask whether to end the session
    Break,
    /// "7" on the response box
    Yes,
    /// "8" on the response box
    No,
    ConfirmYes,
    ConfirmNo,
}

impl Key {
    pub fn name(self) -> &'static str {
        match self {
            Key::Accept => "space",
            Key::Drift => "return",
            Key::Break => "escape",
            Key::Yes => "7",
            Key::No => "8",
            Key::ConfirmYes => "y",
            Key::ConfirmNo => "n",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    KeyPressed(Key),
    RefreshChecked,
    FixationHeld,
    StimuliElapsed,
    ResponseTimeout,
    TrialComplete,
    DriftReady,
    GoodbyeTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakStep {
    Rest,
    Ready,
}

/// Where the session continues after an experimenter interruption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resume {
    /// Back to waiting for fixation in the current trial
    Fixation,
    /// The current trial has ended; block breaks still apply
    AfterTrial,
    /// Straight into the next trial
    NextTrial,
}

/// Port values of the presentation triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerCodes {
    pub response: u8,
    pub fixation: u8,
    pub stimuli: u8,
    pub probe: u8,
    pub drift_correct_start: u8,
    pub drift_correct_end: u8,
}

impl TriggerCodes {
    pub fn from_dict(dict: &EventDict) -> Result<Self, ConfigError> {
        let port_value = |name: &str| -> Result<u8, ConfigError> {
            let code = dict.code(name)?;
            u8::try_from(code).map_err(|_| {
                ConfigError::Invalid(format!("trigger {name:?} = {code} does not fit the port"))
            })
        };
        Ok(Self {
            response: port_value(triggers::RESPONSE)?,
            fixation: port_value(triggers::FIXATION)?,
            stimuli: port_value(triggers::STIMULI)?,
            probe: port_value(triggers::PROBE)?,
            drift_correct_start: port_value(triggers::DRIFT_CORRECT_START)?,
            drift_correct_end: port_value(triggers::DRIFT_CORRECT_END)?,
        })
    }
}

/// Everything prepared before the session starts.
#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub trials: Vec<TrialDescriptor>,
    pub instructions: Vec<String>,
    /// File stem of the results log
    pub stamp: String,
}

fn secs_to_ns(s: f64) -> u64 {
    (s * 1e9) as u64
}

/// Frame-driven presentation session.
///
/// Every frame the caller runs [`update`](Self::update), feeds the returned
/// events and any key presses to [`handle_event`](Self::handle_event), draws
/// [`current_screen`](Self::current_screen) and reports the flip with
/// [`frame_presented`](Self::frame_presented). Triggers go out right after
/// the flip that shows the corresponding screen.
pub struct ExperimentStateMachine<T, E, P>
where
    T: Timer<Timestamp = u64>,
    E: EyeTracker,
    P: TriggerPort,
{
    pub phase: SessionPhase,
    pub timer: T,
    pub config: ExperimentConfig,
    pub current: Option<RunningTrial<u64>>,
    pub trial_number: usize,
    pub refresh_stats: Option<CalibrationStats>,
    geometry: ScreenGeometry,
    codes: TriggerCodes,
    eye: E,
    port: P,
    trials: Vec<TrialDescriptor>,
    instructions: Vec<String>,
    instruction_line: usize,
    records: Vec<TrialRecord>,
    stamp: String,
    stim_positions: [Point; 3],
    fix_thresh_px: f64,
    queued_triggers: Vec<u8>,
    pending_break: bool,
    pending_drift: bool,
    break_step: BreakStep,
    resume: Resume,
    drift_shown: bool,
    phase_start: u64,
    saved: Option<PathBuf>,
    failure: Option<PresentationError>,
}

impl<T, E, P> ExperimentStateMachine<T, E, P>
where
    T: Timer<Timestamp = u64>,
    E: EyeTracker,
    P: TriggerPort,
{
    pub fn new(
        config: ExperimentConfig,
        info: &ExptInfo,
        plan: SessionPlan,
        timer: T,
        eye: E,
        port: P,
    ) -> Result<Self, PresentationError> {
        config.validate()?;
        let codes = TriggerCodes::from_dict(&info.event_dict)?;
        let geometry = info.screen;
        let phase = if config.expected_refresh_hz.is_some() {
            SessionPhase::RefreshCheck
        } else {
            SessionPhase::Instructions
        };
        let phase_start = timer.now();
        let mut machine = Self {
            phase,
            timer,
            current: None,
            trial_number: 0,
            refresh_stats: None,
            geometry,
            codes,
            eye,
            port,
            trials: plan.trials,
            instructions: plan.instructions,
            instruction_line: 0,
            records: Vec::new(),
            stamp: plan.stamp,
            stim_positions: geometry.slot_centers(info.stim_dist_deg),
            fix_thresh_px: geometry.deg2pix(config.fix_thresh_deg).trunc(),
            config,
            queued_triggers: Vec::new(),
            pending_break: false,
            pending_drift: false,
            break_step: BreakStep::Rest,
            resume: Resume::NextTrial,
            drift_shown: false,
            phase_start,
            saved: None,
            failure: None,
        };
        machine.eye.startup()?;
        machine.port.set_data(0);
        if machine.phase == SessionPhase::Instructions {
            machine.enter_instructions();
        }
        Ok(machine)
    }

    pub fn update(&mut self) -> Vec<ExperimentEvent> {
        let mut events = Vec::new();
        match self.phase {
            SessionPhase::RefreshCheck => {
                if self.timer.frame_count() >= self.config.refresh_check_frames {
                    events.push(ExperimentEvent::RefreshChecked);
                }
            }
            SessionPhase::Trials => self.update_trial(&mut events),
            // The drift target has to be on screen before the tracker blocks.
            SessionPhase::DriftCorrect => {
                if self.drift_shown {
                    events.push(ExperimentEvent::DriftReady);
                }
            }
            SessionPhase::Goodbye => {
                if self.timer.elapsed(self.phase_start)
                    >= Duration::from_nanos(secs_to_ns(self.config.goodbye_timeout_s))
                {
                    events.push(ExperimentEvent::GoodbyeTimeout);
                }
            }
            _ => {}
        }
        events
    }

    pub fn handle_event(&mut self, event: ExperimentEvent) -> bool {
        use ExperimentEvent::*;
        match (self.phase, event) {
            (SessionPhase::RefreshCheck, RefreshChecked) => {
                self.apply_refresh_check();
                true
            }

            (SessionPhase::Instructions, KeyPressed(Key::Accept)) => {
                self.instruction_line += 1;
                if self.instruction_line >= self.instructions.len() {
                    self.phase = SessionPhase::Trials;
                    self.start_trial();
                }
                true
            }

            // Experimenter keys are acted on while waiting for fixation and
            // at the end of a trial.
            (phase, KeyPressed(Key::Break)) if phase.polls_experimenter_keys() => {
                self.pending_break = true;
                true
            }
            (phase, KeyPressed(Key::Drift)) if phase.polls_experimenter_keys() => {
                self.pending_drift = true;
                true
            }

            (SessionPhase::Trials, KeyPressed(key @ (Key::Yes | Key::No)))
                if self.current_trial_state() == Some(TrialState::Probe) =>
            {
                self.record_response(key);
                true
            }

            (SessionPhase::Trials, FixationHeld) => {
                self.show_stimuli();
                true
            }

            (SessionPhase::Trials, StimuliElapsed) => {
                let probe = self
                    .current
                    .as_ref()
                    .and_then(|t| t.descriptor().probe_word.clone());
                match probe {
                    Some(word) => self.show_probe(&word),
                    None => self.start_iti(),
                }
                true
            }

            (SessionPhase::Trials, ResponseTimeout) => {
                debug!("no response before cutoff");
                self.start_iti();
                true
            }

            (SessionPhase::Trials, TrialComplete) => {
                self.complete_current_trial();
                true
            }

            (SessionPhase::DriftCorrect, DriftReady) => {
                let target = self.geometry.origin_centered_to_eyelink((0.0, 0.0));
                self.eye.drift_correct(target);
                self.queue_trigger(self.codes.drift_correct_end);
                self.resume_session();
                true
            }

            (SessionPhase::BlockBreak, KeyPressed(Key::Drift)) => {
                match self.break_step {
                    BreakStep::Rest => self.break_step = BreakStep::Ready,
                    BreakStep::Ready => self.begin_drift_correction(Resume::NextTrial),
                }
                true
            }

            (SessionPhase::ConfirmQuit, KeyPressed(key @ (Key::ConfirmYes | Key::ConfirmNo))) => {
                // Answers given before the prompt has been up for a second
                // are discarded.
                if self.timer.elapsed(self.phase_start) < Duration::from_secs(1) {
                    return false;
                }
                if key == Key::ConfirmYes {
                    info!(completed = self.records.len(), "session ended early");
                    self.current = None;
                    self.finish_session();
                } else {
                    self.resume_session();
                }
                true
            }

            (SessionPhase::Goodbye, KeyPressed(Key::Break) | GoodbyeTimeout) => {
                self.phase = SessionPhase::Finished;
                self.eye.shutdown();
                true
            }

            _ => false,
        }
    }

    /// Reports a presented frame: records its duration and sends the
    /// triggers for what it showed.
    pub fn frame_presented(&mut self, frame_time: Duration) {
        self.timer.record_frame(frame_time);
        if self.phase == SessionPhase::DriftCorrect {
            self.drift_shown = true;
        }
        for code in std::mem::take(&mut self.queued_triggers) {
            self.port.set_data(code);
            self.eye.trigger(code as i32);
            self.reset_port();
        }
    }

    pub fn current_screen(&self) -> Screen {
        match self.phase {
            SessionPhase::RefreshCheck | SessionPhase::Finished => Screen::Blank,
            SessionPhase::Instructions => self
                .instructions
                .get(self.instruction_line)
                .map_or(Screen::Blank, |line| Screen::Text(line.clone())),
            SessionPhase::Trials => match &self.current {
                None => Screen::Blank,
                Some(trial) => match trial.state {
                    TrialState::Fixation => Screen::Fixation,
                    TrialState::Stimuli => Screen::Stimuli {
                        stimuli: trial.descriptor().stimuli(),
                        positions: self.stim_positions,
                    },
                    TrialState::Probe => Screen::Text(
                        trial.descriptor().probe_word.clone().unwrap_or_default(),
                    ),
                    TrialState::InterTrial => Screen::Blank,
                },
            },
            SessionPhase::DriftCorrect => Screen::DriftFixation,
            SessionPhase::BlockBreak => match self.break_step {
                BreakStep::Rest => Screen::Text(REST_TEXT.to_string()),
                BreakStep::Ready => Screen::Text(READY_TEXT.to_string()),
            },
            SessionPhase::ConfirmQuit => Screen::Text(CONFIRM_TEXT.to_string()),
            SessionPhase::Goodbye => Screen::Text(GOODBYE_TEXT.to_string()),
        }
    }

    fn apply_refresh_check(&mut self) {
        let stats = self.timer.calibration_stats();
        info!(
            frame_ms = stats.average_frame_time_ns / 1_000_000.0,
            fps = stats.effective_fps,
            jitter_ms = stats.jitter_ns / 1_000_000.0,
            "measured display refresh"
        );
        let checked = match self.config.expected_refresh_hz {
            Some(hz) => check_refresh_rate(
                &stats,
                hz,
                Duration::from_secs_f64(self.config.refresh_tolerance_ms / 1000.0),
            ),
            None => Ok(()),
        };
        self.refresh_stats = Some(stats);
        match checked {
            Ok(()) => self.enter_instructions(),
            Err(e) => self.fail(e.into()),
        }
    }

    fn enter_instructions(&mut self) {
        self.phase = SessionPhase::Instructions;
        self.instruction_line = 0;
        if self.instructions.is_empty() {
            self.phase = SessionPhase::Trials;
            self.start_trial();
        }
    }

    fn start_trial(&mut self) {
        let Some(desc) = self.trials.get(self.trial_number).cloned() else {
            self.finish_session();
            return;
        };
        info!(
            trial = desc.index,
            left = %desc.stim_left,
            center = %desc.stim_center,
            right = %desc.stim_right,
            probe = ?desc.probe_word,
            "trial started"
        );
        self.pending_break = false;
        self.pending_drift = false;
        self.current = Some(RunningTrial::new(desc, self.timer.now()));
        self.queue_trigger(self.codes.fixation);
    }

    fn update_trial(&mut self, events: &mut Vec<ExperimentEvent>) {
        let now = self.timer.now();
        let Some(trial) = &self.current else {
            return;
        };
        let elapsed =
            |since: Option<u64>| Duration::from_nanos(now.saturating_sub(since.unwrap_or(now)));
        let state = trial.state;
        match state {
            TrialState::Fixation => {
                if elapsed(Some(trial.timestamps.fixation_start))
                    < Duration::from_nanos(secs_to_ns(self.config.fix_settle_s))
                {
                    return;
                }
                let hold = elapsed(Some(trial.timestamps.hold_start));
                let fix_dur = Duration::from_nanos(secs_to_ns(trial.descriptor().fix_dur));
                if self.experimenter_control(Resume::Fixation) {
                    return;
                }
                if self.gaze_on_fixation() {
                    if hold > fix_dur {
                        events.push(ExperimentEvent::FixationHeld);
                    }
                } else if let Some(trial) = &mut self.current {
                    trial.timestamps.hold_start = now;
                }
            }
            TrialState::Stimuli => {
                if elapsed(trial.timestamps.stimulus_start)
                    >= Duration::from_nanos(secs_to_ns(self.config.stim_dur_s))
                {
                    events.push(ExperimentEvent::StimuliElapsed);
                }
            }
            TrialState::Probe => {
                if elapsed(trial.timestamps.probe_start)
                    >= Duration::from_nanos(secs_to_ns(self.config.response_cutoff_s))
                {
                    events.push(ExperimentEvent::ResponseTimeout);
                }
            }
            TrialState::InterTrial => {
                if elapsed(trial.timestamps.iti_start)
                    >= Duration::from_nanos(secs_to_ns(self.config.iti_s))
                {
                    events.push(ExperimentEvent::TrialComplete);
                }
            }
        }
    }

    fn gaze_on_fixation(&mut self) -> bool {
        match self.eye.newest_gaze() {
            Some(gaze) => {
                let centered = self.geometry.origin_eyelink_to_centered(gaze);
                euclidean(centered, (0.0, 0.0)) <= self.fix_thresh_px
            }
            None => false,
        }
    }

    /// Acts on a pending break or drift key. Returns whether the session
    /// left the trial loop.
    fn experimenter_control(&mut self, resume: Resume) -> bool {
        if std::mem::take(&mut self.pending_break) {
            self.pending_drift = false;
            self.resume = resume;
            self.phase = SessionPhase::ConfirmQuit;
            self.phase_start = self.timer.now();
            return true;
        }
        if std::mem::take(&mut self.pending_drift) {
            self.begin_drift_correction(resume);
            return true;
        }
        false
    }

    fn begin_drift_correction(&mut self, resume: Resume) {
        self.resume = resume;
        self.phase = SessionPhase::DriftCorrect;
        self.drift_shown = false;
        self.queue_trigger(self.codes.drift_correct_start);
    }

    fn resume_session(&mut self) {
        self.phase = SessionPhase::Trials;
        match self.resume {
            Resume::Fixation => {
                let now = self.timer.now();
                if let Some(trial) = &mut self.current {
                    trial.timestamps.hold_start = now;
                }
            }
            Resume::AfterTrial => self.after_trial(),
            Resume::NextTrial => self.start_trial(),
        }
    }

    fn show_stimuli(&mut self) {
        let now = self.timer.now();
        if let Some(trial) = &mut self.current {
            trial.state = TrialState::Stimuli;
            trial.timestamps.stimulus_start = Some(now);
            trial.record.stim_onset = Some(now as f64 / 1e9);
            debug!(trial = trial.descriptor().index, "stimuli shown");
        }
        self.queue_trigger(self.codes.stimuli);
    }

    fn show_probe(&mut self, word: &str) {
        let now = self.timer.now();
        if let Some(trial) = &mut self.current {
            trial.state = TrialState::Probe;
            trial.timestamps.probe_start = Some(now);
        }
        debug!(word, "probe shown");
        self.queue_trigger(self.codes.probe);
    }

    fn start_iti(&mut self) {
        let now = self.timer.now();
        if let Some(trial) = &mut self.current {
            trial.state = TrialState::InterTrial;
            trial.timestamps.iti_start = Some(now);
        }
    }

    fn record_response(&mut self, key: Key) {
        let now = self.timer.now();
        if let Some(trial) = &mut self.current {
            let rt = now.saturating_sub(trial.timestamps.probe_start.unwrap_or(now)) as f64 / 1e9;
            info!(key = key.name(), rt, "response");
            trial.record.response = Some(Response {
                key: key.name().to_string(),
                rt,
            });
        }
        self.queue_trigger(self.codes.response);
        self.start_iti();
    }

    fn complete_current_trial(&mut self) {
        if let Some(trial) = self.current.take() {
            self.records.push(trial.record);
        }
        self.trial_number += 1;
        if self.experimenter_control(Resume::AfterTrial) {
            return;
        }
        self.after_trial();
    }

    /// Block break after every `block_length`-th trial index, then the next
    /// trial.
    fn after_trial(&mut self) {
        if self.trial_number >= self.trials.len() {
            self.finish_session();
            return;
        }
        let finished = self.trial_number - 1;
        if finished > 0 && finished % self.config.block_length == 0 {
            info!(trial = finished, "block break");
            self.phase = SessionPhase::BlockBreak;
            self.break_step = BreakStep::Rest;
            return;
        }
        self.start_trial();
    }

    fn finish_session(&mut self) {
        match save_results(&self.records, &self.config.log_dir, &self.stamp) {
            Ok(path) => self.saved = Some(path),
            Err(e) => {
                self.fail(e);
                return;
            }
        }
        self.phase = SessionPhase::Goodbye;
        self.phase_start = self.timer.now();
    }

    fn fail(&mut self, e: PresentationError) {
        error!("session aborted: {e}");
        self.failure = Some(e);
        self.phase = SessionPhase::Finished;
        self.eye.shutdown();
    }

    fn queue_trigger(&mut self, code: u8) {
        self.queued_triggers.push(code);
    }

    fn reset_port(&mut self) {
        let wait = Duration::from_millis(self.config.port_reset_ms);
        self.timer.sleep(wait);
        self.port.set_data(0);
        self.timer.sleep(wait);
    }

    pub fn current_trial_state(&self) -> Option<TrialState> {
        self.current.as_ref().map(|t| t.state)
    }

    pub fn records(&self) -> &[TrialRecord] {
        &self.records
    }

    pub fn trial_progress(&self) -> (usize, usize) {
        (self.trial_number, self.trials.len())
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_finished()
    }

    /// Path of the results log once it has been written.
    pub fn saved_path(&self) -> Option<&Path> {
        self.saved.as_deref()
    }

    pub fn take_failure(&mut self) -> Option<PresentationError> {
        self.failure.take()
    }

    pub fn eye(&self) -> &E {
        &self.eye
    }

    pub fn eye_mut(&mut self) -> &mut E {
        &mut self.eye
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn geometry(&self) -> &ScreenGeometry {
        &self.geometry
    }
}
