//! Maps eye-tracker fixations onto the MEG clock and labels them with the
//! stimulus they landed on.
//!
//! Both recordings carry the stimulus-onset trigger of every trial. Each
//! fixation is shifted by the clock offset measured at the onset of the
//! trial it belongs to, so the mapping is piecewise constant per trial.

use crate::behavior::BehaviorRow;
use crate::error::AnalysisError;
use crate::eyelink::EyelinkData;
use crate::signal::std_dev;
use presac_core::events::samples_with_code;
use presac_core::geometry::euclidean;
use presac_core::{
    ConfigError, Eye, ExptInfo, Fixation, MegEvent, Point, SLOTS, Slot, StimulusId, Trigger,
    triggers,
};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// How many earlier fixations the previous-stimulus search looks at.
pub const DEFAULT_LOOKBACK: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct AlignConfig {
    pub stim_code: i32,
    pub fix_on_code: i32,
    pub fix_off_code: i32,
    /// Analysed length of a trial, in eye-tracker samples
    pub trial_window: i64,
    /// Slot centers in eye-tracker coordinates
    pub stim_centers: [Point; 3],
    pub lookback: usize,
}

impl AlignConfig {
    pub fn from_expt_info(info: &ExptInfo) -> Result<Self, ConfigError> {
        Ok(Self {
            stim_code: info.code(triggers::STIMULI)?,
            fix_on_code: info.code(triggers::FIX_ON)?,
            fix_off_code: info.code(triggers::FIX_OFF)?,
            trial_window: info.trial_window_samples(),
            stim_centers: info.slot_centers_eyelink(),
            lookback: DEFAULT_LOOKBACK,
        })
    }
}

/// Decides whether a fixation counts as looking at its closest stimulus.
pub trait TargetClassifier {
    fn classify(&self, fixation: &Fixation, slot: Slot, dist_px: f64) -> Option<bool>;
}

/// Leaves every fixation unresolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unresolved;

impl TargetClassifier for Unresolved {
    fn classify(&self, _fixation: &Fixation, _slot: Slot, _dist_px: f64) -> Option<bool> {
        None
    }
}

/// On target when the gaze lies within `max_px` of the slot center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithinDistance {
    pub max_px: f64,
}

impl TargetClassifier for WithinDistance {
    fn classify(&self, _fixation: &Fixation, _slot: Slot, dist_px: f64) -> Option<bool> {
        Some(dist_px <= self.max_px)
    }
}

/// A fixation with everything derived from the other recordings. `None`
/// marks values that could not be determined.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFixation {
    pub fixation: Fixation,
    pub trial_number: Option<usize>,
    pub start_meg: Option<i64>,
    pub end_meg: Option<i64>,
    pub closest_loc: Option<Slot>,
    pub closest_stim: Option<StimulusId>,
    pub prev_stim: Option<StimulusId>,
    pub dist_to_stim: Option<f64>,
    pub on_target: Option<bool>,
}

impl AlignedFixation {
    fn unassigned(fixation: Fixation) -> Self {
        Self {
            fixation,
            trial_number: None,
            start_meg: None,
            end_meg: None,
            closest_loc: None,
            closest_stim: None,
            prev_stim: None,
            dist_to_stim: None,
            on_target: None,
        }
    }
}

/// Ratio of MEG to eye-tracker inter-onset intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftStats {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub fixations: Vec<AlignedFixation>,
    /// `fix_on` events for every mapped start, then `fix_off` events for
    /// every mapped end
    pub events: Vec<MegEvent>,
    pub drift: Option<DriftStats>,
}

/// Nearest slot center to `pos`; ties go to the lower slot index.
pub fn closest_slot(pos: Point, centers: &[Point; 3]) -> (Slot, f64) {
    let mut best = (SLOTS[0], euclidean(pos, centers[0]));
    for (&slot, &center) in SLOTS.iter().zip(centers).skip(1) {
        let d = euclidean(pos, center);
        if d < best.1 {
            best = (slot, d);
        }
    }
    best
}

/// Index of the latest onset at or before `start`, unless the fixation
/// outlasts that trial's window. `onsets` must be sorted.
pub fn assign_trial(onsets: &[i64], start: i64, end: i64, window: i64) -> Option<usize> {
    let trial = onsets.partition_point(|&o| o <= start).checked_sub(1)?;
    if end > onsets[trial] + window {
        return None;
    }
    Some(trial)
}

pub fn drift_stats(onsets_meg: &[i64], onsets_eye: &[i64]) -> Option<DriftStats> {
    let ratios: Vec<f64> = onsets_meg
        .windows(2)
        .zip(onsets_eye.windows(2))
        .filter(|(_, e)| e[1] != e[0])
        .map(|(m, e)| (m[1] - m[0]) as f64 / (e[1] - e[0]) as f64)
        .collect();
    if ratios.is_empty() {
        return None;
    }
    Some(DriftStats {
        mean: ratios.iter().sum::<f64>() / ratios.len() as f64,
        std: std_dev(&ratios),
    })
}

/// Stimulus fixated before a fixation on `current`, given the rows that
/// precede it in table order.
///
/// Walks back over at most `lookback` rows. A row not on target ends the
/// search with nothing; the first on-target row showing another stimulus
/// answers it. A run of `lookback` rows on the same stimulus, or the start
/// of the table, also gives nothing.
pub fn previous_stimulus(
    prior: &[AlignedFixation],
    current: &StimulusId,
    lookback: usize,
) -> Option<StimulusId> {
    for row in prior.iter().rev().take(lookback) {
        if row.on_target != Some(true) {
            return None;
        }
        if let Some(stim) = &row.closest_stim {
            if stim != current {
                return Some(stim.clone());
            }
        }
    }
    None
}

struct Onsets {
    meg: Vec<i64>,
    eye: Vec<i64>,
}

impl Onsets {
    fn extract(
        meg_events: &[MegEvent],
        eye: &EyelinkData,
        code: i32,
    ) -> Result<Self, AnalysisError> {
        let meg = samples_with_code(meg_events.iter().copied().map(Trigger::from), code);
        let eye = samples_with_code(eye.triggers.iter().copied(), code);
        if meg.len() != eye.len() {
            return Err(AnalysisError::TrialCountMismatch {
                meg: meg.len(),
                eye: eye.len(),
            });
        }
        if eye.windows(2).any(|w| w[1] < w[0]) {
            return Err(AnalysisError::Invalid(
                "eye-tracker stimulus onsets are not in time order".to_string(),
            ));
        }
        Ok(Self { meg, eye })
    }
}

fn label<C: TargetClassifier + ?Sized>(
    fixation: &Fixation,
    prior: &[AlignedFixation],
    onsets: &Onsets,
    behavior: &[BehaviorRow],
    config: &AlignConfig,
    classifier: &C,
) -> Result<AlignedFixation, AnalysisError> {
    let Some(trial) = assign_trial(&onsets.eye, fixation.start, fixation.end, config.trial_window)
    else {
        return Ok(AlignedFixation::unassigned(fixation.clone()));
    };
    let offset = onsets.eye[trial] - onsets.meg[trial];
    let shown = behavior.get(trial).ok_or(AnalysisError::MissingTrial(trial))?;

    let (slot, dist) = closest_slot(fixation.position(), &config.stim_centers);
    let stim = shown.stimulus(slot).clone();
    let on_target = classifier.classify(fixation, slot, dist);
    let prev_stim = previous_stimulus(prior, &stim, config.lookback);

    Ok(AlignedFixation {
        fixation: fixation.clone(),
        trial_number: Some(trial),
        start_meg: Some(fixation.start - offset),
        end_meg: Some(fixation.end - offset),
        closest_loc: Some(slot),
        closest_stim: Some(stim),
        prev_stim,
        dist_to_stim: Some(dist),
        on_target,
    })
}

/// MEG-clock events for the mapped fixations.
pub fn fixation_events(rows: &[AlignedFixation], config: &AlignConfig) -> Vec<MegEvent> {
    let starts = rows
        .iter()
        .filter_map(|r| r.start_meg)
        .map(|s| MegEvent::new(s, config.fix_on_code));
    let ends = rows
        .iter()
        .filter_map(|r| r.end_meg)
        .map(|s| MegEvent::new(s, config.fix_off_code));
    starts.chain(ends).collect()
}

/// Aligns every fixation in a single forward pass. Fails without output
/// when the two clocks disagree on the number of trials or a trial has no
/// behavioral row.
pub fn align<C: TargetClassifier + ?Sized>(
    meg_events: &[MegEvent],
    eye: &EyelinkData,
    behavior: &[BehaviorRow],
    config: &AlignConfig,
    classifier: &C,
) -> Result<Alignment, AnalysisError> {
    let onsets = Onsets::extract(meg_events, eye, config.stim_code)?;

    let drift = drift_stats(&onsets.meg, &onsets.eye);
    match drift {
        Some(d) => info!(mean = d.mean, std = d.std, "timing drift ratio"),
        None => warn!(trials = onsets.eye.len(), "too few trials to estimate clock drift"),
    }

    let mut rows: Vec<AlignedFixation> = Vec::with_capacity(eye.fixations.len());
    for fixation in &eye.fixations {
        let row = label(fixation, &rows, &onsets, behavior, config, classifier)?;
        rows.push(row);
    }

    let events = fixation_events(&rows, config);
    let assigned = rows.iter().filter(|r| r.trial_number.is_some()).count();
    info!(
        trials = onsets.eye.len(),
        fixations = rows.len(),
        assigned,
        events = events.len(),
        "aligned fixations"
    );
    debug!(unassigned = rows.len() - assigned, "fixations outside any trial window");

    Ok(Alignment {
        fixations: rows,
        events,
        drift,
    })
}

#[derive(Serialize)]
struct FixationRow<'a> {
    eye_side: Eye,
    start: i64,
    end: i64,
    dur: i64,
    x_avg: f64,
    y_avg: f64,
    pupil: i64,
    trial_number: Option<usize>,
    start_meg: Option<i64>,
    end_meg: Option<i64>,
    /// Slot index, 0 is left
    closest_loc: Option<usize>,
    closest_stim: Option<&'a str>,
    prev_stim: Option<&'a str>,
    dist_to_stim: Option<f64>,
    on_target: Option<bool>,
}

impl<'a> From<&'a AlignedFixation> for FixationRow<'a> {
    fn from(r: &'a AlignedFixation) -> Self {
        let f = &r.fixation;
        FixationRow {
            eye_side: f.eye,
            start: f.start,
            end: f.end,
            dur: f.duration,
            x_avg: f.x_avg,
            y_avg: f.y_avg,
            pupil: f.pupil,
            trial_number: r.trial_number,
            start_meg: r.start_meg,
            end_meg: r.end_meg,
            closest_loc: r.closest_loc.map(Slot::index),
            closest_stim: r.closest_stim.as_ref().map(StimulusId::as_str),
            prev_stim: r.prev_stim.as_ref().map(StimulusId::as_str),
            dist_to_stim: r.dist_to_stim,
            on_target: r.on_target,
        }
    }
}

/// Writes the fixation table as CSV; undetermined values are empty cells.
pub fn write_fixation_table<W: Write>(
    rows: &[AlignedFixation],
    writer: W,
) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(FixationRow::from(row))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_fixation_table<P: AsRef<Path>>(
    rows: &[AlignedFixation],
    path: P,
) -> Result<(), AnalysisError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| AnalysisError::io(path, e))?;
    write_fixation_table(rows, file)?;
    Ok(())
}
