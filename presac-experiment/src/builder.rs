//! Randomized trial order without repeated images inside a trial.
//!
//! Each repetition block shuffles a copy of the stimulus pool independently
//! for every slot, so every image is shown once per slot before any image
//! repeats. Trials that end up showing an image twice are repaired by swapping
//! with the neighbouring trial until no duplicates remain.

use crate::config::ExperimentConfig;
use crate::error::TrialBuildError;
use presac_core::{StimulusId, TrialDescriptor};
use rand::Rng;
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::HashSet;
use tracing::{debug, info};

/// One shuffled copy of the pool per slot (left, center, right).
pub type SlotColumns = [Vec<StimulusId>; 3];

/// Indices of trials that show the same image in more than one slot.
pub fn duplicate_indices(columns: &SlotColumns) -> Vec<usize> {
    let [left, center, right] = columns;
    (0..left.len())
        .filter(|&i| left[i] == center[i] || left[i] == right[i] || center[i] == right[i])
        .collect()
}

/// Repairs duplicates in place by swapping with the previous trial. The
/// predecessor of the first trial is the last one.
///
/// Returns the number of repair rounds that were needed.
pub fn fix_duplicates(columns: &mut SlotColumns, max_rounds: usize) -> Result<usize, usize> {
    let mut rounds = 0;
    loop {
        let dups = duplicate_indices(columns);
        if dups.is_empty() {
            return Ok(rounds);
        }
        if rounds == max_rounds {
            return Err(rounds);
        }
        debug!(duplicates = dups.len(), round = rounds, "fixing duplicated trials");
        repair_round(columns, &dups);
        rounds += 1;
    }
}

/// One repair pass over the given duplicate indices: a duplicated left image
/// is swapped with the previous trial's left image, otherwise the center
/// images are swapped.
pub fn repair_round(columns: &mut SlotColumns, dups: &[usize]) {
    let len = columns[0].len();
    let [left, center, right] = columns;
    for &inx in dups {
        let prev = if inx == 0 { len - 1 } else { inx - 1 };
        if left[inx] == center[inx] || left[inx] == right[inx] {
            left.swap(prev, inx);
        } else {
            center.swap(prev, inx);
        }
    }
}

/// Builds the full trial list for a session.
pub fn build_trials<R: Rng + ?Sized>(
    pool: &[StimulusId],
    probe_words: &[String],
    config: &ExperimentConfig,
    rng: &mut R,
) -> Result<Vec<TrialDescriptor>, TrialBuildError> {
    let distinct: HashSet<&StimulusId> = pool.iter().collect();
    if distinct.len() < 3 {
        return Err(TrialBuildError::TooFewStimuli(distinct.len()));
    }
    if distinct.len() < pool.len() {
        let mut seen = HashSet::new();
        if let Some(repeated) = pool.iter().find(|id| !seen.insert(*id)) {
            return Err(TrialBuildError::DuplicateStimulus(repeated.to_string()));
        }
    }
    if config.p_probe > 0.0 && probe_words.is_empty() {
        return Err(TrialBuildError::NoProbeWords(config.p_probe));
    }

    let mut by_slot: SlotColumns = Default::default();
    for repetition in 0..config.n_reps_per_loc {
        let mut block: SlotColumns = Default::default();
        for column in block.iter_mut() {
            *column = pool.to_vec();
            column.shuffle(rng);
        }
        fix_duplicates(&mut block, config.max_shuffle_iter).map_err(|rounds| {
            TrialBuildError::ShuffleExhausted { repetition, rounds }
        })?;
        for (all, part) in by_slot.iter_mut().zip(block) {
            all.extend(part);
        }
    }

    let (fix_lo, fix_hi) = config.fix_dur_range_s;
    let [left, center, right] = by_slot;
    let trials: Vec<TrialDescriptor> = left
        .into_iter()
        .zip(center)
        .zip(right)
        .enumerate()
        .map(|(index, ((stim_left, stim_center), stim_right))| {
            let probe_word = if rng.random_bool(config.p_probe) {
                probe_words.choose(rng).cloned()
            } else {
                None
            };
            TrialDescriptor {
                index,
                stim_left,
                stim_center,
                stim_right,
                probe_word,
                fix_dur: rng.random_range(fix_lo..=fix_hi),
            }
        })
        .collect();

    info!(
        trials = trials.len(),
        probes = trials.iter().filter(|t| t.probe_word.is_some()).count(),
        "built trial list"
    );
    Ok(trials)
}
