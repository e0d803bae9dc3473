use presac_core::{SLOTS, StimulusId};
use presac_experiment::builder::{duplicate_indices, fix_duplicates};
use presac_experiment::{ExperimentConfig, build_trials};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};

fn pool(n: usize) -> Vec<StimulusId> {
    (0..n).map(|i| StimulusId::new(&format!("img{i:02}"))).collect()
}

fn sorted(mut v: Vec<StimulusId>) -> Vec<StimulusId> {
    v.sort();
    v
}

proptest! {
    #[test]
    fn trials_never_show_an_image_twice(
        n_images in 6usize..24,
        reps in 1usize..4,
        seed in any::<u64>(),
    ) {
        let pool = pool(n_images);
        let config = ExperimentConfig { n_reps_per_loc: reps, ..ExperimentConfig::default() };
        let words = vec!["lamp".to_string(), "tree".to_string()];
        let mut rng = StdRng::seed_from_u64(seed);
        // Exhausting the repair rounds is a legitimate, reported outcome.
        if let Ok(trials) = build_trials(&pool, &words, &config, &mut rng) {
            prop_assert_eq!(trials.len(), n_images * reps);
            for t in &trials {
                prop_assert!(!t.has_duplicate());
            }
            for slot in SLOTS {
                let mut counts: HashMap<&StimulusId, usize> = HashMap::new();
                for t in &trials {
                    *counts.entry(t.stimulus(slot)).or_default() += 1;
                }
                prop_assert_eq!(counts.len(), n_images);
                prop_assert!(counts.values().all(|&c| c == reps));

                // every image once per slot before any repeats
                for block in trials.chunks(n_images) {
                    let seen: HashSet<&StimulusId> = block.iter().map(|t| t.stimulus(slot)).collect();
                    prop_assert_eq!(seen.len(), n_images);
                }
            }
        }
    }

    #[test]
    fn repair_only_reorders_within_a_slot(n_images in 3usize..16, seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut columns: [Vec<StimulusId>; 3] = Default::default();
        for column in columns.iter_mut() {
            *column = pool(n_images);
            column.shuffle(&mut rng);
        }
        let before = columns.clone();
        match fix_duplicates(&mut columns, 100) {
            Ok(_) => prop_assert!(duplicate_indices(&columns).is_empty()),
            Err(rounds) => prop_assert_eq!(rounds, 100),
        }
        for (after, before) in columns.iter().zip(before) {
            prop_assert_eq!(sorted(after.clone()), sorted(before));
        }
    }
}
