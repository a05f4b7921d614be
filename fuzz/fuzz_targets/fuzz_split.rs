#![no_main]
use alice_solver::{
    split_constraints, ConstraintPair, ParallelGroup, SplitScratch, MOTION_MASK_DYNAMIC,
    MOTION_MASK_STATIC,
};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzPair {
    body_a: u16,
    body_b: u16,
    static_a: bool,
    static_b: bool,
    active: bool,
    rows: u8,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    num_bodies: u16,
    num_tasks: u8,
    pairs: Vec<FuzzPair>,
}

// Fuzz the batch partitioner: arbitrary pair graphs must always produce a
// complete, phase-disjoint schedule — and never panic.
fuzz_target!(|input: FuzzInput| {
    let num_bodies = (input.num_bodies as usize % 512).max(1);
    let num_tasks = (input.num_tasks as usize % 16).max(1);

    let pairs: Vec<ConstraintPair> = input
        .pairs
        .iter()
        .take(2048)
        .enumerate()
        .map(|(i, p)| ConstraintPair {
            body_a: (p.body_a as usize % num_bodies) as u32,
            body_b: (p.body_b as usize % num_bodies) as u32,
            payload: i as u32,
            row_start: (i * 3) as u32,
            row_count: (p.rows % 4) as u16 * 3,
            motion_a: if p.static_a {
                MOTION_MASK_STATIC
            } else {
                MOTION_MASK_DYNAMIC
            },
            motion_b: if p.static_b {
                MOTION_MASK_STATIC
            } else {
                MOTION_MASK_DYNAMIC
            },
            active: p.active,
            friction: 0.5,
        })
        .collect();

    let mut scratch = SplitScratch::default();
    let mut group = ParallelGroup::default();
    split_constraints(&pairs, num_bodies, num_tasks, &mut scratch, &mut group);

    // Completeness: every solvable pair exactly once, nothing else at all.
    let mut seen = vec![0u32; pairs.len()];
    for phase_idx in 0..group.num_phases() {
        let mut owner = vec![u32::MAX; num_bodies];
        for (batch_idx, batch) in group.batches(phase_idx).iter().enumerate() {
            for &pair_idx in batch.pair_indices() {
                seen[pair_idx as usize] += 1;
                let pair = &pairs[pair_idx as usize];
                for (dynamic, body) in [
                    (pair.dynamic_a(), pair.body_a),
                    (pair.dynamic_b(), pair.body_b),
                ] {
                    if dynamic {
                        let slot = &mut owner[body as usize];
                        assert!(*slot == u32::MAX || *slot == batch_idx as u32);
                        *slot = batch_idx as u32;
                    }
                }
            }
        }
    }
    for (pair, count) in pairs.iter().zip(&seen) {
        assert_eq!(*count, u32::from(pair.is_solvable()));
    }
});
