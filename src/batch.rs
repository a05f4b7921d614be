//! Batch Partitioner ("Split Constraints")
//!
//! Greedy first-fit graph coloring over constraint pairs. The output is a
//! [`ParallelGroup`]: an ordered list of phases, each phase holding up to a
//! task-count-bounded number of batches. Within one phase no two batches
//! share a dynamic body, which is the sole invariant licensing lock-free
//! concurrent writes to the shared solver-body array — phases are separated
//! by a full barrier, batches inside a phase run in parallel.
//!
//! The partitioner walks the pair list with a per-body "claimed by batch"
//! table (reset every phase) and a per-pair "already assigned" bitset
//! (persistent across phases). Pairs whose endpoints are claimed by a
//! *different* batch of the current phase are deferred to a later phase;
//! inactive or fully-static pairs are marked resolved immediately without
//! consuming batch capacity. Static endpoints and world anchors never
//! conflict and are never claimed.
//!
//! Termination does not depend on conflict density: each phase assigns at
//! least the first unassigned pair, so a fully connected conflict graph
//! simply degrades to little parallelism, never to an infinite loop.
//!
//! Author: Moroya Sakamoto

use crate::pair::ConstraintPair;

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Lower bound on the per-batch pair target; keeps per-batch dispatch
/// overhead amortized over enough rows.
pub const MIN_BATCH_PAIRS: u32 = 16;

/// Upper bound on the per-batch pair target; keeps batches small enough
/// that all worker tasks stay busy.
pub const MAX_BATCH_PAIRS: u32 = 64;

/// Hard cap on batches per phase.
pub const MAX_SOLVER_BATCHES: usize = 16;

/// "Unclaimed" marker in the per-body claim table.
const FREE_BODY: u16 = u16::MAX;

// ============================================================================
// Group / batch storage
// ============================================================================

/// One conflict-free batch: pair indices processed sequentially by a single
/// worker task.
#[derive(Clone, Debug, Default)]
pub struct ParallelBatch {
    pairs: Vec<u32>,
}

impl ParallelBatch {
    /// Indices into the pair array this batch owns.
    #[inline]
    pub fn pair_indices(&self) -> &[u32] {
        &self.pairs
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Partitioned schedule for one constraint list: phases of parallel-safe
/// batches.
#[derive(Clone, Debug, Default)]
pub struct ParallelGroup {
    phases: Vec<Vec<ParallelBatch>>,
}

impl ParallelGroup {
    #[inline]
    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }

    /// Batches of one phase; all of them may execute concurrently.
    #[inline]
    pub fn batches(&self, phase: usize) -> &[ParallelBatch] {
        &self.phases[phase]
    }

    /// Iterate phases in execution order.
    #[inline]
    pub fn phases(&self) -> impl Iterator<Item = &[ParallelBatch]> {
        self.phases.iter().map(Vec::as_slice)
    }

    /// Total batches across all phases.
    pub fn num_batches(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    /// Total pairs scheduled across all phases.
    pub fn num_pairs(&self) -> usize {
        self.phases
            .iter()
            .flat_map(|phase| phase.iter())
            .map(ParallelBatch::len)
            .sum()
    }

    fn clear(&mut self) {
        self.phases.clear();
    }
}

// ============================================================================
// Split scratch
// ============================================================================

/// Reused partitioner working memory: the per-body claim table and the
/// per-pair assigned bitset. Reset (not freed) between solves.
#[derive(Debug, Default)]
pub struct SplitScratch {
    body_table: Vec<u16>,
    assigned: Vec<u64>,
}

impl SplitScratch {
    fn reset(&mut self, num_bodies: usize, num_pairs: usize) {
        self.body_table.clear();
        self.body_table.resize(num_bodies, FREE_BODY);
        self.assigned.clear();
        self.assigned.resize(num_pairs.div_ceil(64), 0);
    }

    #[inline]
    fn is_assigned(&self, pair: usize) -> bool {
        self.assigned[pair >> 6] & (1u64 << (pair & 63)) != 0
    }

    #[inline]
    fn mark_assigned(&mut self, pair: usize) {
        self.assigned[pair >> 6] |= 1u64 << (pair & 63);
    }
}

// ============================================================================
// Split constraints
// ============================================================================

/// Partition `pairs` into conflict-free batches grouped by phase.
///
/// `num_tasks` bounds the batches per phase and biases the per-batch pair
/// target (`num_pairs / (2 * num_tasks)`, clamped to
/// `[MIN_BATCH_PAIRS, MAX_BATCH_PAIRS]`) toward keeping every worker busy.
/// Runs until every pair is assigned; inactive and fully-static pairs are
/// resolved in place without occupying a batch slot.
pub fn split_constraints(
    pairs: &[ConstraintPair],
    num_bodies: usize,
    num_tasks: usize,
    scratch: &mut SplitScratch,
    group: &mut ParallelGroup,
) {
    debug_assert!(num_tasks >= 1);

    group.clear();
    let num_pairs = pairs.len();
    if num_pairs == 0 {
        return;
    }

    scratch.reset(num_bodies, num_pairs);

    let target_count =
        ((num_pairs as u32) / (2 * num_tasks as u32)).clamp(MIN_BATCH_PAIRS, MAX_BATCH_PAIRS);
    let max_batches = num_tasks.min(MAX_SOLVER_BATCHES);

    // First index not yet known to be assigned; each phase resumes here
    // instead of rescanning from zero.
    let mut start_index = 0usize;
    let mut total_count = 0usize;

    while total_count < num_pairs {
        let mut start_index_check = true;
        scratch.body_table.fill(FREE_BODY);

        let mut phase: Vec<ParallelBatch> = Vec::new();
        let mut i = start_index;
        let mut batch_id: u16 = 0;

        while i < num_pairs && total_count < num_pairs && (batch_id as usize) < max_batches {
            let mut batch = ParallelBatch::default();
            let mut pair_count: u32 = 0;

            while i < num_pairs && pair_count < target_count {
                let idx = i;
                i += 1;

                if scratch.is_assigned(idx) {
                    continue;
                }

                let pair = &pairs[idx];

                // Inactive or fully-static pairs are auto-resolved: no batch
                // slot, no body claims.
                if !pair.is_solvable() {
                    if start_index_check {
                        start_index += 1;
                    }
                    scratch.mark_assigned(idx);
                    total_count += 1;
                    continue;
                }

                // Dependency check: a dynamic endpoint claimed by a
                // different batch of this phase defers the pair.
                let conflict_a = pair.dynamic_a() && {
                    let claimed = scratch.body_table[pair.body_a as usize];
                    claimed != FREE_BODY && claimed != batch_id
                };
                let conflict_b = pair.dynamic_b() && {
                    let claimed = scratch.body_table[pair.body_b as usize];
                    claimed != FREE_BODY && claimed != batch_id
                };
                if conflict_a || conflict_b {
                    start_index_check = false;
                    continue;
                }

                // Claim the dynamic endpoints for this batch.
                if pair.dynamic_a() {
                    scratch.body_table[pair.body_a as usize] = batch_id;
                }
                if pair.dynamic_b() {
                    scratch.body_table[pair.body_b as usize] = batch_id;
                }

                if start_index_check {
                    start_index += 1;
                }
                scratch.mark_assigned(idx);
                batch.pairs.push(idx as u32);
                pair_count += 1;
            }

            total_count += pair_count as usize;
            if !batch.is_empty() {
                phase.push(batch);
            }
            batch_id += 1;
        }

        if !phase.is_empty() {
            group.phases.push(phase);
        }
    }
}
