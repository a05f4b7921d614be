//! Parallel Solve Driver
//!
//! [`ParallelSolver`] owns the per-step pipeline: build solver bodies,
//! convert manifolds and joints into constraint pairs and rows, partition
//! each pair list into conflict-free batches, run the Gauss-Seidel sweeps,
//! and fold the accumulated velocity deltas back into the caller's bodies.
//!
//! # Concurrency contract
//!
//! - Setup completes fully before any solve sweep begins.
//! - Within a sweep, phases execute strictly in order with a full barrier
//!   between them (the fork-join scope boundary). The barrier is
//!   correctness, not a performance knob: solver-body writes from phase N
//!   must be visible to phase N+1, and the partitioner's no-conflict
//!   guarantee only holds inside a single phase.
//! - Batches within a phase run on independent worker tasks in unspecified
//!   order; rows within a batch are resolved sequentially by that batch's
//!   worker. Convergence (not correctness) can therefore vary with the
//!   partition — never with worker scheduling, because batch-to-body
//!   assignments are fixed before the sweep starts.
//!
//! The shared solver-body array is written lock-free. The only
//! synchronization in the crate is the atomic cursor with which setup
//! workers claim contiguous pair ranges; it is never held across the
//! per-constraint computation.
//!
//! Author: Moroya Sakamoto

use crate::batch::{split_constraints, ParallelBatch, ParallelGroup, SplitScratch};
use crate::body::{build_solver_bodies, RigidBodyState, SolverBody, WORLD_BODY};
use crate::config::{SolverConfig, StepParams};
use crate::constraint::{
    effective_mass_denom, setup_contact_point, solve_contact_point, ConstraintRow,
    ContactManifold, ROWS_PER_CONTACT_POINT,
};
use crate::error::SolverError;
use crate::joint::{Joint, JointContext};
use crate::math::{sqrtf, EFFECTIVE_MASS_EPSILON};
use crate::pair::ConstraintPair;
use crate::profiling::{measure, SolverProfiler, Stage};

#[cfg(not(feature = "std"))]
use alloc::boxed::Box;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

#[cfg(feature = "parallel")]
use core::sync::atomic::{AtomicUsize, Ordering};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Setup work-stealing chunk cap (pairs claimed per cursor advance).
#[cfg(feature = "parallel")]
const MAX_SETUP_CHUNK: usize = 64;

// ============================================================================
// Shared-slice view for lock-free batch access
// ============================================================================

/// Raw view over a slice shared by the workers of one phase.
///
/// The partitioner guarantees that batches running concurrently touch
/// disjoint dynamic body indices and disjoint row ranges, which is the sole
/// justification for handing out `&mut` through this view. Every access
/// site carries its own SAFETY argument.
struct SharedSlice<T> {
    ptr: *mut T,
    len: usize,
}

impl<T> Clone for SharedSlice<T> {
    fn clone(&self) -> Self {
        Self {
            ptr: self.ptr,
            len: self.len,
        }
    }
}

impl<T> Copy for SharedSlice<T> {}

// SAFETY: the view only exists inside a fork-join scope whose workers are
// handed disjoint index sets; see the access sites.
unsafe impl<T: Send> Send for SharedSlice<T> {}
unsafe impl<T: Send> Sync for SharedSlice<T> {}

impl<T> SharedSlice<T> {
    fn new(slice: &mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
        }
    }

    /// # Safety
    /// No other live reference to element `index` may exist.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn get_mut(&self, index: usize) -> &mut T {
        debug_assert!(index < self.len);
        &mut *self.ptr.add(index)
    }

    /// # Safety
    /// No other live reference overlapping `range` may exist.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn slice_mut(&self, range: core::ops::Range<usize>) -> &mut [T] {
        debug_assert!(range.end <= self.len);
        core::slice::from_raw_parts_mut(self.ptr.add(range.start), range.len())
    }
}

// ============================================================================
// Solve statistics
// ============================================================================

/// Scheduling and workload counters for one solve call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolveStats {
    /// Contact pairs converted from manifolds (including inactive ones).
    pub contact_pairs: usize,
    /// Joint pairs converted.
    pub joint_pairs: usize,
    /// Total constraint rows set up.
    pub rows: usize,
    /// Phases in the contact schedule.
    pub contact_phases: usize,
    /// Phases in the joint schedule.
    pub joint_phases: usize,
    /// Batches in the contact schedule.
    pub contact_batches: usize,
    /// Batches in the joint schedule.
    pub joint_batches: usize,
    /// Gauss-Seidel sweeps executed (`iterations + 1`).
    pub sweeps: u32,
}

// ============================================================================
// Step scratch
// ============================================================================

/// Step-scoped working memory, reset (not freed) between solves so steady
/// state allocates nothing. Worst case: one solver body per rigid body,
/// three rows per contact point plus the caller-declared joint rows, one
/// pair per manifold/joint.
#[derive(Default)]
struct SolveScratch {
    solver_bodies: Vec<SolverBody>,
    rows: Vec<ConstraintRow>,
    contact_pairs: Vec<ConstraintPair>,
    joint_pairs: Vec<ConstraintPair>,
    contact_group: ParallelGroup,
    joint_group: ParallelGroup,
    split: SplitScratch,
}

/// Which pair list a sweep pass is processing; contacts get the
/// warm-start seed at sweep 0 and per-iteration friction re-bounding.
#[derive(Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Joint,
    Contact,
}

// ============================================================================
// Parallel solver
// ============================================================================

/// Parallel sequential-impulse constraint solver.
///
/// Each instance owns its scratch memory and profiler, so independent
/// instances never share state. The task count is fixed at construction.
pub struct ParallelSolver {
    config: SolverConfig,
    scratch: SolveScratch,
    profiler: SolverProfiler,
}

impl ParallelSolver {
    /// Create a solver with the given configuration.
    pub fn new(config: SolverConfig) -> Result<Self, SolverError> {
        config.validate()?;
        Ok(Self {
            config,
            scratch: SolveScratch::default(),
            profiler: SolverProfiler::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Stage counters accumulated across solve calls.
    #[inline]
    pub fn profiler(&self) -> &SolverProfiler {
        &self.profiler
    }

    /// Solve one step: compute corrective impulses for all contacts and
    /// joints and write the resulting velocities back into `bodies`.
    ///
    /// Positions and orientations are not touched — transform integration
    /// is the caller's job.
    pub fn solve(
        &mut self,
        bodies: &mut [RigidBodyState],
        manifolds: &[ContactManifold],
        joints: &[Box<dyn Joint>],
        params: &StepParams,
    ) -> Result<SolveStats, SolverError> {
        params.validate()?;
        validate_indices(bodies.len(), manifolds, joints)?;

        let num_tasks = self.config.num_tasks;
        let scratch = &mut self.scratch;

        let ((), setup_ticks) = measure(|| {
            build_solver_bodies(bodies, &mut scratch.solver_bodies);
            scratch.rows.clear();
            convert_manifolds(scratch, bodies, manifolds);
            convert_joints(scratch, bodies, joints, params);
            setup_contact_rows(scratch, bodies, manifolds, params, num_tasks);
        });
        self.profiler.record(Stage::Setup, setup_ticks);

        let ((), split_ticks) = measure(|| {
            let num_bodies = bodies.len();
            split_constraints(
                &scratch.joint_pairs,
                num_bodies,
                num_tasks,
                &mut scratch.split,
                &mut scratch.joint_group,
            );
            split_constraints(
                &scratch.contact_pairs,
                num_bodies,
                num_tasks,
                &mut scratch.split,
                &mut scratch.contact_group,
            );
        });
        self.profiler.record(Stage::Split, split_ticks);

        let ((), solve_ticks) = measure(|| solve_group(scratch, params, num_tasks));
        self.profiler.record(Stage::Solve, solve_ticks);

        let ((), integrate_ticks) = measure(|| integrate(bodies, &scratch.solver_bodies, num_tasks));
        self.profiler.record(Stage::Integrate, integrate_ticks);

        Ok(SolveStats {
            contact_pairs: scratch.contact_pairs.len(),
            joint_pairs: scratch.joint_pairs.len(),
            rows: scratch.rows.len(),
            contact_phases: scratch.contact_group.num_phases(),
            joint_phases: scratch.joint_group.num_phases(),
            contact_batches: scratch.contact_group.num_batches(),
            joint_batches: scratch.joint_group.num_batches(),
            sweeps: params.iterations + 1,
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_indices(
    num_bodies: usize,
    manifolds: &[ContactManifold],
    joints: &[Box<dyn Joint>],
) -> Result<(), SolverError> {
    for manifold in manifolds {
        for index in [manifold.body_a, manifold.body_b] {
            if index as usize >= num_bodies {
                return Err(SolverError::InvalidBodyIndex {
                    index: index as usize,
                    count: num_bodies,
                });
            }
        }
        if manifold.body_a == manifold.body_b {
            return Err(SolverError::InvalidConstraint {
                reason: "manifold links a body to itself",
            });
        }
    }
    for joint in joints {
        for index in [joint.body_a(), joint.body_b()] {
            if index != WORLD_BODY && index as usize >= num_bodies {
                return Err(SolverError::InvalidBodyIndex {
                    index: index as usize,
                    count: num_bodies,
                });
            }
        }
        if joint.body_a() == joint.body_b() && joint.body_a() != WORLD_BODY {
            return Err(SolverError::InvalidConstraint {
                reason: "joint links a body to itself",
            });
        }
        if joint.row_count() > u16::MAX as usize {
            return Err(SolverError::CapacityExceeded {
                resource: "joint rows",
                limit: u16::MAX as usize,
            });
        }
    }
    Ok(())
}

// ============================================================================
// Conversion: manifolds / joints -> pairs + rows
// ============================================================================

fn convert_manifolds(
    scratch: &mut SolveScratch,
    states: &[RigidBodyState],
    manifolds: &[ContactManifold],
) {
    scratch.contact_pairs.clear();

    for (index, manifold) in manifolds.iter().enumerate() {
        let state_a = &states[manifold.body_a as usize];
        let state_b = &states[manifold.body_b as usize];
        if !state_a.is_dynamic() && !state_b.is_dynamic() {
            continue;
        }

        let num_points = manifold.num_points();
        let row_count = num_points * ROWS_PER_CONTACT_POINT;
        let row_start = scratch.rows.len();
        scratch
            .rows
            .extend(core::iter::repeat(ConstraintRow::INERT).take(row_count));

        scratch.contact_pairs.push(ConstraintPair {
            body_a: manifold.body_a,
            body_b: manifold.body_b,
            payload: index as u32,
            row_start: row_start as u32,
            row_count: row_count as u16,
            motion_a: state_a.motion.mask(),
            motion_b: state_b.motion.mask(),
            active: num_points > 0,
            friction: sqrtf(state_a.friction * state_b.friction),
        });
    }
}

fn convert_joints(
    scratch: &mut SolveScratch,
    states: &[RigidBodyState],
    joints: &[Box<dyn Joint>],
    params: &StepParams,
) {
    scratch.joint_pairs.clear();

    for (index, joint) in joints.iter().enumerate() {
        let row_count = joint.row_count();
        if row_count == 0 {
            continue;
        }

        let id_a = joint.body_a();
        let id_b = joint.body_b();
        let (state_a, body_a, mask_a) = joint_endpoint(states, &scratch.solver_bodies, id_a);
        let (state_b, body_b, mask_b) = joint_endpoint(states, &scratch.solver_bodies, id_b);

        let row_start = scratch.rows.len();
        scratch.rows.extend(
            core::iter::repeat(ConstraintRow {
                cfm: params.cfm,
                lower_limit: f32::NEG_INFINITY,
                upper_limit: f32::INFINITY,
                ..ConstraintRow::INERT
            })
            .take(row_count),
        );

        let ctx = JointContext {
            state_a,
            state_b,
            body_a,
            body_b,
            params,
        };
        let rows = &mut scratch.rows[row_start..row_start + row_count];
        joint.init_rows(rows, &ctx);

        // Finalize: effective mass and impulse-scaled rhs, exactly once for
        // every joint row regardless of the joint type.
        for row in rows.iter_mut() {
            let denom =
                effective_mass_denom(body_a, body_b, row.direction, row.angular_a, row.angular_b);
            if denom < EFFECTIVE_MASS_EPSILON {
                *row = ConstraintRow::INERT;
            } else {
                row.jac_diag_inv = 1.0 / denom;
                row.rhs *= row.jac_diag_inv;
                row.accum_impulse = 0.0;
            }
        }

        scratch.joint_pairs.push(ConstraintPair {
            body_a: id_a,
            body_b: id_b,
            payload: index as u32,
            row_start: row_start as u32,
            row_count: row_count as u16,
            motion_a: mask_a,
            motion_b: mask_b,
            active: true,
            friction: 0.0,
        });
    }
}

fn joint_endpoint<'a>(
    states: &'a [RigidBodyState],
    solver_bodies: &'a [SolverBody],
    id: u32,
) -> (Option<&'a RigidBodyState>, &'a SolverBody, u8) {
    if id == WORLD_BODY {
        (None, &SolverBody::FIXED, crate::body::MOTION_MASK_STATIC)
    } else {
        let state = &states[id as usize];
        (
            Some(state),
            &solver_bodies[id as usize],
            state.motion.mask(),
        )
    }
}

// ============================================================================
// Contact row setup (work-stealing parallel)
// ============================================================================

fn setup_contact_pair(
    pair: &ConstraintPair,
    rows: &mut [ConstraintRow],
    states: &[RigidBodyState],
    solver_bodies: &[SolverBody],
    manifolds: &[ContactManifold],
    params: &StepParams,
) {
    let state_a = &states[pair.body_a as usize];
    let state_b = &states[pair.body_b as usize];
    let body_a = &solver_bodies[pair.body_a as usize];
    let body_b = &solver_bodies[pair.body_b as usize];
    let manifold = &manifolds[pair.payload as usize];
    let restitution = 0.5 * (state_a.restitution + state_b.restitution);

    for (point, point_rows) in manifold
        .points()
        .iter()
        .zip(rows.chunks_exact_mut(ROWS_PER_CONTACT_POINT))
    {
        setup_contact_point(
            point_rows,
            point,
            state_a,
            state_b,
            body_a,
            body_b,
            restitution,
            params.separate_bias,
            params.time_step,
        );
    }
}

fn setup_contact_rows(
    scratch: &mut SolveScratch,
    states: &[RigidBodyState],
    manifolds: &[ContactManifold],
    params: &StepParams,
    num_tasks: usize,
) {
    let pairs = &scratch.contact_pairs;
    let solver_bodies = &scratch.solver_bodies;

    #[cfg(feature = "parallel")]
    if num_tasks > 1 && !pairs.is_empty() {
        // Work-stealing setup: workers atomically claim contiguous pair
        // ranges. The cursor advance is the only shared mutable access and
        // is never held during the per-constraint computation.
        let chunk = pairs
            .len()
            .div_ceil(num_tasks * 4)
            .clamp(1, MAX_SETUP_CHUNK);
        let cursor = AtomicUsize::new(0);
        let rows_view = SharedSlice::new(&mut scratch.rows);
        rayon::scope(|scope| {
            for _ in 0..num_tasks {
                let cursor = &cursor;
                scope.spawn(move |_| loop {
                    let start = cursor.fetch_add(chunk, Ordering::Relaxed);
                    if start >= pairs.len() {
                        break;
                    }
                    let end = (start + chunk).min(pairs.len());
                    for pair in &pairs[start..end] {
                        if !pair.is_solvable() {
                            continue;
                        }
                        // SAFETY: the cursor hands out disjoint pair ranges
                        // and pair row ranges never overlap, so this worker
                        // is the only one touching these rows.
                        let rows = unsafe { rows_view.slice_mut(pair.row_range()) };
                        setup_contact_pair(pair, rows, states, solver_bodies, manifolds, params);
                    }
                });
            }
        });
        return;
    }

    let _ = num_tasks;
    let rows = &mut scratch.rows;
    for pair in pairs {
        if !pair.is_solvable() {
            continue;
        }
        let range = pair.row_range();
        setup_contact_pair(
            pair,
            &mut rows[range],
            states,
            solver_bodies,
            manifolds,
            params,
        );
    }
}

// ============================================================================
// Solve sweeps
// ============================================================================

fn solve_group(scratch: &mut SolveScratch, params: &StepParams, num_tasks: usize) {
    let rows_view = SharedSlice::new(&mut scratch.rows);
    let bodies_view = SharedSlice::new(&mut scratch.solver_bodies);

    // The extra zeroth sweep applies already-accumulated impulses as a
    // warm-start seed before true Gauss-Seidel iteration begins.
    for sweep in 0..=params.iterations {
        run_group_phases(
            &scratch.joint_group,
            &scratch.joint_pairs,
            rows_view,
            bodies_view,
            sweep,
            GroupKind::Joint,
            num_tasks,
        );
        run_group_phases(
            &scratch.contact_group,
            &scratch.contact_pairs,
            rows_view,
            bodies_view,
            sweep,
            GroupKind::Contact,
            num_tasks,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn run_group_phases(
    group: &ParallelGroup,
    pairs: &[ConstraintPair],
    rows: SharedSlice<ConstraintRow>,
    bodies: SharedSlice<SolverBody>,
    sweep: u32,
    kind: GroupKind,
    num_tasks: usize,
) {
    for phase in group.phases() {
        // Batches of one phase touch disjoint dynamic bodies; the phase
        // boundary below (scope join / loop end) is the mandatory barrier.
        #[cfg(feature = "parallel")]
        if num_tasks > 1 && phase.len() > 1 {
            phase
                .par_iter()
                .for_each(|batch| solve_batch(batch, pairs, rows, bodies, sweep, kind));
            continue;
        }

        let _ = num_tasks;
        for batch in phase {
            solve_batch(batch, pairs, rows, bodies, sweep, kind);
        }
    }
}

/// Process one batch sequentially: the worker resolves every row of every
/// pair in order.
fn solve_batch(
    batch: &ParallelBatch,
    pairs: &[ConstraintPair],
    rows: SharedSlice<ConstraintRow>,
    bodies: SharedSlice<SolverBody>,
    sweep: u32,
    kind: GroupKind,
) {
    for &pair_index in batch.pair_indices() {
        let pair = &pairs[pair_index as usize];
        debug_assert!(pair.is_solvable());
        debug_assert!(pair.body_a != pair.body_b);

        // SAFETY: each pair is assigned to exactly one batch, so this row
        // range is touched by exactly one worker per phase.
        let pair_rows = unsafe { rows.slice_mut(pair.row_range()) };

        // Non-dynamic endpoints are replaced by a local fixed record: the
        // resolve never writes them, and their deltas are always zero, so a
        // copy is exact — and no `&mut` into the shared array is ever
        // created for a body another batch may also be reading.
        let mut static_a = SolverBody::FIXED;
        let mut static_b = SolverBody::FIXED;
        // SAFETY: the partitioner claims every dynamic endpoint for exactly
        // one batch per phase, so no other worker holds a reference to
        // these entries during this phase.
        let body_a = if pair.dynamic_a() {
            unsafe { bodies.get_mut(pair.body_a as usize) }
        } else {
            &mut static_a
        };
        let body_b = if pair.dynamic_b() {
            unsafe { bodies.get_mut(pair.body_b as usize) }
        } else {
            &mut static_b
        };

        match kind {
            GroupKind::Contact => {
                if sweep == 0 {
                    for row in pair_rows.iter() {
                        row.warm_start(body_a, body_b);
                    }
                } else {
                    for point_rows in pair_rows.chunks_exact_mut(ROWS_PER_CONTACT_POINT) {
                        solve_contact_point(point_rows, body_a, body_b, pair.friction);
                    }
                }
            }
            GroupKind::Joint => {
                // Joints have no seed application; sweep 0 is a no-op.
                if sweep > 0 {
                    for row in pair_rows.iter_mut() {
                        row.resolve(body_a, body_b);
                    }
                }
            }
        }
    }
}

// ============================================================================
// Post-solve integration
// ============================================================================

/// Fold accumulated deltas into the caller's velocities. Pure per-body
/// operation: each body is owned by exactly one chunk, so no coordination
/// is needed.
fn integrate(bodies: &mut [RigidBodyState], solver_bodies: &[SolverBody], num_tasks: usize) {
    #[cfg(feature = "parallel")]
    if num_tasks > 1 {
        let chunk = bodies.len().div_ceil(num_tasks).max(1);
        bodies
            .par_chunks_mut(chunk)
            .zip(solver_bodies.par_chunks(chunk))
            .for_each(|(states, deltas)| {
                for (state, delta) in states.iter_mut().zip(deltas) {
                    if state.is_dynamic() {
                        state.linear_velocity += delta.delta_linear_velocity;
                        state.angular_velocity += delta.delta_angular_velocity;
                    }
                }
            });
        return;
    }

    let _ = num_tasks;
    for (state, delta) in bodies.iter_mut().zip(solver_bodies) {
        if state.is_dynamic() {
            state.linear_velocity += delta.delta_linear_velocity;
            state.angular_velocity += delta.delta_angular_velocity;
        }
    }
}
