//! # ALICE-Solver
//!
//! **Parallel Sequential-Impulse Constraint Solver for Rigid-Body Physics**
//!
//! Given rigid-body state snapshots, contact manifolds, and joint
//! descriptors for one simulation step, this crate computes the corrective
//! impulses that satisfy non-penetration, friction, and joint constraints,
//! and writes the updated linear/angular velocities back onto the bodies.
//!
//! ## Pipeline
//!
//! | Stage | Description |
//! |-------|-------------|
//! | **Setup** | Manifolds/joints → constraint rows (Jacobians, bias, limits) |
//! | **Split** | Greedy graph coloring → conflict-free batches per phase |
//! | **Solve** | Projected Gauss-Seidel sweeps, batches of a phase in parallel |
//! | **Integrate** | Accumulated velocity deltas folded back into the bodies |
//!
//! ## Design Principles
//!
//! - **Index-based linkage**: bodies, rows, and pairs are flat arrays
//!   related by integer index — a worker is handed index ranges, never
//!   pointer graphs.
//! - **Step-scoped scratch**: all transient state lives in per-solver
//!   buffers that are reset (not freed) between calls; steady state
//!   allocates nothing.
//! - **Lock-free sharing by scheduling**: the batch partitioner's
//!   phase-disjointness invariant — not locks — is what makes concurrent
//!   solver-body writes safe.
//! - **`no_std` compatible**: the solver core runs without `std`; the
//!   `parallel` feature (rayon) is the only std-bound surface.
//!
//! ## Quick Start
//!
//! ```rust
//! use alice_solver::prelude::*;
//! use alice_solver::math::Vec3A;
//!
//! // Two unit spheres approaching head-on.
//! let mut a = RigidBodyState::active_sphere(Vec3A::new(-1.0, 0.0, 0.0), 1.0, 1.0);
//! a.linear_velocity = Vec3A::new(1.0, 0.0, 0.0);
//! let mut b = RigidBodyState::active_sphere(Vec3A::new(1.0, 0.0, 0.0), 1.0, 1.0);
//! b.linear_velocity = Vec3A::new(-1.0, 0.0, 0.0);
//! let mut bodies = [a, b];
//!
//! // One contact point between them, normal from B toward A.
//! let mut manifold = ContactManifold::new(0, 1);
//! manifold.add_point(ContactPoint {
//!     local_a: Vec3A::new(1.0, 0.0, 0.0),
//!     local_b: Vec3A::new(-1.0, 0.0, 0.0),
//!     normal: Vec3A::new(-1.0, 0.0, 0.0),
//!     separation: 0.0,
//! });
//!
//! let mut solver = ParallelSolver::new(SolverConfig::default()).unwrap();
//! let stats = solver
//!     .solve(&mut bodies, &[manifold], &[], &StepParams::default())
//!     .unwrap();
//!
//! assert_eq!(stats.contact_pairs, 1);
//! // Equal masses, restitution 0: both bodies stop dead.
//! assert!(bodies[0].linear_velocity.x.abs() < 1.0e-4);
//! assert!(bodies[1].linear_velocity.x.abs() < 1.0e-4);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod batch;
pub mod body;
pub mod config;
pub mod constraint;
pub mod error;
pub mod joint;
pub mod math;
pub mod pair;
pub mod profiling;
pub mod solver;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::batch::{split_constraints, ParallelBatch, ParallelGroup, SplitScratch};
    pub use crate::body::{
        MotionKind, RigidBodyState, SolverBody, MOTION_MASK_DYNAMIC, MOTION_MASK_STATIC,
        WORLD_BODY,
    };
    pub use crate::config::{SolverConfig, StepParams};
    pub use crate::constraint::{
        ConstraintRow, ContactManifold, ContactPoint, CONTACT_SLOP, MAX_CONTACT_POINTS,
        ROWS_PER_CONTACT_POINT,
    };
    pub use crate::error::SolverError;
    pub use crate::joint::{BallJoint, DistanceJoint, Joint, JointContext};
    pub use crate::pair::ConstraintPair;
    pub use crate::profiling::{ProfileEntry, SolverProfiler, Stage};
    pub use crate::solver::{ParallelSolver, SolveStats};
}

// Re-export main types at crate root
pub use prelude::*;

// ============================================================================
// Integration Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use crate::math::Vec3A;

    #[cfg(not(feature = "std"))]
    use alloc::{boxed::Box, vec, vec::Vec};

    #[test]
    fn test_stack_column_settles() {
        // A vertical column of spheres resting on a fixed floor, all sinking
        // at the same speed. Adjacent pairs share bodies, so the partitioner
        // keeps the column inside one sequential batch; the floor impulse
        // then propagates up the stack across the Gauss-Seidel sweeps.
        let mut bodies = vec![RigidBodyState::fixed(Vec3A::ZERO)];
        for i in 0..6 {
            let mut s = RigidBodyState::active_sphere(
                Vec3A::new(0.0, 1.0 + 2.0 * i as f32, 0.0),
                1.0,
                1.0,
            );
            s.linear_velocity = Vec3A::new(0.0, -1.0, 0.0);
            s.friction = 0.0;
            bodies.push(s);
        }

        let mut manifolds = Vec::new();
        // Floor contact under the lowest sphere.
        let mut floor = ContactManifold::new(1, 0);
        floor.add_point(ContactPoint {
            local_a: Vec3A::new(0.0, -1.0, 0.0),
            local_b: Vec3A::new(0.0, 0.0, 0.0),
            normal: Vec3A::new(0.0, 1.0, 0.0),
            separation: 0.0,
        });
        manifolds.push(floor);
        // Sphere-on-sphere contacts up the column.
        for i in 1..6u32 {
            let mut m = ContactManifold::new(i + 1, i);
            m.add_point(ContactPoint {
                local_a: Vec3A::new(0.0, -1.0, 0.0),
                local_b: Vec3A::new(0.0, 1.0, 0.0),
                normal: Vec3A::new(0.0, 1.0, 0.0),
                separation: 0.0,
            });
            manifolds.push(m);
        }

        let mut solver = ParallelSolver::new(SolverConfig { num_tasks: 2 }).unwrap();
        let params = StepParams {
            iterations: 16,
            ..StepParams::default()
        };
        solver.solve(&mut bodies, &manifolds, &[], &params).unwrap();

        for (i, body) in bodies.iter().enumerate().skip(1) {
            assert!(
                body.linear_velocity.y.abs() < 1.0e-2,
                "sphere {i} still moving: {}",
                body.linear_velocity.y
            );
        }
        assert_eq!(bodies[0].linear_velocity, Vec3A::ZERO);
    }

    #[test]
    fn test_pendulum_chain_of_joints() {
        // Three bodies chained by ball joints to a world anchor, all given
        // sideways velocity; the joints keep relative anchor velocities near
        // zero after the solve.
        let mut bodies = Vec::new();
        for i in 0..3 {
            // Body i sits at x = 1 + 2i so adjacent anchor points coincide.
            let mut b = RigidBodyState::active_sphere(
                Vec3A::new(1.0 + 2.0 * i as f32, 0.0, 0.0),
                1.0,
                1.0,
            );
            b.linear_velocity = Vec3A::new(0.0, 1.0 + i as f32, 0.0);
            bodies.push(b);
        }

        let mut joints: Vec<Box<dyn Joint>> = Vec::new();
        joints.push(Box::new(BallJoint::anchored(
            0,
            Vec3A::new(-1.0, 0.0, 0.0),
            Vec3A::ZERO,
        )));
        for i in 0..2u32 {
            joints.push(Box::new(BallJoint::new(
                i + 1,
                i,
                Vec3A::new(-1.0, 0.0, 0.0),
                Vec3A::new(1.0, 0.0, 0.0),
            )));
        }

        let mut solver = ParallelSolver::new(SolverConfig { num_tasks: 1 }).unwrap();
        let params = StepParams {
            iterations: 64,
            ..StepParams::default()
        };
        let stats = solver.solve(&mut bodies, &[], &joints, &params).unwrap();
        assert_eq!(stats.joint_pairs, 3);
        assert_eq!(stats.rows, 9);

        assert_eq!(stats.joint_phases, 1, "chained joints serialize into one batch");

        // Anchor-point velocity of the first body must be (near) zero.
        let v0 = bodies[0].linear_velocity
            + bodies[0]
                .angular_velocity
                .cross(Vec3A::new(-1.0, 0.0, 0.0));
        assert!(v0.length() < 5.0e-2, "anchor still moving: {v0:?}");
    }

    #[test]
    fn test_mixed_contacts_and_joints_share_a_solve() {
        let mut a = RigidBodyState::active_sphere(Vec3A::new(-1.0, 0.0, 0.0), 1.0, 1.0);
        a.linear_velocity = Vec3A::new(1.0, 0.0, 0.0);
        let mut b = RigidBodyState::active_sphere(Vec3A::new(1.0, 0.0, 0.0), 1.0, 1.0);
        b.linear_velocity = Vec3A::new(-1.0, 0.0, 0.0);
        let mut bodies = [a, b];

        let mut manifold = ContactManifold::new(0, 1);
        manifold.add_point(ContactPoint {
            local_a: Vec3A::new(1.0, 0.0, 0.0),
            local_b: Vec3A::new(-1.0, 0.0, 0.0),
            normal: Vec3A::new(-1.0, 0.0, 0.0),
            separation: 0.0,
        });

        let joints: Vec<Box<dyn Joint>> = vec![Box::new(BallJoint::anchored(
            0,
            Vec3A::ZERO,
            Vec3A::new(-1.0, 0.0, 0.0),
        ))];

        let mut solver = ParallelSolver::new(SolverConfig::default()).unwrap();
        let stats = solver
            .solve(&mut bodies, &[manifold], &joints, &StepParams::default())
            .unwrap();
        assert_eq!(stats.contact_pairs, 1);
        assert_eq!(stats.joint_pairs, 1);
        assert_eq!(stats.sweeps, StepParams::default().iterations + 1);
    }
}
