//! Rigid Body Snapshots and Per-Step Solver Bodies
//!
//! The solver does not own rigid bodies. The caller hands in an
//! index-aligned array of [`RigidBodyState`] snapshots for one simulation
//! step; the solver builds one [`SolverBody`] per state (same index), solves
//! against the solver bodies only, and writes the accumulated velocity
//! deltas back at the end of the step.
//!
//! The index alignment (array position == body id) is an invariant: it is
//! what lets parallel workers address shared body state lock-free, with the
//! batch partitioner guaranteeing that no two concurrent batches touch the
//! same dynamic index.
//!
//! Author: Moroya Sakamoto

use crate::math::{world_inv_inertia, Mat3A, Quat, Vec3A};

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// Sentinel body index denoting a world (immovable) anchor.
pub const WORLD_BODY: u32 = u32::MAX;

/// Motion-mask bit: endpoint is static (never claimed by the partitioner).
pub const MOTION_MASK_STATIC: u8 = 1 << 0;

/// Motion-mask bit: endpoint is dynamic (claimed by exactly one batch per phase).
pub const MOTION_MASK_DYNAMIC: u8 = 1 << 1;

// ============================================================================
// Motion classification
// ============================================================================

/// Motion classification of a rigid body for one solve.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MotionKind {
    /// Infinite mass; velocities are never written back.
    Fixed = 0,
    /// Simulated; receives impulses and the final velocity write-back.
    Active = 1,
}

impl MotionKind {
    /// Partitioner motion mask for this classification.
    #[inline]
    pub const fn mask(self) -> u8 {
        match self {
            MotionKind::Fixed => MOTION_MASK_STATIC,
            MotionKind::Active => MOTION_MASK_DYNAMIC,
        }
    }

    /// Whether this body participates in batch conflicts.
    #[inline]
    pub const fn is_dynamic(self) -> bool {
        matches!(self, MotionKind::Active)
    }
}

// ============================================================================
// Rigid body state snapshot
// ============================================================================

/// Caller-owned rigid body state for one simulation step.
///
/// The solver reads the initial velocities and writes the final velocities
/// of `Active` bodies; everything else is read-only input.
#[derive(Clone, Copy, Debug)]
pub struct RigidBodyState {
    /// World-space center-of-mass position.
    pub position: Vec3A,
    /// World-space orientation (unit quaternion).
    pub orientation: Quat,
    /// Linear velocity; updated in place by the solve.
    pub linear_velocity: Vec3A,
    /// Angular velocity; updated in place by the solve.
    pub angular_velocity: Vec3A,
    /// Inverse mass (0 for fixed bodies).
    pub inv_mass: f32,
    /// Inverse inertia tensor diagonal in body-local space.
    pub inv_inertia_local: Vec3A,
    /// Friction coefficient (combined per pair as sqrt of the product).
    pub friction: f32,
    /// Restitution coefficient (combined per pair as the average).
    pub restitution: f32,
    /// Motion classification.
    pub motion: MotionKind,
}

impl RigidBodyState {
    /// An active body with the given mass and local inverse inertia diagonal.
    pub fn active(position: Vec3A, mass: f32, inv_inertia_local: Vec3A) -> Self {
        let inv_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        Self {
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3A::ZERO,
            angular_velocity: Vec3A::ZERO,
            inv_mass,
            inv_inertia_local,
            friction: 0.5,
            restitution: 0.0,
            motion: MotionKind::Active,
        }
    }

    /// An immovable body (infinite mass, zero inverse inertia).
    pub fn fixed(position: Vec3A) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3A::ZERO,
            angular_velocity: Vec3A::ZERO,
            inv_mass: 0.0,
            inv_inertia_local: Vec3A::ZERO,
            friction: 0.5,
            restitution: 0.0,
            motion: MotionKind::Fixed,
        }
    }

    /// A unit-radius solid sphere of the given mass.
    pub fn active_sphere(position: Vec3A, mass: f32, radius: f32) -> Self {
        let inertia = 0.4 * mass * radius * radius;
        let inv_i = if inertia > 0.0 { 1.0 / inertia } else { 0.0 };
        Self::active(position, mass, Vec3A::splat(inv_i))
    }

    #[inline]
    pub fn is_dynamic(&self) -> bool {
        self.motion.is_dynamic()
    }
}

// ============================================================================
// Solver body
// ============================================================================

/// Per-body transient solve state, rebuilt from [`RigidBodyState`] each step.
///
/// Workers accumulate velocity corrections into `delta_linear_velocity` /
/// `delta_angular_velocity`; the post-solve integrator folds them back into
/// the caller's state. Fixed bodies keep `inv_mass == 0` and a zero inverse
/// inertia, and the row resolve never writes to them.
#[derive(Clone, Copy, Debug)]
pub struct SolverBody {
    /// Orientation snapshot used to rotate body-local contact points.
    pub orientation: Quat,
    /// Accumulated linear velocity correction.
    pub delta_linear_velocity: Vec3A,
    /// Accumulated angular velocity correction.
    pub delta_angular_velocity: Vec3A,
    /// Inverse mass (0 for fixed bodies).
    pub inv_mass: f32,
    /// World-space inverse inertia tensor.
    pub inv_inertia_world: Mat3A,
    /// Friction coefficient copied from the body state.
    pub friction: f32,
    /// Restitution coefficient copied from the body state.
    pub restitution: f32,
}

impl SolverBody {
    /// A zeroed fixed-body record; used for world anchors.
    pub const FIXED: Self = Self {
        orientation: Quat::IDENTITY,
        delta_linear_velocity: Vec3A::ZERO,
        delta_angular_velocity: Vec3A::ZERO,
        inv_mass: 0.0,
        inv_inertia_world: Mat3A::ZERO,
        friction: 0.0,
        restitution: 0.0,
    };

    /// Build the solve-scratch record for one body.
    pub fn from_state(state: &RigidBodyState) -> Self {
        let inv_inertia_world = if state.is_dynamic() {
            world_inv_inertia(state.orientation, state.inv_inertia_local)
        } else {
            Mat3A::ZERO
        };
        Self {
            orientation: state.orientation,
            delta_linear_velocity: Vec3A::ZERO,
            delta_angular_velocity: Vec3A::ZERO,
            inv_mass: if state.is_dynamic() { state.inv_mass } else { 0.0 },
            inv_inertia_world,
            friction: state.friction,
            restitution: state.restitution,
        }
    }
}

/// Rebuild the index-aligned solver-body array for one step, reusing the
/// buffer's allocation across steps.
pub fn build_solver_bodies(states: &[RigidBodyState], out: &mut Vec<SolverBody>) {
    out.clear();
    out.reserve(states.len());
    out.extend(states.iter().map(SolverBody::from_state));
}
