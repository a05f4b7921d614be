//! Joint Constraints
//!
//! Joints supply their own constraint rows through the [`Joint`] trait:
//! the solver queries the row count, hands the joint a pre-initialized row
//! slice plus a [`JointContext`] with both body states and the global step
//! parameters, and the joint fills in Jacobians, velocity errors, and
//! limits. The solver then finalizes every row uniformly — effective mass,
//! impulse-scaled right-hand side, zeroed accumulator — so joint
//! implementations never deal with effective-mass bookkeeping.
//!
//! Two concrete joints ship with the crate:
//!
//! - [`BallJoint`]: pins two anchor points together (3 rows)
//! - [`DistanceJoint`]: keeps two anchors at a fixed distance (1 row)
//!
//! Author: Moroya Sakamoto

use crate::body::{RigidBodyState, SolverBody, WORLD_BODY};
use crate::config::StepParams;
use crate::constraint::ConstraintRow;
use crate::math::{Vec3A, VEC_EPSILON};

/// Per-joint setup context: body states (`None` for a world anchor), the
/// matching solver bodies, and the global step parameters.
pub struct JointContext<'a> {
    pub state_a: Option<&'a RigidBodyState>,
    pub state_b: Option<&'a RigidBodyState>,
    pub body_a: &'a SolverBody,
    pub body_b: &'a SolverBody,
    pub params: &'a StepParams,
}

/// A typed constraint between two bodies (or one body and the world).
///
/// `init_rows` receives rows pre-initialized with the global cfm and
/// unbounded limits. Implementations fill `direction`, `angular_a`,
/// `angular_b` (convention: body B's linear Jacobian is `-direction`, so a
/// point constraint uses `angular_b = -(rB x direction)`), the velocity
/// error in `rhs` (including any position bias), and tighter limits where
/// the joint has them. `jac_diag_inv` and `accum_impulse` are overwritten
/// by the solver's finalize pass; `rhs` is still in velocity units here.
pub trait Joint {
    /// Index of body A, or [`WORLD_BODY`] for a world anchor.
    fn body_a(&self) -> u32;
    /// Index of body B, or [`WORLD_BODY`] for a world anchor.
    fn body_b(&self) -> u32;
    /// Number of constraint rows this joint contributes.
    fn row_count(&self) -> usize;
    /// Fill the joint's rows for this step.
    fn init_rows(&self, rows: &mut [ConstraintRow], ctx: &JointContext<'_>);
}

/// Velocity of a body-fixed point at lever arm `r` from the center of mass.
#[inline]
fn point_velocity(state: Option<&RigidBodyState>, r: Vec3A) -> Vec3A {
    match state {
        Some(s) => s.linear_velocity + s.angular_velocity.cross(r),
        None => Vec3A::ZERO,
    }
}

/// World-space anchor position and lever arm for one endpoint. For a world
/// anchor the "local" anchor is interpreted as a world-space point.
#[inline]
fn anchor_world(
    state: Option<&RigidBodyState>,
    body: &SolverBody,
    local_anchor: Vec3A,
) -> (Vec3A, Vec3A) {
    match state {
        Some(s) => {
            let r = body.orientation * local_anchor;
            (s.position + r, r)
        }
        None => (local_anchor, Vec3A::ZERO),
    }
}

// ============================================================================
// Ball joint
// ============================================================================

/// Ball-and-socket joint: constrains two anchor points to coincide while
/// leaving rotation free. Three rows, one per world axis.
#[derive(Clone, Copy, Debug)]
pub struct BallJoint {
    pub body_a: u32,
    pub body_b: u32,
    /// Anchor in body A's local frame.
    pub local_anchor_a: Vec3A,
    /// Anchor in body B's local frame (world-space point for a world anchor).
    pub local_anchor_b: Vec3A,
}

impl BallJoint {
    pub fn new(body_a: u32, body_b: u32, anchor_a: Vec3A, anchor_b: Vec3A) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: anchor_a,
            local_anchor_b: anchor_b,
        }
    }

    /// Pin a body's local anchor to a fixed world-space point.
    pub fn anchored(body_a: u32, anchor_a: Vec3A, world_point: Vec3A) -> Self {
        Self::new(body_a, WORLD_BODY, anchor_a, world_point)
    }
}

impl Joint for BallJoint {
    fn body_a(&self) -> u32 {
        self.body_a
    }

    fn body_b(&self) -> u32 {
        self.body_b
    }

    fn row_count(&self) -> usize {
        3
    }

    fn init_rows(&self, rows: &mut [ConstraintRow], ctx: &JointContext<'_>) {
        let (pos_a, r_a) = anchor_world(ctx.state_a, ctx.body_a, self.local_anchor_a);
        let (pos_b, r_b) = anchor_world(ctx.state_b, ctx.body_b, self.local_anchor_b);

        let rel_vel = point_velocity(ctx.state_a, r_a) - point_velocity(ctx.state_b, r_b);
        let error = pos_a - pos_b;
        let bias_scale = ctx.params.erp / ctx.params.time_step;

        for (row, axis) in rows.iter_mut().zip([Vec3A::X, Vec3A::Y, Vec3A::Z]) {
            row.direction = axis;
            row.angular_a = r_a.cross(axis);
            row.angular_b = -(r_b.cross(axis));
            row.rhs = -rel_vel.dot(axis) - bias_scale * error.dot(axis);
        }
    }
}

// ============================================================================
// Distance joint
// ============================================================================

/// Distance joint: keeps two anchor points at a fixed separation. One row
/// along the current anchor-to-anchor direction.
#[derive(Clone, Copy, Debug)]
pub struct DistanceJoint {
    pub body_a: u32,
    pub body_b: u32,
    pub local_anchor_a: Vec3A,
    pub local_anchor_b: Vec3A,
    /// Target distance between the anchors.
    pub rest_length: f32,
}

impl DistanceJoint {
    pub fn new(
        body_a: u32,
        body_b: u32,
        anchor_a: Vec3A,
        anchor_b: Vec3A,
        rest_length: f32,
    ) -> Self {
        Self {
            body_a,
            body_b,
            local_anchor_a: anchor_a,
            local_anchor_b: anchor_b,
            rest_length,
        }
    }
}

impl Joint for DistanceJoint {
    fn body_a(&self) -> u32 {
        self.body_a
    }

    fn body_b(&self) -> u32 {
        self.body_b
    }

    fn row_count(&self) -> usize {
        1
    }

    fn init_rows(&self, rows: &mut [ConstraintRow], ctx: &JointContext<'_>) {
        let (pos_a, r_a) = anchor_world(ctx.state_a, ctx.body_a, self.local_anchor_a);
        let (pos_b, r_b) = anchor_world(ctx.state_b, ctx.body_b, self.local_anchor_b);

        let delta = pos_a - pos_b;
        let length = delta.length();
        if length < VEC_EPSILON {
            // Coincident anchors: direction is undefined, skip this step.
            rows[0] = ConstraintRow::INERT;
            return;
        }
        let n = delta / length;

        let rel_vel = point_velocity(ctx.state_a, r_a) - point_velocity(ctx.state_b, r_b);
        let error = length - self.rest_length;

        let row = &mut rows[0];
        row.direction = n;
        row.angular_a = r_a.cross(n);
        row.angular_b = -(r_b.cross(n));
        row.rhs = -rel_vel.dot(n) - (ctx.params.erp / ctx.params.time_step) * error;
    }
}
