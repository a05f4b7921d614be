//! Constraint Rows: Setup and Sequential-Impulse Resolution
//!
//! A [`ConstraintRow`] is one scalar constraint: a contact normal, one of
//! the two friction directions, or a single joint row. Rows carry the
//! Jacobian-derived coefficients (direction, angular lever terms, effective
//! mass) plus the right-hand side, the accumulated impulse, and its limits.
//!
//! Contacts use three rows per contact point — one normal row limited to
//! `[0, +inf)` and two friction rows whose symmetric limits are re-derived
//! every iteration from the current normal impulse. That nonlinear coupling
//! is solved by freezing the friction bounds at the value implied by the
//! normal impulse just computed, which converges together with the
//! Gauss-Seidel sweep itself.
//!
//! Author: Moroya Sakamoto

use crate::body::{RigidBodyState, SolverBody};
use crate::math::{cross_matrix, plane_space, Mat3A, Vec3A, EFFECTIVE_MASS_EPSILON};

/// Rows generated per contact point (normal + two tangents).
pub const ROWS_PER_CONTACT_POINT: usize = 3;

/// Maximum contact points carried by one manifold.
pub const MAX_CONTACT_POINTS: usize = 4;

/// Penetration tolerance subtracted before the position-bias term kicks in,
/// so bias correction does not fight numerical noise at near-zero depth.
pub const CONTACT_SLOP: f32 = 0.001;

// ============================================================================
// Contact manifold input
// ============================================================================

/// One contact point of a manifold.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContactPoint {
    /// Contact position in body A's local frame.
    pub local_a: Vec3A,
    /// Contact position in body B's local frame.
    pub local_b: Vec3A,
    /// World-space contact normal, pointing from B toward A.
    pub normal: Vec3A,
    /// Signed separation distance (negative = penetrating).
    pub separation: f32,
}

/// Caller-provided contact manifold between two bodies.
///
/// Produced by narrow-phase collision detection, which is outside this
/// crate; the solver only consumes the already-generated points.
#[derive(Clone, Copy, Debug)]
pub struct ContactManifold {
    /// Index of body A in the caller's body array.
    pub body_a: u32,
    /// Index of body B in the caller's body array.
    pub body_b: u32,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    num_points: u8,
}

impl ContactManifold {
    /// Empty manifold between two bodies.
    pub fn new(body_a: u32, body_b: u32) -> Self {
        Self {
            body_a,
            body_b,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            num_points: 0,
        }
    }

    /// Append a contact point; silently ignored beyond [`MAX_CONTACT_POINTS`].
    pub fn add_point(&mut self, point: ContactPoint) {
        if (self.num_points as usize) < MAX_CONTACT_POINTS {
            self.points[self.num_points as usize] = point;
            self.num_points += 1;
        }
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.num_points as usize
    }

    #[inline]
    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.num_points as usize]
    }
}

// ============================================================================
// Constraint row
// ============================================================================

/// One scalar constraint row.
///
/// `angular_a` / `angular_b` are the world-space angular Jacobians for the
/// two bodies. For a contact they are `rA x n` and `-(rB x n)`; joint
/// implementations supply their own axes in the same convention (body B's
/// linear Jacobian is implicitly `-direction`).
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintRow {
    /// Constraint direction (body A's linear Jacobian).
    pub direction: Vec3A,
    /// Angular Jacobian for body A.
    pub angular_a: Vec3A,
    /// Angular Jacobian for body B.
    pub angular_b: Vec3A,
    /// Jacobian-diagonal inverse (effective mass); 0 marks the row inert.
    pub jac_diag_inv: f32,
    /// Target impulse (velocity error already scaled by the effective mass).
    pub rhs: f32,
    /// Constraint-force mixing; softens the row by feeding the accumulated
    /// impulse back into the residual. Zero for contacts.
    pub cfm: f32,
    /// Lower impulse limit.
    pub lower_limit: f32,
    /// Upper impulse limit.
    pub upper_limit: f32,
    /// Accumulated impulse; always within `[lower_limit, upper_limit]`.
    pub accum_impulse: f32,
}

impl ConstraintRow {
    /// A row the solver will skip: zero effective mass, zero limits.
    pub const INERT: Self = Self {
        direction: Vec3A::ZERO,
        angular_a: Vec3A::ZERO,
        angular_b: Vec3A::ZERO,
        jac_diag_inv: 0.0,
        rhs: 0.0,
        cfm: 0.0,
        lower_limit: 0.0,
        upper_limit: 0.0,
        accum_impulse: 0.0,
    };

    /// Projected Gauss-Seidel step: compute the impulse correction from the
    /// current delta velocities, clamp the accumulated impulse into
    /// `[lower_limit, upper_limit]`, and apply the actual delta to both
    /// bodies.
    ///
    /// Fixed bodies (`inv_mass == 0`) are never written — not even a zero
    /// delta — so concurrent batches sharing a static body stay race-free.
    #[inline]
    pub fn resolve(&mut self, body_a: &mut SolverBody, body_b: &mut SolverBody) {
        let rel_vel = self
            .direction
            .dot(body_a.delta_linear_velocity - body_b.delta_linear_velocity)
            + self.angular_a.dot(body_a.delta_angular_velocity)
            + self.angular_b.dot(body_b.delta_angular_velocity);

        let delta = self.rhs - self.accum_impulse * self.cfm - rel_vel * self.jac_diag_inv;
        let old = self.accum_impulse;
        self.accum_impulse = (old + delta).clamp(self.lower_limit, self.upper_limit);
        self.apply(body_a, body_b, self.accum_impulse - old);
    }

    /// Apply the stored accumulated impulse as-is (warm-start seed pass).
    #[inline]
    pub fn warm_start(&self, body_a: &mut SolverBody, body_b: &mut SolverBody) {
        self.apply(body_a, body_b, self.accum_impulse);
    }

    #[inline]
    fn apply(&self, body_a: &mut SolverBody, body_b: &mut SolverBody, impulse: f32) {
        if body_a.inv_mass != 0.0 {
            body_a.delta_linear_velocity += self.direction * (body_a.inv_mass * impulse);
            body_a.delta_angular_velocity += (body_a.inv_inertia_world * self.angular_a) * impulse;
        }
        if body_b.inv_mass != 0.0 {
            body_b.delta_linear_velocity -= self.direction * (body_b.inv_mass * impulse);
            body_b.delta_angular_velocity += (body_b.inv_inertia_world * self.angular_b) * impulse;
        }
    }
}

/// Effective-mass denominator `J M^-1 J^T` for one row: the velocity change
/// along the row per unit impulse. Shared by contact setup and joint
/// implementations.
#[inline]
pub fn effective_mass_denom(
    body_a: &SolverBody,
    body_b: &SolverBody,
    direction: Vec3A,
    angular_a: Vec3A,
    angular_b: Vec3A,
) -> f32 {
    let linear = (body_a.inv_mass + body_b.inv_mass) * direction.dot(direction);
    linear
        + (body_a.inv_inertia_world * angular_a).dot(angular_a)
        + (body_b.inv_inertia_world * angular_b).dot(angular_b)
}

// ============================================================================
// Contact constraint setup
// ============================================================================

/// Combined effective-mass matrix of a body pair about the lever arms
/// `rA` / `rB`: `(mA^-1 + mB^-1) I - [rA]x IA^-1 [rA]x - [rB]x IB^-1 [rB]x`.
#[inline]
fn pair_k_matrix(body_a: &SolverBody, body_b: &SolverBody, r_a: Vec3A, r_b: Vec3A) -> Mat3A {
    let cross_a = cross_matrix(r_a);
    let cross_b = cross_matrix(r_b);
    Mat3A::from_diagonal(glam::Vec3::splat(body_a.inv_mass + body_b.inv_mass))
        - cross_a * body_a.inv_inertia_world * cross_a
        - cross_b * body_b.inv_inertia_world * cross_b
}

/// Fill the three rows of one contact point.
///
/// Row 0 is the non-penetration row: its right-hand side combines the
/// restitution response `-(1 + e) * v_rel.n` with the Baumgarte position
/// bias `-bias * min(0, separation + slop) / dt`, divided by the effective
/// mass. Rows 1 and 2 are the tangent rows; their limits start at zero and
/// are re-bounded from the normal impulse every solve iteration.
#[allow(clippy::too_many_arguments)]
pub fn setup_contact_point(
    rows: &mut [ConstraintRow],
    point: &ContactPoint,
    state_a: &RigidBodyState,
    state_b: &RigidBodyState,
    body_a: &SolverBody,
    body_b: &SolverBody,
    restitution: f32,
    separate_bias: f32,
    time_step: f32,
) {
    debug_assert!(rows.len() >= ROWS_PER_CONTACT_POINT);

    let r_a = body_a.orientation * point.local_a;
    let r_b = body_b.orientation * point.local_b;
    let k = pair_k_matrix(body_a, body_b, r_a, r_b);

    let v_a = state_a.linear_velocity + state_a.angular_velocity.cross(r_a);
    let v_b = state_b.linear_velocity + state_b.angular_velocity.cross(r_b);
    let v_ab = v_a - v_b;

    let normal = point.normal;
    let (tangent1, tangent2) = plane_space(normal);

    // Non-penetration row.
    {
        let denom = (k * normal).dot(normal);
        rows[0] = if denom < EFFECTIVE_MASS_EPSILON {
            ConstraintRow::INERT
        } else {
            let mut rhs = -(1.0 + restitution) * v_ab.dot(normal); // velocity error
            rhs -= separate_bias * (point.separation + CONTACT_SLOP).min(0.0) / time_step; // position error
            rhs /= denom;
            ConstraintRow {
                direction: normal,
                angular_a: r_a.cross(normal),
                angular_b: -(r_b.cross(normal)),
                jac_diag_inv: 1.0 / denom,
                rhs,
                cfm: 0.0,
                lower_limit: 0.0,
                upper_limit: f32::INFINITY,
                accum_impulse: 0.0,
            }
        };
    }

    // Friction rows.
    for (slot, tangent) in [(1usize, tangent1), (2usize, tangent2)] {
        let denom = (k * tangent).dot(tangent);
        rows[slot] = if denom < EFFECTIVE_MASS_EPSILON {
            ConstraintRow::INERT
        } else {
            let jac_diag_inv = 1.0 / denom;
            ConstraintRow {
                direction: tangent,
                angular_a: r_a.cross(tangent),
                angular_b: -(r_b.cross(tangent)),
                jac_diag_inv,
                rhs: -v_ab.dot(tangent) * jac_diag_inv,
                cfm: 0.0,
                // Re-bounded from the normal impulse each iteration.
                lower_limit: 0.0,
                upper_limit: 0.0,
                accum_impulse: 0.0,
            }
        };
    }
}

/// Resolve one contact point's row triplet: the normal row first, then both
/// friction rows inside the cone implied by the normal impulse just
/// computed.
#[inline]
pub fn solve_contact_point(
    rows: &mut [ConstraintRow],
    body_a: &mut SolverBody,
    body_b: &mut SolverBody,
    friction: f32,
) {
    debug_assert!(rows.len() >= ROWS_PER_CONTACT_POINT);

    rows[0].resolve(body_a, body_b);

    let max_friction = friction * rows[0].accum_impulse.abs();
    rows[1].lower_limit = -max_friction;
    rows[1].upper_limit = max_friction;
    rows[2].lower_limit = -max_friction;
    rows[2].upper_limit = max_friction;

    rows[1].resolve(body_a, body_b);
    rows[2].resolve(body_a, body_b);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::MotionKind;
    use crate::math::Quat;

    fn unit_sphere_at(x: f32, vx: f32) -> RigidBodyState {
        let mut state = RigidBodyState::active_sphere(Vec3A::new(x, 0.0, 0.0), 1.0, 1.0);
        state.linear_velocity = Vec3A::new(vx, 0.0, 0.0);
        state
    }

    fn head_on_rows() -> (RigidBodyState, RigidBodyState, [ConstraintRow; 3]) {
        // A on the left moving +x, B on the right moving -x, touching at the
        // origin; normal points from B toward A (-x).
        let state_a = unit_sphere_at(-1.0, 1.0);
        let state_b = unit_sphere_at(1.0, -1.0);
        let body_a = SolverBody::from_state(&state_a);
        let body_b = SolverBody::from_state(&state_b);
        let point = ContactPoint {
            local_a: Vec3A::new(1.0, 0.0, 0.0),
            local_b: Vec3A::new(-1.0, 0.0, 0.0),
            normal: Vec3A::new(-1.0, 0.0, 0.0),
            separation: 0.0,
        };
        let mut rows = [ConstraintRow::default(); 3];
        setup_contact_point(
            &mut rows, &point, &state_a, &state_b, &body_a, &body_b, 0.0, 0.1, 1.0 / 60.0,
        );
        (state_a, state_b, rows)
    }

    #[test]
    fn test_normal_row_rhs_stops_approach() {
        let (state_a, state_b, mut rows) = head_on_rows();
        let mut body_a = SolverBody::from_state(&state_a);
        let mut body_b = SolverBody::from_state(&state_b);

        rows[0].resolve(&mut body_a, &mut body_b);

        // Unit masses, lever arm parallel to the normal: the pair stops dead.
        let va = state_a.linear_velocity + body_a.delta_linear_velocity;
        let vb = state_b.linear_velocity + body_b.delta_linear_velocity;
        assert!(va.x.abs() < 1.0e-5, "body A still moving: {}", va.x);
        assert!(vb.x.abs() < 1.0e-5, "body B still moving: {}", vb.x);
    }

    #[test]
    fn test_clamp_invariant_holds_after_every_resolve() {
        let (state_a, state_b, mut rows) = head_on_rows();
        let mut body_a = SolverBody::from_state(&state_a);
        let mut body_b = SolverBody::from_state(&state_b);

        for _ in 0..8 {
            solve_contact_point(&mut rows, &mut body_a, &mut body_b, 0.5);
            for row in &rows {
                assert!(
                    row.lower_limit <= row.accum_impulse && row.accum_impulse <= row.upper_limit,
                    "impulse {} outside [{}, {}]",
                    row.accum_impulse,
                    row.lower_limit,
                    row.upper_limit
                );
            }
        }
    }

    #[test]
    fn test_fixed_body_never_written() {
        let mut state_b = RigidBodyState::fixed(Vec3A::new(1.0, 0.0, 0.0));
        state_b.motion = MotionKind::Fixed;
        let state_a = unit_sphere_at(-1.0, 1.0);
        let body_a_ro = SolverBody::from_state(&state_a);
        let body_b_ro = SolverBody::from_state(&state_b);

        let point = ContactPoint {
            local_a: Vec3A::new(1.0, 0.0, 0.0),
            local_b: Vec3A::new(0.0, 0.0, 0.0),
            normal: Vec3A::new(-1.0, 0.0, 0.0),
            separation: 0.0,
        };
        let mut rows = [ConstraintRow::default(); 3];
        setup_contact_point(
            &mut rows, &point, &state_a, &state_b, &body_a_ro, &body_b_ro, 0.0, 0.1, 1.0 / 60.0,
        );

        let mut body_a = body_a_ro;
        let mut body_b = body_b_ro;
        for _ in 0..4 {
            solve_contact_point(&mut rows, &mut body_a, &mut body_b, 0.5);
        }
        assert_eq!(body_b.delta_linear_velocity, Vec3A::ZERO);
        assert_eq!(body_b.delta_angular_velocity, Vec3A::ZERO);
        assert!(body_a.delta_linear_velocity.length() > 0.0);
    }

    #[test]
    fn test_degenerate_denominator_marks_row_inert() {
        // Two fixed endpoints: zero inverse mass on both sides makes the
        // denominator vanish; the rows must come out inert, not infinite.
        let state_a = RigidBodyState::fixed(Vec3A::ZERO);
        let state_b = RigidBodyState::fixed(Vec3A::X);
        let body_a = SolverBody::from_state(&state_a);
        let body_b = SolverBody::from_state(&state_b);
        let point = ContactPoint {
            normal: Vec3A::Z,
            ..ContactPoint::default()
        };
        let mut rows = [ConstraintRow::default(); 3];
        setup_contact_point(
            &mut rows, &point, &state_a, &state_b, &body_a, &body_b, 0.0, 0.1, 1.0 / 60.0,
        );
        for row in &rows {
            assert_eq!(row.jac_diag_inv, 0.0);
            assert_eq!(row.rhs, 0.0);
        }
    }

    #[test]
    fn test_warm_start_reapplies_accumulated_impulse() {
        let (state_a, _state_b, mut rows) = head_on_rows();
        let mut body_a = SolverBody::from_state(&state_a);
        let mut body_b = SolverBody::FIXED;
        rows[0].accum_impulse = 2.0;
        rows[0].warm_start(&mut body_a, &mut body_b);
        // impulse * inv_mass along the normal (-x).
        assert!((body_a.delta_linear_velocity.x + 2.0).abs() < 1.0e-6);
        assert_eq!(body_b.delta_linear_velocity, Vec3A::ZERO);
    }

    #[test]
    fn test_manifold_point_cap() {
        let mut manifold = ContactManifold::new(0, 1);
        for _ in 0..6 {
            manifold.add_point(ContactPoint::default());
        }
        assert_eq!(manifold.num_points(), MAX_CONTACT_POINTS);
    }

    #[test]
    fn test_rotated_lever_arm_uses_orientation_snapshot() {
        // Body A rotated 90 degrees about z: its local +x contact point ends
        // up at world +y, so a world -y normal gives a pure linear response.
        let mut state_a = RigidBodyState::active_sphere(Vec3A::ZERO, 1.0, 1.0);
        state_a.orientation = Quat::from_rotation_z(core::f32::consts::FRAC_PI_2);
        state_a.linear_velocity = Vec3A::new(0.0, -1.0, 0.0);
        let state_b = RigidBodyState::fixed(Vec3A::new(0.0, 2.0, 0.0));
        let body_a = SolverBody::from_state(&state_a);
        let body_b = SolverBody::from_state(&state_b);
        let point = ContactPoint {
            local_a: Vec3A::new(1.0, 0.0, 0.0),
            local_b: Vec3A::ZERO,
            normal: Vec3A::new(0.0, -1.0, 0.0),
            separation: 0.0,
        };
        let mut rows = [ConstraintRow::default(); 3];
        setup_contact_point(
            &mut rows, &point, &state_a, &state_b, &body_a, &body_b, 0.0, 0.1, 1.0 / 60.0,
        );
        // Lever arm (world +y) is anti-parallel to the normal: no torque.
        assert!(rows[0].angular_a.length() < 1.0e-5);
    }
}
