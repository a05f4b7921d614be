//! Solver Math Helpers
//!
//! Thin layer over [`glam`] covering the pieces the constraint solver needs
//! beyond plain vector algebra: the contact-plane basis, skew-symmetric
//! cross matrices for effective-mass assembly, and world-space inverse
//! inertia construction.
//!
//! Author: Moroya Sakamoto

pub use glam::{Mat3A, Quat, Vec3A};

/// Normalization guard: vectors shorter than this are treated as degenerate
/// and left untouched instead of being divided toward infinity.
pub const VEC_EPSILON: f32 = 1.0e-6;

/// Effective-mass denominators below this mark a constraint row as inert.
pub const EFFECTIVE_MASS_EPSILON: f32 = 1.0e-10;

/// Scalar square root that works in `no_std` builds.
#[inline]
pub(crate) fn sqrtf(x: f32) -> f32 {
    #[cfg(feature = "std")]
    {
        x.sqrt()
    }
    #[cfg(not(feature = "std"))]
    {
        libm::sqrtf(x)
    }
}

/// Build an orthonormal tangent basis `(p, q)` for a unit normal `n`.
///
/// Branches on the dominant axis: if `|n.z| > 0.707` the first tangent is
/// built in the y-z plane, otherwise in the x-y plane. Keeps the cross
/// products well away from degeneracy for any unit input.
pub fn plane_space(n: Vec3A) -> (Vec3A, Vec3A) {
    if n.z.abs() > 0.707 {
        // choose p in y-z plane
        let a = n.y * n.y + n.z * n.z;
        let k = 1.0 / sqrtf(a);
        let p = Vec3A::new(0.0, -n.z * k, n.y * k);
        // q = n x p
        let q = Vec3A::new(a * k, -n.x * p.z, n.x * p.y);
        (p, q)
    } else {
        // choose p in x-y plane
        let a = n.x * n.x + n.y * n.y;
        let k = 1.0 / sqrtf(a);
        let p = Vec3A::new(-n.y * k, n.x * k, 0.0);
        // q = n x p
        let q = Vec3A::new(-n.z * p.y, n.z * p.x, a * k);
        (p, q)
    }
}

/// Skew-symmetric cross-product matrix: `cross_matrix(v) * w == v.cross(w)`.
#[inline]
pub fn cross_matrix(v: Vec3A) -> Mat3A {
    Mat3A::from_cols(
        Vec3A::new(0.0, v.z, -v.y),
        Vec3A::new(-v.z, 0.0, v.x),
        Vec3A::new(v.y, -v.x, 0.0),
    )
}

/// World-space inverse inertia from a local diagonal and an orientation:
/// `R * diag(inv_inertia_local) * R^T`.
#[inline]
pub fn world_inv_inertia(orientation: Quat, inv_inertia_local: Vec3A) -> Mat3A {
    let r = Mat3A::from_quat(orientation);
    r * Mat3A::from_diagonal(inv_inertia_local.into()) * r.transpose()
}
