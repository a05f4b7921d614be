#![no_main]
use alice_solver::math::Vec3A;
use alice_solver::prelude::*;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Number of bodies to create (capped)
    body_count: u8,
    /// Position/velocity components (i8 keeps magnitudes sane)
    bodies: Vec<(i8, i8, i8, i8, i8, i8, bool)>,
    /// Contacts as (body_a, body_b, normal axis, separation milli-units)
    contacts: Vec<(u8, u8, u8, i8)>,
    /// Task count (capped)
    num_tasks: u8,
}

// Fuzz the full solve: arbitrary body soups and contact graphs must never
// panic and must never write non-finite velocities or touch fixed bodies.
fuzz_target!(|input: FuzzInput| {
    let body_count = (input.body_count as usize % 24).max(2);

    let mut bodies = Vec::with_capacity(body_count);
    for i in 0..body_count {
        let (px, py, pz, vx, vy, vz, fixed) = input
            .bodies
            .get(i)
            .copied()
            .unwrap_or((0, 0, 0, 0, 0, 0, false));
        let position = Vec3A::new(px as f32, py as f32, pz as f32);
        let mut body = if fixed {
            RigidBodyState::fixed(position)
        } else {
            RigidBodyState::active_sphere(position, 1.0, 1.0)
        };
        if !fixed {
            body.linear_velocity = Vec3A::new(vx as f32, vy as f32, vz as f32) * 0.25;
        }
        bodies.push(body);
    }

    let mut manifolds = Vec::new();
    for &(a, b, axis, separation) in input.contacts.iter().take(128) {
        let body_a = (a as usize % body_count) as u32;
        let body_b = (b as usize % body_count) as u32;
        if body_a == body_b {
            continue;
        }
        let normal = match axis % 3 {
            0 => Vec3A::X,
            1 => Vec3A::Y,
            _ => Vec3A::Z,
        };
        let mut manifold = ContactManifold::new(body_a, body_b);
        manifold.add_point(ContactPoint {
            local_a: -normal,
            local_b: normal,
            normal,
            separation: separation as f32 * 0.001,
        });
        manifolds.push(manifold);
    }

    let num_tasks = (input.num_tasks as usize % 8).max(1);
    let mut solver = ParallelSolver::new(SolverConfig { num_tasks }).unwrap();
    let params = StepParams {
        iterations: 4,
        ..StepParams::default()
    };

    let fixed_flags: Vec<bool> = bodies.iter().map(|b| !b.is_dynamic()).collect();
    solver
        .solve(&mut bodies, &manifolds, &[], &params)
        .expect("valid inputs must solve");

    for (body, was_fixed) in bodies.iter().zip(&fixed_flags) {
        assert!(body.linear_velocity.is_finite());
        assert!(body.angular_velocity.is_finite());
        if *was_fixed {
            assert_eq!(body.linear_velocity, Vec3A::ZERO);
            assert_eq!(body.angular_velocity, Vec3A::ZERO);
        }
    }
});
