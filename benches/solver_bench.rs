//! Benchmarks for ALICE-Solver
//!
//! Run with: `cargo bench` (add `--features parallel` for the threaded
//! solve paths).

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use alice_solver::math::Vec3A;
use alice_solver::prelude::*;

/// Build a grid of sphere columns resting on one fixed floor: plenty of
/// conflicts inside each column, none across columns.
fn stacked_scene(
    columns: usize,
    height: usize,
) -> (Vec<RigidBodyState>, Vec<ContactManifold>) {
    let mut bodies = vec![RigidBodyState::fixed(Vec3A::ZERO)];
    let mut manifolds = Vec::new();

    for col in 0..columns {
        let x = col as f32 * 4.0;
        let mut below = 0u32; // floor
        for level in 0..height {
            let mut body = RigidBodyState::active_sphere(
                Vec3A::new(x, 1.0 + 2.0 * level as f32, 0.0),
                1.0,
                1.0,
            );
            body.linear_velocity = Vec3A::new(0.0, -1.0, 0.0);
            let id = bodies.len() as u32;
            bodies.push(body);

            let mut manifold = ContactManifold::new(id, below);
            manifold.add_point(ContactPoint {
                local_a: Vec3A::new(0.0, -1.0, 0.0),
                local_b: if below == 0 {
                    Vec3A::new(x, 0.0, 0.0)
                } else {
                    Vec3A::new(0.0, 1.0, 0.0)
                },
                normal: Vec3A::new(0.0, 1.0, 0.0),
                separation: -0.002,
            });
            manifolds.push(manifold);
            below = id;
        }
    }
    (bodies, manifolds)
}

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");

    for &tasks in &[1usize, 4] {
        group.bench_function(format!("columns_32x8_tasks_{tasks}"), |b| {
            let (bodies, manifolds) = stacked_scene(32, 8);
            let mut solver = ParallelSolver::new(SolverConfig { num_tasks: tasks }).unwrap();
            let params = StepParams {
                iterations: 8,
                ..StepParams::default()
            };
            b.iter(|| {
                let mut bodies = bodies.clone();
                solver
                    .solve(black_box(&mut bodies), &manifolds, &[], &params)
                    .unwrap();
                bodies[1].linear_velocity
            });
        });
    }

    group.finish();
}

fn bench_partitioner(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_constraints");

    // Chain graph: maximally conflicting neighbor pairs.
    let pairs: Vec<ConstraintPair> = (0..1024u32)
        .map(|i| ConstraintPair {
            body_a: i,
            body_b: i + 1,
            payload: i,
            row_start: i * 3,
            row_count: 3,
            motion_a: MOTION_MASK_DYNAMIC,
            motion_b: MOTION_MASK_DYNAMIC,
            active: true,
            friction: 0.5,
        })
        .collect();

    group.bench_function("chain_1024_tasks_4", |b| {
        let mut scratch = SplitScratch::default();
        let mut out = ParallelGroup::default();
        b.iter(|| {
            split_constraints(black_box(&pairs), 1025, 4, &mut scratch, &mut out);
            out.num_phases()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_solve, bench_partitioner);
criterion_main!(benches);
