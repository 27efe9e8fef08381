use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use kornia_ba::{
    bundle_adjust,
    derivatives::compute_derivatives,
    layout::ParameterLayout,
    normalize::GaugeNormalizer,
    problem::{BundleAdjustmentProblem, OptimizationState},
    solver::solve_corrections,
    synthetic::{self, SyntheticScene},
    BundleAdjustmentConfig, CameraIntrinsics, UnityAxis,
};
use rand::{rngs::StdRng, SeedableRng};

const FRAMES: usize = 8;

fn scene(points: usize) -> (SyntheticScene, Vec<Option<DVec3>>, Vec<kornia_lie::se3::SE3F64>) {
    let mut rng = StdRng::seed_from_u64(0);
    let intrinsics = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
    let scene = SyntheticScene::circle(&mut rng, intrinsics, points, FRAMES, 6.0, 0.1, 0.5);
    let world = synthetic::perturb_points(&mut rng, &scene.points, 0.05)
        .into_iter()
        .map(Some)
        .collect();
    let frames = synthetic::perturb_frames(&mut rng, &scene.frames, 0.005, 0.02);
    (scene, world, frames)
}

fn normalized(
    scene: &SyntheticScene,
    world: &[Option<DVec3>],
    frames: &[kornia_lie::se3::SE3F64],
) -> (BundleAdjustmentProblem, ParameterLayout, OptimizationState) {
    let (problem, mut state) =
        BundleAdjustmentProblem::from_tracks(&scene.tracks, &scene.intrinsics, world, frames)
            .unwrap();
    GaugeNormalizer::new(UnityAxis::X, 1.0)
        .normalize(&mut state)
        .unwrap();
    let layout = ParameterLayout::new(problem.points_count(), problem.frames_count, UnityAxis::X);
    (problem, layout, state)
}

fn bench_derivatives(c: &mut Criterion) {
    let mut group = c.benchmark_group("derivatives");
    for points in [50, 200, 800] {
        let (scene, world, frames) = scene(points);
        let (problem, layout, state) = normalized(&scene, &world, &frames);
        group.bench_with_input(BenchmarkId::new("compute", points), &points, |b, _| {
            b.iter(|| black_box(compute_derivatives(&problem, &layout, &state)))
        });

        let buffers = compute_derivatives(&problem, &layout, &state).unwrap();
        group.bench_with_input(BenchmarkId::new("schur_solve", points), &points, |b, _| {
            b.iter(|| black_box(solve_corrections(&problem, &layout, &buffers, 1e-4)))
        });
    }
    group.finish();
}

fn bench_bundle_adjust(c: &mut Criterion) {
    let mut group = c.benchmark_group("bundle_adjust");
    group.sample_size(10);
    let config = BundleAdjustmentConfig::default().with_unity(UnityAxis::X, 1.0);
    for points in [50, 200] {
        let (scene, world, frames) = scene(points);
        group.bench_with_input(BenchmarkId::new("circle", points), &points, |b, _| {
            b.iter(|| {
                let mut world = world.clone();
                let mut frames = frames.clone();
                black_box(bundle_adjust(
                    &scene.tracks,
                    &scene.intrinsics,
                    &mut world,
                    &mut frames,
                    &config,
                ))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_derivatives, bench_bundle_adjust);
criterion_main!(benches);
