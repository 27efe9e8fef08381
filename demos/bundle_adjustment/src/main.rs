use argh::FromArgs;
use std::path::PathBuf;

use glam::DVec3;
use kornia::ba::{
    self, bundle_adjust, reprojection_error, synthetic::SyntheticScene, BundleAdjustmentConfig,
    CameraIntrinsics, UnityAxis,
};
use kornia::linalg::umeyama;
use rand::{rngs::StdRng, SeedableRng};

#[derive(FromArgs)]
/// Bundle adjustment of a synthetic scene observed by cameras on a circle
struct Args {
    /// number of camera frames
    #[argh(option, default = "5")]
    num_frames: usize,

    /// number of world points
    #[argh(option, default = "50")]
    num_points: usize,

    /// standard deviation of the pixel noise
    #[argh(option, default = "0.5")]
    noise: f64,

    /// standard deviation of the initial point and camera translation error
    #[argh(option, default = "0.05")]
    perturbation: f64,

    /// seed of the random generator
    #[argh(option, default = "42")]
    seed: u64,

    /// path to a JSON file with the optimizer configuration
    #[argh(option)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        // the cameras move tangentially to the circle, i.e. along their x axis
        None => BundleAdjustmentConfig::default().with_unity(UnityAxis::X, 1.0),
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let intrinsics = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0);
    let scene = SyntheticScene::circle(
        &mut rng,
        intrinsics,
        args.num_points,
        args.num_frames,
        6.0,
        0.15,
        args.noise,
    );
    println!(
        "Scene: #{} points, #{} frames",
        scene.points.len(),
        scene.frames.len()
    );

    // initial guess: noisy poses and points triangulated from them
    let mut frames = ba::synthetic::perturb_frames(
        &mut rng,
        &scene.frames,
        0.1 * args.perturbation,
        args.perturbation,
    );
    let mut world_points = ba::triangulate_tracks(&scene.tracks, &scene.intrinsics, &frames);
    log::info!(
        "triangulated {} of {} tracks",
        world_points.iter().flatten().count(),
        scene.tracks.len()
    );

    let initial = reprojection_error(&scene.tracks, &scene.intrinsics, &world_points, &frames)?;
    println!(
        "Initial reprojection error: total {:.4} mean {:?}",
        initial.total, initial.mean
    );

    let result = bundle_adjust(
        &scene.tracks,
        &scene.intrinsics,
        &mut world_points,
        &mut frames,
        &config,
    )?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    // distance to the ground truth after removing the gauge
    let (estimated, truth): (Vec<DVec3>, Vec<DVec3>) = world_points
        .iter()
        .zip(scene.points.iter())
        .filter_map(|(e, t)| e.map(|e| (e, *t)))
        .unzip();
    let alignment = umeyama(&estimated, &truth)?;
    let rmse = (estimated
        .iter()
        .zip(truth.iter())
        .map(|(e, t)| (alignment.transform_point(*e) - *t).length_squared())
        .sum::<f64>()
        / estimated.len().max(1) as f64)
        .sqrt();
    println!("Point RMSE after similarity alignment: {rmse:.6}");

    Ok(())
}
