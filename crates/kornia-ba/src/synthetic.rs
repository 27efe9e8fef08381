//! Synthetic scenes: world points, camera shots and their noisy observations.

use std::f64::consts::PI;

use glam::{DMat3, DVec2, DVec3};
use kornia_lie::se3::SE3F64;
use kornia_lie::so3::exp_so3;
use rand::Rng;

use crate::camera::CameraIntrinsics;
use crate::track::PointTrack;

/// A sample of the standard normal distribution (Box-Muller transform).
pub fn gaussian<R: Rng>(rng: &mut R) -> f64 {
    // clamp to avoid ln(0)
    let u1: f64 = rng.random::<f64>().max(1e-12);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// A vector of independent normal samples with standard deviation `sigma`.
pub fn gaussian_vec3<R: Rng>(rng: &mut R, sigma: f64) -> DVec3 {
    DVec3::new(gaussian(rng), gaussian(rng), gaussian(rng)) * sigma
}

/// The 8 corners of an axis aligned cube.
pub fn cube_points(center: DVec3, side: f64) -> Vec<DVec3> {
    let h = 0.5 * side;
    let mut points = Vec::with_capacity(8);
    for x in [-h, h] {
        for y in [-h, h] {
            for z in [-h, h] {
                points.push(center + DVec3::new(x, y, z));
            }
        }
    }
    points
}

/// Points uniformly distributed in the cube `center +- half_extent`.
pub fn random_points<R: Rng>(
    rng: &mut R,
    count: usize,
    center: DVec3,
    half_extent: f64,
) -> Vec<DVec3> {
    (0..count)
        .map(|_| {
            let u = DVec3::new(rng.random(), rng.random(), rng.random());
            center + (u * 2.0 - 1.0) * half_extent
        })
        .collect()
}

/// World-to-camera pose of a camera at `eye` looking at `target`.
///
/// The camera z axis points to the target, x to the right and y down, with `up` the world
/// direction shown upwards in the image.
pub fn look_at(eye: DVec3, target: DVec3, up: DVec3) -> SE3F64 {
    let forward = (target - eye).normalize();
    let right = forward.cross(up).normalize();
    let down = forward.cross(right);
    // columns are the camera axes in world coordinates
    let world_from_cam = DMat3::from_cols(right, down, forward);
    SE3F64::new(world_from_cam, eye).inverse()
}

/// Camera shots on a horizontal circle, every camera looking at the circle center.
///
/// Camera `i` is placed at `center + (radius * cos(a_i), radius * sin(a_i), ascent)`, the world z
/// axis is up.
pub fn circle_camera_shots(center: DVec3, radius: f64, ascent: f64, angles: &[f64]) -> Vec<SE3F64> {
    angles
        .iter()
        .map(|ang| {
            let eye = center + DVec3::new(radius * ang.cos(), radius * ang.sin(), ascent);
            look_at(eye, center, DVec3::Z)
        })
        .collect()
}

/// Project the points into every frame and collect the pixels into tracks.
///
/// Track `i` observes point `i`. A point behind a camera is not observed in that frame. Each pixel
/// is corrupted with Gaussian noise of standard deviation `noise_sigma`.
pub fn project_tracks<R: Rng>(
    rng: &mut R,
    intrinsics: &CameraIntrinsics,
    points: &[DVec3],
    frames: &[SE3F64],
    noise_sigma: f64,
) -> Vec<PointTrack> {
    points
        .iter()
        .enumerate()
        .map(|(track_id, point)| {
            let mut track = PointTrack::new(track_id, 0);
            track.corners = frames
                .iter()
                .map(|frame| {
                    let p_cam = frame.transform_point(*point);
                    (p_cam.z > 0.0).then(|| {
                        let noise = DVec2::new(gaussian(rng), gaussian(rng)) * noise_sigma;
                        intrinsics.project(p_cam) + noise
                    })
                })
                .collect();
            track
        })
        .collect()
}

/// Add Gaussian noise of standard deviation `sigma` to every point.
pub fn perturb_points<R: Rng>(rng: &mut R, points: &[DVec3], sigma: f64) -> Vec<DVec3> {
    points
        .iter()
        .map(|p| *p + gaussian_vec3(rng, sigma))
        .collect()
}

/// Rotate and translate every frame by Gaussian noise.
///
/// # Arguments
///
/// * `rotation_sigma` - Standard deviation of the axis-angle rotation noise in radians.
/// * `translation_sigma` - Standard deviation of the translation noise.
pub fn perturb_frames<R: Rng>(
    rng: &mut R,
    frames: &[SE3F64],
    rotation_sigma: f64,
    translation_sigma: f64,
) -> Vec<SE3F64> {
    frames
        .iter()
        .map(|frame| {
            let rot = exp_so3(gaussian_vec3(rng, rotation_sigma));
            SE3F64::new(rot * frame.r, frame.t + gaussian_vec3(rng, translation_sigma))
        })
        .collect()
}

/// A complete synthetic reconstruction problem with its ground truth.
#[derive(Debug, Clone)]
pub struct SyntheticScene {
    /// Camera intrinsics.
    pub intrinsics: CameraIntrinsics,
    /// Ground truth world points, point `i` is observed by track `i`.
    pub points: Vec<DVec3>,
    /// Ground truth world-to-camera frames.
    pub frames: Vec<SE3F64>,
    /// Noisy observations.
    pub tracks: Vec<PointTrack>,
}

impl SyntheticScene {
    /// Random points around the origin observed by cameras on a circle.
    ///
    /// # Arguments
    ///
    /// * `rng` - The random generator.
    /// * `intrinsics` - The camera intrinsics.
    /// * `points_count` - Number of points, drawn uniformly in the cube `[-1, 1]^3`.
    /// * `frames_count` - Number of cameras, spaced by `step` radians on a circle of radius
    ///   `radius` at height `radius / 4`.
    /// * `noise_sigma` - Standard deviation of the pixel noise.
    pub fn circle<R: Rng>(
        rng: &mut R,
        intrinsics: CameraIntrinsics,
        points_count: usize,
        frames_count: usize,
        radius: f64,
        step: f64,
        noise_sigma: f64,
    ) -> Self {
        let points = random_points(rng, points_count, DVec3::ZERO, 1.0);
        let angles: Vec<f64> = (0..frames_count).map(|i| i as f64 * step).collect();
        let frames = circle_camera_shots(DVec3::ZERO, radius, 0.25 * radius, &angles);
        let tracks = project_tracks(rng, &intrinsics, &points, &frames, noise_sigma);
        Self {
            intrinsics,
            points,
            frames,
            tracks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_look_at() {
        let eye = DVec3::new(5.0, 0.0, 1.0);
        let pose = look_at(eye, DVec3::ZERO, DVec3::Z);
        // the target is on the optical axis
        let target_cam = pose.transform_point(DVec3::ZERO);
        assert_relative_eq!(target_cam.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(target_cam.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(target_cam.z, eye.length(), epsilon = 1e-12);
        // the camera center maps to the origin
        assert!(pose.transform_point(eye).abs_diff_eq(DVec3::ZERO, 1e-12));
        // world up is image up, i.e. negative y
        let above = pose.transform_point(DVec3::new(0.0, 0.0, 1.0));
        assert!(above.y < 0.0);
        assert_relative_eq!(pose.r.determinant(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cube_points() {
        let pts = cube_points(DVec3::new(0.0, 0.0, 5.0), 2.0);
        assert_eq!(pts.len(), 8);
        let centroid = pts.iter().copied().sum::<DVec3>() / 8.0;
        assert!(centroid.abs_diff_eq(DVec3::new(0.0, 0.0, 5.0), 1e-12));
        assert!(pts.contains(&DVec3::new(1.0, 1.0, 6.0)));
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(42);
        let n = 20000;
        let samples: Vec<f64> = (0..n).map(|_| gaussian(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05);
        assert!((var - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_project_tracks_noise_free() {
        let mut rng = StdRng::seed_from_u64(0);
        let intrinsics = CameraIntrinsics::new(400.0, 400.0, 320.0, 240.0);
        let points = cube_points(DVec3::ZERO, 1.0);
        let frames = circle_camera_shots(DVec3::ZERO, 5.0, 1.0, &[0.0, 0.5]);
        let tracks = project_tracks(&mut rng, &intrinsics, &points, &frames, 0.0);

        assert_eq!(tracks.len(), 8);
        for (track, point) in tracks.iter().zip(points.iter()) {
            assert_eq!(track.observation_count(), 2);
            for (frame_ind, corner) in track.observations() {
                let expected = intrinsics.project(frames[frame_ind].transform_point(*point));
                assert_eq!(corner, expected);
            }
        }
    }

    #[test]
    fn test_points_behind_camera_are_hidden() {
        let mut rng = StdRng::seed_from_u64(0);
        let intrinsics = CameraIntrinsics::new(400.0, 400.0, 320.0, 240.0);
        let frames = vec![SE3F64::IDENTITY];
        let behind = [DVec3::new(0.0, 0.0, -1.0)];
        let tracks = project_tracks(&mut rng, &intrinsics, &behind, &frames, 0.0);
        assert_eq!(tracks[0].observation_count(), 0);
    }

    #[test]
    fn test_circle_scene() {
        let mut rng = StdRng::seed_from_u64(9);
        let intrinsics = CameraIntrinsics::new(400.0, 400.0, 320.0, 240.0);
        let scene = SyntheticScene::circle(&mut rng, intrinsics, 10, 4, 6.0, 0.2, 0.5);
        assert_eq!(scene.points.len(), 10);
        assert_eq!(scene.frames.len(), 4);
        assert!(scene.tracks.iter().all(|t| t.observation_count() == 4));
    }
}
