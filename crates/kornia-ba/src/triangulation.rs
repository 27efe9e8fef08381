use glam::{DMat3, DVec3};
use kornia_lie::se3::SE3F64;
use kornia_linalg::invert3x3;

use crate::camera::CameraIntrinsics;
use crate::error::BundleAdjustmentError;
use crate::track::PointTrack;

/// Triangulate the world point of a track by linear least squares.
///
/// Every observation `(x, y)` in a frame with projection matrix `P = K * [R | T]` contributes the
/// two linear equations `x * P_2 - f0 * P_0` and `y * P_2 - f0 * P_1` in the homogeneous point.
/// The overdetermined system is solved through its normal equations.
///
/// # Arguments
///
/// * `track` - The track to triangulate, observed in at least 2 frames.
/// * `intrinsics` - The camera intrinsics.
/// * `frames` - The world-to-camera transformation of each frame.
///
/// # Returns
///
/// The world point.
pub fn triangulate_track(
    track: &PointTrack,
    intrinsics: &CameraIntrinsics,
    frames: &[SE3F64],
) -> Result<DVec3, BundleAdjustmentError> {
    let f0 = intrinsics.f0;
    let mut ata = DMat3::ZERO;
    let mut atb = DVec3::ZERO;
    let mut count = 0;

    for (frame_ind, corner) in track.observations() {
        let frame = frames
            .get(frame_ind)
            .ok_or_else(|| BundleAdjustmentError::TrackOutOfRange {
                track_id: track.track_id,
                reason: format!("observed in frame {frame_ind}, only {} frames", frames.len()),
            })?;
        let p = intrinsics.projection_matrix(frame);

        for (coord, row) in [(corner.x, 0), (corner.y, 1)] {
            let a = DVec3::new(
                coord * p[2][0] - f0 * p[row][0],
                coord * p[2][1] - f0 * p[row][1],
                coord * p[2][2] - f0 * p[row][2],
            );
            let b = -(coord * p[2][3] - f0 * p[row][3]);
            ata += DMat3::from_cols(a * a.x, a * a.y, a * a.z);
            atb += a * b;
        }
        count += 1;
    }

    if count < 2 {
        return Err(BundleAdjustmentError::Triangulation {
            track_id: track.track_id,
            reason: format!("observed in {count} frames, need at least 2"),
        });
    }

    let inv = invert3x3(&ata).map_err(|err| BundleAdjustmentError::Triangulation {
        track_id: track.track_id,
        reason: err.to_string(),
    })?;

    Ok(inv * atb)
}

/// Triangulate every track observed in at least 2 frames.
///
/// # Returns
///
/// The world points indexed by track id, `None` for tracks which cannot be triangulated.
pub fn triangulate_tracks(
    tracks: &[PointTrack],
    intrinsics: &CameraIntrinsics,
    frames: &[SE3F64],
) -> Vec<Option<DVec3>> {
    let len = tracks.iter().map(|t| t.track_id + 1).max().unwrap_or(0);
    let mut points = vec![None; len];

    for track in tracks {
        match triangulate_track(track, intrinsics, frames) {
            Ok(point) => points[track.track_id] = Some(point),
            Err(err) => log::debug!("skipping track {}: {err}", track.track_id),
        }
    }

    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    fn setup() -> (CameraIntrinsics, Vec<SE3F64>) {
        let intrinsics = CameraIntrinsics::new(500.0, 500.0, 320.0, 240.0).with_f0(600.0);
        let frames = vec![
            SE3F64::IDENTITY,
            SE3F64::from_axis_angle(DVec3::new(0.0, -0.1, 0.0), DVec3::new(-1.0, 0.0, 0.0)),
            SE3F64::from_axis_angle(DVec3::new(0.1, 0.0, 0.0), DVec3::new(0.0, -1.0, 0.2)),
        ];
        (intrinsics, frames)
    }

    #[test]
    fn test_triangulate_exact() -> Result<(), BundleAdjustmentError> {
        let (intrinsics, frames) = setup();
        let point = DVec3::new(0.3, -0.4, 6.0);
        let track = PointTrack::from_observations(
            7,
            frames
                .iter()
                .enumerate()
                .map(|(i, f)| (i, intrinsics.project(f.transform_point(point)))),
        );
        let estimated = triangulate_track(&track, &intrinsics, &frames)?;
        assert!(estimated.abs_diff_eq(point, 1e-6));
        Ok(())
    }

    #[test]
    fn test_triangulate_single_view() {
        let (intrinsics, frames) = setup();
        let track = PointTrack::from_observations(0, vec![(1, DVec2::new(300.0, 200.0))]);
        assert!(matches!(
            triangulate_track(&track, &intrinsics, &frames),
            Err(BundleAdjustmentError::Triangulation { .. })
        ));
    }

    #[test]
    fn test_triangulate_tracks() {
        let (intrinsics, frames) = setup();
        let point = DVec3::new(-0.2, 0.1, 5.0);
        let obs = |frames_ind: &[usize]| {
            frames_ind
                .iter()
                .map(|i| (*i, intrinsics.project(frames[*i].transform_point(point))))
                .collect::<Vec<_>>()
        };
        let tracks = vec![
            PointTrack::from_observations(0, obs(&[0, 2])),
            PointTrack::from_observations(2, obs(&[1])),
        ];
        let points = triangulate_tracks(&tracks, &intrinsics, &frames);
        assert_eq!(points.len(), 3);
        assert!(points[0].is_some_and(|p| p.abs_diff_eq(point, 1e-6)));
        assert!(points[1].is_none());
        assert!(points[2].is_none());
    }
}
