use std::collections::HashSet;

use glam::{DVec2, DVec3};
use kornia_lie::se3::SE3F64;

use crate::camera::CameraIntrinsics;
use crate::error::BundleAdjustmentError;
use crate::track::PointTrack;

/// The immutable part of one bundle adjustment invocation.
///
/// Points are renumbered densely: point `i` of the problem is the world point of track
/// `track_ids[i]`.
#[derive(Debug, Clone)]
pub struct BundleAdjustmentProblem {
    /// Camera intrinsics shared by all frames.
    pub intrinsics: CameraIntrinsics,
    /// Track identifier of each optimized point.
    pub track_ids: Vec<usize>,
    /// `(frame, pixel)` observations of each optimized point.
    pub observations: Vec<Vec<(usize, DVec2)>>,
    /// Number of camera frames.
    pub frames_count: usize,
}

/// The mutable part of one bundle adjustment invocation.
///
/// Snapshots are taken by cloning the state and restored by value.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationState {
    /// Position of each optimized point.
    pub points: Vec<DVec3>,
    /// World-to-camera transformation of each frame.
    pub frames: Vec<SE3F64>,
}

impl BundleAdjustmentProblem {
    /// Collect the optimized points from the caller's tracks and world points.
    ///
    /// Tracks without a world point or without observations are skipped.
    ///
    /// # Arguments
    ///
    /// * `tracks` - The point tracks, `track_id` indexes `world_points`.
    /// * `intrinsics` - The camera intrinsics.
    /// * `world_points` - The world points, `None` when not triangulated.
    /// * `frames` - The world-to-camera transformation of each frame.
    ///
    /// # Returns
    ///
    /// The problem and its initial state.
    pub fn from_tracks(
        tracks: &[PointTrack],
        intrinsics: &CameraIntrinsics,
        world_points: &[Option<DVec3>],
        frames: &[SE3F64],
    ) -> Result<(Self, OptimizationState), BundleAdjustmentError> {
        let mut track_ids = Vec::new();
        let mut observations = Vec::new();
        let mut points = Vec::new();
        let mut seen = HashSet::new();

        for track in tracks {
            let Some(point) = world_points.get(track.track_id).ok_or_else(|| {
                BundleAdjustmentError::TrackOutOfRange {
                    track_id: track.track_id,
                    reason: format!("only {} world points", world_points.len()),
                }
            })?
            else {
                continue;
            };

            if !seen.insert(track.track_id) {
                return Err(BundleAdjustmentError::TrackOutOfRange {
                    track_id: track.track_id,
                    reason: "duplicate track id".to_string(),
                });
            }

            let obs: Vec<(usize, DVec2)> = track.observations().collect();
            if let Some((frame, _)) = obs.iter().find(|(frame, _)| *frame >= frames.len()) {
                return Err(BundleAdjustmentError::TrackOutOfRange {
                    track_id: track.track_id,
                    reason: format!("observed in frame {frame}, only {} frames", frames.len()),
                });
            }
            if obs.is_empty() {
                log::debug!("track {} has no observations, skipped", track.track_id);
                continue;
            }

            track_ids.push(track.track_id);
            observations.push(obs);
            points.push(*point);
        }

        if points.is_empty() {
            return Err(BundleAdjustmentError::NoPoints);
        }

        let problem = Self {
            intrinsics: *intrinsics,
            track_ids,
            observations,
            frames_count: frames.len(),
        };
        let state = OptimizationState {
            points,
            frames: frames.to_vec(),
        };
        Ok((problem, state))
    }

    /// Number of optimized points.
    pub fn points_count(&self) -> usize {
        self.track_ids.len()
    }

    /// Total number of `(point, frame)` observations.
    pub fn observations_count(&self) -> usize {
        self.observations.iter().map(Vec::len).sum()
    }
}

impl OptimizationState {
    /// Copy the state into the caller's world points and frames.
    pub fn write_back(
        &self,
        problem: &BundleAdjustmentProblem,
        world_points: &mut [Option<DVec3>],
        frames: &mut [SE3F64],
    ) {
        for (track_id, point) in problem.track_ids.iter().zip(self.points.iter()) {
            world_points[*track_id] = Some(*point);
        }
        frames.copy_from_slice(&self.frames);
    }

    /// Whether every point and frame is finite.
    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.is_finite()) && self.frames.iter().all(|f| f.is_finite())
    }
}
