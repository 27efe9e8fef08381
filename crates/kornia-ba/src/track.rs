use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::BundleAdjustmentError;

/// Pixel observations of one world point across consecutive frames.
///
/// The track starts at `start_frame` and stores one optional corner per frame from there on. A
/// missing corner means the point was not detected in that frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointTrack {
    /// Identifier of the track, also the index of its world point.
    pub track_id: usize,
    /// Index of the first frame covered by `corners`.
    pub start_frame: usize,
    /// Corner of each frame, starting at `start_frame`.
    pub corners: Vec<Option<DVec2>>,
}

impl PointTrack {
    /// Create an empty track.
    pub fn new(track_id: usize, start_frame: usize) -> Self {
        Self {
            track_id,
            start_frame,
            corners: Vec::new(),
        }
    }

    /// Create a track from `(frame, corner)` pairs.
    ///
    /// The start frame is the smallest frame index of the pairs.
    pub fn from_observations<I>(track_id: usize, observations: I) -> Self
    where
        I: IntoIterator<Item = (usize, DVec2)>,
    {
        let mut observations: Vec<(usize, DVec2)> = observations.into_iter().collect();
        observations.sort_by_key(|(frame, _)| *frame);

        let start_frame = observations.first().map(|(f, _)| *f).unwrap_or(0);
        let mut track = Self::new(track_id, start_frame);
        for (frame, corner) in observations {
            track.set_corner(frame, corner);
        }
        track
    }

    /// Record the corner detected in `frame`.
    ///
    /// Frames between the last recorded one and `frame` are marked as missing.
    pub fn add_corner(&mut self, frame: usize, corner: DVec2) -> Result<(), BundleAdjustmentError> {
        if frame < self.start_frame {
            return Err(BundleAdjustmentError::TrackOutOfRange {
                track_id: self.track_id,
                reason: format!(
                    "frame {frame} precedes the start frame {}",
                    self.start_frame
                ),
            });
        }
        self.set_corner(frame, corner);
        Ok(())
    }

    fn set_corner(&mut self, frame: usize, corner: DVec2) {
        let local = frame - self.start_frame;
        if local >= self.corners.len() {
            self.corners.resize(local + 1, None);
        }
        self.corners[local] = Some(corner);
    }

    /// The corner detected in `frame`, if any.
    pub fn corner(&self, frame: usize) -> Option<DVec2> {
        let local = frame.checked_sub(self.start_frame)?;
        self.corners.get(local).copied().flatten()
    }

    /// Index one past the last frame covered by the track.
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.corners.len()
    }

    /// Iterate over `(frame, corner)` pairs of the frames where the point was detected.
    pub fn observations(&self) -> impl Iterator<Item = (usize, DVec2)> + '_ {
        self.corners
            .iter()
            .enumerate()
            .filter_map(move |(i, c)| c.map(|c| (self.start_frame + i, c)))
    }

    /// Number of frames where the point was detected.
    pub fn observation_count(&self) -> usize {
        self.corners.iter().filter(|c| c.is_some()).count()
    }
}
