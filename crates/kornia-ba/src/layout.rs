use crate::config::UnityAxis;

/// Number of variables of a world point: `[X, Y, Z]`.
pub const POINT_VARS: usize = 3;

/// Number of variables of a camera frame: camera center `[Tx, Ty, Tz]` then rotation
/// `[Wx, Wy, Wz]`.
pub const FRAME_VARS: usize = 6;

/// Offset of the rotation variables inside a frame block.
pub const ROTATION_OFFSET: usize = 3;

/// Index table between the full parameter vector and the free (non gauge-fixed) frame parameters.
///
/// The full vector stacks all point variables followed by all frame variables:
/// `[X_0 .. X_{P-1}, F_0 .. F_{F-1}]`. Gauge normalization fixes the 6 variables of frame 0 and the
/// unity-axis component of frame 1's camera center, the remaining `6 * F - 7` frame variables are
/// free and are numbered consecutively in frame order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterLayout {
    points_count: usize,
    frames_count: usize,
    // free index of each frame variable, `None` for gauge-fixed ones
    frame_to_free: Vec<Option<usize>>,
    // frame variable (frame * FRAME_VARS + var) of each free index
    free_to_frame: Vec<usize>,
}

impl ParameterLayout {
    /// Build the layout of `points_count` points and `frames_count` frames.
    pub fn new(points_count: usize, frames_count: usize, unity_axis: UnityAxis) -> Self {
        let mut frame_to_free = vec![None; frames_count * FRAME_VARS];
        let mut free_to_frame = Vec::with_capacity((frames_count * FRAME_VARS).saturating_sub(7));

        for frame in 0..frames_count {
            for var in 0..FRAME_VARS {
                let fixed = frame == 0 || (frame == 1 && var == unity_axis.index());
                if fixed {
                    continue;
                }
                let flat = frame * FRAME_VARS + var;
                frame_to_free[flat] = Some(free_to_frame.len());
                free_to_frame.push(flat);
            }
        }

        Self {
            points_count,
            frames_count,
            frame_to_free,
            free_to_frame,
        }
    }

    /// Number of optimized points.
    pub fn points_count(&self) -> usize {
        self.points_count
    }

    /// Number of frames.
    pub fn frames_count(&self) -> usize {
        self.frames_count
    }

    /// Length of the full parameter vector, `3 * P + 6 * F`.
    pub fn full_len(&self) -> usize {
        POINT_VARS * self.points_count + FRAME_VARS * self.frames_count
    }

    /// Number of free frame variables, `6 * F - 7` for two or more frames.
    pub fn free_frame_len(&self) -> usize {
        self.free_to_frame.len()
    }

    /// Full index of the first variable of a point.
    #[inline]
    pub fn point_offset(&self, point: usize) -> usize {
        POINT_VARS * point
    }

    /// Full index of the first variable of a frame.
    #[inline]
    pub fn frame_offset(&self, frame: usize) -> usize {
        POINT_VARS * self.points_count + FRAME_VARS * frame
    }

    /// Free index of variable `var` of `frame`, `None` when it is fixed by the gauge.
    #[inline]
    pub fn free_index(&self, frame: usize, var: usize) -> Option<usize> {
        self.frame_to_free
            .get(frame * FRAME_VARS + var)
            .copied()
            .flatten()
    }

    /// `(frame, var)` of a free index.
    #[inline]
    pub fn frame_var(&self, free: usize) -> (usize, usize) {
        let flat = self.free_to_frame[free];
        (flat / FRAME_VARS, flat % FRAME_VARS)
    }

    /// Whether variable `var` of `frame` is fixed by the gauge.
    #[inline]
    pub fn is_fixed(&self, frame: usize, var: usize) -> bool {
        self.free_index(frame, var).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_counts() {
        let layout = ParameterLayout::new(8, 3, UnityAxis::Y);
        assert_eq!(layout.full_len(), 8 * 3 + 3 * 6);
        assert_eq!(layout.free_frame_len(), 3 * 6 - 7);
        assert_eq!(layout.frame_offset(0), 24);
        assert_eq!(layout.frame_offset(2), 36);
    }

    #[test]
    fn test_layout_fixed_entries() {
        let layout = ParameterLayout::new(1, 3, UnityAxis::X);
        for var in 0..FRAME_VARS {
            assert!(layout.is_fixed(0, var));
            assert!(!layout.is_fixed(2, var));
        }
        assert!(layout.is_fixed(1, 0));
        assert!(!layout.is_fixed(1, 1));
        assert_eq!(layout.free_index(1, 1), Some(0));
        assert_eq!(layout.free_index(2, 0), Some(5));
    }

    #[test]
    fn test_layout_roundtrip() {
        let layout = ParameterLayout::new(2, 4, UnityAxis::Y);
        for free in 0..layout.free_frame_len() {
            let (frame, var) = layout.frame_var(free);
            assert_eq!(layout.free_index(frame, var), Some(free));
        }
    }
}
