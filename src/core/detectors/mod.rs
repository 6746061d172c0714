// Signal detectors
// Each detector turns one frame plus its landmarks into boolean signals for
// the violation kinds it owns. Detectors are pure and keep no state between calls.

pub mod face_count;
pub mod gaze;
pub mod head_pose;
pub mod mouth;
pub mod substitution;

use crate::models::frame::Frame;
use crate::models::landmarks::LandmarkSet;
use crate::models::policy::ViolationKind;
use serde::{Deserialize, Serialize};

pub use face_count::FaceCountDetector;
pub use gaze::{GazeDetector, GazeDirection};
pub use head_pose::{HeadDirection, HeadPose, HeadPoseDetector};
pub use mouth::MouthDetector;
pub use substitution::SubstitutionCheck;

/// Everything a detector may look at for one frame
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    pub frame: &'a Frame,
    pub landmarks: &'a LandmarkSet,
}

/// A violation classifier over a single frame
pub trait Detector: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Violation kinds this detector reports on
    fn kinds(&self) -> &'static [ViolationKind];

    /// Evaluate the frame. Returns one entry per kind in `kinds()`;
    /// callers discard the entries whose policy flag is off.
    fn detect(&self, input: &DetectionInput<'_>) -> Vec<(ViolationKind, bool)>;
}

// ==============================================================================
// Thresholds
// ==============================================================================

/// Tunable detector constants. Values are empirical, not physically derived.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorThresholds {
    /// Pixels at or below this luminance count as pupil/iris
    pub luminance_cutoff: u8,
    /// Yaw/pitch magnitude in degrees beyond which the head is turned away
    pub head_pose_threshold_deg: f64,
    /// Inter-lip to head-height ratio (x100) at which the mouth counts as open
    pub mouth_ratio_threshold: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            luminance_cutoff: 70,
            head_pose_threshold_deg: 10.0,
            mouth_ratio_threshold: 2.0,
        }
    }
}
