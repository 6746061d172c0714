// Mouth-aperture detector

use super::{DetectionInput, Detector};
use crate::core::geometry::distance;
use crate::models::landmarks::{indices, FaceLandmarks};
use crate::models::policy::ViolationKind;

pub struct MouthDetector {
    ratio_threshold: f64,
}

impl MouthDetector {
    pub fn new(ratio_threshold: f64) -> Self {
        Self { ratio_threshold }
    }

    /// Inner-lip gap as a percentage of head height.
    /// `None` when the head height collapses to zero.
    pub fn aperture_ratio(face: &FaceLandmarks) -> Option<f64> {
        let gap = distance(
            face.point(indices::UPPER_LIP_INNER),
            face.point(indices::LOWER_LIP_INNER),
        );
        let head = distance(
            face.point(indices::FOREHEAD_TOP),
            face.point(indices::CHIN_BOTTOM),
        );
        if head <= f64::EPSILON {
            return None;
        }
        Some(gap * 100.0 / head)
    }
}

impl Detector for MouthDetector {
    fn name(&self) -> &'static str {
        "mouth"
    }

    fn kinds(&self) -> &'static [ViolationKind] {
        &[ViolationKind::MouthOpening]
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<(ViolationKind, bool)> {
        // Unlike gaze and head pose, a missing face is not a violation here.
        // Kept as-is until product decides which behaviour is intended.
        let Some(face) = input.landmarks.primary() else {
            return vec![(ViolationKind::MouthOpening, false)];
        };

        let violation = match Self::aperture_ratio(face) {
            Some(ratio) => {
                tracing::debug!(ratio, threshold = self.ratio_threshold, "mouth aperture");
                ratio >= self.ratio_threshold
            }
            None => false,
        };

        vec![(ViolationKind::MouthOpening, violation)]
    }
}
