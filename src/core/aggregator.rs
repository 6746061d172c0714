// Violation aggregator
// Runs the registered detectors whose policy flags are enabled and collects
// their signals into a single verdict.

use crate::core::detectors::{
    DetectionInput, Detector, DetectorThresholds, FaceCountDetector, GazeDetector,
    HeadPoseDetector, MouthDetector, SubstitutionCheck,
};
use crate::models::frame::Frame;
use crate::models::landmarks::LandmarkSet;
use crate::models::policy::Policy;
use crate::models::verdict::Verdict;

pub struct ViolationAggregator {
    detectors: Vec<Box<dyn Detector>>,
}

impl ViolationAggregator {
    /// Aggregator with the standard detector set
    pub fn new(thresholds: &DetectorThresholds) -> Self {
        Self::with_detectors(vec![
            Box::new(FaceCountDetector::new()),
            Box::new(SubstitutionCheck::new()),
            Box::new(GazeDetector::new(thresholds.luminance_cutoff)),
            Box::new(MouthDetector::new(thresholds.mouth_ratio_threshold)),
            Box::new(HeadPoseDetector::new(thresholds.head_pose_threshold_deg)),
        ])
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    pub fn register(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push(detector);
    }

    /// Evaluate one frame under `policy`.
    ///
    /// Only detectors owning at least one enabled kind run, and only enabled
    /// kinds are written to the verdict. Zero faces is a normal input.
    pub fn check(&self, frame: &Frame, landmarks: &LandmarkSet, policy: &Policy) -> Verdict {
        let input = DetectionInput { frame, landmarks };
        let mut verdict = Verdict::default();

        for detector in &self.detectors {
            if !detector.kinds().iter().any(|kind| policy.is_enabled(*kind)) {
                continue;
            }

            for (kind, value) in detector.detect(&input) {
                if policy.is_enabled(kind) {
                    verdict.set(kind, Some(value));
                }
            }
        }

        tracing::debug!(
            faces = landmarks.face_count(),
            violations = ?verdict.violations(),
            "frame checked"
        );

        verdict
    }
}
