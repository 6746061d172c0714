// Face-count detector: absence and extra person from one count

use super::{DetectionInput, Detector};
use crate::models::policy::ViolationKind;

#[derive(Debug, Default)]
pub struct FaceCountDetector;

impl FaceCountDetector {
    pub fn new() -> Self {
        Self
    }

    /// (absence, extra person) for a given number of faces
    pub fn classify(count: usize) -> (bool, bool) {
        (count == 0, count > 1)
    }
}

impl Detector for FaceCountDetector {
    fn name(&self) -> &'static str {
        "face_count"
    }

    fn kinds(&self) -> &'static [ViolationKind] {
        &[ViolationKind::AbsencePerson, ViolationKind::ExtraPerson]
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<(ViolationKind, bool)> {
        let count = input.landmarks.face_count();
        let (absent, extra) = Self::classify(count);
        tracing::debug!(faces = count, "face count");
        vec![
            (ViolationKind::AbsencePerson, absent),
            (ViolationKind::ExtraPerson, extra),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detectors::test_support::{face_with_eyes, frame_with_pupils, HEIGHT, WIDTH};
    use crate::models::landmarks::LandmarkSet;

    #[test]
    fn test_classify_counts() {
        assert_eq!(FaceCountDetector::classify(0), (true, false));
        assert_eq!(FaceCountDetector::classify(1), (false, false));
        assert_eq!(FaceCountDetector::classify(2), (false, true));
        assert_eq!(FaceCountDetector::classify(5), (false, true));
    }

    #[test]
    fn test_detect_two_faces() {
        let frame = frame_with_pupils(None, None);
        let landmarks = LandmarkSet::new(vec![face_with_eyes(), face_with_eyes()], WIDTH, HEIGHT);
        let input = DetectionInput { frame: &frame, landmarks: &landmarks };
        let out = FaceCountDetector::new().detect(&input);
        assert_eq!(
            out,
            vec![
                (ViolationKind::AbsencePerson, false),
                (ViolationKind::ExtraPerson, true),
            ]
        );
    }
}
