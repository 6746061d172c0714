// Facial landmark geometry in image pixel space

use serde::{Deserialize, Serialize};

/// MediaPipe Face Mesh landmark count (without iris refinement)
pub const FACE_MESH_LANDMARKS: usize = 468;

/// MediaPipe Face Mesh indices used by the detectors.
///
/// Left/right follow MediaPipe naming, i.e. the subject's own side.
pub mod indices {
    /// Left eye contour
    pub const LEFT_EYE: [usize; 16] = [
        362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398,
    ];
    /// Right eye contour
    pub const RIGHT_EYE: [usize; 16] = [
        33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246,
    ];

    pub const NOSE_TIP: usize = 1;
    pub const RIGHT_EYE_OUTER: usize = 33;
    pub const LEFT_EYE_OUTER: usize = 263;
    pub const MOUTH_RIGHT: usize = 61;
    pub const MOUTH_LEFT: usize = 291;
    pub const CHIN: usize = 199;

    pub const UPPER_LIP_INNER: usize = 13;
    pub const LOWER_LIP_INNER: usize = 14;
    pub const FOREHEAD_TOP: usize = 10;
    pub const CHIN_BOTTOM: usize = 152;
}

// ==============================================================================
// Points and Faces
// ==============================================================================

/// A landmark in pixel coordinates. `z` keeps the provider's relative depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One detected face. Always carries the full mesh, also when deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point3>", into = "Vec<Point3>")]
pub struct FaceLandmarks {
    points: Vec<Point3>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<Point3>) -> Result<Self, LandmarkError> {
        if points.len() < FACE_MESH_LANDMARKS {
            return Err(LandmarkError::IncompleteFace {
                expected: FACE_MESH_LANDMARKS,
                actual: points.len(),
            });
        }
        Ok(Self { points })
    }

    /// Landmark by mesh index. Indices below `FACE_MESH_LANDMARKS` are always present.
    pub fn point(&self, index: usize) -> Point3 {
        self.points[index]
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    /// Landmarks for a list of indices, in the order given
    pub fn select(&self, indices: &[usize]) -> Vec<Point3> {
        indices.iter().map(|i| self.points[*i]).collect()
    }
}

impl TryFrom<Vec<Point3>> for FaceLandmarks {
    type Error = LandmarkError;

    fn try_from(points: Vec<Point3>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<FaceLandmarks> for Vec<Point3> {
    fn from(face: FaceLandmarks) -> Self {
        face.points
    }
}

/// All faces found in one frame, with the frame size they were scaled to.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub faces: Vec<FaceLandmarks>,
    pub width: u32,
    pub height: u32,
}

impl LandmarkSet {
    pub fn new(faces: Vec<FaceLandmarks>, width: u32, height: u32) -> Self {
        Self { faces, width, height }
    }

    /// Empty set for a frame in which no face was found
    pub fn empty(width: u32, height: u32) -> Self {
        Self::new(Vec::new(), width, height)
    }

    /// Build from provider output normalized to [0, 1]
    pub fn from_normalized(
        faces: Vec<Vec<(f32, f32, f32)>>,
        width: u32,
        height: u32,
    ) -> Result<Self, LandmarkError> {
        let w = width as f64;
        let h = height as f64;

        let faces = faces
            .into_iter()
            .map(|face| {
                let points = face
                    .into_iter()
                    .map(|(x, y, z)| Point3::new(x as f64 * w, y as f64 * h, z as f64 * w))
                    .collect();
                FaceLandmarks::new(points)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(faces, width, height))
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// The face the single-subject detectors look at
    pub fn primary(&self) -> Option<&FaceLandmarks> {
        self.faces.first()
    }
}

// ==============================================================================
// Provider Configuration
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    /// Faces the mesh model may return; must exceed 1 to notice extra people
    pub max_faces: u32,
    pub min_detection_confidence: f32,
    /// Directory holding the Python inference module (pyo3 backend only)
    pub python_dir: std::path::PathBuf,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            max_faces: 4,
            min_detection_confidence: 0.5,
            python_dir: std::path::PathBuf::from("python"),
        }
    }
}

// ==============================================================================
// Error Types
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LandmarkError {
    #[error("Landmark model not initialized")]
    NotInitialized,

    #[error("Model loading failed: {0}")]
    ModelLoadFailed(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Incomplete face mesh: expected {expected} landmarks, got {actual}")]
    IncompleteFace { expected: usize, actual: usize },
}

pub type LandmarkResult<T> = Result<T, LandmarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized_face(value: f32) -> Vec<(f32, f32, f32)> {
        vec![(value, value, 0.0); FACE_MESH_LANDMARKS]
    }

    #[test]
    fn test_from_normalized_scales_to_pixels() {
        let set = LandmarkSet::from_normalized(vec![normalized_face(0.5)], 640, 480).unwrap();
        assert_eq!(set.face_count(), 1);
        let nose = set.primary().unwrap().point(indices::NOSE_TIP);
        assert_eq!(nose.x, 320.0);
        assert_eq!(nose.y, 240.0);
    }

    #[test]
    fn test_incomplete_face_rejected() {
        let short = vec![(0.1, 0.1, 0.0); 10];
        let err = LandmarkSet::from_normalized(vec![short], 100, 100).unwrap_err();
        assert!(matches!(
            err,
            LandmarkError::IncompleteFace { expected: FACE_MESH_LANDMARKS, actual: 10 }
        ));
    }

    #[test]
    fn test_empty_set_has_no_primary_face() {
        let set = LandmarkSet::empty(640, 480);
        assert_eq!(set.face_count(), 0);
        assert!(set.primary().is_none());
    }

    #[test]
    fn test_deserialize_enforces_full_mesh() {
        let short = serde_json::json!({
            "faces": [vec![serde_json::json!({"x": 1.0, "y": 2.0, "z": 0.0}); 12]],
            "width": 640,
            "height": 480,
        });
        let err = serde_json::from_value::<LandmarkSet>(short).unwrap_err();
        assert!(err.to_string().contains("expected 468 landmarks, got 12"), "{}", err);

        let full = LandmarkSet::from_normalized(vec![normalized_face(0.25)], 640, 480).unwrap();
        let json = serde_json::to_string(&full).unwrap();
        let restored: LandmarkSet = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, full);
    }

    #[test]
    fn test_select_preserves_order() {
        let mut points = vec![Point3::new(0.0, 0.0, 0.0); FACE_MESH_LANDMARKS];
        points[33] = Point3::new(1.0, 2.0, 0.0);
        points[7] = Point3::new(3.0, 4.0, 0.0);
        let face = FaceLandmarks::new(points).unwrap();
        let selected = face.select(&[33, 7]);
        assert_eq!(selected[0], Point3::new(1.0, 2.0, 0.0));
        assert_eq!(selected[1], Point3::new(3.0, 4.0, 0.0));
    }
}
