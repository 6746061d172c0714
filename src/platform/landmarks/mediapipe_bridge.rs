// MediaPipe Face Mesh bridge
// Abstracts the landmark model behind a trait so detectors never depend on a
// particular inference runtime. The PyO3 backend runs the Python MediaPipe
// package; without it a dummy provider reports no faces.

use crate::models::frame::Frame;
use crate::models::landmarks::{LandmarkConfig, LandmarkError, LandmarkResult, LandmarkSet};

/// Face landmark provider
pub trait LandmarkProvider: Send + Sync {
    /// Initialize the model
    fn new(config: &LandmarkConfig) -> LandmarkResult<Self>
    where
        Self: Sized;

    /// Find every face in the frame, in pixel coordinates
    fn detect(&self, frame: &Frame) -> LandmarkResult<LandmarkSet>;

    /// Check if the model is loaded
    fn is_initialized(&self) -> bool;

    fn model_info(&self) -> String;
}

/// Normalized face mesh as returned by the inference module
#[derive(Debug, Clone, Default, serde::Deserialize)]
struct MeshOutput {
    #[serde(default)]
    faces: Vec<Vec<MeshPoint>>,
}

#[derive(Debug, Clone, Copy, serde::Deserialize)]
struct MeshPoint {
    x: f32,
    y: f32,
    #[serde(default)]
    z: f32,
}

/// Parse the inference module's JSON into a landmark set for a `width` x `height` frame
fn parse_mesh_output(json: &str, width: u32, height: u32) -> LandmarkResult<LandmarkSet> {
    let output: MeshOutput = serde_json::from_str(json)
        .map_err(|e| LandmarkError::InferenceFailed(format!("Failed to parse JSON: {}", e)))?;

    let faces = output
        .faces
        .into_iter()
        .map(|face| face.into_iter().map(|p| (p.x, p.y, p.z)).collect())
        .collect();

    LandmarkSet::from_normalized(faces, width, height)
}

// ==============================================================================
// PyO3 Implementation (Python MediaPipe)
// ==============================================================================

#[cfg(feature = "ml-pyo3")]
pub mod pyo3_backend {
    use super::*;
    use pyo3::prelude::*;
    use pyo3::types::{PyBytes, PyDict, PyModule};

    pub struct PyO3FaceMesh {
        inference_module: Py<PyModule>,
        config: LandmarkConfig,
    }

    impl LandmarkProvider for PyO3FaceMesh {
        fn new(config: &LandmarkConfig) -> LandmarkResult<Self> {
            Python::with_gil(|py| {
                let sys = py.import_bound("sys").map_err(|e| {
                    LandmarkError::ModelLoadFailed(format!("Failed to import sys: {}", e))
                })?;

                let python_dir = config.python_dir.to_str().ok_or_else(|| {
                    LandmarkError::ModelLoadFailed(
                        "Python directory is not valid UTF-8".to_string(),
                    )
                })?;

                sys.getattr("path")
                    .and_then(|path| path.call_method1("insert", (0, python_dir)))
                    .map_err(|e| {
                        LandmarkError::ModelLoadFailed(format!(
                            "Failed to add python dir to path: {}",
                            e
                        ))
                    })?;

                let inference_module = py.import_bound("face_mesh_inference").map_err(|e| {
                    LandmarkError::ModelLoadFailed(format!(
                        "Failed to import face_mesh_inference: {}. \
                         Make sure the mediapipe package is installed",
                        e
                    ))
                })?;

                tracing::info!(
                    max_faces = config.max_faces,
                    min_detection_confidence = config.min_detection_confidence,
                    "PyO3 face mesh initialized"
                );

                Ok(Self {
                    inference_module: inference_module.unbind(),
                    config: config.clone(),
                })
            })
        }

        fn detect(&self, frame: &Frame) -> LandmarkResult<LandmarkSet> {
            let (width, height) = (frame.width(), frame.height());

            let json = Python::with_gil(|py| -> LandmarkResult<String> {
                let module = self.inference_module.bind(py);

                let process_fn = module.getattr("process_rgb_bytes").map_err(|e| {
                    LandmarkError::InferenceFailed(format!(
                        "Failed to get process_rgb_bytes: {}",
                        e
                    ))
                })?;

                let kwargs = PyDict::new_bound(py);
                let set = |key: &str, value: PyObject| {
                    kwargs.set_item(key, value).map_err(|e| {
                        LandmarkError::InferenceFailed(format!("Failed to set {}: {}", key, e))
                    })
                };
                set("image_bytes", PyBytes::new_bound(py, frame.image.as_raw()).into_py(py))?;
                set("width", width.into_py(py))?;
                set("height", height.into_py(py))?;
                set("max_faces", self.config.max_faces.into_py(py))?;
                set(
                    "min_detection_confidence",
                    self.config.min_detection_confidence.into_py(py),
                )?;

                let result = process_fn.call((), Some(&kwargs)).map_err(|e| {
                    LandmarkError::InferenceFailed(format!("MediaPipe inference failed: {}", e))
                })?;

                result.extract().map_err(|e| {
                    LandmarkError::InferenceFailed(format!("Failed to extract JSON: {}", e))
                })
            })?;

            parse_mesh_output(&json, width, height)
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn model_info(&self) -> String {
            format!(
                "PyO3 MediaPipe Face Mesh (Python backend) - max faces: {}",
                self.config.max_faces
            )
        }
    }
}

// ==============================================================================
// Dummy Implementation (for compilation without features)
// ==============================================================================

/// Finds no faces. Every frame therefore counts as an absent student.
#[cfg(not(feature = "ml-pyo3"))]
pub struct DummyLandmarks;

#[cfg(not(feature = "ml-pyo3"))]
impl LandmarkProvider for DummyLandmarks {
    fn new(_config: &LandmarkConfig) -> LandmarkResult<Self> {
        tracing::warn!("Using dummy face mesh (no inference); enable the 'ml-pyo3' feature");
        Ok(Self)
    }

    fn detect(&self, frame: &Frame) -> LandmarkResult<LandmarkSet> {
        Ok(LandmarkSet::empty(frame.width(), frame.height()))
    }

    fn is_initialized(&self) -> bool {
        false
    }

    fn model_info(&self) -> String {
        "Dummy face mesh (no ML inference - enable 'ml-pyo3' feature)".to_string()
    }
}

// ==============================================================================
// Fixed Output (tests and replays)
// ==============================================================================

/// Returns the same landmark set for every frame
pub struct StaticLandmarks {
    set: LandmarkSet,
}

impl StaticLandmarks {
    pub fn returning(set: LandmarkSet) -> Self {
        Self { set }
    }
}

impl LandmarkProvider for StaticLandmarks {
    fn new(_config: &LandmarkConfig) -> LandmarkResult<Self> {
        Ok(Self { set: LandmarkSet::default() })
    }

    fn detect(&self, _frame: &Frame) -> LandmarkResult<LandmarkSet> {
        Ok(self.set.clone())
    }

    fn is_initialized(&self) -> bool {
        true
    }

    fn model_info(&self) -> String {
        format!("Static landmarks ({} faces)", self.set.face_count())
    }
}

// ==============================================================================
// Default Backend Selection
// ==============================================================================

#[cfg(feature = "ml-pyo3")]
pub type DefaultLandmarkProvider = pyo3_backend::PyO3FaceMesh;

#[cfg(not(feature = "ml-pyo3"))]
pub type DefaultLandmarkProvider = DummyLandmarks;
