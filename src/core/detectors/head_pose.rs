// Head-pose detector
// Solves a perspective-n-point problem for six facial landmarks against a
// generic 3D face model, then classifies the head as turned away when yaw or
// pitch exceed the threshold.

use super::{DetectionInput, Detector};
use crate::core::geometry::{project_normalized, CameraIntrinsics};
use crate::models::landmarks::{indices, FaceLandmarks};
use crate::models::policy::ViolationKind;
use nalgebra::{Rotation3, SMatrix, SVector, Vector2, Vector3};

/// Generic face model in camera axes (x right, y down, z away from camera),
/// millimetre-ish units, nose tip at the origin.
pub(crate) const MODEL_POINTS: [(usize, [f64; 3]); 6] = [
    (indices::NOSE_TIP, [0.0, 0.0, 0.0]),
    (indices::CHIN, [0.0, 330.0, 65.0]),
    (indices::RIGHT_EYE_OUTER, [-225.0, -170.0, 135.0]),
    (indices::LEFT_EYE_OUTER, [225.0, -170.0, 135.0]),
    (indices::MOUTH_RIGHT, [-150.0, 150.0, 125.0]),
    (indices::MOUTH_LEFT, [150.0, 150.0, 125.0]),
];

/// Model distance between the two outer eye corners
const MODEL_EYE_SPAN: f64 = 450.0;

const MAX_ITERATIONS: usize = 100;
const CONVERGENCE_STEP: f64 = 1e-10;
/// Residual used for a point that lands behind the camera
const BEHIND_CAMERA_PENALTY: f64 = 1e3;
/// Largest accepted RMS reprojection error, as a fraction of the eye span.
/// Real faces deviate from the generic model; scrambled landmarks do not fit at all.
const MAX_RELATIVE_REPROJECTION_ERROR: f64 = 0.15;

type Params = SVector<f64, 6>;
type Residuals = SVector<f64, 12>;
type Jacobian = SMatrix<f64, 12, 6>;

// ==============================================================================
// Pose Types
// ==============================================================================

/// Head orientation in degrees.
///
/// Positive yaw turns the nose toward the left edge of the frame, positive
/// pitch tilts the head up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub yaw: f64,
    pub pitch: f64,
    pub roll: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadDirection {
    Forward,
    Left,
    Right,
    Up,
    Down,
}

impl HeadDirection {
    pub fn to_string(&self) -> &'static str {
        match self {
            HeadDirection::Forward => "forward",
            HeadDirection::Left => "left",
            HeadDirection::Right => "right",
            HeadDirection::Up => "up",
            HeadDirection::Down => "down",
        }
    }
}

impl HeadPose {
    /// Yaw is checked before pitch, so a head turned both ways reports the side.
    pub fn direction(&self, threshold_deg: f64) -> HeadDirection {
        if self.yaw > threshold_deg {
            HeadDirection::Left
        } else if self.yaw < -threshold_deg {
            HeadDirection::Right
        } else if self.pitch < -threshold_deg {
            HeadDirection::Down
        } else if self.pitch > threshold_deg {
            HeadDirection::Up
        } else {
            HeadDirection::Forward
        }
    }

    /// Decompose `R = Rx(a) * Ry(b) * Rz(c)`
    fn from_rotation(rotation: &Rotation3<f64>) -> Self {
        let m = rotation.matrix();
        let yaw = m[(0, 2)].clamp(-1.0, 1.0).asin();
        // Rotation about x that tips the nose down the image is positive here
        let pitch_down = (-m[(1, 2)]).atan2(m[(2, 2)]);
        let roll = (-m[(0, 1)]).atan2(m[(0, 0)]);

        Self {
            yaw: yaw.to_degrees(),
            pitch: -pitch_down.to_degrees(),
            roll: roll.to_degrees(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PoseSolveError {
    #[error("Degenerate landmarks: {0}")]
    Degenerate(String),

    #[error("Solver did not converge")]
    Diverged,

    #[error("Landmarks do not fit a face: RMS error {rms_px:.1}px, eye span {eye_span_px:.1}px")]
    PoorFit { rms_px: f64, eye_span_px: f64 },
}

// ==============================================================================
// Solver
// ==============================================================================

/// Estimate head orientation from a face's six canonical landmarks
pub fn estimate_pose(
    face: &FaceLandmarks,
    width: u32,
    height: u32,
) -> Result<HeadPose, PoseSolveError> {
    let camera = CameraIntrinsics::from_frame(width, height);

    let mut observed = [Vector2::zeros(); 6];
    let mut model = [Vector3::zeros(); 6];
    for (i, (idx, point)) in MODEL_POINTS.iter().enumerate() {
        let p = face.point(*idx);
        observed[i] = camera.normalize(p.x, p.y);
        model[i] = Vector3::new(point[0], point[1], point[2]);
    }

    let (params, cost) = solve(&model, &observed, initial_guess(face, &camera)?)?;

    // Residuals are in normalized image units; scale back to pixels per point
    let rms_px = (cost / MODEL_POINTS.len() as f64).sqrt() * camera.focal;
    let eye_span_px = eye_span(face);
    if rms_px > MAX_RELATIVE_REPROJECTION_ERROR * eye_span_px {
        return Err(PoseSolveError::PoorFit { rms_px, eye_span_px });
    }

    let rotation = Rotation3::new(Vector3::new(params[0], params[1], params[2]));
    Ok(HeadPose::from_rotation(&rotation))
}

/// Start facing the camera at a depth matching the observed eye span
fn initial_guess(
    face: &FaceLandmarks,
    camera: &CameraIntrinsics,
) -> Result<Params, PoseSolveError> {
    let span = eye_span(face);
    if span < 1.0 {
        return Err(PoseSolveError::Degenerate(format!("eye span {:.3}px", span)));
    }

    let tz = camera.focal * MODEL_EYE_SPAN / span;
    let nose = face.point(indices::NOSE_TIP);
    let n = camera.normalize(nose.x, nose.y);
    Ok(Params::from_column_slice(&[0.0, 0.0, 0.0, n.x * tz, n.y * tz, tz]))
}

fn eye_span(face: &FaceLandmarks) -> f64 {
    let right = face.point(indices::RIGHT_EYE_OUTER);
    let left = face.point(indices::LEFT_EYE_OUTER);
    ((left.x - right.x).powi(2) + (left.y - right.y).powi(2)).sqrt()
}

fn residuals(
    params: &Params,
    model: &[Vector3<f64>; 6],
    observed: &[Vector2<f64>; 6],
) -> Residuals {
    let rotation = Rotation3::new(Vector3::new(params[0], params[1], params[2]));
    let translation = Vector3::new(params[3], params[4], params[5]);

    let mut r = Residuals::zeros();
    for i in 0..6 {
        match project_normalized(&rotation, &translation, &model[i]) {
            Some(p) => {
                r[2 * i] = p.x - observed[i].x;
                r[2 * i + 1] = p.y - observed[i].y;
            }
            None => {
                r[2 * i] = BEHIND_CAMERA_PENALTY;
                r[2 * i + 1] = BEHIND_CAMERA_PENALTY;
            }
        }
    }
    r
}

fn jacobian(params: &Params, model: &[Vector3<f64>; 6], observed: &[Vector2<f64>; 6]) -> Jacobian {
    let mut j = Jacobian::zeros();
    for k in 0..6 {
        let h = 1e-6 * params[k].abs().max(1.0);
        let mut plus = *params;
        let mut minus = *params;
        plus[k] += h;
        minus[k] -= h;
        let delta = residuals(&plus, model, observed) - residuals(&minus, model, observed);
        let column = delta / (2.0 * h);
        j.set_column(k, &column);
    }
    j
}

/// Levenberg-Marquardt over (rotation vector, translation).
/// Returns the parameters and the final squared residual norm.
///
/// The solve has converged when a step becomes negligible, or when no step
/// lowers the cost any more (a minimum, possibly a poor one). Running out of
/// iterations is a failure.
fn solve(
    model: &[Vector3<f64>; 6],
    observed: &[Vector2<f64>; 6],
    mut params: Params,
) -> Result<(Params, f64), PoseSolveError> {
    let mut lambda = 1e-3;
    let mut cost = residuals(&params, model, observed).norm_squared();
    let mut converged = false;

    for _ in 0..MAX_ITERATIONS {
        let r = residuals(&params, model, observed);
        let j = jacobian(&params, model, observed);
        let jtj = j.transpose() * j;
        let gradient = j.transpose() * r;

        let mut damped = jtj;
        for d in 0..6 {
            damped[(d, d)] += lambda * jtj[(d, d)].max(1e-12);
        }

        let Some(step) = damped.lu().solve(&(-gradient)) else {
            lambda *= 10.0;
            continue;
        };

        let candidate = params + step;
        let candidate_cost = residuals(&candidate, model, observed).norm_squared();
        if candidate_cost.is_finite() && candidate_cost < cost {
            params = candidate;
            cost = candidate_cost;
            lambda = (lambda / 10.0).max(1e-12);
            if step.norm() < CONVERGENCE_STEP * params.norm().max(1.0) {
                converged = true;
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                converged = true;
                break;
            }
        }
    }

    if !converged || !cost.is_finite() || params.iter().any(|v| !v.is_finite()) {
        return Err(PoseSolveError::Diverged);
    }
    Ok((params, cost))
}

// ==============================================================================
// Detector
// ==============================================================================

pub struct HeadPoseDetector {
    threshold_deg: f64,
}

impl HeadPoseDetector {
    pub fn new(threshold_deg: f64) -> Self {
        Self { threshold_deg }
    }
}

impl Detector for HeadPoseDetector {
    fn name(&self) -> &'static str {
        "head_pose"
    }

    fn kinds(&self) -> &'static [ViolationKind] {
        &[ViolationKind::HintsOutside]
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<(ViolationKind, bool)> {
        // Same fail-safe as gaze: no face counts as turned away.
        // Mouth opening does not follow this rule.
        let Some(face) = input.landmarks.primary() else {
            return vec![(ViolationKind::HintsOutside, true)];
        };

        let violation = match estimate_pose(face, input.landmarks.width, input.landmarks.height) {
            Ok(pose) => {
                let direction = pose.direction(self.threshold_deg);
                tracing::debug!(
                    yaw = pose.yaw,
                    pitch = pose.pitch,
                    roll = pose.roll,
                    direction = direction.to_string(),
                    "head pose estimated"
                );
                direction != HeadDirection::Forward
            }
            Err(e) => {
                tracing::warn!(error = %e, "head pose solve failed, treating as no pose");
                true
            }
        };

        vec![(ViolationKind::HintsOutside, violation)]
    }
}
