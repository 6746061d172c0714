// Gaze-zone detector
// Locates the dark pupil inside each eye crop and classifies which third of
// the eye it sits in.

use super::{DetectionInput, Detector};
use crate::core::geometry::crop_region;
use crate::models::landmarks::{indices, FaceLandmarks};
use crate::models::policy::ViolationKind;
use image::{imageops, GrayImage, Luma};

const BLUR_SIGMA: f32 = 1.0;

/// Where an eye is looking, in image terms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GazeDirection {
    Right,
    Center,
    Left,
    Closed,
}

impl GazeDirection {
    pub fn to_string(&self) -> &'static str {
        match self {
            GazeDirection::Right => "right",
            GazeDirection::Center => "center",
            GazeDirection::Left => "left",
            GazeDirection::Closed => "closed",
        }
    }

    fn from_band(band: usize) -> Self {
        match band {
            0 => GazeDirection::Right,
            1 => GazeDirection::Center,
            _ => GazeDirection::Left,
        }
    }
}

pub struct GazeDetector {
    luminance_cutoff: u8,
}

impl GazeDetector {
    pub fn new(luminance_cutoff: u8) -> Self {
        Self { luminance_cutoff }
    }

    /// Classify both eyes of a face. Returns (right eye, left eye).
    pub fn classify_face(
        &self,
        gray: &GrayImage,
        face: &FaceLandmarks,
    ) -> (GazeDirection, GazeDirection) {
        let right = crop_region(gray, &face.select(&indices::RIGHT_EYE));
        let left = crop_region(gray, &face.select(&indices::LEFT_EYE));
        (
            classify_eye(&right, self.luminance_cutoff),
            classify_eye(&left, self.luminance_cutoff),
        )
    }

    /// Both eyes must agree on the same side for a violation
    pub fn is_violation(right: GazeDirection, left: GazeDirection) -> bool {
        right == left && matches!(right, GazeDirection::Left | GazeDirection::Right)
    }
}

impl Detector for GazeDetector {
    fn name(&self) -> &'static str {
        "gaze"
    }

    fn kinds(&self) -> &'static [ViolationKind] {
        &[ViolationKind::LookingAway]
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<(ViolationKind, bool)> {
        // No trackable face while gaze is monitored counts as looking away.
        // The mouth detector treats the same case as clean; the two disagree.
        let Some(face) = input.landmarks.primary() else {
            return vec![(ViolationKind::LookingAway, true)];
        };

        let gray = input.frame.to_luma();
        let (right, left) = self.classify_face(&gray, face);
        let violation = Self::is_violation(right, left);

        tracing::debug!(
            right_eye = right.to_string(),
            left_eye = left.to_string(),
            violation,
            "gaze classified"
        );

        vec![(ViolationKind::LookingAway, violation)]
    }
}

/// Classify a single eye crop.
///
/// The crop is denoised, thresholded at `cutoff`, split into three equal
/// vertical bands, and the band holding the most dark pixels wins (first band
/// on ties). No dark pixels at all means the eye is closed.
pub fn classify_eye(crop: &GrayImage, cutoff: u8) -> GazeDirection {
    if crop.width() == 0 || crop.height() == 0 {
        return GazeDirection::Closed;
    }

    let denoised = median_3x3(&imageops::blur(crop, BLUR_SIGMA));
    direction_from_counts(dark_pixels_per_band(&denoised, cutoff))
}

fn direction_from_counts(counts: [usize; 3]) -> GazeDirection {
    if counts.iter().all(|c| *c == 0) {
        return GazeDirection::Closed;
    }

    let mut best = 0;
    for band in 1..counts.len() {
        if counts[band] > counts[best] {
            best = band;
        }
    }
    GazeDirection::from_band(best)
}

/// Dark pixel counts for three equal-width vertical bands
fn dark_pixels_per_band(img: &GrayImage, cutoff: u8) -> [usize; 3] {
    let width = img.width();
    let mut counts = [0usize; 3];
    for (x, _, pixel) in img.enumerate_pixels() {
        if pixel[0] <= cutoff {
            let band = ((x * 3) / width).min(2) as usize;
            counts[band] += 1;
        }
    }
    counts
}

/// 3x3 median filter with edge replication
fn median_3x3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    GrayImage::from_fn(w, h, |x, y| {
        let mut window = [0u8; 9];
        let mut i = 0;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                window[i] = img.get_pixel(sx, sy)[0];
                i += 1;
            }
        }
        window.sort_unstable();
        Luma([window[4]])
    })
}
