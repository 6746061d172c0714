// Geometry helpers shared by the detectors

use crate::models::landmarks::Point3;
use image::{GrayImage, Luma};
use nalgebra::{Rotation3, Vector2, Vector3};

/// Gray level painted outside a cropped polygon. Sits above the dark-pixel cutoff.
pub const OUTSIDE_REGION_FILL: u8 = 155;

/// Euclidean distance in the image plane
pub fn distance(a: Point3, b: Point3) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

/// Integer pixel box, inclusive of `min`, exclusive of `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y
    }
}

/// Bounding box of `points`, clamped to a `width` x `height` frame.
/// Returns `None` when the clamped box is empty.
pub fn bounding_box(points: &[Point3], width: u32, height: u32) -> Option<BoundingBox> {
    if points.is_empty() {
        return None;
    }

    let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
    let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let clamp = |v: f64, limit: u32| v.max(0.0).min(limit as f64) as u32;
    let bbox = BoundingBox {
        min_x: clamp(min_x.floor(), width),
        min_y: clamp(min_y.floor(), height),
        max_x: clamp(max_x.ceil(), width),
        max_y: clamp(max_y.ceil(), height),
    };

    if bbox.max_x <= bbox.min_x || bbox.max_y <= bbox.min_y {
        None
    } else {
        Some(bbox)
    }
}

/// Even-odd point-in-polygon test
pub fn point_in_polygon(x: f64, y: f64, polygon: &[Point3]) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > y) != (pj.y > y) {
            let cross_x = (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x;
            if x < cross_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Cut the polygon region out of a grayscale frame.
///
/// Pixels inside the polygon keep their value, pixels outside it are painted
/// `OUTSIDE_REGION_FILL`, and the result is cropped to the polygon's bounding
/// box. A degenerate polygon yields an empty image.
pub fn crop_region(gray: &GrayImage, polygon: &[Point3]) -> GrayImage {
    let Some(bbox) = bounding_box(polygon, gray.width(), gray.height()) else {
        return GrayImage::new(0, 0);
    };

    GrayImage::from_fn(bbox.width(), bbox.height(), |x, y| {
        let (fx, fy) = (bbox.min_x + x, bbox.min_y + y);
        if point_in_polygon(fx as f64 + 0.5, fy as f64 + 0.5, polygon) {
            *gray.get_pixel(fx, fy)
        } else {
            Luma([OUTSIDE_REGION_FILL])
        }
    })
}

// ==============================================================================
// Pinhole Camera
// ==============================================================================

/// Pinhole intrinsics without lens distortion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraIntrinsics {
    pub focal: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Approximate webcam: focal length equal to frame width, principal point at the center
    pub fn from_frame(width: u32, height: u32) -> Self {
        Self {
            focal: width as f64,
            cx: width as f64 / 2.0,
            cy: height as f64 / 2.0,
        }
    }

    /// Pixel coordinates to normalized image coordinates
    pub fn normalize(&self, u: f64, v: f64) -> Vector2<f64> {
        Vector2::new((u - self.cx) / self.focal, (v - self.cy) / self.focal)
    }

    pub fn denormalize(&self, n: &Vector2<f64>) -> (f64, f64) {
        (n.x * self.focal + self.cx, n.y * self.focal + self.cy)
    }
}

/// Project a model point to normalized image coordinates.
/// Returns `None` for points at or behind the camera plane.
pub fn project_normalized(
    rotation: &Rotation3<f64>,
    translation: &Vector3<f64>,
    point: &Vector3<f64>,
) -> Option<Vector2<f64>> {
    let cam = rotation * point + translation;
    if cam.z <= f64::EPSILON {
        return None;
    }
    Some(Vector2::new(cam.x / cam.z, cam.y / cam.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point3> {
        vec![
            Point3::new(x0, y0, 0.0),
            Point3::new(x1, y0, 0.0),
            Point3::new(x1, y1, 0.0),
            Point3::new(x0, y1, 0.0),
        ]
    }

    #[test]
    fn test_distance() {
        let d = distance(Point3::new(0.0, 0.0, 5.0), Point3::new(3.0, 4.0, -5.0));
        assert!((d - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_bounding_box_clamps_to_frame() {
        let bbox = bounding_box(&square(-5.0, 2.0, 50.0, 8.0), 20, 20).unwrap();
        assert_eq!(bbox, BoundingBox { min_x: 0, min_y: 2, max_x: 20, max_y: 8 });
        assert!(bounding_box(&square(30.0, 30.0, 40.0, 40.0), 20, 20).is_none());
        assert!(bounding_box(&[], 20, 20).is_none());
    }

    #[test]
    fn test_point_in_polygon() {
        let poly = square(0.0, 0.0, 10.0, 10.0);
        assert!(point_in_polygon(5.0, 5.0, &poly));
        assert!(!point_in_polygon(15.0, 5.0, &poly));
        assert!(!point_in_polygon(5.0, -1.0, &poly));
    }

    #[test]
    fn test_crop_region_masks_outside_pixels() {
        let gray = GrayImage::from_pixel(20, 20, Luma([10]));
        // Triangle: top-left half of the 10x10 box
        let triangle = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(10.0, 0.0, 0.0),
            Point3::new(0.0, 10.0, 0.0),
        ];
        let crop = crop_region(&gray, &triangle);
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!(crop.get_pixel(1, 1)[0], 10);
        assert_eq!(crop.get_pixel(9, 9)[0], OUTSIDE_REGION_FILL);
    }

    #[test]
    fn test_crop_region_degenerate_polygon() {
        let gray = GrayImage::new(20, 20);
        let line = vec![Point3::new(5.0, 5.0, 0.0), Point3::new(5.0, 5.0, 0.0)];
        assert_eq!(crop_region(&gray, &line).dimensions(), (0, 0));
    }

    #[test]
    fn test_projection_round_trip() {
        let camera = CameraIntrinsics::from_frame(640, 480);
        assert_eq!(camera.focal, 640.0);
        assert_eq!((camera.cx, camera.cy), (320.0, 240.0));

        let rotation = Rotation3::identity();
        let translation = Vector3::new(0.0, 0.0, 1000.0);
        let point = Vector3::new(100.0, -50.0, 0.0);
        let n = project_normalized(&rotation, &translation, &point).unwrap();
        let (u, v) = camera.denormalize(&n);
        assert!((u - 384.0).abs() < 1e-9);
        assert!((v - 208.0).abs() < 1e-9);

        let back = camera.normalize(u, v);
        assert!((back - n).norm() < 1e-12);
    }

    #[test]
    fn test_projection_behind_camera() {
        let rotation = Rotation3::identity();
        let translation = Vector3::new(0.0, 0.0, -10.0);
        assert!(project_normalized(&rotation, &translation, &Vector3::zeros()).is_none());
    }
}
