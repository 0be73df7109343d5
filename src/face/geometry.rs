//! Landmark geometry: eye aspect ratio, brow-to-eye gap, face bounding box.
//!
//! Landmarks arrive normalized (0..1) in MediaPipe 468-point mesh order and are
//! projected to pixel space with the frame dimensions before measuring.

use serde::{Deserialize, Serialize};

/// MediaPipe mesh indices used by the face pipeline
pub mod mesh {
    /// Left eye contour, EAR order p0..p5
    pub const LEFT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
    /// Right eye contour, EAR order p0..p5
    pub const RIGHT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Upper left eyebrow
    pub const LEFT_BROW: [usize; 5] = [336, 296, 334, 293, 300];
    /// Upper right eyebrow
    pub const RIGHT_BROW: [usize; 5] = [107, 66, 105, 63, 70];

    /// Highest index any measurement touches
    pub const MAX_INDEX: usize = 387;
}

/// Padding (pixels) added around the landmark box before emotion classification
pub const FACE_BOX_PADDING: u32 = 20;

/// Pixel-space face region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Landmarks projected into pixel space for one frame
#[derive(Debug, Clone)]
pub struct PixelLandmarks {
    points: Vec<[f32; 2]>,
    width: f32,
    height: f32,
}

impl PixelLandmarks {
    /// Project normalized landmarks. `None` when the mesh is too short or the
    /// frame has no area.
    pub fn project(normalized: &[[f32; 2]], width: u32, height: u32) -> Option<Self> {
        if normalized.len() <= mesh::MAX_INDEX || width == 0 || height == 0 {
            return None;
        }
        let (w, h) = (width as f32, height as f32);
        let points = normalized.iter().map(|[x, y]| [x * w, y * h]).collect();
        Some(Self {
            points,
            width: w,
            height: h,
        })
    }

    fn point(&self, idx: usize) -> [f32; 2] {
        self.points[idx]
    }

    fn distance(&self, a: usize, b: usize) -> f32 {
        let [ax, ay] = self.point(a);
        let [bx, by] = self.point(b);
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    fn centroid_y(&self, indices: &[usize]) -> f32 {
        indices.iter().map(|&i| self.point(i)[1]).sum::<f32>() / indices.len() as f32
    }

    /// EAR = (|p1-p5| + |p2-p4|) / (2 |p0-p3|); `None` for a degenerate eye
    pub fn eye_aspect_ratio(&self, eye: &[usize; 6]) -> Option<f32> {
        let horizontal = self.distance(eye[0], eye[3]);
        if horizontal <= f32::EPSILON {
            return None;
        }
        let vertical = self.distance(eye[1], eye[5]) + self.distance(eye[2], eye[4]);
        Some(vertical / (2.0 * horizontal))
    }

    /// Mean of left and right EAR
    pub fn average_ear(&self) -> Option<f32> {
        let left = self.eye_aspect_ratio(&mesh::LEFT_EYE)?;
        let right = self.eye_aspect_ratio(&mesh::RIGHT_EYE)?;
        Some((left + right) / 2.0)
    }

    /// Vertical brow-to-eye gap as a fraction of frame height, averaged over sides
    pub fn brow_gap(&self) -> f32 {
        let left = self.centroid_y(&mesh::LEFT_EYE) - self.centroid_y(&mesh::LEFT_BROW);
        let right = self.centroid_y(&mesh::RIGHT_EYE) - self.centroid_y(&mesh::RIGHT_BROW);
        ((left + right) / 2.0) / self.height
    }

    /// Tight bounds of all landmarks as (min_x, min_y, max_x, max_y), clamped to frame
    fn bounds(&self) -> (f32, f32, f32, f32) {
        let mut min_x = f32::MAX;
        let mut min_y = f32::MAX;
        let mut max_x = f32::MIN;
        let mut max_y = f32::MIN;
        for &[x, y] in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        (
            min_x.clamp(0.0, self.width),
            min_y.clamp(0.0, self.height),
            max_x.clamp(0.0, self.width),
            max_y.clamp(0.0, self.height),
        )
    }

    /// Face span as fractions of frame (width, height)
    pub fn face_fraction(&self) -> (f32, f32) {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        ((max_x - min_x) / self.width, (max_y - min_y) / self.height)
    }

    /// Landmark box grown by `pad` pixels on each side, clamped to the frame
    pub fn face_box(&self, pad: u32) -> FaceBox {
        let (min_x, min_y, max_x, max_y) = self.bounds();
        let pad = pad as f32;
        let x0 = (min_x - pad).max(0.0);
        let y0 = (min_y - pad).max(0.0);
        let x1 = (max_x + pad).min(self.width);
        let y1 = (max_y + pad).min(self.height);
        FaceBox {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0).max(0.0) as u32,
            height: (y1 - y0).max(0.0) as u32,
        }
    }
}
