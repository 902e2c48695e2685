//! Framing and color adjustments that ride along with the corner mapping
//!
//! Rotation and scale are applied about the frame center after the
//! perspective map, so they are expressed as one more projective matrix and
//! composed with the homography.
//!
//! Brightness and contrast become a per-channel lookup table:
//! `out = saturate(|alpha * v + beta|)` with `alpha = contrast / 100` and
//! `beta = brightness - 100`. Saturation scales each pixel's distance from
//! its luma.

use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::settings::TransformSettings;
use crate::transform::HomographyMatrix;

/// Rotation (degrees, counter-clockwise on screen) and uniform scale about a center
pub fn rotation_about(cx: f64, cy: f64, degrees: f64, scale: f64) -> HomographyMatrix {
    let theta = degrees.to_radians();
    let alpha = scale * theta.cos();
    let beta = scale * theta.sin();

    HomographyMatrix::from_affine([
        [alpha, beta, (1.0 - alpha) * cx - beta * cy],
        [-beta, alpha, beta * cx + (1.0 - alpha) * cy],
    ])
}

/// The non-geometric part of [`TransformSettings`]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Adjustments {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub rotation: f64,
    pub scale: f64,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            rotation: 0.0,
            scale: 100.0,
        }
    }
}

impl From<&TransformSettings> for Adjustments {
    fn from(s: &TransformSettings) -> Self {
        Self {
            brightness: s.brightness,
            contrast: s.contrast,
            saturation: s.saturation,
            rotation: s.rotation,
            scale: s.scale,
        }
    }
}

impl Adjustments {
    /// True when rotation and scale leave the frame untouched
    pub fn is_identity_framing(&self) -> bool {
        self.rotation.rem_euclid(360.0).abs() < 1e-9 && (self.scale - 100.0).abs() < 1e-9
    }

    /// Perspective first, then rotation/scale about the frame center
    ///
    /// The center is taken at integer halves of the media size.
    pub fn compose(
        &self,
        perspective: &HomographyMatrix,
        width: u32,
        height: u32,
    ) -> Result<HomographyMatrix, TransformError> {
        if self.is_identity_framing() {
            return Ok(*perspective);
        }
        let cx = (width / 2) as f64;
        let cy = (height / 2) as f64;
        let framing = rotation_about(cx, cy, self.rotation, self.scale / 100.0);
        perspective.then(&framing)
    }

    pub fn saturation_factor(&self) -> f64 {
        self.saturation / 100.0
    }

    pub fn color_lut(&self) -> ColorLut {
        ColorLut::new(self.brightness, self.contrast)
    }
}

/// Pre-computed brightness/contrast table (256 entries)
#[derive(Debug, Clone)]
pub struct ColorLut {
    table: [u8; 256],
    is_identity: bool,
}

impl ColorLut {
    pub fn new(brightness: f64, contrast: f64) -> Self {
        let alpha = contrast / 100.0;
        let beta = brightness - 100.0;

        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let v = (alpha * i as f64 + beta).abs();
            // Saturating cast with ties to even
            *entry = v.round_ties_even().clamp(0.0, 255.0) as u8;
        }

        let is_identity = table.iter().enumerate().all(|(i, v)| *v as usize == i);

        Self { table, is_identity }
    }

    #[inline]
    pub fn apply(&self, value: u8) -> u8 {
        self.table[value as usize]
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity
    }
}

/// Scale each RGB pixel's chroma by `factor` (1.0 = unchanged, 0.0 = gray)
pub fn apply_saturation(rgb: &mut [u8], factor: f64) {
    if (factor - 1.0).abs() < 1e-3 {
        return;
    }

    for chunk in rgb.chunks_exact_mut(3) {
        let r = chunk[0] as f64;
        let g = chunk[1] as f64;
        let b = chunk[2] as f64;
        let luma = 0.299 * r + 0.587 * g + 0.114 * b;

        chunk[0] = (luma + (r - luma) * factor).round().clamp(0.0, 255.0) as u8;
        chunk[1] = (luma + (g - luma) * factor).round().clamp(0.0, 255.0) as u8;
        chunk[2] = (luma + (b - luma) * factor).round().clamp(0.0, 255.0) as u8;
    }
}

/// Brightness/contrast, then saturation, on an RGB24 buffer in place
pub fn apply_color(rgb: &mut [u8], adjustments: &Adjustments) {
    let lut = adjustments.color_lut();
    if !lut.is_identity() {
        for value in rgb.iter_mut() {
            *value = lut.apply(*value);
        }
    }
    apply_saturation(rgb, adjustments.saturation_factor());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CornerSet, Point2D};

    fn assert_point(p: Point2D, x: f64, y: f64) {
        assert!(
            (p.x - x).abs() < 1e-9 && (p.y - y).abs() < 1e-9,
            "got {p:?}, expected ({x}, {y})"
        );
    }

    #[test]
    fn test_rotation_quarter_turn() {
        let r = rotation_about(50.0, 50.0, 90.0, 1.0);
        // Right of center moves above center
        assert_point(r.transform_point(Point2D::new(100.0, 50.0)).unwrap(), 50.0, 0.0);
        assert_point(r.transform_point(Point2D::new(50.0, 50.0)).unwrap(), 50.0, 50.0);
    }

    #[test]
    fn test_scale_about_center() {
        let r = rotation_about(10.0, 10.0, 0.0, 2.0);
        assert_point(r.transform_point(Point2D::new(20.0, 10.0)).unwrap(), 30.0, 10.0);
    }

    #[test]
    fn test_compose_neutral_framing_is_passthrough() {
        let src = CornerSet::rect(100.0, 100.0);
        let h = HomographyMatrix::from_corners(&src, &src.translated(3.0, 4.0)).unwrap();
        let composed = Adjustments::default().compose(&h, 100, 100).unwrap();
        assert_eq!(composed, h);
    }

    #[test]
    fn test_compose_applies_rotation_after_perspective() {
        let src = CornerSet::rect(100.0, 100.0);
        let h = HomographyMatrix::from_corners(&src, &src).unwrap();
        let adjustments = Adjustments {
            rotation: 180.0,
            ..Default::default()
        };

        let composed = adjustments.compose(&h, 100, 100).unwrap();
        assert_point(composed.transform_point(Point2D::new(0.0, 0.0)).unwrap(), 100.0, 100.0);
        assert_eq!(composed.as_array()[8], 1.0);
    }

    #[test]
    fn test_lut_identity_at_neutral() {
        let lut = ColorLut::new(100.0, 100.0);
        assert!(lut.is_identity());
        for i in 0..=255u8 {
            assert_eq!(lut.apply(i), i);
        }
    }

    #[test]
    fn test_lut_brightness_and_contrast() {
        let brighter = ColorLut::new(150.0, 100.0);
        assert_eq!(brighter.apply(0), 50);
        assert_eq!(brighter.apply(250), 255);

        let contrast = ColorLut::new(100.0, 200.0);
        assert_eq!(contrast.apply(100), 200);
        assert_eq!(contrast.apply(200), 255);
    }

    #[test]
    fn test_lut_takes_absolute_value() {
        // alpha = 1, beta = -100: 40 -> |-60| = 60
        let darker = ColorLut::new(0.0, 100.0);
        assert_eq!(darker.apply(40), 60);
        assert_eq!(darker.apply(100), 0);
    }

    #[test]
    fn test_lut_rounds_half_to_even() {
        // alpha = 0.5: 1 -> 0.5, 3 -> 1.5, 5 -> 2.5
        let half = ColorLut::new(100.0, 50.0);
        assert_eq!(half.apply(1), 0);
        assert_eq!(half.apply(3), 2);
        assert_eq!(half.apply(5), 2);
    }

    #[test]
    fn test_desaturate_to_gray() {
        let mut rgb = vec![255u8, 0, 0, 10, 200, 30];
        apply_saturation(&mut rgb, 0.0);
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
        assert_eq!(rgb[3], rgb[4]);
        assert_eq!(rgb[4], rgb[5]);
    }

    #[test]
    fn test_apply_color_neutral_is_noop() {
        let original = vec![1u8, 2, 3, 250, 128, 64];
        let mut rgb = original.clone();
        apply_color(&mut rgb, &Adjustments::default());
        assert_eq!(rgb, original);
    }
}
