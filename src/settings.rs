//! Transform settings posted by the editor UI
//!
//! The JSON document carries the four dragged corners in canvas pixels plus
//! the color and framing scalars. Everything is validated here, at the
//! boundary, so the solver never sees NaN or out-of-range values.

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;
use crate::geometry::{Corner, CornerSet, Point2D};

/// Percent range shared by brightness, contrast and saturation
pub const PERCENT_RANGE: (f64, f64) = (0.0, 200.0);

/// Allowed scale, in percent
pub const SCALE_RANGE: (f64, f64) = (1.0, 1000.0);

/// Settings as exchanged with the editor (camelCase JSON)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransformSettings {
    pub top_left: Point2D,
    pub top_right: Point2D,
    pub bottom_right: Point2D,
    pub bottom_left: Point2D,
    /// 0-200 (%), 100 = unchanged
    pub brightness: f64,
    /// 0-200 (%), 100 = unchanged
    pub contrast: f64,
    /// 0-200 (%), 100 = unchanged
    pub saturation: f64,
    /// Degrees, counter-clockwise on screen
    pub rotation: f64,
    /// Percent, 100 = unchanged
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    100.0
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            top_left: Point2D::new(50.0, 50.0),
            top_right: Point2D::new(350.0, 50.0),
            bottom_right: Point2D::new(350.0, 250.0),
            bottom_left: Point2D::new(50.0, 250.0),
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            rotation: 0.0,
            scale: 100.0,
        }
    }
}

impl TransformSettings {
    pub fn corners(&self) -> CornerSet {
        CornerSet::new(
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        )
    }

    /// Same scalars, different corners
    pub fn with_corners(&self, corners: &CornerSet) -> Self {
        Self {
            top_left: corners.top_left,
            top_right: corners.top_right,
            bottom_right: corners.bottom_right,
            bottom_left: corners.bottom_left,
            ..*self
        }
    }

    /// Check every field; the first problem found is returned
    pub fn validate(&self) -> Result<(), SettingsError> {
        let corners = self.corners();
        for corner in Corner::ALL {
            let p = corners.get(corner);
            if !p.is_finite() {
                return Err(SettingsError::NonFinite {
                    field: corner_field(corner),
                });
            }
        }

        check_range("brightness", self.brightness, PERCENT_RANGE)?;
        check_range("contrast", self.contrast, PERCENT_RANGE)?;
        check_range("saturation", self.saturation, PERCENT_RANGE)?;
        check_range("scale", self.scale, SCALE_RANGE)?;

        if !self.rotation.is_finite() {
            return Err(SettingsError::NonFinite { field: "rotation" });
        }

        Ok(())
    }
}

fn corner_field(corner: Corner) -> &'static str {
    match corner {
        Corner::TopLeft => "topLeft",
        Corner::TopRight => "topRight",
        Corner::BottomRight => "bottomRight",
        Corner::BottomLeft => "bottomLeft",
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    (min, max): (f64, f64),
) -> Result<(), SettingsError> {
    if !value.is_finite() {
        return Err(SettingsError::NonFinite { field });
    }
    if value < min || value > max {
        return Err(SettingsError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}
