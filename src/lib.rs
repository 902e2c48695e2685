//! quadmap - corner-mapping homography backend for a browser video editor
//!
//! The editor lets a user drag four corner handles over a canvas to place a
//! video feed, and tune brightness, contrast, saturation, rotation and scale.
//! This crate turns those settings into the 3x3 projective transform that
//! maps the media rectangle onto the dragged quadrilateral, and hands it to
//! renderers either as an affine approximation or as a projective mesh.

pub mod adjustments;
pub mod config;
pub mod error;
pub mod geometry;
pub mod live;
pub mod server;
pub mod settings;
pub mod transform;

pub use error::{SettingsError, TransformError, UpdateError};
pub use geometry::{Corner, CornerSet, Point2D};
pub use settings::TransformSettings;
pub use transform::{solve, solve_least_squares, AffineApprox, HomographyMatrix, Mesh};
