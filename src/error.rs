//! Error types for the solver and the settings boundary

use thiserror::Error;

/// Failures while building or applying a projective transform
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// The linear system has no unique solution (near-zero pivot). Column 8
    /// means elimination succeeded but the solved matrix is rank-deficient.
    #[error("singular system: pivot {pivot:e} in column {column}")]
    Singular { column: usize, pivot: f64 },

    #[error("non-finite coordinate in {role} point {index}")]
    NonFinite { role: &'static str, index: usize },

    #[error("at least 4 correspondences are required, got {0}")]
    TooFewCorrespondences(usize),

    #[error("source has {src} points but destination has {dst}")]
    LengthMismatch { src: usize, dst: usize },

    #[error("point ({x}, {y}) maps to infinity")]
    PointAtInfinity { x: f64, y: f64 },

    /// Composition produced a matrix that cannot be normalized to h8 = 1
    #[error("composed transform is degenerate")]
    Degenerate,

    #[error("mesh needs at least one column and one row")]
    EmptyMesh,

    #[error("mesh of {cols}x{rows} cells exceeds {max} per axis")]
    MeshTooLarge { cols: u32, rows: u32, max: u32 },
}

/// Rejected values in a settings document
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    #[error("{field} = {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Why a live update was not applied
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Transform(#[from] TransformError),
}
