//! Perspective transformation between the media rectangle and the dragged quad
//!
//! This module implements the homography solver: four point correspondences
//! give an 8x8 linear system which is solved by Gaussian elimination with
//! partial pivoting. The ninth coefficient is fixed at 1.
//!
//! It also produces the two render hand-offs: an affine approximation for
//! 2D transform APIs (with the loss it incurs) and a per-vertex projective
//! mesh for renderers that can draw one.

use nalgebra::{DMatrix, DVector, Matrix3};
use serde::{Deserialize, Serialize};

use crate::error::TransformError;
use crate::geometry::{CornerSet, Point2D};

/// Relative pivot threshold, scaled by the largest coefficient of the
/// conditioned system
pub const PIVOT_EPSILON: f64 = 1e-10;

/// Below this the homogeneous w is treated as zero
const W_EPSILON: f64 = 1e-12;

/// Largest mesh subdivision per axis
pub const MAX_MESH_CELLS: u32 = 256;

/// Perspective transformation matrix (3x3 homography)
///
/// Stored row-major as `h0..h8`. `h8` is 1 for every matrix produced here.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(transparent)]
pub struct HomographyMatrix([f64; 9]);

impl HomographyMatrix {
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    pub fn identity() -> Self {
        Self::IDENTITY
    }

    /// Solve for the transform mapping `src` corners onto `dst` corners
    pub fn from_corners(src: &CornerSet, dst: &CornerSet) -> Result<Self, TransformError> {
        solve(&src.to_array(), &dst.to_array())
    }

    /// An affine matrix from its top two rows; the last row is `[0, 0, 1]`
    pub fn from_affine(rows: [[f64; 3]; 2]) -> Self {
        Self([
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            0.0, 0.0, 1.0,
        ])
    }

    /// Accept nine raw coefficients, normalizing so that h8 = 1
    pub fn try_from_array(m: [f64; 9]) -> Result<Self, TransformError> {
        normalize(m)
    }

    pub fn as_array(&self) -> &[f64; 9] {
        &self.0
    }

    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let h = &self.0;
        [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], h[8]]]
    }

    /// True when the perspective terms vanish
    pub fn is_affine(&self) -> bool {
        self.0[6].abs() < W_EPSILON && self.0[7].abs() < W_EPSILON
    }

    /// Transform a point from source to destination coordinates
    #[inline]
    pub fn transform_point(&self, p: Point2D) -> Result<Point2D, TransformError> {
        apply_homography(&self.0, p.x, p.y)
            .ok_or(TransformError::PointAtInfinity { x: p.x, y: p.y })
    }

    /// The transform mapping destination back to source, normalized to h8 = 1
    pub fn inverse(&self) -> Result<Self, TransformError> {
        let m = Matrix3::from_row_slice(&self.0);
        let inv = m.try_inverse().ok_or(TransformError::Degenerate)?;
        let mut out = [0.0f64; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = inv[(row, col)];
            }
        }
        normalize(out)
    }

    /// Apply `self` first, then `next`
    pub fn then(&self, next: &HomographyMatrix) -> Result<Self, TransformError> {
        let a = next.to_rows();
        let b = self.to_rows();
        let mut out = [0.0f64; 9];
        for row in 0..3 {
            for col in 0..3 {
                out[row * 3 + col] = (0..3).map(|k| a[row][k] * b[k][col]).sum();
            }
        }
        normalize(out)
    }

    /// Approximate with a 2D affine transform; see [`AffineApprox`]
    pub fn affine_approx(&self, source: &CornerSet) -> AffineApprox {
        AffineApprox::from_matrix(self, source)
    }
}

impl Default for HomographyMatrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

fn normalize(mut m: [f64; 9]) -> Result<HomographyMatrix, TransformError> {
    let w = m[8];
    if !w.is_finite() || w.abs() < W_EPSILON {
        return Err(TransformError::Degenerate);
    }
    for v in m.iter_mut() {
        *v /= w;
    }
    m[8] = 1.0;
    if m.iter().any(|v| !v.is_finite()) {
        return Err(TransformError::Degenerate);
    }
    Ok(HomographyMatrix(m))
}

/// Compute a 3x3 homography from exactly 4 point correspondences
///
/// Fails with [`TransformError::Singular`] when the points are degenerate
/// (collinear or coincident) and no projective map exists.
pub fn solve(src: &[Point2D; 4], dst: &[Point2D; 4]) -> Result<HomographyMatrix, TransformError> {
    check_finite(src, "source")?;
    check_finite(dst, "destination")?;

    // Both sets are centered and scaled to a mean distance of sqrt(2) so the
    // pivot threshold sees the same magnitudes for any coordinate range
    let src_norm = Conditioner::fit(src)?;
    let dst_norm = Conditioner::fit(dst)?;
    let src_n = src.map(|p| src_norm.apply(p));
    let dst_n = dst.map(|p| dst_norm.apply(p));

    // Two rows per correspondence (x,y) -> (x',y'):
    //   x*h0 + y*h1 + h2 - x'*x*h6 - x'*y*h7 = x'
    //   x*h3 + y*h4 + h5 - y'*x*h6 - y'*y*h7 = y'
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
        let (x, y) = (src_n[i].x, src_n[i].y);
        let (xp, yp) = (dst_n[i].x, dst_n[i].y);

        let row1 = i * 2;
        let row2 = i * 2 + 1;

        a[row1] = [x, y, 1.0, 0.0, 0.0, 0.0, -xp * x, -xp * y];
        b[row1] = xp;

        a[row2] = [0.0, 0.0, 0.0, x, y, 1.0, -yp * x, -yp * y];
        b[row2] = yp;
    }

    let h = solve_linear_system(&mut a, &mut b)?;
    let conditioned = HomographyMatrix([h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0]);
    check_rank(&conditioned, &src_n)?;

    let result = uncondition(&conditioned, &src_norm, &dst_norm)?;
    tracing::trace!(h = ?result.as_array(), "solved homography");

    Ok(result)
}

/// Similarity moving a point set to its centroid at mean distance sqrt(2)
#[derive(Debug, Clone, Copy)]
struct Conditioner {
    cx: f64,
    cy: f64,
    scale: f64,
}

impl Conditioner {
    fn fit(points: &[Point2D]) -> Result<Self, TransformError> {
        let n = points.len() as f64;
        let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
        let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
        let centroid = Point2D::new(cx, cy);
        let mean = points.iter().map(|p| p.distance(&centroid)).sum::<f64>() / n;

        let scale = std::f64::consts::SQRT_2 / mean;
        if !(mean > 0.0) || !scale.is_finite() {
            // All points coincide
            return Err(TransformError::Singular {
                column: 0,
                pivot: 0.0,
            });
        }
        Ok(Self { cx, cy, scale })
    }

    fn apply(&self, p: Point2D) -> Point2D {
        Point2D::new((p.x - self.cx) * self.scale, (p.y - self.cy) * self.scale)
    }

    fn matrix(&self) -> HomographyMatrix {
        let s = self.scale;
        HomographyMatrix::from_affine([[s, 0.0, -s * self.cx], [0.0, s, -s * self.cy]])
    }

    fn inverse_matrix(&self) -> HomographyMatrix {
        let s = 1.0 / self.scale;
        HomographyMatrix::from_affine([[s, 0.0, self.cx], [0.0, s, self.cy]])
    }
}

/// Undo the conditioning: `dst_norm^-1 * h * src_norm`
fn uncondition(
    h: &HomographyMatrix,
    src_norm: &Conditioner,
    dst_norm: &Conditioner,
) -> Result<HomographyMatrix, TransformError> {
    src_norm
        .matrix()
        .then(h)
        .and_then(|m| m.then(&dst_norm.inverse_matrix()))
        // The source origin itself maps to infinity; h8 = 1 is not reachable
        .map_err(|_| TransformError::Singular {
            column: 8,
            pivot: 0.0,
        })
}

/// Reject a solved matrix that collapses the plane or sends a source corner
/// to infinity. Elimination alone lets three collinear destination corners
/// through.
fn check_rank(h: &HomographyMatrix, src: &[Point2D; 4]) -> Result<(), TransformError> {
    let m = h.as_array();
    let largest = m.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let det = Matrix3::from_row_slice(m).determinant();
    if !(det.abs() > PIVOT_EPSILON * largest.powi(3)) {
        return Err(TransformError::Singular {
            column: 8,
            pivot: det,
        });
    }

    for p in src {
        let w = m[6] * p.x + m[7] * p.y + m[8];
        if !(w.abs() > PIVOT_EPSILON) {
            return Err(TransformError::Singular {
                column: 8,
                pivot: w,
            });
        }
    }
    Ok(())
}

fn check_finite(points: &[Point2D], role: &'static str) -> Result<(), TransformError> {
    match points.iter().position(|p| !p.is_finite()) {
        Some(index) => Err(TransformError::NonFinite { role, index }),
        None => Ok(()),
    }
}

/// Solve an 8x8 linear system using Gaussian elimination with partial pivoting
fn solve_linear_system(
    a: &mut [[f64; 8]; 8],
    b: &mut [f64; 8],
) -> Result<[f64; 8], TransformError> {
    let n = 8;

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0f64, |m, v| m.max(v.abs()));
    let threshold = PIVOT_EPSILON * scale;

    // Forward elimination with partial pivoting
    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[col][col].abs();
        for row in (col + 1)..n {
            if a[row][col].abs() > max_val {
                max_val = a[row][col].abs();
                max_row = row;
            }
        }

        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        let pivot = a[col][col];
        if !(pivot.abs() > threshold) {
            return Err(TransformError::Singular { column: col, pivot });
        }

        for row in (col + 1)..n {
            let factor = a[row][col] / pivot;
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    // Back substitution
    let mut x = [0.0f64; 8];
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[i][j] * x[j];
        }
        x[i] = sum / a[i][i];
    }

    Ok(x)
}

/// Least-squares homography from N >= 4 correspondences
///
/// This is an extension over [`solve`]: the over-determined 2N x 8 system is
/// solved through an SVD. With exactly four well-placed points it agrees with
/// [`solve`] up to rounding.
pub fn solve_least_squares(
    src: &[Point2D],
    dst: &[Point2D],
) -> Result<HomographyMatrix, TransformError> {
    if src.len() != dst.len() {
        return Err(TransformError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 4 {
        return Err(TransformError::TooFewCorrespondences(src.len()));
    }
    check_finite(src, "source")?;
    check_finite(dst, "destination")?;

    let src_norm = Conditioner::fit(src)?;
    let dst_norm = Conditioner::fit(dst)?;

    let rows = src.len() * 2;
    let mut a = DMatrix::<f64>::zeros(rows, 8);
    let mut b = DVector::<f64>::zeros(rows);

    for (i, (s, d)) in src.iter().zip(dst).enumerate() {
        let (s, d) = (src_norm.apply(*s), dst_norm.apply(*d));
        let r = i * 2;
        let row_x = [s.x, s.y, 1.0, 0.0, 0.0, 0.0, -d.x * s.x, -d.x * s.y];
        let row_y = [0.0, 0.0, 0.0, s.x, s.y, 1.0, -d.y * s.x, -d.y * s.y];
        for c in 0..8 {
            a[(r, c)] = row_x[c];
            a[(r + 1, c)] = row_y[c];
        }
        b[r] = d.x;
        b[r + 1] = d.y;
    }

    let svd = a.svd(true, true);
    let largest = svd.singular_values.max();
    let eps = PIVOT_EPSILON * largest;
    let rank = svd.rank(eps);
    if rank < 8 {
        return Err(TransformError::Singular {
            column: rank,
            pivot: svd.singular_values.min(),
        });
    }

    let h = svd.solve(&b, eps).map_err(|_| TransformError::Singular {
        column: rank,
        pivot: 0.0,
    })?;

    let conditioned = HomographyMatrix([h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0]);
    uncondition(&conditioned, &src_norm, &dst_norm)
}

/// Apply a homography matrix to a point
#[inline]
fn apply_homography(h: &[f64; 9], x: f64, y: f64) -> Option<Point2D> {
    let w = h[6] * x + h[7] * y + h[8];
    if !(w.abs() > W_EPSILON) {
        return None;
    }
    let xp = (h[0] * x + h[1] * y + h[2]) / w;
    let yp = (h[3] * x + h[4] * y + h[5]) / w;
    Some(Point2D::new(xp, yp))
}

/// Affine part of a homography, in canvas `setTransform(a, b, c, d, tx, ty)` order
///
/// `x' = a*x + c*y + tx`, `y' = b*x + d*y + ty`. The perspective terms are
/// dropped; `dropped` keeps them and `max_corner_error` reports how far the
/// affine image of the source corners lands from the projective one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AffineApprox {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
    /// `[h6, h7]`
    pub dropped: [f64; 2],
    /// Largest corner displacement in destination pixels
    pub max_corner_error: f64,
}

impl AffineApprox {
    pub fn from_matrix(h: &HomographyMatrix, source: &CornerSet) -> Self {
        let m = h.as_array();
        let mut approx = Self {
            a: m[0],
            b: m[3],
            c: m[1],
            d: m[4],
            tx: m[2],
            ty: m[5],
            dropped: [m[6], m[7]],
            max_corner_error: 0.0,
        };

        approx.max_corner_error = source
            .to_array()
            .iter()
            .map(|p| match h.transform_point(*p) {
                Ok(exact) => exact.distance(&approx.apply(*p)),
                Err(_) => f64::INFINITY,
            })
            .fold(0.0, f64::max);

        approx
    }

    pub fn apply(&self, p: Point2D) -> Point2D {
        Point2D::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }
}

/// A vertex of the projective mesh
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct MeshVertex {
    /// Destination position after the full projective map
    pub position: Point2D,
    /// Normalized texture coordinate in the source media
    pub uv: [f64; 2],
}

/// Grid over the source rectangle mapped vertex by vertex
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mesh {
    pub cols: u32,
    pub rows: u32,
    /// Row-major, `(cols + 1) * (rows + 1)` entries
    pub vertices: Vec<MeshVertex>,
    /// Two triangles per cell
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn build(
        h: &HomographyMatrix,
        width: f64,
        height: f64,
        cols: u32,
        rows: u32,
    ) -> Result<Self, TransformError> {
        if cols == 0 || rows == 0 {
            return Err(TransformError::EmptyMesh);
        }
        if cols > MAX_MESH_CELLS || rows > MAX_MESH_CELLS {
            return Err(TransformError::MeshTooLarge {
                cols,
                rows,
                max: MAX_MESH_CELLS,
            });
        }

        let stride = cols + 1;
        let mut vertices = Vec::with_capacity(stride as usize * (rows as usize + 1));
        for j in 0..=rows {
            let v = j as f64 / rows as f64;
            for i in 0..=cols {
                let u = i as f64 / cols as f64;
                let position = h.transform_point(Point2D::new(u * width, v * height))?;
                vertices.push(MeshVertex { position, uv: [u, v] });
            }
        }

        let mut indices = Vec::with_capacity(cols as usize * rows as usize * 6);
        for j in 0..rows {
            for i in 0..cols {
                let tl = j * stride + i;
                let tr = tl + 1;
                let bl = tl + stride;
                let br = bl + 1;
                indices.extend_from_slice(&[tl, tr, br, tl, br, bl]);
            }
        }

        Ok(Self {
            cols,
            rows,
            vertices,
            indices,
        })
    }
}
