//! Aspect-preserving canvas geometry
//!
//! An original `H x W` image is scaled uniformly so that it fits inside an
//! `S x S` canvas and centered, leaving equal padding on both sides of the
//! shorter axis. The mapping is expressed as a 2x3 affine matrix solved from
//! three corner correspondences, together with its inverse so that canvas
//! predictions can be mapped back to the original frame.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use refseg_core::error::{Error, Result};

/// Determinants smaller than this are treated as singular
const SINGULAR_EPS: f64 = 1e-12;

/// A 2D affine transform `(x, y) -> (a*x + b*y + c, d*x + e*y + f)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    rows: [[f64; 3]; 2],
}

impl Affine {
    /// The identity transform
    pub const IDENTITY: Affine = Affine {
        rows: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
    };

    /// Build a transform from its two matrix rows
    pub fn new(rows: [[f64; 3]; 2]) -> Self {
        Self { rows }
    }

    /// Solve the unique transform mapping each `src[i]` onto `dst[i]`
    ///
    /// Fails when the source points are collinear.
    pub fn from_points(src: [(f64, f64); 3], dst: [(f64, f64); 3]) -> Result<Self> {
        let [(x0, y0), (x1, y1), (x2, y2)] = src;
        let det = x0 * (y1 - y2) - y0 * (x1 - x2) + (x1 * y2 - x2 * y1);
        if det.abs() < SINGULAR_EPS {
            return Err(Error::InvalidArgument(format!(
                "source points {src:?} are collinear"
            )));
        }

        // Cramer's rule, once per output coordinate.
        let solve = |t0: f64, t1: f64, t2: f64| {
            [
                (t0 * (y1 - y2) - y0 * (t1 - t2) + (t1 * y2 - t2 * y1)) / det,
                (x0 * (t1 - t2) - t0 * (x1 - x2) + (x1 * t2 - x2 * t1)) / det,
                (x0 * (y1 * t2 - t1 * y2) - y0 * (x1 * t2 - t1 * x2) + t0 * (x1 * y2 - y1 * x2))
                    / det,
            ]
        };

        Ok(Self {
            rows: [
                solve(dst[0].0, dst[1].0, dst[2].0),
                solve(dst[0].1, dst[1].1, dst[2].1),
            ],
        })
    }

    /// Matrix rows
    pub fn rows(&self) -> &[[f64; 3]; 2] {
        &self.rows
    }

    /// Map a point
    #[inline]
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [[a, b, c], [d, e, f]] = self.rows;
        (a * x + b * y + c, d * x + e * y + f)
    }

    /// The inverse transform
    pub fn invert(&self) -> Result<Self> {
        let [[a, b, c], [d, e, f]] = self.rows;
        let det = a * e - b * d;
        if det.abs() < SINGULAR_EPS {
            return Err(Error::InvalidArgument(format!(
                "affine matrix {:?} is not invertible",
                self.rows
            )));
        }

        let (ia, ib, id, ie) = (e / det, -b / det, -d / det, a / det);
        Ok(Self {
            rows: [
                [ia, ib, -(ia * c + ib * f)],
                [id, ie, -(id * c + ie * f)],
            ],
        })
    }

    /// The transform that applies `self` first and `next` second
    #[must_use]
    pub fn then(&self, next: &Affine) -> Affine {
        let [[a, b, c], [d, e, f]] = self.rows;
        let [[na, nb, nc], [nd, ne, nf]] = next.rows;
        Affine {
            rows: [
                [na * a + nb * d, na * b + nb * e, na * c + nb * f + nc],
                [nd * a + ne * d, nd * b + ne * e, nd * c + ne * f + nf],
            ],
        }
    }

    /// The matrix as a `2 x 3` array
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((2, 3), |(r, c)| self.rows[r][c])
    }
}

/// Placement of an original image inside the square canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    /// Uniform scale factor `min(S / H, S / W)`
    pub scale: f64,
    /// Scaled height of the content area
    pub new_height: f64,
    /// Scaled width of the content area
    pub new_width: f64,
    /// Horizontal padding on the left (and right) of the content
    pub bias_x: f64,
    /// Vertical padding above (and below) the content
    pub bias_y: f64,
}

impl CanvasGeometry {
    /// Fit an `original_height x original_width` image into a `target_size` square
    pub fn fit(original_height: usize, original_width: usize, target_size: usize) -> Result<Self> {
        if original_height == 0 || original_width == 0 || target_size == 0 {
            return Err(Error::InvalidArgument(format!(
                "cannot fit a {original_height}x{original_width} image into a {target_size} canvas"
            )));
        }

        let (h, w, s) = (
            original_height as f64,
            original_width as f64,
            target_size as f64,
        );
        let scale = (s / h).min(s / w);
        let (new_height, new_width) = (h * scale, w * scale);

        Ok(Self {
            scale,
            new_height,
            new_width,
            bias_x: (s - new_width) / 2.0,
            bias_y: (s - new_height) / 2.0,
        })
    }
}

/// Compute the canvas transform for an original image size
///
/// Returns the forward (original to canvas) matrix and, when `want_inverse`
/// is set, the canvas to original matrix.
pub fn compute_transform(
    original_height: usize,
    original_width: usize,
    target_size: usize,
    want_inverse: bool,
) -> Result<(Affine, Option<Affine>)> {
    let g = CanvasGeometry::fit(original_height, original_width, target_size)?;
    let (h, w) = (original_height as f64, original_width as f64);

    let src = [(0.0, 0.0), (w, 0.0), (0.0, h)];
    let dst = [
        (g.bias_x, g.bias_y),
        (g.new_width + g.bias_x, g.bias_y),
        (g.bias_x, g.new_height + g.bias_y),
    ];

    let forward = Affine::from_points(src, dst)?;
    let inverse = if want_inverse {
        Some(Affine::from_points(dst, src)?)
    } else {
        None
    };
    Ok((forward, inverse))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn assert_close(actual: (f64, f64), expected: (f64, f64), tol: f64) {
        assert!(
            (actual.0 - expected.0).abs() <= tol && (actual.1 - expected.1).abs() <= tol,
            "{actual:?} != {expected:?}"
        );
    }

    #[test]
    fn test_wide_image_geometry() {
        let g = CanvasGeometry::fit(100, 200, 50).unwrap();
        assert_eq!(g.scale, 0.25);
        assert_eq!(g.new_height, 25.0);
        assert_eq!(g.new_width, 50.0);
        assert_eq!(g.bias_x, 0.0);
        assert_eq!(g.bias_y, 12.5);

        let (forward, inverse) = compute_transform(100, 200, 50, true).unwrap();
        let expected = Affine::new([[0.25, 0.0, 0.0], [0.0, 0.25, 12.5]]);
        for (row, want) in forward.rows().iter().zip(expected.rows()) {
            for (v, w) in row.iter().zip(want) {
                assert!((v - w).abs() < 1e-12);
            }
        }

        let inverse = inverse.unwrap();
        assert_close(inverse.apply(0.0, 12.5), (0.0, 0.0), 1e-9);
        assert_close(inverse.apply(50.0, 37.5), (200.0, 100.0), 1e-9);
    }

    #[test_case(480, 640, 416; "landscape")]
    #[test_case(640, 480, 416; "portrait")]
    #[test_case(300, 300, 416; "square upscale")]
    fn test_content_is_centered(h: usize, w: usize, s: usize) {
        let (forward, _) = compute_transform(h, w, s, false).unwrap();
        let (left, top) = forward.apply(0.0, 0.0);
        let (right, bottom) = forward.apply(w as f64, h as f64);

        let size = s as f64;
        assert!((left - (size - right)).abs() <= 1.0);
        assert!((top - (size - bottom)).abs() <= 1.0);
        // One axis always spans the full canvas.
        assert!((right - left - size).abs() < 1e-9 || (bottom - top - size).abs() < 1e-9);
    }

    #[test]
    fn test_inverse_only_on_request() {
        let (_, inverse) = compute_transform(10, 20, 8, false).unwrap();
        assert!(inverse.is_none());
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            compute_transform(0, 20, 8, true),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_collinear_points_rejected() {
        let src = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)];
        assert!(Affine::from_points(src, src).is_err());
    }

    #[test]
    fn test_invert_and_compose() {
        let m = Affine::new([[2.0, 0.5, 3.0], [-1.0, 1.5, 7.0]]);
        let round_trip = m.then(&m.invert().unwrap());
        for &(x, y) in &[(0.0, 0.0), (13.0, -4.0), (250.5, 99.25)] {
            assert_close(round_trip.apply(x, y), (x, y), 1e-9);
        }
        assert_eq!(m.to_array().shape(), &[2, 3]);
        assert_eq!(m.to_array()[[1, 2]], 7.0);
    }

    proptest! {
        #[test]
        fn prop_inverse_restores_corners(h in 1usize..4000, w in 1usize..4000, s in 1usize..1024) {
            let (forward, inverse) = compute_transform(h, w, s, true).unwrap();
            let inverse = inverse.unwrap();
            let tol = 1e-6 * (h.max(w) as f64);

            let (hf, wf) = (h as f64, w as f64);
            for (x, y) in [(0.0, 0.0), (wf, 0.0), (0.0, hf), (wf, hf)] {
                let (cx, cy) = forward.apply(x, y);
                let (bx, by) = inverse.apply(cx, cy);
                prop_assert!((bx - x).abs() <= tol && (by - y).abs() <= tol);
            }
        }

        #[test]
        fn prop_content_fits_canvas(h in 1usize..4000, w in 1usize..4000, s in 1usize..1024) {
            let g = CanvasGeometry::fit(h, w, s).unwrap();
            let size = s as f64;
            prop_assert!(g.new_width <= size + 1e-9 && g.new_height <= size + 1e-9);
            prop_assert!(g.bias_x >= -1e-9 && g.bias_y >= -1e-9);
            prop_assert!(((g.new_width / g.new_height) - (w as f64 / h as f64)).abs() < 1e-6 * (w as f64 / h as f64));
        }
    }
}
