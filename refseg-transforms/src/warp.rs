//! Affine resampling of images, masks and predictions
//!
//! Every destination pixel `(x, y)` samples the source at `M⁻¹ · (x, y)`,
//! where `M` maps source coordinates onto destination coordinates. Pixel
//! centers sit on integer coordinates.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};

use refseg_core::error::{Error, Result};

use crate::affine::Affine;

/// Free parameter of the bicubic convolution kernel
const CUBIC_A: f64 = -0.75;

/// Interpolation kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Bilinear, 2x2 taps
    Linear,
    /// Bicubic, 4x4 taps
    Cubic,
}

impl Interpolation {
    /// Tap weights for fractional offset `t` and the index of the first tap
    /// relative to `floor(coordinate)`
    #[inline]
    fn weights(self, t: f64) -> ([f64; 4], usize, isize) {
        match self {
            Interpolation::Linear => ([1.0 - t, t, 0.0, 0.0], 2, 0),
            Interpolation::Cubic => {
                let w0 = ((CUBIC_A * (t + 1.0) - 5.0 * CUBIC_A) * (t + 1.0) + 8.0 * CUBIC_A)
                    * (t + 1.0)
                    - 4.0 * CUBIC_A;
                let w1 = ((CUBIC_A + 2.0) * t - (CUBIC_A + 3.0)) * t * t + 1.0;
                let u = 1.0 - t;
                let w2 = ((CUBIC_A + 2.0) * u - (CUBIC_A + 3.0)) * u * u + 1.0;
                ([w0, w1, w2, 1.0 - w0 - w1 - w2], 4, -1)
            }
        }
    }
}

/// How taps falling outside the source are filled
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Border<V> {
    /// Use a fixed value
    Constant(V),
    /// Repeat the nearest edge pixel
    Replicate,
}

/// Resample an `[H, W, C]` array into `out_size = (height, width)`
///
/// Sample coordinates are finite and far below `isize::MAX`; indices are
/// bounds checked or clamped to the source before the unsigned cast.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn warp_planes<T>(
    src: ArrayView3<T>,
    forward: &Affine,
    out_size: (usize, usize),
    interpolation: Interpolation,
    border: Border<&[f64]>,
) -> Result<Array3<f64>>
where
    T: Copy + Into<f64>,
{
    let (src_h, src_w, channels) = src.dim();
    if let Border::Constant(values) = border {
        if values.len() != channels {
            return Err(Error::ShapeMismatch(format!(
                "{} border values for {channels} channels",
                values.len()
            )));
        }
    }
    if src_h == 0 || src_w == 0 {
        return Err(Error::InvalidArgument("cannot warp an empty image".into()));
    }

    let inverse = forward.invert()?;
    let (out_h, out_w) = out_size;
    let mut out = Array3::<f64>::zeros((out_h, out_w, channels));
    let (max_y, max_x) = (src_h as isize - 1, src_w as isize - 1);

    for y in 0..out_h {
        for x in 0..out_w {
            let (sx, sy) = inverse.apply(x as f64, y as f64);
            let (fx, fy) = (sx.floor(), sy.floor());
            let (wx, taps, offset) = interpolation.weights(sx - fx);
            let (wy, _, _) = interpolation.weights(sy - fy);
            let (x0, y0) = (fx as isize + offset, fy as isize + offset);

            for c in 0..channels {
                let mut acc = 0.0;
                for (j, weight_y) in wy.iter().take(taps).enumerate() {
                    let yy = y0 + j as isize;
                    for (i, weight_x) in wx.iter().take(taps).enumerate() {
                        let xx = x0 + i as isize;
                        let inside = (0..=max_y).contains(&yy) && (0..=max_x).contains(&xx);
                        let value = match border {
                            _ if inside => src[[yy as usize, xx as usize, c]].into(),
                            Border::Constant(values) => values[c],
                            Border::Replicate => {
                                src[[yy.clamp(0, max_y) as usize, xx.clamp(0, max_x) as usize, c]]
                                    .into()
                            }
                        };
                        acc += weight_y * weight_x * value;
                    }
                }
                out[[y, x, c]] = acc;
            }
        }
    }

    Ok(out)
}

/// Round and clamp to `[0, 255]`
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn saturate_u8(value: f64) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Warp an RGB image `[H, W, 3]`
pub fn warp_rgb(
    src: ArrayView3<u8>,
    forward: &Affine,
    out_size: (usize, usize),
    interpolation: Interpolation,
    border: Border<[f64; 3]>,
) -> Result<Array3<u8>> {
    let values;
    let border = match border {
        Border::Constant(v) => {
            values = v;
            Border::Constant(&values[..])
        }
        Border::Replicate => Border::Replicate,
    };
    Ok(warp_planes(src, forward, out_size, interpolation, border)?.mapv(saturate_u8))
}

/// Warp a single-channel 8-bit image `[H, W]`
pub fn warp_gray(
    src: ArrayView2<u8>,
    forward: &Affine,
    out_size: (usize, usize),
    interpolation: Interpolation,
    border: Border<f64>,
) -> Result<Array2<u8>> {
    let out = warp_single(src, forward, out_size, interpolation, border)?;
    Ok(out.mapv(saturate_u8))
}

/// Warp a single-channel float array `[H, W]`
#[allow(clippy::cast_possible_truncation)]
pub fn warp_f32(
    src: ArrayView2<f32>,
    forward: &Affine,
    out_size: (usize, usize),
    interpolation: Interpolation,
    border: Border<f32>,
) -> Result<Array2<f32>> {
    let border = match border {
        Border::Constant(v) => Border::Constant(f64::from(v)),
        Border::Replicate => Border::Replicate,
    };
    let out = warp_single(src, forward, out_size, interpolation, border)?;
    Ok(out.mapv(|v| v as f32))
}

fn warp_single<T>(
    src: ArrayView2<T>,
    forward: &Affine,
    out_size: (usize, usize),
    interpolation: Interpolation,
    border: Border<f64>,
) -> Result<Array2<f64>>
where
    T: Copy + Into<f64>,
{
    let values;
    let border = match border {
        Border::Constant(v) => {
            values = [v];
            Border::Constant(&values[..])
        }
        Border::Replicate => Border::Replicate,
    };
    let out = warp_planes(src.insert_axis(Axis(2)), forward, out_size, interpolation, border)?;
    Ok(out.index_axis_move(Axis(2), 0))
}

/// Map a canvas-space prediction back onto the original image frame
///
/// `inverse` is the canvas to original matrix returned alongside the forward
/// transform; `original_size` is `(height, width)`.
pub fn unwarp_prediction(
    prediction: ArrayView2<f32>,
    inverse: &Affine,
    original_size: (usize, usize),
) -> Result<Array2<f32>> {
    warp_f32(
        prediction,
        inverse,
        original_size,
        Interpolation::Cubic,
        Border::Constant(0.0),
    )
}
