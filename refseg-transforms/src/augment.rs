//! Training-time augmentations for canvased image/mask pairs
//!
//! Geometric steps move image and mask together; photometric steps touch the
//! image only. Every step keeps the array shapes of a square canvas.

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rand::{Rng, RngCore};

use refseg_core::error::Result;
use refseg_core::transform::{Augment, AugmentChain};

use crate::affine::Affine;
use crate::warp::{saturate_u8, warp_f32, warp_rgb, Border, Interpolation};

#[inline]
fn fires(p: f64, rng: &mut dyn RngCore) -> bool {
    rng.gen::<f64>() < p
}

/// Mirror left to right with probability `p`
#[derive(Debug, Clone)]
pub struct HorizontalFlip {
    /// Probability of applying the flip
    pub p: f64,
}

impl Augment for HorizontalFlip {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        if !fires(self.p, rng) {
            return Ok((image, mask));
        }
        Ok((
            image.slice(s![.., ..;-1, ..]).to_owned(),
            mask.slice(s![.., ..;-1]).to_owned(),
        ))
    }
}

/// Rotate by a random multiple of 90 degrees with probability `p`
///
/// Non-square inputs are only rotated by 0 or 180 degrees so that shapes are
/// preserved.
#[derive(Debug, Clone)]
pub struct RandomRotate90 {
    /// Probability of applying a rotation
    pub p: f64,
}

/// Counter-clockwise rotation by `k * 90` degrees
fn rot90<T: Copy>(plane: ArrayView2<T>, k: u8) -> Array2<T> {
    let (h, w) = plane.dim();
    match k % 4 {
        1 => Array2::from_shape_fn((w, h), |(i, j)| plane[[j, w - 1 - i]]),
        2 => Array2::from_shape_fn((h, w), |(i, j)| plane[[h - 1 - i, w - 1 - j]]),
        3 => Array2::from_shape_fn((w, h), |(i, j)| plane[[h - 1 - j, i]]),
        _ => plane.to_owned(),
    }
}

impl Augment for RandomRotate90 {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        if !fires(self.p, rng) {
            return Ok((image, mask));
        }
        let (h, w) = mask.dim();
        let k = if h == w {
            rng.gen_range(0..4u8)
        } else {
            2 * rng.gen_range(0..2u8)
        };

        let planes: Vec<Array2<u8>> = image
            .axis_iter(Axis(2))
            .map(|plane| rot90(plane, k))
            .collect();
        let views: Vec<_> = planes.iter().map(|p| p.view().insert_axis(Axis(2))).collect();
        let image = ndarray::concatenate(Axis(2), &views)
            .map_err(|e| refseg_core::Error::TransformationError(e.to_string()))?;

        Ok((image, rot90(mask.view(), k)))
    }
}

/// Crop a random square and scale it back to the full canvas
///
/// The crop side is drawn from `[min_size, max_size]` pixels.
#[derive(Debug, Clone)]
pub struct RandomSizedCrop {
    /// Smallest crop side
    pub min_size: usize,
    /// Largest crop side
    pub max_size: usize,
    /// Probability of applying the crop
    pub p: f64,
}

impl Augment for RandomSizedCrop {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        if !fires(self.p, rng) {
            return Ok((image, mask));
        }
        let (h, w) = mask.dim();
        let limit = h.min(w);
        if limit == 0 {
            return Ok((image, mask));
        }
        let hi = self.max_size.min(limit).max(1);
        let lo = self.min_size.clamp(1, hi);
        let side = rng.gen_range(lo..=hi);
        let y0 = rng.gen_range(0..=h - side);
        let x0 = rng.gen_range(0..=w - side);

        let (sx, sy) = (w as f64 / side as f64, h as f64 / side as f64);
        let forward = Affine::new([
            [sx, 0.0, -(x0 as f64) * sx],
            [0.0, sy, -(y0 as f64) * sy],
        ]);

        let image = warp_rgb(
            image.view(),
            &forward,
            (h, w),
            Interpolation::Linear,
            Border::Replicate,
        )?;
        let mask = warp_f32(
            mask.view(),
            &forward,
            (h, w),
            Interpolation::Linear,
            Border::Replicate,
        )?;
        Ok((image, mask))
    }
}

/// Contrast limited adaptive histogram equalization of the luma
///
/// The image is split into a `tile_grid = (columns, rows)` grid. Each tile
/// gets an equalization table built from its histogram clipped at
/// `clip_limit` times the mean bin count, and every pixel blends the tables
/// of its four nearest tiles. The luma shift is added back to each channel,
/// so chroma is kept. The mask is left untouched.
#[derive(Debug, Clone)]
pub struct Clahe {
    /// Histogram clip limit relative to a flat histogram
    pub clip_limit: f64,
    /// Tile columns and rows
    pub tile_grid: (usize, usize),
    /// Probability of applying the equalization
    pub p: f64,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: 4.0,
            tile_grid: (8, 8),
            p: 0.5,
        }
    }
}

/// Split `len` pixels into `tiles` bands of fractional size
#[derive(Debug, Clone, Copy)]
struct Bands {
    tiles: usize,
    size: f64,
}

impl Bands {
    #[allow(clippy::cast_precision_loss)]
    fn new(len: usize, tiles: usize) -> Self {
        let tiles = tiles.clamp(1, len.max(1));
        Self {
            tiles,
            size: len as f64 / tiles as f64,
        }
    }

    /// Pixel range covered by tile `i`
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn range(self, i: usize) -> std::ops::Range<usize> {
        // Both bounds lie in `[0, len]`.
        let start = (i as f64 * self.size).floor() as usize;
        let end = ((i + 1) as f64 * self.size).floor() as usize;
        start..end
    }

    /// Neighbouring tiles of pixel `p` and the weight of the second one
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn neighbours(self, p: usize) -> (usize, usize, f64) {
        let f = p as f64 / self.size - 0.5;
        let first = f.floor();
        let weight = f - first;
        // `first` lies in `[-1, tiles - 1]`.
        let lower = first.max(0.0) as usize;
        let upper = ((first + 1.0).max(0.0) as usize).min(self.tiles - 1);
        (lower.min(self.tiles - 1), upper, weight)
    }
}

impl Clahe {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    fn table(&self, luma: ArrayView2<u8>) -> [u8; 256] {
        let area = luma.len().max(1);
        let mut histogram = [0usize; 256];
        for &v in luma {
            histogram[usize::from(v)] += 1;
        }

        // The limit is at least one count per bin, so it fits a usize.
        let limit = ((self.clip_limit * area as f64 / 256.0) as usize).max(1);
        let mut excess = 0;
        for bin in &mut histogram {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let batch = excess / 256;
        let mut residual = excess - batch * 256;
        let step = if residual > 0 { (256 / residual).max(1) } else { 1 };
        for (i, bin) in histogram.iter_mut().enumerate() {
            *bin += batch;
            if residual > 0 && i % step == 0 {
                *bin += 1;
                residual -= 1;
            }
        }

        let scale = 255.0 / area as f64;
        let mut table = [0u8; 256];
        let mut sum = 0;
        for (slot, &count) in table.iter_mut().zip(&histogram) {
            sum += count;
            *slot = saturate_u8(sum as f64 * scale);
        }
        table
    }

    fn equalize(&self, image: Array3<u8>) -> Array3<u8> {
        let (h, w, _) = image.dim();
        if h == 0 || w == 0 || self.clip_limit <= 0.0 {
            return image;
        }
        let luma = image.map_axis(Axis(2), |px| match px.len() {
            0 => 0,
            1 | 2 => px[0],
            _ => saturate_u8(
                0.299 * f64::from(px[0]) + 0.587 * f64::from(px[1]) + 0.114 * f64::from(px[2]),
            ),
        });

        let (cols, rows) = self.tile_grid;
        let (bands_y, bands_x) = (Bands::new(h, rows), Bands::new(w, cols));
        let tables: Vec<Vec<[u8; 256]>> = (0..bands_y.tiles)
            .map(|ty| {
                (0..bands_x.tiles)
                    .map(|tx| self.table(luma.slice(s![bands_y.range(ty), bands_x.range(tx)])))
                    .collect()
            })
            .collect();

        let mut image = image;
        for y in 0..h {
            let (ty1, ty2, ya) = bands_y.neighbours(y);
            for x in 0..w {
                let (tx1, tx2, xa) = bands_x.neighbours(x);
                let v = usize::from(luma[[y, x]]);
                let at = |ty: usize, tx: usize| f64::from(tables[ty][tx][v]);
                let top = at(ty1, tx1) * (1.0 - xa) + at(ty1, tx2) * xa;
                let bottom = at(ty2, tx1) * (1.0 - xa) + at(ty2, tx2) * xa;
                let shift =
                    f64::from(saturate_u8(top * (1.0 - ya) + bottom * ya)) - f64::from(luma[[y, x]]);
                for c in image.slice_mut(s![y, x, ..]) {
                    *c = saturate_u8(f64::from(*c) + shift);
                }
            }
        }
        image
    }
}

impl Augment for Clahe {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        if !fires(self.p, rng) {
            return Ok((image, mask));
        }
        Ok((self.equalize(image), mask))
    }
}

/// Random brightness shift and contrast scale with probability `p`
#[derive(Debug, Clone)]
pub struct RandomBrightnessContrast {
    /// Maximum brightness shift as a fraction of 255
    pub brightness_limit: f64,
    /// Maximum relative contrast change
    pub contrast_limit: f64,
    /// Probability of applying the adjustment
    pub p: f64,
}

impl Default for RandomBrightnessContrast {
    fn default() -> Self {
        Self {
            brightness_limit: 0.2,
            contrast_limit: 0.2,
            p: 0.5,
        }
    }
}

impl Augment for RandomBrightnessContrast {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        if !fires(self.p, rng) {
            return Ok((image, mask));
        }
        let alpha = 1.0 + rng.gen_range(-self.contrast_limit..=self.contrast_limit);
        let beta = 255.0 * rng.gen_range(-self.brightness_limit..=self.brightness_limit);
        let image = image.mapv(|v| saturate_u8(f64::from(v) * alpha + beta));
        Ok((image, mask))
    }
}

/// Random gamma curve with probability `p`
#[derive(Debug, Clone)]
pub struct RandomGamma {
    /// Gamma range in percent, e.g. `(80, 120)` for `[0.8, 1.2]`
    pub gamma_limit: (u32, u32),
    /// Probability of applying the curve
    pub p: f64,
}

impl Default for RandomGamma {
    fn default() -> Self {
        Self {
            gamma_limit: (80, 120),
            p: 0.5,
        }
    }
}

impl RandomGamma {
    /// Uniform draw over `gamma_limit / 100`
    fn draw_gamma(&self, rng: &mut dyn RngCore) -> f64 {
        let (lo, hi) = self.gamma_limit;
        let (lo, hi) = (f64::from(lo.min(hi)), f64::from(hi.max(lo)));
        rng.gen_range(lo..=hi) / 100.0
    }
}

impl Augment for RandomGamma {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        if !fires(self.p, rng) {
            return Ok((image, mask));
        }
        let gamma = self.draw_gamma(rng);

        let lut: Vec<u8> = (0..=255u8)
            .map(|v| saturate_u8(255.0 * (f64::from(v) / 255.0).powf(gamma)))
            .collect();
        Ok((image.mapv(|v| lut[usize::from(v)]), mask))
    }
}

/// The augmentation pipeline used for surgical-scene training
pub fn default_pipeline(input_size: usize) -> AugmentChain {
    AugmentChain::default()
        .then(RandomSizedCrop {
            min_size: input_size / 2,
            max_size: input_size,
            p: 0.5,
        })
        .then(HorizontalFlip { p: 0.5 })
        .then(RandomRotate90 { p: 0.5 })
        .then(Clahe {
            p: 0.8,
            ..Default::default()
        })
        .then(RandomBrightnessContrast {
            p: 0.8,
            ..Default::default()
        })
        .then(RandomGamma {
            p: 0.8,
            ..Default::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use refseg_core::transform::apply_checked;

    /// Image whose red channel mirrors the mask, to check joint geometry
    fn paired(size: usize) -> (Array3<u8>, Array2<f32>) {
        let mask = Array2::from_shape_fn((size, size), |(y, x)| {
            if y < size / 2 && x < size / 3 {
                1.0
            } else {
                0.0
            }
        });
        let image = Array3::from_shape_fn((size, size, 3), |(y, x, c)| match c {
            0 => (mask[[y, x]] * 255.0) as u8,
            _ => (y * 10 + x) as u8,
        });
        (image, mask)
    }

    fn assert_aligned(image: &Array3<u8>, mask: &Array2<f32>) {
        for ((y, x), &m) in mask.indexed_iter() {
            assert_eq!(image[[y, x, 0]], (m * 255.0) as u8, "misaligned at ({y}, {x})");
        }
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let (image, mask) = paired(6);
        let flip = HorizontalFlip { p: 1.0 };
        let mut rng = StdRng::seed_from_u64(1);

        let (once_i, once_m) = flip.augment(image.clone(), mask.clone(), &mut rng).unwrap();
        assert_eq!(once_m[[0, 5]], 1.0);
        assert_aligned(&once_i, &once_m);

        let (twice_i, twice_m) = flip.augment(once_i, once_m, &mut rng).unwrap();
        assert_eq!(twice_i, image);
        assert_eq!(twice_m, mask);
    }

    #[test]
    fn test_rotation_keeps_pairs_aligned() {
        let rotate = RandomRotate90 { p: 1.0 };
        for seed in 0..8 {
            let (image, mask) = paired(6);
            let mut rng = StdRng::seed_from_u64(seed);
            let (image, mask) = apply_checked(&rotate, image, mask, &mut rng).unwrap();
            assert_aligned(&image, &mask);
        }
    }

    #[test]
    fn test_rot90_matches_counter_clockwise_rotation() {
        let plane = Array2::from_shape_vec((2, 3), vec![1, 2, 3, 4, 5, 6]).unwrap();
        let once = rot90(plane.view(), 1);
        assert_eq!(once, Array2::from_shape_vec((3, 2), vec![3, 6, 2, 5, 1, 4]).unwrap());
        assert_eq!(rot90(once.view(), 3), plane);
        assert_eq!(rot90(rot90(plane.view(), 2).view(), 2), plane);
    }

    #[test]
    fn test_zero_probability_is_noop() {
        let (image, mask) = paired(8);
        let chain = AugmentChain::default()
            .then(HorizontalFlip { p: 0.0 })
            .then(RandomRotate90 { p: 0.0 })
            .then(RandomSizedCrop {
                min_size: 2,
                max_size: 4,
                p: 0.0,
            })
            .then(Clahe {
                p: 0.0,
                ..Default::default()
            })
            .then(RandomBrightnessContrast {
                p: 0.0,
                ..Default::default()
            })
            .then(RandomGamma {
                p: 0.0,
                ..Default::default()
            });
        let mut rng = StdRng::seed_from_u64(3);
        let (out_i, out_m) = chain.augment(image.clone(), mask.clone(), &mut rng).unwrap();
        assert_eq!(out_i, image);
        assert_eq!(out_m, mask);
    }

    #[test]
    fn test_gamma_keeps_extremes() {
        let image = Array3::from_shape_fn((1, 2, 3), |(_, x, _)| if x == 0 { 0 } else { 255 });
        let mask = Array2::zeros((1, 2));
        let mut rng = StdRng::seed_from_u64(11);
        let (out, _) = RandomGamma {
            p: 1.0,
            ..Default::default()
        }
        .augment(image.clone(), mask, &mut rng)
        .unwrap();
        assert_eq!(out, image);
    }

    #[test]
    fn test_clahe_keeps_flat_image_flat() {
        let image = Array3::from_elem((16, 24, 3), 120u8);
        let mask = Array2::from_elem((16, 24), 0.5f32);
        let mut rng = StdRng::seed_from_u64(5);
        let (out, out_mask) = Clahe {
            p: 1.0,
            ..Default::default()
        }
        .augment(image, mask.clone(), &mut rng)
        .unwrap();
        assert_eq!(out.dim(), (16, 24, 3));
        assert_eq!(out_mask, mask);
        let first = out[[0, 0, 0]];
        assert!(out.iter().all(|&v| v == first));
    }

    #[test]
    fn test_clahe_stretches_low_contrast() {
        let image = Array3::from_shape_fn((16, 16, 3), |(y, x, _)| 100 + ((y + x) % 8) as u8);
        let clahe = Clahe {
            clip_limit: 40.0,
            tile_grid: (2, 2),
            p: 1.0,
        };
        let out = clahe.equalize(image.clone());
        let spread = |a: &Array3<u8>| {
            let (lo, hi) = a.iter().fold((u8::MAX, 0), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            hi - lo
        };
        assert_eq!(out.dim(), image.dim());
        assert!(spread(&out) > spread(&image));
    }

    #[test]
    fn test_clahe_table_without_clipping_is_the_histogram_cdf() {
        let luma = Array2::from_shape_fn((2, 2), |(y, x)| [[0u8, 0], [128, 255]][y][x]);
        let table = Clahe {
            clip_limit: 256.0,
            tile_grid: (1, 1),
            p: 1.0,
        }
        .table(luma.view());
        assert_eq!(table[0], 128);
        assert_eq!(table[127], 128);
        assert_eq!(table[128], 191);
        assert_eq!(table[255], 255);
    }

    #[test]
    fn test_gamma_is_drawn_from_a_continuous_range() {
        let gamma = RandomGamma::default();
        let mut rng = StdRng::seed_from_u64(9);
        let draws: Vec<f64> = (0..64).map(|_| gamma.draw_gamma(&mut rng)).collect();
        assert!(draws.iter().all(|g| (0.8..=1.2).contains(g)));
        assert!(draws
            .iter()
            .any(|g| ((g * 100.0) - (g * 100.0).round()).abs() > 1e-3));
    }

    #[test]
    fn test_default_pipeline_preserves_shapes_and_mask_range() {
        let pipeline = default_pipeline(32);
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..10 {
            let (image, mask) = paired(32);
            let (image, mask) = apply_checked(&pipeline, image, mask, &mut rng).unwrap();
            assert_eq!(image.dim(), (32, 32, 3));
            assert!(mask.iter().all(|v| (-1e-6..=1.0 + 1e-6).contains(v)));
        }
    }
}
