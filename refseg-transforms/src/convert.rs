//! Conversion of canvased pixel arrays into normalized tensors

use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

use refseg_core::error::{Error, Result};

/// Per-channel mean of the CLIP image encoder's training data
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// Per-channel standard deviation of the CLIP image encoder's training data
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Channel-wise normalization `(x / 255 - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalize {
    /// Per-channel mean on the `[0, 1]` scale
    pub mean: [f32; 3],
    /// Per-channel standard deviation on the `[0, 1]` scale
    pub std: [f32; 3],
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }
}

impl Normalize {
    /// The mean color on the 0-255 scale, used to pad canvases
    pub fn border_color(&self) -> [f64; 3] {
        self.mean.map(|m| f64::from(m) * 255.0)
    }

    /// Convert an `[H, W, 3]` image into a normalized `[3, H, W]` tensor
    pub fn image_to_tensor<T>(&self, image: ArrayView3<T>) -> Result<Array3<f32>>
    where
        T: Copy + Into<f32>,
    {
        let (h, w, channels) = image.dim();
        if channels != 3 {
            return Err(Error::ShapeMismatch(format!(
                "expected a 3-channel image, got {channels} channels"
            )));
        }

        Ok(Array3::from_shape_fn((3, h, w), |(c, y, x)| {
            let v: f32 = image[[y, x, c]].into();
            (v / 255.0 - self.mean[c]) / self.std[c]
        }))
    }

    /// Convert an image and optional mask in one call
    pub fn convert<T, M>(
        &self,
        image: ArrayView3<T>,
        mask: Option<ArrayView2<M>>,
    ) -> Result<(Array3<f32>, Option<Array2<f32>>)>
    where
        T: Copy + Into<f32>,
        M: Copy + Into<f32>,
    {
        let image_tensor = self.image_to_tensor(image)?;
        let mask_tensor = match mask {
            Some(mask) => {
                if mask.dim() != (image.dim().0, image.dim().1) {
                    return Err(Error::ShapeMismatch(format!(
                        "mask {:?} does not match image {:?}",
                        mask.dim(),
                        image.dim()
                    )));
                }
                Some(mask_to_tensor(mask))
            }
            None => None,
        };
        Ok((image_tensor, mask_tensor))
    }
}

/// Cast a mask to `f32` without rescaling
pub fn mask_to_tensor<M>(mask: ArrayView2<M>) -> Array2<f32>
where
    M: Copy + Into<f32>,
{
    mask.mapv(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_is_scaled_then_centered() {
        let norm = Normalize::default();
        let mut image = Array3::<u8>::zeros((2, 3, 3));
        image[[1, 2, 0]] = 255;

        let tensor = norm.image_to_tensor(image.view()).unwrap();
        assert_eq!(tensor.dim(), (3, 2, 3));

        let expected_black = -CLIP_MEAN[1] / CLIP_STD[1];
        assert!((tensor[[1, 0, 0]] - expected_black).abs() < 1e-6);

        let expected_white = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        assert!((tensor[[0, 1, 2]] - expected_white).abs() < 1e-6);
    }

    #[test]
    fn test_mean_color_maps_to_zero() {
        let norm = Normalize {
            mean: [0.5, 0.5, 0.5],
            std: [0.25, 0.25, 0.25],
        };
        let image = Array3::<f32>::from_elem((1, 1, 3), 127.5);
        let tensor = norm.image_to_tensor(image.view()).unwrap();
        assert!(tensor.iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_mask_conversion_is_idempotent() {
        let mask = Array2::from_shape_fn((4, 4), |(y, x)| (y * 4 + x) as f32 / 15.0);
        let once = mask_to_tensor(mask.view());
        let twice = mask_to_tensor(once.view());
        assert_eq!(once, mask);
        assert_eq!(twice, once);
        assert!(twice.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_convert_checks_mask_shape() {
        let norm = Normalize::default();
        let image = Array3::<u8>::zeros((4, 4, 3));
        let mask = Array2::<f32>::zeros((4, 5));
        assert!(matches!(
            norm.convert(image.view(), Some(mask.view())),
            Err(Error::ShapeMismatch(_))
        ));

        let (tensor, none) = norm.convert::<u8, f32>(image.view(), None).unwrap();
        assert_eq!(tensor.dim(), (3, 4, 4));
        assert!(none.is_none());
    }

    #[test]
    fn test_rejects_non_rgb() {
        let image = Array3::<u8>::zeros((4, 4, 1));
        assert!(Normalize::default().image_to_tensor(image.view()).is_err());
    }

    #[test]
    fn test_border_color_is_mean_on_byte_scale() {
        let border = Normalize::default().border_color();
        assert!((border[0] - 122.771).abs() < 1e-2);
        assert!((border[1] - 116.746).abs() < 1e-2);
        assert!((border[2] - 104.094).abs() < 1e-2);
    }
}
