//! Augmentation capability applied to canvased image/mask pairs

use ndarray::{Array2, Array3};
use rand::RngCore;

use crate::error::{Error, Result};

/// A joint transformation of an image `[H, W, 3]` and its mask `[H, W]`
///
/// Implementations must return arrays with the same shapes they were given.
pub trait Augment: Send + Sync {
    /// Transform one image/mask pair
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)>;
}

impl<F> Augment for F
where
    F: Fn(Array3<u8>, Array2<f32>, &mut dyn RngCore) -> Result<(Array3<u8>, Array2<f32>)>
        + Send
        + Sync,
{
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        self(image, mask, rng)
    }
}

/// Run an augmentation and check that it kept both shapes
pub fn apply_checked(
    augment: &dyn Augment,
    image: Array3<u8>,
    mask: Array2<f32>,
    rng: &mut dyn RngCore,
) -> Result<(Array3<u8>, Array2<f32>)> {
    let image_shape = image.shape().to_vec();
    let mask_shape = mask.shape().to_vec();
    let (image, mask) = augment.augment(image, mask, rng)?;

    if image.shape() != image_shape.as_slice() || mask.shape() != mask_shape.as_slice() {
        return Err(Error::ShapeMismatch(format!(
            "augmentation changed shapes from {image_shape:?}/{mask_shape:?} to {:?}/{:?}",
            image.shape(),
            mask.shape()
        )));
    }
    Ok((image, mask))
}

/// A sequence of augmentations executed as one
#[derive(Default)]
pub struct AugmentChain {
    steps: Vec<Box<dyn Augment>>,
}

impl AugmentChain {
    /// Create a chain from its steps
    pub fn new(steps: Vec<Box<dyn Augment>>) -> Self {
        Self { steps }
    }

    /// Append a step
    #[must_use]
    pub fn then<A: Augment + 'static>(mut self, step: A) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the chain has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Augment for AugmentChain {
    fn augment(
        &self,
        image: Array3<u8>,
        mask: Array2<f32>,
        rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        let mut current = (image, mask);
        for step in &self.steps {
            current = step.augment(current.0, current.1, rng)?;
        }
        Ok(current)
    }
}

impl std::fmt::Debug for AugmentChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AugmentChain").field("steps", &self.steps.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn invert(
        image: Array3<u8>,
        mask: Array2<f32>,
        _rng: &mut dyn RngCore,
    ) -> Result<(Array3<u8>, Array2<f32>)> {
        Ok((image.mapv(|v| 255 - v), mask.mapv(|v| 1.0 - v)))
    }

    #[test]
    fn test_chain_runs_in_order() {
        let chain = AugmentChain::default().then(invert).then(invert);
        assert_eq!(chain.len(), 2);

        let image = Array3::from_shape_fn((2, 3, 3), |(y, x, c)| (y * 9 + x * 3 + c) as u8);
        let mask = Array2::from_elem((2, 3), 0.25_f32);
        let mut rng = StdRng::seed_from_u64(7);

        let (out_image, out_mask) = chain.augment(image.clone(), mask.clone(), &mut rng).unwrap();
        assert_eq!(out_image, image);
        assert_eq!(out_mask, mask);
    }

    #[test]
    fn test_shape_change_is_rejected() {
        let shrink = |image: Array3<u8>,
                      _mask: Array2<f32>,
                      _rng: &mut dyn RngCore|
         -> Result<(Array3<u8>, Array2<f32>)> { Ok((image, Array2::zeros((1, 1)))) };
        let mut rng = StdRng::seed_from_u64(0);

        let result = apply_checked(
            &shrink,
            Array3::zeros((4, 4, 3)),
            Array2::zeros((4, 4)),
            &mut rng,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch(_))));
    }
}
