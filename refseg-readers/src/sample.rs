//! Samples and the pipeline that builds them

use std::path::PathBuf;

use ndarray::{Array1, Array2, Array3, ArrayView2};
use rand::RngCore;
use tracing::debug;

use refseg_core::transform::{apply_checked, Augment};
use refseg_core::{Error as CoreError, Mode};
use refseg_transforms::{
    compute_transform, warp_gray, warp_rgb, Affine, Border, ClipTokenizer, Interpolation,
    Normalize,
};

use crate::error::Result;

/// What a validation sample needs to be scored against the original mask
#[derive(Debug, Clone)]
pub struct ValParams {
    /// Full-resolution mask file
    pub mask_path: PathBuf,
    /// Canvas to original transform
    pub inverse: Affine,
    /// Original `(height, width)`
    pub original_size: (usize, usize),
}

/// What a test sample needs to run and visualise inference
#[derive(Debug, Clone)]
pub struct TestParams {
    /// Decoded original RGB image
    pub original_image: Array3<u8>,
    /// Segment id of the record
    pub seg_id: u64,
    /// Full-resolution mask file
    pub mask_path: PathBuf,
    /// Canvas to original transform
    pub inverse: Affine,
    /// Original `(height, width)`
    pub original_size: (usize, usize),
    /// Every sentence of the record
    pub sentences: Vec<String>,
}

/// One model input, shaped by the loading mode
#[derive(Debug, Clone)]
pub enum Sample {
    /// Training triple
    Train {
        /// `[3, S, S]` normalized image
        image: Array3<f32>,
        /// `[L]` token row
        text: Array1<i64>,
        /// `[S, S]` mask in `[0, 1]`
        mask: Array2<f32>,
    },
    /// Validation sample
    Val {
        /// `[3, S, S]` normalized image
        image: Array3<f32>,
        /// `[L]` token row of the first sentence
        text: Array1<i64>,
        /// Scoring parameters
        params: ValParams,
    },
    /// Test sample
    Test {
        /// `[3, S, S]` normalized image
        image: Array3<f32>,
        /// Inference parameters
        params: TestParams,
    },
}

impl Sample {
    /// The normalized image tensor
    pub fn image(&self) -> &Array3<f32> {
        match self {
            Sample::Train { image, .. } | Sample::Val { image, .. } | Sample::Test { image, .. } => {
                image
            }
        }
    }

    /// The token row, absent in test samples
    pub fn text(&self) -> Option<&Array1<i64>> {
        match self {
            Sample::Train { text, .. } | Sample::Val { text, .. } => Some(text),
            Sample::Test { .. } => None,
        }
    }

    /// The mode this sample was built for
    pub fn mode(&self) -> Mode {
        match self {
            Sample::Train { .. } => Mode::Train,
            Sample::Val { .. } => Mode::Val,
            Sample::Test { .. } => Mode::Test,
        }
    }
}

/// An image placed on the canvas
struct Canvas {
    image: Array3<u8>,
    forward: Affine,
    inverse: Affine,
    original_size: (usize, usize),
}

/// Geometry, normalization and tokenization shared by every dataset
#[derive(Debug, Clone)]
pub struct SamplePipeline {
    input_size: usize,
    word_length: usize,
    normalize: Normalize,
    tokenizer: ClipTokenizer,
}

impl SamplePipeline {
    /// Create a pipeline for an `input_size` canvas and `word_length` tokens
    pub fn new(input_size: usize, word_length: usize, tokenizer: ClipTokenizer) -> Self {
        Self {
            input_size,
            word_length,
            normalize: Normalize::default(),
            tokenizer,
        }
    }

    /// Side of the square canvas
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Token row length
    pub fn word_length(&self) -> usize {
        self.word_length
    }

    fn canvas(&self, image: &Array3<u8>) -> Result<Canvas> {
        let (h, w, _) = image.dim();
        let (forward, inverse) = compute_transform(h, w, self.input_size, true)?;
        let inverse = inverse.ok_or_else(|| {
            CoreError::TransformationError("inverse transform was not computed".into())
        })?;
        let canvas = warp_rgb(
            image.view(),
            &forward,
            (self.input_size, self.input_size),
            Interpolation::Cubic,
            Border::Constant(self.normalize.border_color()),
        )?;
        debug!(height = h, width = w, size = self.input_size, "placed image on canvas");

        Ok(Canvas {
            image: canvas,
            forward,
            inverse,
            original_size: (h, w),
        })
    }

    fn canvas_mask(&self, mask: ArrayView2<u8>, canvas: &Canvas) -> Result<Array2<f32>> {
        if mask.dim() != canvas.original_size {
            return Err(CoreError::ShapeMismatch(format!(
                "mask {:?} does not match image {:?}",
                mask.dim(),
                canvas.original_size
            ))
            .into());
        }
        let warped = warp_gray(
            mask,
            &canvas.forward,
            (self.input_size, self.input_size),
            Interpolation::Linear,
            Border::Constant(0.0),
        )?;
        Ok(warped.mapv(|v| f32::from(v) / 255.0))
    }

    fn tokens(&self, sentence: &str) -> Result<Array1<i64>> {
        Ok(self
            .tokenizer
            .tokenize_one(sentence, self.word_length, true)?)
    }

    /// Build a training sample from a decoded image and mask
    pub fn train(
        &self,
        image: &Array3<u8>,
        mask: ArrayView2<u8>,
        sentence: &str,
        augment: Option<&dyn Augment>,
        rng: &mut dyn RngCore,
    ) -> Result<Sample> {
        let canvas = self.canvas(image)?;
        let mut mask = self.canvas_mask(mask, &canvas)?;
        let mut pixels = canvas.image;
        if let Some(augment) = augment {
            (pixels, mask) = apply_checked(augment, pixels, mask, rng)?;
        }

        let text = self.tokens(sentence)?;
        let (image, mask) = self.normalize.convert(pixels.view(), Some(mask.view()))?;
        let mask = mask.ok_or_else(|| {
            CoreError::TransformationError("mask conversion produced no tensor".into())
        })?;
        Ok(Sample::Train { image, text, mask })
    }

    /// Build a validation sample from a decoded image
    pub fn val(&self, image: &Array3<u8>, sentence: &str, mask_path: PathBuf) -> Result<Sample> {
        let canvas = self.canvas(image)?;
        let text = self.tokens(sentence)?;
        let image = self.normalize.image_to_tensor(canvas.image.view())?;
        Ok(Sample::Val {
            image,
            text,
            params: ValParams {
                mask_path,
                inverse: canvas.inverse,
                original_size: canvas.original_size,
            },
        })
    }

    /// Build a test sample, keeping the original image
    pub fn test(
        &self,
        image: Array3<u8>,
        seg_id: u64,
        mask_path: PathBuf,
        sentences: Vec<String>,
    ) -> Result<Sample> {
        let canvas = self.canvas(&image)?;
        let tensor = self.normalize.image_to_tensor(canvas.image.view())?;
        Ok(Sample::Test {
            image: tensor,
            params: TestParams {
                original_image: image,
                seg_id,
                mask_path,
                inverse: canvas.inverse,
                original_size: canvas.original_size,
                sentences,
            },
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use refseg_transforms::TextEncoder;

    use super::*;

    /// One token per whitespace-separated word
    pub(crate) struct WordEncoder;

    impl TextEncoder for WordEncoder {
        fn encode(&self, text: &str) -> refseg_core::Result<Vec<u32>> {
            Ok(text
                .split_whitespace()
                .map(|w| 1000 + w.bytes().map(u32::from).sum::<u32>())
                .collect())
        }

        fn token_id(&self, token: &str) -> Option<u32> {
            match token {
                "<|startoftext|>" => Some(49406),
                "<|endoftext|>" => Some(49407),
                _ => None,
            }
        }
    }

    pub(crate) fn tokenizer() -> ClipTokenizer {
        ClipTokenizer::new(Arc::new(WordEncoder)).unwrap()
    }
}
