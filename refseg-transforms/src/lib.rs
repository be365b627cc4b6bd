//! Sample preparation for referring segmentation models
//!
//! This crate turns decoded images, masks and sentences into model inputs:
//!
//! - [`affine`]: aspect-preserving canvas geometry and its inverse
//! - [`warp`]: affine resampling of images, masks and predictions
//! - [`convert`]: scaling and channel normalization into CHW tensors
//! - [`tokenize`]: fixed-length token rows for the text encoder
//! - [`augment`]: optional training-time augmentations

#![warn(missing_docs)]

pub mod affine;
pub mod augment;
pub mod convert;
pub mod tokenize;
pub mod warp;

// Re-export key types for convenience
pub use affine::{compute_transform, Affine, CanvasGeometry};
pub use augment::{
    default_pipeline, HorizontalFlip, RandomBrightnessContrast, RandomGamma, RandomRotate90,
    RandomSizedCrop,
};
pub use convert::{mask_to_tensor, Normalize, CLIP_MEAN, CLIP_STD};
pub use tokenize::{ClipTokenizer, TextEncoder, DEFAULT_CONTEXT_LENGTH};
pub use warp::{unwarp_prediction, warp_f32, warp_gray, warp_rgb, Border, Interpolation};
