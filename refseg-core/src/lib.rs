//! Core traits, errors and record storage for referring segmentation datasets
//!
//! This crate provides the pieces shared by every dataset flavour: the
//! [`Dataset`] trait and loading [`Mode`], the [`Augment`] capability used for
//! optional training-time augmentation, and a read-only key-value record
//! store that datasets open lazily, once per worker.

#![warn(missing_docs)]

pub mod dataset;
pub mod error;
pub mod store;
pub mod transform;

// Re-export key types for convenience
pub use dataset::{Dataset, Mode};
pub use error::{Error, Result};
pub use store::{KvStore, MmapStore, MmapStoreOpener, StoreOpener, StoreWriter};
pub use transform::{Augment, AugmentChain};
