//! Dataset implementations for referring image segmentation
//!
//! Two sources are supported: a record store of pre-packaged benchmark
//! records ([`RefStoreDataset`]) and a JSON manifest of image and mask files
//! ([`ManifestDataset`]). Both produce [`Sample`]s shaped by the loading
//! [`Mode`](refseg_core::Mode).

#![warn(missing_docs)]

mod error;

pub mod config;
pub mod image;
pub mod info;
pub mod manifest;
pub mod record;
pub mod sample;
pub mod store;

pub use config::{ManifestDatasetConfig, SentenceSelect, StoreDatasetConfig};
pub use error::{Error, Result};
pub use info::known_split_len;
pub use manifest::ManifestDataset;
pub use record::{ManifestEntry, RefRecord};
pub use sample::{Sample, SamplePipeline, TestParams, ValParams};
pub use store::{RecordStoreBuilder, RefStoreDataset, StoreState};

// Re-export core types
pub use refseg_core::{Dataset, Mode};
