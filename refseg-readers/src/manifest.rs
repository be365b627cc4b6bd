//! Dataset over a JSON manifest of image and mask files
//!
//! The manifest is a JSON array of `{img_path, mask_path, num_sents, sents}`
//! objects whose paths are relative to the data root. It is read in full at
//! construction.

use std::fmt;
use std::fs::File;
use std::io::BufReader;

use rand::{Rng, RngCore};
use tracing::{debug, info};

use refseg_core::transform::Augment;
use refseg_core::{Dataset, Error as CoreError, Mode};
use refseg_transforms::{default_pipeline, ClipTokenizer};

use crate::config::{ManifestDatasetConfig, SentenceSelect};
use crate::error::{Error, Result};
use crate::image::{read_gray, read_rgb};
use crate::record::ManifestEntry;
use crate::sample::{Sample, SamplePipeline};

/// Dataset of described image regions listed in a manifest file
pub struct ManifestDataset {
    config: ManifestDatasetConfig,
    entries: Vec<ManifestEntry>,
    pipeline: SamplePipeline,
    augment: Option<Box<dyn Augment>>,
}

impl ManifestDataset {
    /// Load the manifest named by `config`
    ///
    /// The default augmentation pipeline is installed when `use_vis_aug` is
    /// set.
    pub fn new(config: ManifestDatasetConfig, tokenizer: ClipTokenizer) -> Result<Self> {
        config.validate()?;
        let path = config.manifest_path();
        let file = File::open(&path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {e}", path.display()),
            ))
        })?;
        let entries: Vec<ManifestEntry> = serde_json::from_reader(BufReader::new(file))?;
        for entry in &entries {
            entry.validate()?;
        }
        info!(path = %path.display(), entries = entries.len(), "loaded manifest");

        let augment: Option<Box<dyn Augment>> = if config.use_vis_aug {
            Some(Box::new(default_pipeline(config.input_size)))
        } else {
            None
        };
        let pipeline = SamplePipeline::new(config.input_size, config.word_length, tokenizer);
        Ok(Self {
            config,
            entries,
            pipeline,
            augment,
        })
    }

    /// Replace the augmentation applied to training samples
    #[must_use]
    pub fn with_augment(mut self, augment: Box<dyn Augment>) -> Self {
        self.augment = Some(augment);
        self
    }

    /// The dataset configuration
    pub fn config(&self) -> &ManifestDatasetConfig {
        &self.config
    }

    /// The manifest entries
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    fn choose_sentence(&self, entry: &ManifestEntry, rng: &mut dyn RngCore) -> usize {
        match self.config.sents_select {
            SentenceSelect::Random => rng.gen_range(0..entry.num_sents),
            SentenceSelect::First => 0,
        }
    }
}

impl Dataset for ManifestDataset {
    type Item = Sample;
    type Error = Error;

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let entry = self.entries.get(index).ok_or(CoreError::IndexOutOfBounds {
            index,
            len: self.entries.len(),
        })?;
        let root = &self.config.data_root;
        let image = read_rgb(root.join(&entry.img_path))?;
        let mask_path = root.join(&entry.mask_path);

        match self.config.mode {
            Mode::Train => {
                let mask = read_gray(&mask_path)?;
                let choice = self.choose_sentence(entry, rng);
                debug!(index, sentence = choice, "building training sample");
                self.pipeline.train(
                    &image,
                    mask.view(),
                    &entry.sents[choice],
                    self.augment.as_deref(),
                    rng,
                )
            }
            Mode::Val => {
                debug!(index, "building validation sample");
                self.pipeline.val(&image, &entry.sents[0], mask_path)
            }
            Mode::Test => {
                debug!(index, "building test sample");
                self.pipeline.test(image, 0, mask_path, entry.sents.clone())
            }
        }
    }

    fn name(&self) -> &str {
        "endovis"
    }
}

impl fmt::Display for ManifestDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ManifestDataset(data_root={}, data_file={}, mode={}, input_size={}, word_length={}, sents_select={})",
            self.config.data_root.display(),
            self.config.data_file.display(),
            self.config.mode,
            self.config.input_size,
            self.config.word_length,
            self.config.sents_select
        )
    }
}

impl fmt::Debug for ManifestDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestDataset")
            .field("config", &self.config)
            .field("entries", &self.entries.len())
            .field("augment", &self.augment.is_some())
            .finish()
    }
}
