//! Dataset over a record store of benchmark corpora
//!
//! The store holds one bincode-serialized [`RefRecord`] per key plus two
//! reserved entries, `__len__` and `__keys__`. It is opened on first access,
//! once per dataset object; clones start closed so that every worker maps
//! the store itself.

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use rand::{Rng, RngCore};
use tracing::{debug, info, warn};

use refseg_core::store::{load, KvStore, MmapStoreOpener, StoreOpener, StoreWriter};
use refseg_core::{Dataset, Error as CoreError, Mode};
use refseg_transforms::ClipTokenizer;

use crate::config::StoreDatasetConfig;
use crate::error::Result;
use crate::image::{decode_gray, decode_rgb};
use crate::record::RefRecord;
use crate::sample::{Sample, SamplePipeline};

/// Reserved key holding the number of records
pub const LEN_KEY: &[u8] = b"__len__";

/// Reserved key holding the ordered list of record keys
pub const KEYS_KEY: &[u8] = b"__keys__";

/// Whether the store handle has been created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// Not opened yet
    Closed,
    /// Opened, length and keys loaded
    Open,
}

struct OpenStore<S> {
    store: S,
    len: usize,
    keys: Vec<Vec<u8>>,
}

/// Dataset of referring expressions read from a record store
pub struct RefStoreDataset<O: StoreOpener = MmapStoreOpener> {
    config: StoreDatasetConfig,
    opener: O,
    pipeline: SamplePipeline,
    known_len: usize,
    state: OnceCell<OpenStore<O::Store>>,
}

impl RefStoreDataset<MmapStoreOpener> {
    /// Create a dataset over a memory-mapped store
    pub fn new(config: StoreDatasetConfig, tokenizer: ClipTokenizer) -> Result<Self> {
        Self::with_opener(config, tokenizer, MmapStoreOpener)
    }
}

impl<O: StoreOpener> RefStoreDataset<O> {
    /// Create a dataset whose store is produced by `opener`
    ///
    /// Nothing is read until the first access.
    pub fn with_opener(
        config: StoreDatasetConfig,
        tokenizer: ClipTokenizer,
        opener: O,
    ) -> Result<Self> {
        let known_len = config.validate()?;
        let pipeline = SamplePipeline::new(config.input_size, config.word_length, tokenizer);
        Ok(Self {
            config,
            opener,
            pipeline,
            known_len,
            state: OnceCell::new(),
        })
    }

    /// The dataset configuration
    pub fn config(&self) -> &StoreDatasetConfig {
        &self.config
    }

    /// Current state of the store handle
    pub fn state(&self) -> StoreState {
        if self.state.get().is_some() {
            StoreState::Open
        } else {
            StoreState::Closed
        }
    }

    /// Whether the store has been opened
    pub fn is_open(&self) -> bool {
        self.state() == StoreState::Open
    }

    /// Open the store and load its length and keys, if not done yet
    pub fn ensure_open(&self) -> Result<()> {
        self.open_store().map(|_| ())
    }

    fn open_store(&self) -> Result<&OpenStore<O::Store>> {
        self.state.get_or_try_init(|| -> Result<OpenStore<O::Store>> {
            let store = self.opener.open(&self.config.store_path)?;
            let len: u64 = load(&store, LEN_KEY)?;
            let keys: Vec<Vec<u8>> = load(&store, KEYS_KEY)?;

            let len = usize::try_from(len)
                .map_err(|_| CoreError::InvalidRecord(format!("store length {len} overflows")))?;
            if keys.len() != len {
                return Err(CoreError::InvalidRecord(format!(
                    "store declares {len} records but lists {} keys",
                    keys.len()
                ))
                .into());
            }
            if len != self.known_len {
                warn!(
                    dataset = %self.config.dataset,
                    split = %self.config.split,
                    expected = self.known_len,
                    actual = len,
                    "store length differs from the known split size"
                );
            }
            info!(path = %self.config.store_path.display(), records = len, "opened record store");

            Ok(OpenStore { store, len, keys })
        })
    }

    fn mask_path(&self, seg_id: u64) -> PathBuf {
        self.config.mask_dir.join(format!("{seg_id}.png"))
    }

    fn read_record(&self, index: usize) -> Result<RefRecord> {
        let open = self.open_store()?;
        if index >= open.len {
            return Err(CoreError::IndexOutOfBounds {
                index,
                len: open.len,
            }
            .into());
        }
        let key = &open.keys[index];
        let bytes = open
            .store
            .get(key)?
            .ok_or_else(|| CoreError::KeyNotFound(String::from_utf8_lossy(key).into_owned()))?;
        RefRecord::from_bytes(bytes)
    }
}

impl<O: StoreOpener + Clone> Clone for RefStoreDataset<O> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            opener: self.opener.clone(),
            pipeline: self.pipeline.clone(),
            known_len: self.known_len,
            state: OnceCell::new(),
        }
    }
}

impl<O: StoreOpener> Dataset for RefStoreDataset<O> {
    type Item = Sample;
    type Error = crate::error::Error;

    /// The known split size until the store is opened, then the store's own
    fn len(&self) -> usize {
        self.state.get().map_or(self.known_len, |open| open.len)
    }

    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Sample> {
        let record = self.read_record(index)?;
        let image = decode_rgb(&record.img)?;
        let mask_path = self.mask_path(record.seg_id);

        match self.config.mode {
            Mode::Train => {
                let mask = decode_gray(&record.mask)?;
                let choice = rng.gen_range(0..record.num_sents);
                debug!(index, seg_id = record.seg_id, sentence = choice, "building training sample");
                self.pipeline
                    .train(&image, mask.view(), &record.sents[choice], None, rng)
            }
            Mode::Val => {
                debug!(index, seg_id = record.seg_id, "building validation sample");
                self.pipeline.val(&image, &record.sents[0], mask_path)
            }
            Mode::Test => {
                debug!(index, seg_id = record.seg_id, "building test sample");
                self.pipeline
                    .test(image, record.seg_id, mask_path, record.sents)
            }
        }
    }

    fn name(&self) -> &str {
        &self.config.dataset
    }
}

impl<O: StoreOpener> fmt::Display for RefStoreDataset<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RefStoreDataset(db_path={}, dataset={}, split={}, mode={}, input_size={}, word_length={})",
            self.config.store_path.display(),
            self.config.dataset,
            self.config.split,
            self.config.mode,
            self.config.input_size,
            self.config.word_length
        )
    }
}

impl<O: StoreOpener> fmt::Debug for RefStoreDataset<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefStoreDataset")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// Writes records into a store readable by [`RefStoreDataset`]
pub struct RecordStoreBuilder {
    writer: StoreWriter,
    keys: Vec<Vec<u8>>,
}

impl RecordStoreBuilder {
    /// Create a store file (or `data.rsk` inside a directory)
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            writer: StoreWriter::create(path)?,
            keys: Vec::new(),
        })
    }

    /// Append a record under `key`
    pub fn add(&mut self, key: &[u8], record: &RefRecord) -> Result<()> {
        if key == LEN_KEY || key == KEYS_KEY {
            return Err(CoreError::InvalidArgument(format!(
                "{} is a reserved key",
                String::from_utf8_lossy(key)
            ))
            .into());
        }
        record.validate()?;
        self.writer.put_serialized(key, record)?;
        self.keys.push(key.to_vec());
        Ok(())
    }

    /// Number of records added
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no record has been added
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Write the reserved entries and close the store
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.put_serialized(LEN_KEY, &(self.keys.len() as u64))?;
        self.writer.put_serialized(KEYS_KEY, &self.keys)?;
        let path = self.writer.finish()?;
        info!(path = %path.display(), records = self.keys.len(), "built record store");
        Ok(path)
    }
}
