//! Read-only key-value record store backed by a single memory-mapped file
//!
//! A store file is laid out as a 16 byte header (8 byte magic followed by the
//! little-endian offset of the index), the concatenated values, and finally a
//! `bincode` encoded index of `(key, offset, len)` entries. Values are served
//! as zero-copy slices of the mapping.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// File name used when a store path points at a directory
pub const STORE_FILE_NAME: &str = "data.rsk";

const MAGIC: &[u8; 8] = b"RSKVSTO1";
const HEADER_LEN: usize = 16;

/// A read-only key-value store
pub trait KvStore: Send + Sync {
    /// Look up the value stored under `key`
    fn get(&self, key: &[u8]) -> Result<Option<&[u8]>>;

    /// Number of entries in the store
    fn entry_count(&self) -> usize;
}

/// Opens a store from a path
///
/// Datasets hold an opener rather than an open store so that the handle can
/// be created lazily inside each worker.
pub trait StoreOpener: Send + Sync {
    /// The store type produced by this opener
    type Store: KvStore;

    /// Open the store located at `path`
    fn open(&self, path: &Path) -> Result<Self::Store>;
}

/// Fetch `key` and deserialize it, failing if the key is absent
pub fn load<S: KvStore + ?Sized, T: DeserializeOwned>(store: &S, key: &[u8]) -> Result<T> {
    let bytes = store
        .get(key)?
        .ok_or_else(|| Error::KeyNotFound(String::from_utf8_lossy(key).into_owned()))?;
    Ok(bincode::deserialize(bytes)?)
}

/// Resolve a store path: directories hold their data in [`STORE_FILE_NAME`]
pub fn resolve_store_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(STORE_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    key: Vec<u8>,
    offset: u64,
    len: u64,
}

/// Memory-mapped store file
pub struct MmapStore {
    mmap: Mmap,
    path: PathBuf,
    index: HashMap<Vec<u8>, (usize, usize)>,
}

impl MmapStore {
    /// Open a store file (or a directory containing one) for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = resolve_store_file(path.as_ref());
        let file = File::open(&path)?;

        // SAFETY: the mapping is read-only and store files are never modified
        // after `StoreWriter::finish`.
        #[allow(unsafe_code)]
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        if mmap.len() < HEADER_LEN || &mmap[..MAGIC.len()] != MAGIC {
            return Err(Error::InvalidRecord(format!(
                "{} is not a record store",
                path.display()
            )));
        }

        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&mmap[MAGIC.len()..HEADER_LEN]);
        let index_offset = usize::try_from(u64::from_le_bytes(offset_bytes))
            .map_err(|_| Error::InvalidRecord("index offset overflows usize".into()))?;
        if index_offset < HEADER_LEN || index_offset > mmap.len() {
            return Err(Error::InvalidRecord(format!(
                "index offset {index_offset} outside of {} byte store",
                mmap.len()
            )));
        }

        let entries: Vec<IndexEntry> = bincode::deserialize(&mmap[index_offset..])?;
        let mut index = HashMap::with_capacity(entries.len());
        for entry in entries {
            let start = usize::try_from(entry.offset)
                .map_err(|_| Error::InvalidRecord("value offset overflows usize".into()))?;
            let end = usize::try_from(entry.len)
                .ok()
                .and_then(|len| start.checked_add(len))
                .filter(|&end| start >= HEADER_LEN && end <= index_offset)
                .ok_or_else(|| {
                    Error::InvalidRecord(format!(
                        "value for key {} lies outside the data section",
                        String::from_utf8_lossy(&entry.key)
                    ))
                })?;
            index.insert(entry.key, (start, end));
        }

        debug!(path = %path.display(), entries = index.len(), "mapped record store");

        Ok(Self { mmap, path, index })
    }

    /// Path of the mapped file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for MmapStore {
    fn get(&self, key: &[u8]) -> Result<Option<&[u8]>> {
        Ok(self.index.get(key).map(|&(start, end)| &self.mmap[start..end]))
    }

    fn entry_count(&self) -> usize {
        self.index.len()
    }
}

impl std::fmt::Debug for MmapStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MmapStore")
            .field("path", &self.path)
            .field("entries", &self.index.len())
            .field("bytes", &self.mmap.len())
            .finish()
    }
}

/// Opener for [`MmapStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MmapStoreOpener;

impl StoreOpener for MmapStoreOpener {
    type Store = MmapStore;

    fn open(&self, path: &Path) -> Result<MmapStore> {
        MmapStore::open(path)
    }
}

/// Writes a store file readable by [`MmapStore`]
pub struct StoreWriter {
    writer: BufWriter<File>,
    path: PathBuf,
    offset: u64,
    entries: Vec<IndexEntry>,
    keys: HashSet<Vec<u8>>,
}

impl StoreWriter {
    /// Create (or truncate) a store at `path`
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = resolve_store_file(path.as_ref());
        let mut writer = BufWriter::new(File::create(&path)?);
        writer.write_all(MAGIC)?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            writer,
            path,
            offset: HEADER_LEN as u64,
            entries: Vec::new(),
            keys: HashSet::new(),
        })
    }

    /// Append a raw value. Keys must be unique.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if !self.keys.insert(key.to_vec()) {
            return Err(Error::InvalidArgument(format!(
                "duplicate store key {}",
                String::from_utf8_lossy(key)
            )));
        }
        self.writer.write_all(value)?;
        self.entries.push(IndexEntry {
            key: key.to_vec(),
            offset: self.offset,
            len: value.len() as u64,
        });
        self.offset += value.len() as u64;
        Ok(())
    }

    /// Serialize `value` with `bincode` and append it
    pub fn put_serialized<T: Serialize + ?Sized>(&mut self, key: &[u8], value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.put(key, &bytes)
    }

    /// Number of entries written so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the index and header, returning the path of the store file
    pub fn finish(mut self) -> Result<PathBuf> {
        let index = bincode::serialize(&self.entries)?;
        self.writer.write_all(&index)?;
        self.writer.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        self.writer.write_all(&self.offset.to_le_bytes())?;
        self.writer.flush()?;

        debug!(path = %self.path.display(), entries = self.entries.len(), "wrote record store");
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StoreWriter::create(dir.path()).unwrap();
        writer.put(b"alpha", b"first value").unwrap();
        writer.put(b"beta", b"").unwrap();
        writer.put_serialized(b"__len__", &2u64).unwrap();
        let path = writer.finish().unwrap();
        assert_eq!(path, dir.path().join(STORE_FILE_NAME));

        let store = MmapStore::open(dir.path()).unwrap();
        assert_eq!(store.entry_count(), 3);
        assert_eq!(store.get(b"alpha").unwrap(), Some(&b"first value"[..]));
        assert_eq!(store.get(b"beta").unwrap(), Some(&b""[..]));
        assert_eq!(store.get(b"gamma").unwrap(), None);

        let len: u64 = load(&store, b"__len__").unwrap();
        assert_eq!(len, 2);
    }

    #[test]
    fn test_load_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        StoreWriter::create(dir.path()).unwrap().finish().unwrap();

        let store = MmapStoreOpener.open(dir.path()).unwrap();
        let err = load::<_, u64>(&store, b"__keys__").unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(ref k) if k == "__keys__"));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = StoreWriter::create(dir.path().join("store.rsk")).unwrap();
        writer.put(b"k", b"1").unwrap();
        assert!(matches!(writer.put(b"k", b"2"), Err(Error::InvalidArgument(_))));
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-a-store.bin");
        std::fs::write(&path, b"definitely not a store file").unwrap();

        assert!(matches!(MmapStore::open(&path), Err(Error::InvalidRecord(_))));
    }
}
