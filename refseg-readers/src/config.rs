//! Dataset configuration
//!
//! Both configurations deserialize from JSON with defaults for every field
//! but the paths. Enumerated values are parsed while loading, so a bad mode
//! or sentence policy is reported as a configuration error.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use refseg_core::{Error as CoreError, Mode};

use crate::error::{Error, Result};
use crate::info::known_split_len;

/// How a training sample picks one of its sentences
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SentenceSelect {
    /// Uniformly random sentence
    #[default]
    Random,
    /// Always the first sentence
    First,
}

impl SentenceSelect {
    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            SentenceSelect::Random => "random",
            SentenceSelect::First => "first",
        }
    }
}

impl FromStr for SentenceSelect {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "random" => Ok(SentenceSelect::Random),
            "first" => Ok(SentenceSelect::First),
            other => Err(CoreError::Config(format!(
                "unsupported sentence selection {other:?}, expected random or first"
            ))),
        }
    }
}

impl TryFrom<String> for SentenceSelect {
    type Error = CoreError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SentenceSelect> for String {
    fn from(select: SentenceSelect) -> Self {
        select.as_str().to_owned()
    }
}

impl fmt::Display for SentenceSelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a JSON configuration, reporting bad values as configuration errors
fn parse_json<T: DeserializeOwned>(result: serde_json::Result<T>) -> Result<T> {
    result.map_err(|e| match e.classify() {
        serde_json::error::Category::Data => CoreError::Config(e.to_string()).into(),
        _ => Error::Json(e),
    })
}

fn check_sizes(input_size: usize, word_length: usize) -> Result<()> {
    if input_size == 0 {
        return Err(CoreError::Config("input_size must be positive".into()).into());
    }
    if word_length < 2 {
        return Err(CoreError::Config(format!(
            "word_length {word_length} cannot hold start and end tokens"
        ))
        .into());
    }
    Ok(())
}

/// Configuration of a record-store dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDatasetConfig {
    /// Store file, or a directory holding `data.rsk`
    pub store_path: PathBuf,
    /// Directory of `<seg_id>.png` evaluation masks
    pub mask_dir: PathBuf,
    /// Corpus name, e.g. `refcoco`
    pub dataset: String,
    /// Split name, e.g. `val` or `testA`
    pub split: String,
    /// Loading mode
    pub mode: Mode,
    /// Side of the square canvas
    pub input_size: usize,
    /// Token row length
    pub word_length: usize,
}

impl Default for StoreDatasetConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::new(),
            mask_dir: PathBuf::new(),
            dataset: "refcoco".to_owned(),
            split: "train".to_owned(),
            mode: Mode::Train,
            input_size: 416,
            word_length: 17,
        }
    }
}

impl StoreDatasetConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(serde_json::from_str(json))
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        parse_json(serde_json::from_reader(reader))
    }

    /// Check sizes and the corpus/split pair, returning the split's known length
    pub fn validate(&self) -> Result<usize> {
        check_sizes(self.input_size, self.word_length)?;
        known_split_len(&self.dataset, &self.split).ok_or_else(|| {
            CoreError::Config(format!(
                "unknown split {:?} of dataset {:?}",
                self.split, self.dataset
            ))
            .into()
        })
    }
}

/// Configuration of a manifest dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestDatasetConfig {
    /// Root directory for the manifest and every path inside it
    pub data_root: PathBuf,
    /// Manifest file name relative to `data_root`
    pub data_file: PathBuf,
    /// Loading mode
    pub mode: Mode,
    /// Side of the square canvas
    pub input_size: usize,
    /// Token row length
    pub word_length: usize,
    /// Sentence choice for training samples
    pub sents_select: SentenceSelect,
    /// Whether to run the default augmentation pipeline in train mode
    pub use_vis_aug: bool,
}

impl Default for ManifestDatasetConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::new(),
            data_file: PathBuf::new(),
            mode: Mode::Train,
            input_size: 416,
            word_length: 77,
            sents_select: SentenceSelect::Random,
            use_vis_aug: false,
        }
    }
}

impl ManifestDatasetConfig {
    /// Parse a configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(serde_json::from_str(json))
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        parse_json(serde_json::from_reader(reader))
    }

    /// Check the canvas and token sizes
    pub fn validate(&self) -> Result<()> {
        check_sizes(self.input_size, self.word_length)
    }

    /// Path of the manifest file
    pub fn manifest_path(&self) -> PathBuf {
        self.data_root.join(&self.data_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("random", SentenceSelect::Random)]
    #[test_case("first", SentenceSelect::First)]
    fn test_sentence_select_parse(input: &str, expected: SentenceSelect) {
        assert_eq!(input.parse::<SentenceSelect>().unwrap(), expected);
    }

    #[test]
    fn test_bogus_policy_is_config_error() {
        assert!(matches!(
            "bogus".parse::<SentenceSelect>(),
            Err(CoreError::Config(_))
        ));

        let err = ManifestDatasetConfig::from_json_str(r#"{"sents_select": "bogus"}"#).unwrap_err();
        assert!(err.is_config(), "{err}");
    }

    #[test]
    fn test_store_defaults() {
        let config = StoreDatasetConfig::from_json_str(
            r#"{"store_path": "/data/refcoco/val.rsk", "split": "val", "mode": "val"}"#,
        )
        .unwrap();
        assert_eq!(config.dataset, "refcoco");
        assert_eq!(config.mode, Mode::Val);
        assert_eq!(config.input_size, 416);
        assert_eq!(config.word_length, 17);
        assert_eq!(config.validate().unwrap(), 3811);
    }

    #[test]
    fn test_manifest_defaults() {
        let config = ManifestDatasetConfig::from_json_str(r#"{"data_root": "/endovis"}"#).unwrap();
        assert_eq!(config.word_length, 77);
        assert_eq!(config.sents_select, SentenceSelect::Random);
        assert!(!config.use_vis_aug);
        config.validate().unwrap();
    }

    #[test]
    fn test_unknown_mode_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"mode": "inference"}"#).unwrap();
        assert!(StoreDatasetConfig::from_json_file(&path).unwrap_err().is_config());
    }

    #[test]
    fn test_malformed_json_is_not_config_error() {
        let err = StoreDatasetConfig::from_json_str("{").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test_case("refcoco", "testC")]
    #[test_case("refclef", "train")]
    fn test_unknown_split(dataset: &str, split: &str) {
        let config = StoreDatasetConfig {
            dataset: dataset.to_owned(),
            split: split.to_owned(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn test_short_word_length() {
        let config = ManifestDatasetConfig {
            word_length: 1,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().is_config());
    }
}
