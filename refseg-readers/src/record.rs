//! Annotation records for both dataset flavours

use serde::{Deserialize, Serialize};

use refseg_core::Error as CoreError;

use crate::error::Result;

fn check_sentences(what: &str, num_sents: usize, sents: &[String]) -> Result<()> {
    if sents.is_empty() {
        return Err(CoreError::InvalidRecord(format!("{what} has no sentences")).into());
    }
    if num_sents != sents.len() {
        return Err(CoreError::InvalidRecord(format!(
            "{what} declares {num_sents} sentences but carries {}",
            sents.len()
        ))
        .into());
    }
    Ok(())
}

/// One referring expression record as stored in the record store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRecord {
    /// Encoded image
    pub img: Vec<u8>,
    /// Encoded single-channel mask, values 0 or 255
    pub mask: Vec<u8>,
    /// Segment id, names the mask file on disk
    pub seg_id: u64,
    /// Number of sentences
    pub num_sents: usize,
    /// Referring expressions
    pub sents: Vec<String>,
}

impl RefRecord {
    /// Deserialize a stored record and check it
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let record: RefRecord = bincode::deserialize(bytes).map_err(CoreError::from)?;
        record.validate()?;
        Ok(record)
    }

    /// Check that the sentence count is consistent and non-zero
    pub fn validate(&self) -> Result<()> {
        check_sentences(
            &format!("record {}", self.seg_id),
            self.num_sents,
            &self.sents,
        )
    }
}

/// One entry of a JSON manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Image path relative to the data root
    pub img_path: String,
    /// Mask path relative to the data root
    pub mask_path: String,
    /// Number of sentences
    pub num_sents: usize,
    /// Descriptions of the masked region
    pub sents: Vec<String>,
}

impl ManifestEntry {
    /// Check that the sentence count is consistent and non-zero
    pub fn validate(&self) -> Result<()> {
        check_sentences(&format!("entry {}", self.img_path), self.num_sents, &self.sents)
    }
}
