//! Fixed-length tokenization on top of an external BPE encoder
//!
//! Each text becomes `[<|startoftext|>, ids..., <|endoftext|>]`, left packed
//! into a row of `context_length` integers and zero padded on the right.

use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2};
use tracing::debug;

use refseg_core::error::{Error, Result};

/// Start-of-text special token
pub const START_OF_TEXT: &str = "<|startoftext|>";

/// End-of-text special token
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Context length used by every CLIP text encoder
pub const DEFAULT_CONTEXT_LENGTH: usize = 77;

/// The slice of a BPE tokenizer this crate relies on
pub trait TextEncoder: Send + Sync {
    /// Encode `text` into token ids, without special tokens
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Look up the id of a token in the vocabulary
    fn token_id(&self, token: &str) -> Option<u32>;
}

#[cfg(feature = "hf-tokenizer")]
impl TextEncoder for tokenizers::Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = std::ops::Deref::deref(self)
            .encode(text, false)
            .map_err(|e| Error::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn token_id(&self, token: &str) -> Option<u32> {
        self.token_to_id(token)
    }
}

/// Tokenizer producing fixed-length id rows
#[derive(Clone)]
pub struct ClipTokenizer {
    encoder: Arc<dyn TextEncoder>,
    sot: u32,
    eot: u32,
}

impl ClipTokenizer {
    /// Wrap an encoder, resolving its start and end tokens
    pub fn new(encoder: Arc<dyn TextEncoder>) -> Result<Self> {
        let lookup = |token: &str| {
            encoder.token_id(token).ok_or_else(|| {
                Error::Config(format!("tokenizer vocabulary has no {token} token"))
            })
        };
        let sot = lookup(START_OF_TEXT)?;
        let eot = lookup(END_OF_TEXT)?;
        debug!(sot, eot, "resolved special tokens");
        Ok(Self { encoder, sot, eot })
    }

    /// Load a `tokenizer.json` file in the Hugging Face format
    #[cfg(feature = "hf-tokenizer")]
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let tokenizer = tokenizers::Tokenizer::from_file(path.as_ref())
            .map_err(|e| Error::Tokenizer(format!("{}: {e}", path.as_ref().display())))?;
        Self::new(Arc::new(tokenizer))
    }

    /// Id of the start-of-text token
    pub fn start_token(&self) -> u32 {
        self.sot
    }

    /// Id of the end-of-text token
    pub fn end_token(&self) -> u32 {
        self.eot
    }

    /// Tokenize several texts into a `[texts.len(), context_length]` array
    ///
    /// Texts that do not fit are cut to `context_length` with the end token
    /// in the last slot when `truncate` is set, and rejected otherwise.
    pub fn tokenize<S: AsRef<str>>(
        &self,
        texts: &[S],
        context_length: usize,
        truncate: bool,
    ) -> Result<Array2<i64>> {
        if context_length < 2 {
            return Err(Error::InvalidArgument(format!(
                "context length {context_length} cannot hold start and end tokens"
            )));
        }

        let mut result = Array2::<i64>::zeros((texts.len(), context_length));
        for (mut row, text) in result.rows_mut().into_iter().zip(texts) {
            let text = text.as_ref();
            let mut tokens = Vec::with_capacity(context_length);
            tokens.push(self.sot);
            tokens.extend(self.encoder.encode(text)?);
            tokens.push(self.eot);

            if tokens.len() > context_length {
                if !truncate {
                    return Err(Error::TextTooLong {
                        text: text.to_owned(),
                        context_length,
                    });
                }
                debug!(len = tokens.len(), context_length, "truncating text");
                tokens.truncate(context_length);
                tokens[context_length - 1] = self.eot;
            }

            for (slot, token) in row.iter_mut().zip(tokens) {
                *slot = i64::from(token);
            }
        }
        Ok(result)
    }

    /// Tokenize a single text into a `[context_length]` row
    pub fn tokenize_one(
        &self,
        text: &str,
        context_length: usize,
        truncate: bool,
    ) -> Result<Array1<i64>> {
        let rows = self.tokenize(&[text], context_length, truncate)?;
        Ok(rows.index_axis_move(ndarray::Axis(0), 0))
    }
}

impl fmt::Debug for ClipTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipTokenizer")
            .field("sot", &self.sot)
            .field("eot", &self.eot)
            .finish_non_exhaustive()
    }
}
