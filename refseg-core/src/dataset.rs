//! Dataset trait and loading mode

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Which kind of sample a dataset manufactures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mode {
    /// Image, tokenized sentence and resampled mask
    Train,
    /// Image, tokenized first sentence and the parameters needed to score it
    Val,
    /// Image and everything needed to run and visualise inference
    Test,
}

impl Mode {
    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Val => "val",
            Mode::Test => "test",
        }
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "val" => Ok(Mode::Val),
            "test" => Ok(Mode::Test),
            other => Err(Error::Config(format!(
                "unsupported mode {other:?}, expected one of train, val, test"
            ))),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mode> for String {
    fn from(mode: Mode) -> Self {
        mode.as_str().to_owned()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indexable collection of samples
///
/// Randomness used while building a sample (sentence choice, augmentation)
/// is drawn from the caller's `rng`, so a seeded generator reproduces a run.
pub trait Dataset: Send + Sync {
    /// The sample type produced by this dataset
    type Item;

    /// The error type that can be produced while building a sample
    type Error;

    /// Number of samples
    fn len(&self) -> usize;

    /// Whether the dataset has no samples
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the sample at `index`
    fn get(&self, index: usize, rng: &mut dyn RngCore) -> Result<Self::Item, Self::Error>;

    /// Human-readable name
    fn name(&self) -> &str {
        "dataset"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("train", Mode::Train)]
    #[test_case("val", Mode::Val)]
    #[test_case("test", Mode::Test)]
    fn test_mode_parse(input: &str, expected: Mode) {
        assert_eq!(input.parse::<Mode>().unwrap(), expected);
    }

    #[test_case("testA")]
    #[test_case("validation")]
    #[test_case("Train")]
    #[test_case("VAL")]
    #[test_case("")]
    #[test_case("inference")]
    fn test_unknown_mode_is_config_error(input: &str) {
        assert!(matches!(input.parse::<Mode>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_mode_display_roundtrip() {
        for mode in [Mode::Train, Mode::Val, Mode::Test] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
    }
}
