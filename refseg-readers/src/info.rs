//! Sizes of the benchmark corpora splits

/// Number of samples per split for each known corpus
pub const KNOWN_SPLITS: &[(&str, &[(&str, usize)])] = &[
    (
        "refcoco",
        &[
            ("train", 42404),
            ("val", 3811),
            ("val-test", 3811),
            ("testA", 1975),
            ("testB", 1810),
        ],
    ),
    (
        "refcoco+",
        &[
            ("train", 42278),
            ("val", 3805),
            ("val-test", 3805),
            ("testA", 1975),
            ("testB", 1798),
        ],
    ),
    (
        "refcocog_u",
        &[
            ("train", 42226),
            ("val", 2573),
            ("val-test", 2573),
            ("test", 5023),
        ],
    ),
    (
        "refcocog_g",
        &[("train", 44822), ("val", 5000), ("val-test", 5000)],
    ),
];

/// Number of samples in `split` of `dataset`, if the pair is known
pub fn known_split_len(dataset: &str, split: &str) -> Option<usize> {
    KNOWN_SPLITS
        .iter()
        .find(|(name, _)| *name == dataset)
        .and_then(|(_, splits)| splits.iter().find(|(s, _)| *s == split))
        .map(|&(_, len)| len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("refcoco", "train", 42404)]
    #[test_case("refcoco", "testB", 1810)]
    #[test_case("refcoco+", "testB", 1798)]
    #[test_case("refcocog_u", "test", 5023)]
    #[test_case("refcocog_g", "val-test", 5000)]
    fn test_known_sizes(dataset: &str, split: &str, expected: usize) {
        assert_eq!(known_split_len(dataset, split), Some(expected));
    }

    #[test_case("refcocog_g", "test")]
    #[test_case("refclef", "train")]
    #[test_case("refcoco", "TRAIN")]
    fn test_unknown_pairs(dataset: &str, split: &str) {
        assert_eq!(known_split_len(dataset, split), None);
    }
}
