//! SimHash fingerprints.
//!
//! Text is lower-cased, punctuation becomes whitespace, whitespace is
//! collapsed, and the resulting tokens are grouped into overlapping
//! shingles. Each shingle hash votes +1/-1 on every bit position; a bit of
//! the fingerprint is set when its net vote is positive. Near-duplicate
//! texts share most shingles and therefore most bits.

use std::fmt;

pub const DEFAULT_SHINGLE_SIZE: usize = 3;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit SimHash of a text. Only equality and Hamming distance are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn hamming_distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// True when at most `threshold` bits differ.
    pub fn is_similar(&self, other: &Fingerprint, threshold: u32) -> bool {
        self.hamming_distance(other) <= threshold
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SimHasher {
    shingle_size: usize,
}

impl Default for SimHasher {
    fn default() -> Self {
        Self::new(DEFAULT_SHINGLE_SIZE)
    }
}

impl SimHasher {
    /// A shingle size of zero falls back to [`DEFAULT_SHINGLE_SIZE`].
    pub fn new(shingle_size: usize) -> Self {
        let shingle_size = if shingle_size == 0 { DEFAULT_SHINGLE_SIZE } else { shingle_size };
        Self { shingle_size }
    }

    pub fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    pub fn hash(&self, content: &str) -> Fingerprint {
        let normalized = normalize_text(content);
        let tokens = tokenize(&normalized);
        if tokens.is_empty() {
            return Fingerprint(0);
        }

        let mut votes = [0i64; 64];
        for shingle in shingles(&tokens, self.shingle_size) {
            let h = fnv1a(shingle.as_bytes());
            for (bit, vote) in votes.iter_mut().enumerate() {
                if h & (1u64 << bit) != 0 {
                    *vote += 1;
                } else {
                    *vote -= 1;
                }
            }
        }

        let bits = votes
            .iter()
            .enumerate()
            .filter(|(_, vote)| **vote > 0)
            .fold(0u64, |acc, (bit, _)| acc | (1u64 << bit));
        Fingerprint(bits)
    }
}

/// Lower-case, map every non-alphanumeric character to a space and collapse runs of whitespace.
pub(crate) fn normalize_text(content: &str) -> String {
    let mapped: String = content
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn tokenize(normalized: &str) -> Vec<&str> {
    normalized.split_whitespace().collect()
}

fn shingles(tokens: &[&str], size: usize) -> Vec<String> {
    if tokens.len() <= size {
        return vec![tokens.join(" ")];
    }
    tokens.windows(size).map(|w| w.join(" ")).collect()
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_zero_only_for_empty_content() {
        let hasher = SimHasher::new(3);
        let cases = [
            ("the quick brown fox jumps over the lazy dog", true),
            ("", false),
            ("   \t\n  ", false),
            ("!@#$%^&*()", false),
            ("hello", true),
            ("hello world", true),
            ("function foo() { return 42; }", true),
        ];
        for (content, non_zero) in cases {
            let fp = hasher.hash(content);
            assert_eq!(!fp.is_zero(), non_zero, "content {:?} gave {}", content, fp);
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let hasher = SimHasher::default();
        let content = "the quick brown fox jumps over the lazy dog";
        assert_eq!(hasher.hash(content), hasher.hash(content));
    }

    #[test]
    fn near_duplicates_are_closer_than_unrelated_text() {
        let hasher = SimHasher::new(3);
        let original = hasher.hash("the quick brown fox jumps over the lazy dog");
        let similar = hasher.hash("the quick brown fox leaps over the lazy dog");
        let different = hasher.hash("completely unrelated content about programming");

        assert!(original.hamming_distance(&similar) < original.hamming_distance(&different));
    }

    #[test]
    fn case_and_punctuation_are_ignored() {
        let hasher = SimHasher::new(3);
        assert_eq!(hasher.hash("Hello World"), hasher.hash("hello, world!"));
        assert_eq!(hasher.hash("hello world test"), hasher.hash("HeLLo WoRLd TeST"));
        assert_eq!(hasher.hash("hello world test"), hasher.hash("hello, world! test..."));
    }

    #[test]
    fn shingle_size_changes_the_fingerprint() {
        let content = "one two three four five six seven eight";
        let fp2 = SimHasher::new(2).hash(content);
        let fp3 = SimHasher::new(3).hash(content);
        let fp5 = SimHasher::new(5).hash(content);

        assert!(!fp2.is_zero() && !fp3.is_zero() && !fp5.is_zero());
        assert!(!(fp2 == fp3 && fp3 == fp5));
    }

    #[test]
    fn zero_shingle_size_uses_default() {
        assert_eq!(SimHasher::new(0).shingle_size(), DEFAULT_SHINGLE_SIZE);
    }

    #[test]
    fn hamming_distance_counts_differing_bits() {
        let ones = Fingerprint(u64::MAX);
        assert_eq!(ones.hamming_distance(&ones), 0);
        assert_eq!(ones.hamming_distance(&Fingerprint(0xFFFF_FFFF_FFFF_FFFE)), 1);
        assert_eq!(ones.hamming_distance(&Fingerprint(0)), 64);
        assert_eq!(ones.hamming_distance(&Fingerprint(0xFFFF_FFFF_FFFF_FF00)), 8);
        assert_eq!(
            Fingerprint(0xAAAA_AAAA_AAAA_AAAA).hamming_distance(&Fingerprint(0x5555_5555_5555_5555)),
            64
        );

        let a = Fingerprint(0xABCD_EF12_3456_7890);
        let b = Fingerprint(0x1234_5678_90AB_CDEF);
        assert_eq!(a.hamming_distance(&b), b.hamming_distance(&a));
    }

    #[test]
    fn similarity_threshold_is_inclusive() {
        let ones = Fingerprint(u64::MAX);
        assert!(ones.is_similar(&Fingerprint(0xFFFF_FFFF_FFFF_FFE0), 5));
        assert!(!ones.is_similar(&Fingerprint(0xFFFF_FFFF_FFFF_FFC0), 5));
    }

    #[test]
    fn normalizes_text() {
        let cases = [
            ("Hello World", "hello world"),
            ("with  multiple   spaces", "with multiple spaces"),
            ("  leading and trailing  ", "leading and trailing"),
            ("with\ttabs\nand\nnewlines", "with tabs and newlines"),
            ("punctuation!@#$%test", "punctuation test"),
            ("numbers123test", "numbers123test"),
        ];
        for (input, want) in cases {
            assert_eq!(normalize_text(input), want);
        }
        assert_eq!(tokenize("one two three four five").len(), 5);
        assert!(tokenize("").is_empty());
    }
}
