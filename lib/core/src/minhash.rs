//! MinHash signatures over feature tokens.
//!
//! For a random permutation π of the token universe,
//! `P[min π(A) = min π(B)] = |A ∩ B| / |A ∪ B|`, so the fraction of slots two
//! signatures agree on estimates the Jaccard similarity of their token sets.
//!
//! Permutations are simulated with the universal family
//! `h_i(x) = ((a_i * x + b_i) mod (2^61 - 1)) & (2^32 - 1)` applied to a 32-bit
//! base hash of each token (the first four bytes of its SHA-256 digest). The
//! `(a_i, b_i)` pairs are drawn once from a seeded generator, so two hashers
//! built with the same `num_perm` and seed produce identical signatures.

use crate::record::{FeatureRecord, Scalar};
use crate::schema::FeatureSchema;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Write;

const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Value of every slot of an empty token set.
pub const MAX_HASH: u32 = u32::MAX;

pub const DEFAULT_SEED: u64 = 1;

/// Generator of MinHash signatures with a fixed permutation family.
#[derive(Debug, Clone)]
pub struct MinHasher {
    seed: u64,
    /// `(a, b)` coefficient of each permutation
    permutations: Vec<(u64, u64)>,
}

impl MinHasher {
    /// Create a hasher with `num_perm` permutations and the default seed.
    pub fn new(num_perm: usize) -> Self {
        Self::with_seed(num_perm, DEFAULT_SEED)
    }

    pub fn with_seed(num_perm: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let permutations = (0..num_perm)
            .map(|_| {
                let a = rng.random_range(1..MERSENNE_PRIME);
                let b = rng.random_range(0..MERSENNE_PRIME);
                (a, b)
            })
            .collect();
        Self { seed, permutations }
    }

    #[inline]
    pub fn num_perm(&self) -> usize {
        self.permutations.len()
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Signature of an arbitrary token stream
    pub fn signature<I, T>(&self, tokens: I) -> Signature
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let mut mins = vec![MAX_HASH; self.num_perm()];
        for token in tokens {
            self.update(&mut mins, token.as_ref());
        }
        Signature { values: mins }
    }

    /// Fold one token into the running minimums.
    #[inline]
    fn update(&self, mins: &mut [u32], token: &[u8]) {
        let base = base_hash(token) as u128;
        for (slot, &(a, b)) in mins.iter_mut().zip(&self.permutations) {
            let permuted = ((a as u128 * base + b as u128) % MERSENNE_PRIME as u128) as u64;
            let hv = (permuted & MAX_HASH as u64) as u32;
            if hv < *slot {
                *slot = hv;
            }
        }
    }
}

#[inline]
fn base_hash(token: &[u8]) -> u32 {
    let digest = Sha256::digest(token);
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// How a scalar is turned into a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenMode {
    /// The value's string form alone
    #[default]
    Plain,
    /// `"{feature}_{value}"`, keeping equal literals of different features apart
    Prefixed,
}

/// Encodes feature records of one schema into signatures.
#[derive(Debug, Clone)]
pub struct RecordEncoder {
    hasher: MinHasher,
    mode: TokenMode,
    feature_names: Vec<String>,
}

impl RecordEncoder {
    pub fn new(hasher: MinHasher, schema: &FeatureSchema, mode: TokenMode) -> Self {
        Self {
            hasher,
            mode,
            feature_names: schema.feature_names().map(str::to_string).collect(),
        }
    }

    pub fn hasher(&self) -> &MinHasher {
        &self.hasher
    }

    pub fn mode(&self) -> TokenMode {
        self.mode
    }

    /// Encode one record. Multi-valued features contribute each element,
    /// scalars contribute once; an empty record yields an all-`MAX_HASH`
    /// signature.
    pub fn encode(&self, record: &FeatureRecord) -> Signature {
        let mut mins = vec![MAX_HASH; self.hasher.num_perm()];
        let mut token = String::new();

        for (name, value) in self.feature_names.iter().zip(&record.values) {
            for scalar in value.scalars() {
                self.write_token(&mut token, name, scalar);
                self.hasher.update(&mut mins, token.as_bytes());
            }
        }

        Signature { values: mins }
    }

    /// Tokens a record is hashed from, in visiting order
    pub fn tokens(&self, record: &FeatureRecord) -> Vec<String> {
        let mut out = Vec::with_capacity(record.token_count());
        let mut token = String::new();
        for (name, value) in self.feature_names.iter().zip(&record.values) {
            for scalar in value.scalars() {
                self.write_token(&mut token, name, scalar);
                out.push(token.clone());
            }
        }
        out
    }

    #[inline]
    fn write_token(&self, buf: &mut String, feature: &str, scalar: &Scalar) {
        buf.clear();
        // Writing into a String cannot fail.
        let _ = match self.mode {
            TokenMode::Plain => write!(buf, "{}", scalar),
            TokenMode::Prefixed => write!(buf, "{}_{}", feature, scalar),
        };
    }
}

/// Fixed-length MinHash sketch of a token set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    values: Vec<u32>,
}

impl Signature {
    #[inline]
    #[must_use]
    pub fn from_values(values: Vec<u32>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// True when no token was hashed into this signature.
    pub fn is_empty_set(&self) -> bool {
        self.values.iter().all(|&v| v == MAX_HASH)
    }

    /// Number of slots where both signatures agree
    #[inline]
    pub fn matches(&self, other: &Signature) -> usize {
        self.values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count()
    }

    /// Estimated Jaccard similarity in `[0, 1]`.
    ///
    /// Signatures of different lengths are incomparable and score 0.
    pub fn jaccard(&self, other: &Signature) -> f64 {
        if self.values.len() != other.values.len() || self.values.is_empty() {
            return 0.0;
        }
        self.matches(other) as f64 / self.values.len() as f64
    }

    /// Signature of the union of both underlying sets.
    pub fn merge(&self, other: &Signature) -> Signature {
        let values = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(&a, &b)| a.min(b))
            .collect();
        Signature { values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FeatureValue;
    use crate::schema::FeatureSpec;

    fn tag_schema() -> FeatureSchema {
        FeatureSchema::new("id", vec![FeatureSpec::multi("tags")]).unwrap()
    }

    fn tags(id: u64, values: &[&str]) -> FeatureRecord {
        FeatureRecord::new(id, vec![FeatureValue::multi(values.iter().copied())])
    }

    #[test]
    fn test_identical_sets() {
        let mh = MinHasher::new(128);
        let a = mh.signature(["a", "b", "c"]);
        let b = mh.signature(["c", "b", "a"]);
        assert_eq!(a, b);
        assert_eq!(a.jaccard(&b), 1.0);
    }

    #[test]
    fn test_disjoint_sets() {
        let mh = MinHasher::new(128);
        let a = mh.signature(["a", "b", "c"]);
        let b = mh.signature(["x", "y", "z"]);
        assert!(a.jaccard(&b) < 0.2);
    }

    #[test]
    fn test_similar_sets_estimate() {
        let mh = MinHasher::new(256);
        let a: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        let b: Vec<String> = (50..150).map(|i| i.to_string()).collect();
        // true Jaccard = 50 / 150
        let estimate = mh.signature(&a).jaccard(&mh.signature(&b));
        assert!((estimate - 1.0 / 3.0).abs() < 0.1, "estimate {}", estimate);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let schema = tag_schema();
        let record = tags(1, &["a", "b", "c"]);
        let first = RecordEncoder::new(MinHasher::with_seed(64, 7), &schema, TokenMode::Plain);
        let second = RecordEncoder::new(MinHasher::with_seed(64, 7), &schema, TokenMode::Plain);
        assert_eq!(first.encode(&record), first.encode(&record));
        assert_eq!(first.encode(&record), second.encode(&record));
    }

    #[test]
    fn test_different_seed_differs() {
        let a = MinHasher::with_seed(64, 1).signature(["a", "b"]);
        let b = MinHasher::with_seed(64, 2).signature(["a", "b"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_record() {
        let encoder = RecordEncoder::new(MinHasher::new(32), &tag_schema(), TokenMode::Plain);
        let sig = encoder.encode(&tags(1, &[]));
        assert_eq!(sig.len(), 32);
        assert!(sig.is_empty_set());
        assert!(sig.as_slice().iter().all(|&v| v == MAX_HASH));
    }

    #[test]
    fn test_record_matches_token_signature() {
        let schema = FeatureSchema::new(
            "id",
            vec![FeatureSpec::scalar("gender"), FeatureSpec::multi("tags")],
        )
        .unwrap();
        let record = FeatureRecord::new(
            1u64,
            vec![FeatureValue::from("f"), FeatureValue::multi(["a", "b"])],
        );
        let mh = MinHasher::new(64);
        let encoder = RecordEncoder::new(mh.clone(), &schema, TokenMode::Plain);
        assert_eq!(encoder.tokens(&record), vec!["f", "a", "b"]);
        assert_eq!(encoder.encode(&record), mh.signature(["f", "a", "b"]));
    }

    #[test]
    fn test_prefixed_tokens_separate_features() {
        let schema = FeatureSchema::new(
            "id",
            vec![FeatureSpec::scalar("home"), FeatureSpec::scalar("work")],
        )
        .unwrap();
        let a = FeatureRecord::new(1u64, vec![FeatureValue::from("rome"), FeatureValue::from("milan")]);
        let b = FeatureRecord::new(2u64, vec![FeatureValue::from("milan"), FeatureValue::from("rome")]);

        let plain = RecordEncoder::new(MinHasher::new(64), &schema, TokenMode::Plain);
        assert_eq!(plain.encode(&a), plain.encode(&b));

        let prefixed = RecordEncoder::new(MinHasher::new(64), &schema, TokenMode::Prefixed);
        assert_eq!(prefixed.tokens(&a), vec!["home_rome", "work_milan"]);
        assert!(prefixed.encode(&a).jaccard(&prefixed.encode(&b)) < 0.3);
    }

    #[test]
    fn test_signature_merge() {
        let mh = MinHasher::new(64);
        let merged = mh.signature(["a", "b"]).merge(&mh.signature(["c", "d"]));
        assert_eq!(merged, mh.signature(["a", "b", "c", "d"]));
    }

    #[test]
    fn test_length_mismatch_scores_zero() {
        let a = MinHasher::new(16).signature(["a"]);
        let b = MinHasher::new(32).signature(["a"]);
        assert_eq!(a.jaccard(&b), 0.0);
    }
}
