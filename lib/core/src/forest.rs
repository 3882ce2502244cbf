//! Banded LSH index over MinHash signatures.
//!
//! The index has two phases. While building, `(id, signature)` pairs are
//! appended to a pending buffer guarded by a mutex. `freeze` drains that
//! buffer, hashes each signature's `bands` disjoint runs of `rows` slots into
//! one bucket table per band and publishes the result through a `OnceLock`.
//! From then on the index is immutable: inserts fail and queries read the
//! published tables without taking any lock.
//!
//! Two signatures whose token sets have Jaccard similarity `s` share at least
//! one bucket with probability `1 - (1 - s^r)^b`. More bands raise recall (and
//! false positives); more rows per band raise precision (and false negatives).
//!
//! Each band is also kept as a sorted list of slots, ordered by the band's
//! values. When the exact buckets yield fewer than `k` candidates, `query`
//! walks those lists with ever shorter band prefixes (`r - 1` down to `1`)
//! until it has `k` candidates, the way an LSH forest descends its prefix
//! trees.
//!
//! Empty-set signatures (every slot `u32::MAX`) are stored but never placed in
//! a bucket or prefix list: they would otherwise collide with each other in
//! every band. They are never returned by a query and an empty-set query
//! returns nothing.

use crate::error::{Error, Result, StateError};
use crate::minhash::Signature;
use crate::record::EntityId;
use ahash::{AHashMap, AHashSet};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Shape of the signature partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Signature length
    pub num_perm: usize,
    /// Number of bands `b`
    pub bands: usize,
    /// Slots per band `r`
    pub rows: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_perm: 128,
            bands: 32,
            rows: 4,
        }
    }
}

impl ForestConfig {
    pub fn new(num_perm: usize, bands: usize, rows: usize) -> Result<Self> {
        let config = Self {
            num_perm,
            bands,
            rows,
        };
        config.validate()?;
        Ok(config)
    }

    /// Four rows per band, as many bands as fit.
    pub fn for_num_perm(num_perm: usize) -> Result<Self> {
        let rows = 4.min(num_perm.max(1));
        Self::new(num_perm, num_perm / rows, rows)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_perm == 0 || self.bands == 0 || self.rows == 0 {
            return Err(Error::InvalidConfig(format!(
                "num_perm, bands and rows must be positive (got {}, {}, {})",
                self.num_perm, self.bands, self.rows
            )));
        }
        match self.bands.checked_mul(self.rows) {
            Some(used) if used <= self.num_perm => Ok(()),
            _ => Err(Error::InvalidConfig(format!(
                "bands * rows ({} * {}) exceeds num_perm ({})",
                self.bands, self.rows, self.num_perm
            ))),
        }
    }

    /// Similarity at which a pair becomes a candidate with probability ~0.5.
    pub fn threshold(&self) -> f64 {
        (1.0 / self.bands as f64).powf(1.0 / self.rows as f64)
    }

    /// Probability that two sets of Jaccard similarity `s` collide in at
    /// least one band.
    pub fn candidate_probability(&self, s: f64) -> f64 {
        let s = s.clamp(0.0, 1.0);
        1.0 - (1.0 - s.powi(self.rows as i32)).powi(self.bands as i32)
    }
}

/// One ranked query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: EntityId,
    /// Fraction of agreeing signature slots
    pub similarity: f64,
}

/// Bucket occupancy of a frozen forest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForestStats {
    pub entities: usize,
    pub buckets: usize,
    pub largest_bucket: usize,
    pub empty_signatures: usize,
}

#[derive(Default)]
struct PendingBuffer {
    entries: Vec<(EntityId, Signature)>,
    ids: AHashSet<EntityId>,
}

type Bucket = SmallVec<[u32; 4]>;

struct FrozenForest {
    /// Entities in insertion order; a slot's position is its tie-break rank
    ids: Vec<EntityId>,
    signatures: Vec<Signature>,
    positions: AHashMap<EntityId, u32>,
    /// One `band hash -> slots` table per band
    tables: Vec<AHashMap<u64, Bucket>>,
    /// Per band, indexed slots sorted by band values then slot
    prefixes: Vec<Vec<u32>>,
}

/// Append-then-freeze similarity index.
///
/// Duplicate ids are rejected at insert time. Query results are ordered by
/// descending similarity; equal similarities keep insertion order.
pub struct LshForest {
    config: ForestConfig,
    pending: Mutex<PendingBuffer>,
    frozen: OnceLock<FrozenForest>,
}

impl LshForest {
    pub fn new(config: ForestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pending: Mutex::new(PendingBuffer::default()),
            frozen: OnceLock::new(),
        })
    }

    /// Insert every pair and freeze.
    pub fn from_entries<I>(config: ForestConfig, entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (EntityId, Signature)>,
    {
        let forest = Self::new(config)?;
        for (id, signature) in entries {
            forest.insert(id, signature)?;
        }
        forest.freeze()?;
        Ok(forest)
    }

    pub fn config(&self) -> &ForestConfig {
        &self.config
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get().is_some()
    }

    pub fn len(&self) -> usize {
        match self.frozen.get() {
            Some(frozen) => frozen.ids.len(),
            None => self.pending.lock().entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a signature for indexing. Only valid before `freeze`.
    pub fn insert(&self, id: EntityId, signature: Signature) -> Result<()> {
        self.check_length(&signature)?;

        let mut pending = self.pending.lock();
        if self.frozen.get().is_some() {
            return Err(StateError::Frozen.into());
        }
        if pending.ids.contains(&id) {
            return Err(Error::DuplicateEntity(id.to_string()));
        }
        pending.ids.insert(id.clone());
        pending.entries.push((id, signature));
        Ok(())
    }

    /// Build the band tables and switch to read-only mode. One-way.
    pub fn freeze(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if self.frozen.get().is_some() {
            return Err(StateError::Frozen.into());
        }

        let PendingBuffer { entries, .. } = std::mem::take(&mut *pending);
        let frozen = self.build_tables(entries);
        let buckets: usize = frozen.tables.iter().map(|t| t.len()).sum();
        info!(
            entities = frozen.ids.len(),
            bands = self.config.bands,
            rows = self.config.rows,
            buckets,
            "LSH forest frozen"
        );

        // The pending lock is held, so nobody else can have published.
        self.frozen
            .set(frozen)
            .map_err(|_| Error::State(StateError::Frozen))
    }

    fn build_tables(&self, entries: Vec<(EntityId, Signature)>) -> FrozenForest {
        let mut ids = Vec::with_capacity(entries.len());
        let mut signatures = Vec::with_capacity(entries.len());
        let mut positions = AHashMap::with_capacity(entries.len());
        let mut tables: Vec<AHashMap<u64, Bucket>> =
            (0..self.config.bands).map(|_| AHashMap::new()).collect();
        let mut indexed = Vec::with_capacity(entries.len());

        for (slot, (id, signature)) in entries.into_iter().enumerate() {
            let slot = slot as u32;
            if !signature.is_empty_set() {
                for (band, table) in tables.iter_mut().enumerate() {
                    table
                        .entry(self.band_hash(&signature, band))
                        .or_default()
                        .push(slot);
                }
                indexed.push(slot);
            }
            positions.insert(id.clone(), slot);
            ids.push(id);
            signatures.push(signature);
        }

        let prefixes = (0..self.config.bands)
            .map(|band| {
                let mut sorted = indexed.clone();
                // stable, so equal bands keep insertion order
                sorted.sort_by(|&a, &b| {
                    self.band(&signatures[a as usize], band)
                        .cmp(self.band(&signatures[b as usize], band))
                });
                sorted
            })
            .collect();

        FrozenForest {
            ids,
            signatures,
            positions,
            tables,
            prefixes,
        }
    }

    /// Ids sharing at least one full band with `signature`, unranked.
    pub fn query_candidates(&self, signature: &Signature) -> Result<AHashSet<EntityId>> {
        let frozen = self.frozen()?;
        self.check_length(signature)?;
        if signature.is_empty_set() {
            return Ok(AHashSet::new());
        }
        Ok(self
            .candidate_slots(frozen, signature)
            .into_iter()
            .map(|slot| frozen.ids[slot as usize].clone())
            .collect())
    }

    /// Top-`k` indexed entities by estimated similarity to `signature`.
    ///
    /// Full band collisions are gathered first. While fewer than `k`
    /// candidates are known, entities agreeing with `signature` on a shorter
    /// band prefix are added, one prefix length at a time down to a single
    /// slot. Fewer than `k` candidates after that means all of them are
    /// returned.
    pub fn query(&self, signature: &Signature, k: usize) -> Result<Vec<Neighbor>> {
        let frozen = self.frozen()?;
        self.check_length(signature)?;
        if k == 0 || signature.is_empty_set() {
            return Ok(Vec::new());
        }

        let mut slots = self.candidate_slots(frozen, signature);
        let mut prefix = self.config.rows;
        while slots.len() < k && prefix > 1 {
            prefix -= 1;
            self.extend_with_prefix(frozen, signature, prefix, &mut slots);
        }

        let mut scored: Vec<(usize, u32)> = slots
            .into_iter()
            .map(|slot| (signature.matches(&frozen.signatures[slot as usize]), slot))
            .collect();
        let candidates = scored.len();

        scored.sort_unstable_by_key(|&(matches, slot)| (Reverse(matches), slot));
        scored.truncate(k);

        debug!(candidates, returned = scored.len(), "forest query");

        let total = self.config.num_perm as f64;
        Ok(scored
            .into_iter()
            .map(|(matches, slot)| Neighbor {
                id: frozen.ids[slot as usize].clone(),
                similarity: matches as f64 / total,
            })
            .collect())
    }

    fn candidate_slots(&self, frozen: &FrozenForest, signature: &Signature) -> AHashSet<u32> {
        let mut slots = AHashSet::new();
        for (band, table) in frozen.tables.iter().enumerate() {
            if let Some(bucket) = table.get(&self.band_hash(signature, band)) {
                slots.extend(bucket.iter().copied());
            }
        }
        slots
    }

    /// Add every slot whose band starts with the same `prefix` values as
    /// `signature`'s, in any band.
    fn extend_with_prefix(
        &self,
        frozen: &FrozenForest,
        signature: &Signature,
        prefix: usize,
        slots: &mut AHashSet<u32>,
    ) {
        for (band, sorted) in frozen.prefixes.iter().enumerate() {
            let key = &self.band(signature, band)[..prefix];
            let head = |slot: &u32| &self.band(&frozen.signatures[*slot as usize], band)[..prefix];
            let start = sorted.partition_point(|slot| head(slot) < key);
            let len = sorted[start..].partition_point(|slot| head(slot) == key);
            slots.extend(sorted[start..start + len].iter().copied());
        }
    }

    /// Stored signature of an indexed entity. `None` before freeze.
    pub fn signature(&self, id: &EntityId) -> Option<&Signature> {
        let frozen = self.frozen.get()?;
        frozen
            .positions
            .get(id)
            .map(|&slot| &frozen.signatures[slot as usize])
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        match self.frozen.get() {
            Some(frozen) => frozen.positions.contains_key(id),
            None => self.pending.lock().ids.contains(id),
        }
    }

    /// Indexed pairs in insertion order.
    pub fn entries(&self) -> Result<impl Iterator<Item = (&EntityId, &Signature)>> {
        let frozen = self.frozen()?;
        Ok(frozen.ids.iter().zip(frozen.signatures.iter()))
    }

    pub fn stats(&self) -> Result<ForestStats> {
        let frozen = self.frozen()?;
        Ok(ForestStats {
            entities: frozen.ids.len(),
            buckets: frozen.tables.iter().map(|t| t.len()).sum(),
            largest_bucket: frozen
                .tables
                .iter()
                .flat_map(|t| t.values().map(|b| b.len()))
                .max()
                .unwrap_or(0),
            empty_signatures: frozen.signatures.iter().filter(|s| s.is_empty_set()).count(),
        })
    }

    #[inline]
    fn frozen(&self) -> Result<&FrozenForest> {
        self.frozen.get().ok_or(Error::State(StateError::NotFrozen))
    }

    #[inline]
    fn check_length(&self, signature: &Signature) -> Result<()> {
        if signature.len() != self.config.num_perm {
            return Err(Error::SignatureLength {
                expected: self.config.num_perm,
                actual: signature.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn band<'s>(&self, signature: &'s Signature, band: usize) -> &'s [u32] {
        let start = band * self.config.rows;
        &signature.as_slice()[start..start + self.config.rows]
    }

    /// FNV-1a over the little-endian bytes of one band.
    #[inline]
    fn band_hash(&self, signature: &Signature, band: usize) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut state = OFFSET;
        for value in self.band(signature, band) {
            for byte in value.to_le_bytes() {
                state ^= byte as u64;
                state = state.wrapping_mul(PRIME);
            }
        }
        state
    }
}

impl std::fmt::Debug for LshForest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LshForest")
            .field("config", &self.config)
            .field("frozen", &self.is_frozen())
            .field("len", &self.len())
            .finish()
    }
}
