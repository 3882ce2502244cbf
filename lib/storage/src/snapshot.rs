// Snapshot support for frozen lookalike indexes
use anyhow::{anyhow, Result};
use atomicwrites::{AllowOverwrite, AtomicFile};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lookalike_core::{EngineConfig, EntityId, LookalikeEngine, LshForest, Population, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Version written into every snapshot; other versions are rejected on load.
pub const SNAPSHOT_VERSION: u32 = 2;

const SNAPSHOT_EXTENSION: &str = "snapshot";
const CHECKSUM_EXTENSION: &str = "sha256";

/// Snapshot description returned by save and list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDescription {
    pub name: String,
    /// Compressed size on disk in bytes
    pub size: u64,
    pub checksum: String,
}

/// Entity id in an externally tagged form bincode can round-trip
#[derive(Debug, Clone, Serialize, Deserialize)]
enum StoredId {
    Integer(u64),
    String(String),
}

impl From<&EntityId> for StoredId {
    fn from(id: &EntityId) -> Self {
        match id {
            EntityId::Integer(i) => StoredId::Integer(*i),
            EntityId::String(s) => StoredId::String(s.clone()),
        }
    }
}

impl From<StoredId> for EntityId {
    fn from(id: StoredId) -> Self {
        match id {
            StoredId::Integer(i) => EntityId::Integer(i),
            StoredId::String(s) => EntityId::String(s),
        }
    }
}

/// Serialized form of a frozen index. Bucket tables are not stored; they are
/// rebuilt from the signatures on load.
#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    config: EngineConfig,
    /// Hex SHA-256 of the schema and records the signatures were computed from
    population_digest: String,
    entries: Vec<(StoredId, Vec<u32>)>,
}

/// Directory of named index snapshots.
///
/// Each snapshot is a gzip-compressed bincode payload written atomically,
/// next to a `.sha256` file holding the hex digest of the compressed bytes.
pub struct SnapshotStore {
    snapshot_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(snapshot_dir: P) -> Result<Self> {
        let snapshot_dir = snapshot_dir.as_ref().to_path_buf();
        fs::create_dir_all(&snapshot_dir)?;
        Ok(Self { snapshot_dir })
    }

    pub fn dir(&self) -> &Path {
        &self.snapshot_dir
    }

    /// Path of the snapshot file for `name`
    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.snapshot_dir.join(format!("{}.{}", name, SNAPSHOT_EXTENSION))
    }

    fn checksum_path(&self, name: &str) -> PathBuf {
        self.snapshot_dir
            .join(format!("{}.{}.{}", name, SNAPSHOT_EXTENSION, CHECKSUM_EXTENSION))
    }

    /// Persist the engine's frozen forest under `name`, replacing any
    /// previous snapshot of that name.
    pub fn save(&self, name: &str, engine: &LookalikeEngine) -> Result<SnapshotDescription> {
        validate_name(name)?;

        let entries = engine
            .forest()
            .entries()?
            .map(|(id, signature)| (StoredId::from(id), signature.as_slice().to_vec()))
            .collect::<Vec<_>>();
        let count = entries.len();
        let snapshot = IndexSnapshot {
            version: SNAPSHOT_VERSION,
            config: *engine.config(),
            population_digest: population_digest(engine.population())?,
            entries,
        };

        let data = bincode::serialize(&snapshot)
            .map_err(|e| anyhow!("Serialization error: {}", e))?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&data)?;
        let compressed = encoder.finish()?;
        let checksum = format!("{:x}", Sha256::digest(&compressed));

        write_atomic(&self.snapshot_path(name), &compressed)?;
        write_atomic(&self.checksum_path(name), checksum.as_bytes())?;

        info!(name, entities = count, bytes = compressed.len(), "Snapshot saved");
        Ok(SnapshotDescription {
            name: name.to_string(),
            size: compressed.len() as u64,
            checksum,
        })
    }

    /// Load the configuration and frozen forest stored under `name`.
    pub fn load(&self, name: &str) -> Result<(EngineConfig, LshForest)> {
        let (config, forest, _) = self.read(name)?;
        Ok((config, forest))
    }

    /// Load a snapshot and attach it to the population it was built from.
    ///
    /// Fails when `population` differs from the one the snapshot was saved
    /// with, even if the entity ids are the same.
    pub fn load_engine(&self, name: &str, population: Population) -> Result<LookalikeEngine> {
        let (config, forest, digest) = self.read(name)?;
        if population_digest(&population)? != digest {
            return Err(anyhow!(
                "Snapshot '{}' was built from a different population; rebuild the index",
                name
            ));
        }
        Ok(LookalikeEngine::from_parts(config, population, forest)?)
    }

    fn read(&self, name: &str) -> Result<(EngineConfig, LshForest, String)> {
        validate_name(name)?;
        let snapshot_path = self.snapshot_path(name);
        if !snapshot_path.exists() {
            return Err(anyhow!("Snapshot '{}' not found", name));
        }

        let compressed = fs::read(&snapshot_path)?;
        let expected = fs::read_to_string(self.checksum_path(name))
            .map_err(|e| anyhow!("Missing checksum for snapshot '{}': {}", name, e))?;
        let actual = format!("{:x}", Sha256::digest(&compressed));
        if actual != expected.trim() {
            return Err(anyhow!(
                "Checksum mismatch: expected {}, got {}",
                expected.trim(),
                actual
            ));
        }

        let mut decoder = GzDecoder::new(compressed.as_slice());
        let mut data = Vec::new();
        decoder.read_to_end(&mut data)?;
        let snapshot: IndexSnapshot = bincode::deserialize(&data)
            .map_err(|e| anyhow!("Deserialization error: {}", e))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(anyhow!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version,
                SNAPSHOT_VERSION
            ));
        }

        let count = snapshot.entries.len();
        let forest = LshForest::from_entries(
            snapshot.config.forest,
            snapshot
                .entries
                .into_iter()
                .map(|(id, values)| (EntityId::from(id), Signature::from_values(values))),
        )?;

        info!(name, entities = count, "Snapshot loaded");
        Ok((snapshot.config, forest, snapshot.population_digest))
    }

    /// List all snapshots, sorted by name
    pub fn list(&self) -> Result<Vec<SnapshotDescription>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.snapshot_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|n| n.to_str()) else {
                continue;
            };
            let checksum = fs::read_to_string(self.checksum_path(name))
                .map(|s| s.trim().to_string())
                .unwrap_or_default();
            snapshots.push(SnapshotDescription {
                name: name.to_string(),
                size: fs::metadata(&path)?.len(),
                checksum,
            });
        }

        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }

    /// Delete a snapshot and its checksum
    pub fn delete(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        let snapshot_path = self.snapshot_path(name);
        if !snapshot_path.exists() {
            return Ok(false);
        }
        fs::remove_file(&snapshot_path)?;
        let checksum_path = self.checksum_path(name);
        if checksum_path.exists() {
            fs::remove_file(checksum_path)?;
        }
        Ok(true)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(|c: char| c == '/' || c == '\\') || name.starts_with('.') {
        return Err(anyhow!("Invalid snapshot name '{}'", name));
    }
    Ok(())
}

fn population_digest(population: &Population) -> Result<String> {
    let bytes = serde_json::to_vec(&(population.schema(), population.records()))?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(bytes))
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))
}
