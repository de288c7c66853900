use crate::error::TaxonomyError;
use crate::model::Graph;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSION: &str = "json.zst";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotId(pub String);

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub id: SnapshotId,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Content-addressed, zstd-compressed copies of the whole graph, kept so an
/// operator can roll back a bulk repair or migration.
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: &Path) -> Self {
        SnapshotStore {
            dir: dir.to_path_buf(),
        }
    }

    pub fn init(&self) -> Result<(), TaxonomyError> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    fn path_for(&self, id: &SnapshotId) -> PathBuf {
        self.dir.join(format!("{}.{}", id.0, EXTENSION))
    }

    /// Canonical JSON: going through `serde_json::Value` sorts map keys, so the
    /// same graph always hashes to the same id.
    fn canonical_json(graph: &Graph) -> Result<Vec<u8>, TaxonomyError> {
        let value = serde_json::to_value(graph)?;
        Ok(serde_json::to_vec(&value)?)
    }

    pub fn hash_json(json: &[u8]) -> SnapshotId {
        let mut hasher = Sha256::new();
        hasher.update(json);
        SnapshotId(format!("{:x}", hasher.finalize()))
    }

    pub fn write(&self, graph: &Graph) -> Result<SnapshotId, TaxonomyError> {
        self.init()?;
        let json = Self::canonical_json(graph)?;
        let id = Self::hash_json(&json);
        let path = self.path_for(&id);
        if path.exists() {
            debug!(id = %id, "snapshot already stored");
            return Ok(id);
        }
        let compressed = zstd::encode_all(json.as_slice(), 3).map_err(TaxonomyError::Io)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, compressed)?;
        std::fs::rename(&tmp_path, &path)?;
        info!(id = %id, nodes = graph.nodes.len(), "snapshot written");
        Ok(id)
    }

    pub fn read(&self, id: &SnapshotId) -> Result<Graph, TaxonomyError> {
        debug!(id = %id, "reading snapshot");
        let path = self.path_for(id);
        if !path.exists() {
            return Err(TaxonomyError::SnapshotNotFound(id.0.clone()));
        }
        let compressed = std::fs::read(path)?;
        let mut decoder = zstd::Decoder::new(compressed.as_slice()).map_err(TaxonomyError::Io)?;
        let mut json = Vec::new();
        decoder.read_to_end(&mut json).map_err(TaxonomyError::Io)?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Stored snapshots, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotInfo>, TaxonomyError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let suffix = format!(".{EXTENSION}");
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else { continue };
            let Some(hash) = name.strip_suffix(&suffix) else { continue };
            let meta = entry.metadata()?;
            out.push(SnapshotInfo {
                id: SnapshotId(hash.to_string()),
                size_bytes: meta.len(),
                created_at: meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now()),
            });
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_and_list() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(&dir.path().join("snapshots"));
        let graph = dag(&["a", "b", "c"], &[("b", "a"), ("c", "a")]);

        let id = store.write(&graph).unwrap();
        assert_eq!(id.0.len(), 64);

        let back = store.read(&id).unwrap();
        assert_eq!(back.nodes.len(), 3);
        assert_eq!(back.nodes[&nid("a")].children.len(), 2);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert!(listed[0].size_bytes > 0);
    }

    #[test]
    fn test_same_graph_same_address() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let graph = dag(&["a", "b", "c", "d", "e"], &[("b", "a")]);

        let first = store.write(&graph).unwrap();
        let second = store.write(&graph.clone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_read_unknown_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path());
        let err = store.read(&SnapshotId("deadbeef".to_string())).unwrap_err();
        assert!(matches!(err, TaxonomyError::SnapshotNotFound(_)));
    }
}
