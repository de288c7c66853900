use crate::error::TaxonomyError;
use crate::model::Graph;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

pub fn load_graph(path: &Path) -> Result<Graph, TaxonomyError> {
    debug!(path = %path.display(), "loading graph");
    let data = fs::read_to_string(path)?;
    let graph: Graph = serde_json::from_str(&data)?;
    info!(
        nodes = graph.nodes.len(),
        attached_nodes = graph.attachments.len(),
        "graph loaded"
    );
    Ok(graph)
}

/// Write to a sibling temp file, then rename over the target so readers
/// never observe a half-written document.
pub fn save_graph(path: &Path, graph: &Graph) -> Result<(), TaxonomyError> {
    debug!(path = %path.display(), "saving graph");
    let json = serde_json::to_string_pretty(graph)?;
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, &json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn create_default_graph() -> Graph {
    Graph::empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.json");
        let mut graph = dag(&["winter", "sale"], &[("sale", "winter")]);
        graph.attachments.entry(nid("sale")).or_default().insert(pid("p1"));

        save_graph(&path, &graph).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let loaded = load_graph(&path).unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.nodes[&nid("sale")].parents, vec![nid("winter")]);
        assert_eq!(loaded.direct_product_count(&nid("sale")), 1);
    }

    #[test]
    fn test_load_corrupt_file_is_json_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("taxonomy.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_graph(&path), Err(TaxonomyError::Json(_))));
    }

    #[test]
    fn test_load_missing_file_is_transient_io() {
        let dir = TempDir::new().unwrap();
        let err = load_graph(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.is_transient());
    }
}
