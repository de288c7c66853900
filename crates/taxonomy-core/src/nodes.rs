use crate::config::TaxonomyConfig;
use crate::dag;
use crate::error::{StructuralViolation, TaxonomyError};
use crate::model::{clean_name, Graph, HierarchyKind, Node, NodeId};
use crate::tree;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

pub(crate) fn new_node(
    name: String,
    kind: HierarchyKind,
    namespace: Option<String>,
    level: u32,
    featured: bool,
) -> Node {
    let now = Utc::now();
    Node {
        id: NodeId(Uuid::new_v4().to_string()),
        name,
        kind,
        namespace,
        level,
        parents: Vec::new(),
        children: Vec::new(),
        is_active: true,
        is_featured: featured,
        product_count: 0,
        created_at: now,
        updated_at: now,
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Reject `name` when the sibling-uniqueness policy for `kind` is on and a
/// node that would share a parent (or, for roots, the namespace) already
/// carries it. `exclude` skips the node being renamed or moved.
pub(crate) fn ensure_unique_sibling(
    graph: &Graph,
    config: &TaxonomyConfig,
    kind: HierarchyKind,
    name: &str,
    parents: &[NodeId],
    namespace: Option<&str>,
    exclude: Option<&NodeId>,
) -> Result<(), TaxonomyError> {
    if !config.unique_sibling_names(kind) {
        return Ok(());
    }
    let clashes = |n: &Node| Some(&n.id) != exclude && same_name(&n.name, name);

    if parents.is_empty() {
        let clash = graph
            .nodes_of_kind(kind)
            .filter(|n| n.is_root() && n.namespace.as_deref() == namespace)
            .any(clashes);
        if clash {
            return Err(StructuralViolation::DuplicateSiblingName {
                name: name.to_string(),
                parent: None,
            }
            .into());
        }
        return Ok(());
    }

    for parent_id in parents {
        let parent = graph.node(parent_id)?;
        let clash = parent
            .children
            .iter()
            .filter_map(|c| graph.nodes.get(c))
            .any(clashes);
        if clash {
            return Err(StructuralViolation::DuplicateSiblingName {
                name: name.to_string(),
                parent: Some(parent.name.clone()),
            }
            .into());
        }
    }
    Ok(())
}

pub fn rename(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    id: &NodeId,
    name: &str,
) -> Result<Node, TaxonomyError> {
    let name = clean_name(name)?;
    let node = graph.node(id)?;
    debug!(node_id = %id, from = %node.name, to = %name, "rename");
    ensure_unique_sibling(
        graph,
        config,
        node.kind,
        &name,
        &node.parents,
        node.namespace.as_deref(),
        Some(id),
    )?;

    let node = graph.node_mut(id)?;
    node.name = name;
    node.updated_at = Utc::now();
    Ok(node.clone())
}

pub fn set_active(graph: &mut Graph, id: &NodeId, active: bool) -> Result<Node, TaxonomyError> {
    let node = graph.node_mut(id)?;
    if node.is_active != active {
        node.is_active = active;
        node.updated_at = Utc::now();
    }
    Ok(node.clone())
}

pub fn set_featured(graph: &mut Graph, id: &NodeId, featured: bool) -> Result<Node, TaxonomyError> {
    let node = graph.node_mut(id)?;
    if node.is_featured != featured {
        node.is_featured = featured;
        node.updated_at = Utc::now();
    }
    Ok(node.clone())
}

/// Delete under the rules of the node's own hierarchy.
pub fn delete(graph: &mut Graph, config: &TaxonomyConfig, id: &NodeId) -> Result<Node, TaxonomyError> {
    match graph.node(id)?.kind {
        HierarchyKind::Tree => tree::delete_node(graph, id),
        HierarchyKind::Dag => dag::delete_node(graph, config, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_config() -> TaxonomyConfig {
        let mut config = TaxonomyConfig::default();
        config.tree.unique_sibling_names = true;
        config.dag.unique_sibling_names = true;
        config
    }

    #[test]
    fn test_rename_trims_and_touches() {
        let config = TaxonomyConfig::default();
        let mut graph = Graph::empty();
        let node = tree::create_node(&mut graph, &config, "Tops", "ladies", None, false).unwrap();

        let renamed = rename(&mut graph, &config, &node.id, "  Blouses ").unwrap();
        assert_eq!(renamed.name, "Blouses");
        assert!(renamed.updated_at >= node.updated_at);
        assert!(rename(&mut graph, &config, &node.id, "").is_err());
    }

    #[test]
    fn test_rename_respects_unique_policy() {
        let config = unique_config();
        let mut graph = Graph::empty();
        let root = tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).unwrap();
        tree::create_node(&mut graph, &config, "Tops", "ladies", Some(&root.id), false).unwrap();
        let dresses = tree::create_node(&mut graph, &config, "Dresses", "ladies", Some(&root.id), false).unwrap();

        let err = rename(&mut graph, &config, &dresses.id, "tops").unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::Structural(StructuralViolation::DuplicateSiblingName { .. })
        ));
        // renaming to its own name is not a clash
        assert!(rename(&mut graph, &config, &dresses.id, "Dresses").is_ok());
    }

    #[test]
    fn test_duplicates_tolerated_by_default() {
        let config = TaxonomyConfig::default();
        let mut graph = Graph::empty();
        let root = tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).unwrap();
        tree::create_node(&mut graph, &config, "Tops", "ladies", Some(&root.id), false).unwrap();
        assert!(tree::create_node(&mut graph, &config, "Tops", "ladies", Some(&root.id), false).is_ok());
    }

    #[test]
    fn test_root_uniqueness_is_per_namespace() {
        let config = unique_config();
        let mut graph = Graph::empty();
        tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).unwrap();
        assert!(tree::create_node(&mut graph, &config, "Clothing", "gents", None, false).is_ok());
        assert!(tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).is_err());
    }

    #[test]
    fn test_flags_are_independent() {
        let config = TaxonomyConfig::default();
        let mut graph = Graph::empty();
        let node = dag::create_node(&mut graph, &config, "Winter", &[], false).unwrap();

        let node = set_featured(&mut graph, &node.id, true).unwrap();
        assert!(node.is_featured && node.is_active);
        let node = set_active(&mut graph, &node.id, false).unwrap();
        assert!(node.is_featured && !node.is_active);
        assert!(set_active(&mut graph, &NodeId("nope".into()), true).is_err());
    }

    #[test]
    fn test_delete_dispatches_by_kind() {
        let config = TaxonomyConfig::default();
        let mut graph = Graph::empty();
        let cat = tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).unwrap();
        let tag = dag::create_node(&mut graph, &config, "Winter", &[], false).unwrap();

        delete(&mut graph, &config, &cat.id).unwrap();
        delete(&mut graph, &config, &tag.id).unwrap();
        assert!(graph.nodes.is_empty());
    }
}
