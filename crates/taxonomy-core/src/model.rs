use crate::error::TaxonomyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generate `as_str()` and `from_str()` for a snake_case enum.
macro_rules! str_enum {
    ($T:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $T {
            pub fn as_str(&self) -> &str {
                match self { $( $T::$variant => $s, )+ }
            }
            pub fn from_str(s: &str) -> Option<$T> {
                match s { $( $s => Some($T::$variant), )+ _ => None }
            }
        }
        impl std::fmt::Display for $T {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use str_enum;

/// Which hierarchy a node lives in: the single-parent category tree or the
/// multi-parent filter DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyKind {
    Tree,
    Dag,
}

str_enum!(HierarchyKind {
    Tree => "tree",
    Dag => "dag",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: HierarchyKind,
    #[serde(default)]
    pub namespace: Option<String>,
    pub level: u32,
    #[serde(default)]
    pub parents: Vec<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    pub is_active: bool,
    pub is_featured: bool,
    #[serde(default)]
    pub product_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// The whole persisted state: nodes keyed by id plus product attachments
/// keyed by the node they hang from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: HashMap<NodeId, Node>,
    #[serde(default)]
    pub attachments: HashMap<NodeId, BTreeSet<ProductId>>,
}

impl Graph {
    pub fn empty() -> Self {
        Graph::default()
    }

    pub fn node(&self, id: &NodeId) -> Result<&Node, TaxonomyError> {
        self.nodes
            .get(id)
            .ok_or_else(|| TaxonomyError::NodeNotFound(id.0.clone()))
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Result<&mut Node, TaxonomyError> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| TaxonomyError::NodeNotFound(id.0.clone()))
    }

    /// Look up a node and check it belongs to the expected hierarchy.
    pub fn node_of_kind(&self, id: &NodeId, kind: HierarchyKind) -> Result<&Node, TaxonomyError> {
        let node = self.node(id)?;
        if node.kind != kind {
            return Err(TaxonomyError::WrongHierarchy {
                node: node.name.clone(),
                expected: kind.to_string(),
                actual: node.kind.to_string(),
            });
        }
        Ok(node)
    }

    /// Display name for messages; falls back to the raw id for dangling refs.
    pub fn name_of(&self, id: &NodeId) -> String {
        self.nodes
            .get(id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.0.clone())
    }

    pub fn products_of(&self, id: &NodeId) -> impl Iterator<Item = &ProductId> {
        self.attachments.get(id).into_iter().flatten()
    }

    pub fn direct_product_count(&self, id: &NodeId) -> usize {
        self.attachments.get(id).map_or(0, |set| set.len())
    }

    pub fn nodes_of_kind(&self, kind: HierarchyKind) -> impl Iterator<Item = &Node> {
        self.nodes.values().filter(move |n| n.kind == kind)
    }

    /// Insert the edge `child -> parent` into both adjacency lists.
    pub(crate) fn link(&mut self, child: &NodeId, parent: &NodeId) {
        if let Some(node) = self.nodes.get_mut(child) {
            if !node.parents.contains(parent) {
                node.parents.push(parent.clone());
            }
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            if !node.children.contains(child) {
                node.children.push(child.clone());
            }
        }
    }

    /// Remove the edge `child -> parent` from both adjacency lists.
    pub(crate) fn unlink(&mut self, child: &NodeId, parent: &NodeId) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parents.retain(|p| p != parent);
        }
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|c| c != child);
        }
    }

    /// Remove a node together with every incident edge and its attachments.
    pub(crate) fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        for parent in &node.parents {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| c != id);
            }
        }
        for child in &node.children {
            if let Some(c) = self.nodes.get_mut(child) {
                c.parents.retain(|p| p != id);
            }
        }
        self.attachments.remove(id);
        Some(node)
    }
}

/// Normalize a display name; empty names are rejected.
pub(crate) fn clean_name(name: &str) -> Result<String, TaxonomyError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TaxonomyError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_string())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_link_is_symmetric_and_idempotent() {
        let mut graph = dag(&["a", "b"], &[]);
        graph.link(&nid("b"), &nid("a"));
        graph.link(&nid("b"), &nid("a"));
        assert_eq!(graph.nodes[&nid("b")].parents, vec![nid("a")]);
        assert_eq!(graph.nodes[&nid("a")].children, vec![nid("b")]);

        graph.unlink(&nid("b"), &nid("a"));
        assert!(graph.nodes[&nid("b")].parents.is_empty());
        assert!(graph.nodes[&nid("a")].children.is_empty());
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let mut graph = dag(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
        graph.attachments.entry(nid("b")).or_default().insert(pid("p1"));

        let removed = graph.remove_node(&nid("b")).unwrap();
        assert_eq!(removed.name, "b");
        assert!(graph.nodes[&nid("a")].children.is_empty());
        assert!(graph.nodes[&nid("c")].parents.is_empty());
        assert!(!graph.attachments.contains_key(&nid("b")));
    }

    #[test]
    fn test_node_of_kind_rejects_other_hierarchy() {
        let graph = dag(&["a"], &[]);
        let err = graph.node_of_kind(&nid("a"), HierarchyKind::Tree).unwrap_err();
        assert!(matches!(err, TaxonomyError::WrongHierarchy { .. }));
    }

    #[test]
    fn test_clean_name() {
        assert_eq!(clean_name("  Tops ").unwrap(), "Tops");
        assert!(clean_name("   ").is_err());
    }

    #[test]
    fn test_graph_serde_keeps_attachments() {
        let mut graph = dag(&["a"], &[]);
        graph.attachments.entry(nid("a")).or_default().insert(pid("p1"));
        let json = serde_json::to_string(&graph).unwrap();
        let back: Graph = serde_json::from_str(&json).unwrap();
        assert_eq!(back.direct_product_count(&nid("a")), 1);
        assert_eq!(back.nodes[&nid("a")].kind, HierarchyKind::Dag);
    }
}
