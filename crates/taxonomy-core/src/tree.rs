//! Single-parent category tree.
//!
//! Each namespace (`ladies`, `gents`, ...) is its own forest of roots. A node
//! has at most one parent, its level is its depth below the namespace root,
//! and products may only hang from leaves.

use crate::config::TaxonomyConfig;
use crate::error::{plural, StructuralViolation, TaxonomyError};
use crate::model::{clean_name, Graph, HierarchyKind, Node, NodeId, ProductId};
use crate::nodes::{ensure_unique_sibling, new_node};
use crate::traversal::{closure, Direction};
use chrono::Utc;
use std::collections::{BTreeSet, HashSet, VecDeque};
use tracing::debug;

/// Outcome of checking whether a node may receive product attachments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafValidation {
    pub node_id: NodeId,
    pub node_name: String,
    pub child_count: usize,
    pub eligible: bool,
    pub message: Option<String>,
}

fn tree_parent<'a>(graph: &'a Graph, parent_id: &NodeId, namespace: &str) -> Result<&'a Node, TaxonomyError> {
    match graph.nodes.get(parent_id) {
        Some(p) if p.kind == HierarchyKind::Tree && p.namespace.as_deref() == Some(namespace) => Ok(p),
        _ => Err(TaxonomyError::ParentNotFound {
            parent_id: parent_id.0.clone(),
            kind: HierarchyKind::Tree.to_string(),
            namespace: Some(namespace.to_string()),
        }),
    }
}

pub fn create_node(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    name: &str,
    namespace: &str,
    parent_id: Option<&NodeId>,
    featured: bool,
) -> Result<Node, TaxonomyError> {
    let name = clean_name(name)?;
    let namespace = namespace.trim();
    if namespace.is_empty() {
        return Err(TaxonomyError::MissingNamespace);
    }
    if !config.namespace_allowed(namespace) {
        return Err(TaxonomyError::UnknownNamespace(namespace.to_string()));
    }

    let (level, parents) = match parent_id {
        Some(pid) => (tree_parent(graph, pid, namespace)?.level + 1, vec![pid.clone()]),
        None => (0, Vec::new()),
    };
    ensure_unique_sibling(graph, config, HierarchyKind::Tree, &name, &parents, Some(namespace), None)?;

    let node = new_node(name, HierarchyKind::Tree, Some(namespace.to_string()), level, featured);
    let id = node.id.clone();
    debug!(node_id = %id, namespace = %namespace, level, "tree create_node");
    graph.nodes.insert(id.clone(), node);
    if let Some(pid) = parent_id {
        graph.link(&id, pid);
    }
    Ok(graph.node(&id)?.clone())
}

/// Re-hang `id` under `new_parent_id` (or make it a root) and re-level the
/// moved subtree.
pub fn move_node(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    id: &NodeId,
    new_parent_id: Option<&NodeId>,
) -> Result<Node, TaxonomyError> {
    let node = graph.node_of_kind(id, HierarchyKind::Tree)?;
    let namespace = node.namespace.clone().ok_or(TaxonomyError::MissingNamespace)?;
    let name = node.name.clone();
    let old_parents = node.parents.clone();

    let new_parents = match new_parent_id {
        Some(pid) => {
            let parent = tree_parent(graph, pid, &namespace)?;
            if pid == id || closure(&*graph, id, Direction::Down, usize::MAX).contains(pid) {
                return Err(StructuralViolation::CycleWouldForm {
                    node: name,
                    parent: parent.name.clone(),
                }
                .into());
            }
            vec![pid.clone()]
        }
        None => Vec::new(),
    };
    if new_parents == old_parents {
        return Ok(graph.node(id)?.clone());
    }
    ensure_unique_sibling(graph, config, HierarchyKind::Tree, &name, &new_parents, Some(&namespace), Some(id))?;

    for old in &old_parents {
        graph.unlink(id, old);
    }
    if let Some(pid) = new_parent_id {
        graph.link(id, pid);
    }
    let changed = relevel_subtree(graph, id);
    debug!(node_id = %id, relevelled = changed, "tree move_node");

    let node = graph.node_mut(id)?;
    node.updated_at = Utc::now();
    Ok(node.clone())
}

pub fn delete_node(graph: &mut Graph, id: &NodeId) -> Result<Node, TaxonomyError> {
    let node = graph.node_of_kind(id, HierarchyKind::Tree)?;
    if !node.children.is_empty() {
        return Err(StructuralViolation::HasChildren {
            node: node.name.clone(),
            child_count: node.children.len(),
        }
        .into());
    }
    let product_count = graph.direct_product_count(id);
    if product_count > 0 {
        return Err(StructuralViolation::HasProducts {
            node: node.name.clone(),
            product_count,
        }
        .into());
    }
    debug!(node_id = %id, "tree delete_node");
    graph.remove_node(id).ok_or_else(|| TaxonomyError::NodeNotFound(id.0.clone()))
}

pub fn validate_leaf_for_attachment(graph: &Graph, id: &NodeId) -> Result<LeafValidation, TaxonomyError> {
    let node = graph.node_of_kind(id, HierarchyKind::Tree)?;
    let child_count = node.children.len();
    let eligible = child_count == 0;
    let message = (!eligible).then(|| {
        format!(
            "category '{}' has {} {}; attach to a leaf instead",
            node.name,
            child_count,
            plural(child_count, "child category", "child categories")
        )
    });
    Ok(LeafValidation {
        node_id: id.clone(),
        node_name: node.name.clone(),
        child_count,
        eligible,
        message,
    })
}

/// Attach a product to a leaf. Returns `false` when it was already attached.
pub fn attach_product(graph: &mut Graph, product_id: &ProductId, id: &NodeId) -> Result<bool, TaxonomyError> {
    let check = validate_leaf_for_attachment(graph, id)?;
    if !check.eligible {
        return Err(StructuralViolation::NonLeafAttachment {
            node: check.node_name,
            child_count: check.child_count,
        }
        .into());
    }
    Ok(graph.attachments.entry(id.clone()).or_default().insert(product_id.clone()))
}

/// Products attached anywhere in the subtree rooted at `id`, `id` included.
pub fn descendant_products(graph: &Graph, id: &NodeId) -> Result<BTreeSet<ProductId>, TaxonomyError> {
    graph.node_of_kind(id, HierarchyKind::Tree)?;
    let subtree = closure(graph, id, Direction::Down, usize::MAX);
    Ok(std::iter::once(id)
        .chain(subtree.ids.iter())
        .flat_map(|n| graph.products_of(n))
        .cloned()
        .collect())
}

/// Top-down walk from `id` setting each level to parent level + 1. Returns
/// how many nodes changed.
pub(crate) fn relevel_subtree(graph: &mut Graph, id: &NodeId) -> usize {
    let base = graph
        .node(id)
        .ok()
        .and_then(|n| n.parents.first())
        .and_then(|p| graph.nodes.get(p))
        .map_or(0, |p| p.level + 1);

    let mut changed = 0;
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<(NodeId, u32)> = VecDeque::new();
    queue.push_back((id.clone(), base));
    while let Some((current, level)) = queue.pop_front() {
        if !seen.insert(current.clone()) {
            continue;
        }
        let Some(node) = graph.nodes.get_mut(&current) else { continue };
        if node.level != level {
            node.level = level;
            changed += 1;
        }
        for child in node.children.clone() {
            queue.push_back((child, level + 1));
        }
    }
    changed
}

/// Re-level every tree from its namespace roots.
pub fn recompute_levels(graph: &mut Graph) -> usize {
    let mut roots: Vec<NodeId> = graph
        .nodes_of_kind(HierarchyKind::Tree)
        .filter(|n| n.is_root())
        .map(|n| n.id.clone())
        .collect();
    roots.sort();
    roots.iter().map(|r| relevel_subtree(graph, r)).sum()
}
