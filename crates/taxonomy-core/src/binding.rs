//! Product attachments across both hierarchies. Tree nodes only accept
//! products on leaves; DAG nodes take them anywhere.

use crate::dag;
use crate::error::TaxonomyError;
use crate::model::{Graph, HierarchyKind, NodeId, ProductId};
use crate::traversal::{closure, Direction};
use crate::tree::{self, LeafValidation};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Returns `false` when the product was already attached.
pub fn attach(graph: &mut Graph, product_id: &ProductId, id: &NodeId) -> Result<bool, TaxonomyError> {
    match graph.node(id)?.kind {
        HierarchyKind::Tree => tree::attach_product(graph, product_id, id),
        HierarchyKind::Dag => {
            let created = graph.attachments.entry(id.clone()).or_default().insert(product_id.clone());
            debug!(node_id = %id, product_id = %product_id, created, "dag attach");
            Ok(created)
        }
    }
}

/// Returns whether an attachment was removed. A missing attachment on an
/// existing node is not an error.
pub fn detach(graph: &mut Graph, product_id: &ProductId, id: &NodeId) -> Result<bool, TaxonomyError> {
    graph.node(id)?;
    let Some(set) = graph.attachments.get_mut(id) else { return Ok(false) };
    let removed = set.remove(product_id);
    if set.is_empty() {
        graph.attachments.remove(id);
    }
    debug!(node_id = %id, product_id = %product_id, removed, "detach");
    Ok(removed)
}

/// Ask before attaching. DAG nodes are always eligible.
pub fn validate_attachment(graph: &Graph, id: &NodeId) -> Result<LeafValidation, TaxonomyError> {
    let node = graph.node(id)?;
    match node.kind {
        HierarchyKind::Tree => tree::validate_leaf_for_attachment(graph, id),
        HierarchyKind::Dag => Ok(LeafValidation {
            node_id: id.clone(),
            node_name: node.name.clone(),
            child_count: node.children.len(),
            eligible: true,
            message: None,
        }),
    }
}

pub fn products_of(graph: &Graph, id: &NodeId) -> Result<Vec<ProductId>, TaxonomyError> {
    graph.node(id)?;
    Ok(graph.products_of(id).cloned().collect())
}

/// Reverse lookup: every node a product hangs from, optionally limited to one
/// hierarchy. Sorted by id.
pub fn nodes_for_product(graph: &Graph, product_id: &ProductId, kind: Option<HierarchyKind>) -> Vec<NodeId> {
    let mut ids: Vec<NodeId> = graph
        .attachments
        .iter()
        .filter(|(_, set)| set.contains(product_id))
        .filter(|(id, _)| match (kind, graph.nodes.get(*id)) {
            (None, _) => true,
            (Some(k), Some(node)) => node.kind == k,
            (Some(_), None) => false,
        })
        .map(|(id, _)| id.clone())
        .collect();
    ids.sort();
    ids
}

/// Products on `id` and everything below it.
pub fn expanded_products(graph: &Graph, id: &NodeId) -> Result<BTreeSet<ProductId>, TaxonomyError> {
    match graph.node(id)?.kind {
        HierarchyKind::Tree => tree::descendant_products(graph, id),
        HierarchyKind::Dag => dag::products_under(graph, std::slice::from_ref(id)),
    }
}

/// Roll distinct product counts up into every node's cached `product_count`.
/// Returns how many nodes changed.
pub fn recompute_product_counts(graph: &mut Graph) -> usize {
    let counts: Vec<(NodeId, u32)> = graph
        .nodes
        .keys()
        .map(|id| {
            let mut products: HashSet<&ProductId> = graph.products_of(id).collect();
            for below in closure(&*graph, id, Direction::Down, usize::MAX).ids {
                products.extend(graph.products_of(&below));
            }
            (id.clone(), u32::try_from(products.len()).unwrap_or(u32::MAX))
        })
        .collect();

    let mut changed = 0;
    for (id, count) in counts {
        if let Some(node) = graph.nodes.get_mut(&id) {
            if node.product_count != count {
                node.product_count = count;
                changed += 1;
            }
        }
    }
    debug!(changed, "product counts recomputed");
    changed
}
