//! Multi-parent filter hierarchy.
//!
//! A node may hang under several parents. Every accepted mutation keeps the
//! graph acyclic, and `level` is the longest path from any parentless node:
//! `1 + max(parent.level)`, or `0` for roots.
//!
//! Levels are recomputed with a topological wave sweep rather than by
//! relaxing until nothing changes: the k-th wave holds exactly the nodes
//! whose longest path is k, so one sweep lands on the fixed point.

use crate::config::TaxonomyConfig;
use crate::error::{StructuralViolation, TaxonomyError};
use crate::model::{clean_name, Graph, HierarchyKind, Node, NodeId, ProductId};
use crate::nodes::{ensure_unique_sibling, new_node};
use crate::traversal::{self, closure, reach, Adjacency, Direction, ProposedParents, Reach};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Outcome of a level recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LevelRepair {
    /// Topological waves processed; the last wave settled the deepest level.
    pub passes: usize,
    pub nodes_changed: usize,
    /// False when the wave ceiling was hit or some nodes sit on/below a cycle.
    pub converged: bool,
    /// Nodes whose level could not be settled; left untouched.
    pub unresolved: Vec<NodeId>,
}

fn dedup(ids: &[NodeId]) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert((*id).clone())).cloned().collect()
}

fn dag_parent<'a>(graph: &'a Graph, parent_id: &NodeId) -> Result<&'a Node, TaxonomyError> {
    match graph.nodes.get(parent_id) {
        Some(p) if p.kind == HierarchyKind::Dag => Ok(p),
        _ => Err(TaxonomyError::ParentNotFound {
            parent_id: parent_id.0.clone(),
            kind: HierarchyKind::Dag.to_string(),
            namespace: None,
        }),
    }
}

/// `1 + max(parent.level)` over the parents that exist, or 0.
pub fn expected_level(graph: &Graph, node: &Node) -> u32 {
    node.parents
        .iter()
        .filter_map(|p| graph.nodes.get(p))
        .map(|p| p.level + 1)
        .max()
        .unwrap_or(0)
}

pub fn create_node(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    name: &str,
    parent_ids: &[NodeId],
    featured: bool,
) -> Result<Node, TaxonomyError> {
    let name = clean_name(name)?;
    let parents = dedup(parent_ids);
    let mut level = 0;
    for pid in &parents {
        level = level.max(dag_parent(graph, pid)?.level + 1);
    }
    ensure_unique_sibling(graph, config, HierarchyKind::Dag, &name, &parents, None, None)?;

    // A brand-new node has no descendants, so none of its parents can close a cycle.
    let node = new_node(name, HierarchyKind::Dag, None, level, featured);
    let id = node.id.clone();
    debug!(node_id = %id, parents = parents.len(), level, "dag create_node");
    graph.nodes.insert(id.clone(), node);
    for pid in &parents {
        graph.link(&id, pid);
    }
    Ok(graph.node(&id)?.clone())
}

/// True if making `candidate_parent` a parent of `node` would close a cycle,
/// i.e. the candidate is `node` itself or already below it. A search cut
/// short by the depth cap cannot rule a cycle out and fails with
/// [`TaxonomyError::TraversalLimit`].
pub fn would_create_cycle<A: Adjacency + ?Sized>(
    adj: &A,
    node: &NodeId,
    candidate_parent: &NodeId,
    max_depth: usize,
) -> Result<bool, TaxonomyError> {
    match reach(adj, node, candidate_parent, Direction::Down, max_depth) {
        Reach::Found => Ok(true),
        Reach::NotFound => Ok(false),
        Reach::Truncated => {
            warn!(node_id = %node, candidate = %candidate_parent, max_depth, "cycle check hit depth cap, refusing edge");
            Err(TaxonomyError::TraversalLimit {
                node: node.0.clone(),
                depth: max_depth,
            })
        }
    }
}

/// Validate and write a new parent set for `id` without touching levels.
fn apply_parents(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    id: &NodeId,
    new_parents: &[NodeId],
) -> Result<bool, TaxonomyError> {
    let node = graph.node_of_kind(id, HierarchyKind::Dag)?;
    let name = node.name.clone();
    let old = node.parents.clone();
    let proposed = dedup(new_parents);
    for pid in &proposed {
        dag_parent(graph, pid)?;
    }

    {
        let overlay = ProposedParents::new(graph, id, &proposed);
        for pid in &proposed {
            match would_create_cycle(&overlay, id, pid, config.dag.max_traversal_depth) {
                Ok(false) => {}
                Ok(true) => {
                    return Err(StructuralViolation::CycleWouldForm {
                        node: name,
                        parent: graph.name_of(pid),
                    }
                    .into())
                }
                Err(TaxonomyError::TraversalLimit { depth, .. }) => {
                    return Err(TaxonomyError::TraversalLimit { node: name, depth })
                }
                Err(e) => return Err(e),
            }
        }
    }

    let added: Vec<NodeId> = proposed.iter().filter(|p| !old.contains(p)).cloned().collect();
    let removed: Vec<NodeId> = old.iter().filter(|p| !proposed.contains(p)).cloned().collect();
    if added.is_empty() && removed.is_empty() {
        return Ok(false);
    }
    if proposed.is_empty() {
        ensure_unique_sibling(graph, config, HierarchyKind::Dag, &name, &[], None, Some(id))?;
    } else if !added.is_empty() {
        ensure_unique_sibling(graph, config, HierarchyKind::Dag, &name, &added, None, Some(id))?;
    }

    for pid in &removed {
        graph.unlink(id, pid);
    }
    for pid in &added {
        graph.link(id, pid);
    }
    let node = graph.node_mut(id)?;
    node.parents = proposed;
    node.updated_at = Utc::now();
    debug!(node_id = %id, added = added.len(), removed = removed.len(), "dag parents replaced");
    Ok(true)
}

/// Replace every parent edge of `id`. The proposed set is validated as a
/// whole before anything is written; the first parent that would close a
/// cycle is named in the error.
pub fn update_parents(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    id: &NodeId,
    new_parents: &[NodeId],
) -> Result<Node, TaxonomyError> {
    if apply_parents(graph, config, id, new_parents)? {
        recompute_levels_from(graph, std::slice::from_ref(id));
    }
    Ok(graph.node(id)?.clone())
}

/// Several re-parent operations followed by one level recompute. Meant to
/// run inside a single store transaction so a failure discards all of them.
pub fn update_parents_batch(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    changes: &[(NodeId, Vec<NodeId>)],
) -> Result<usize, TaxonomyError> {
    let mut touched = Vec::new();
    for (id, parents) in changes {
        if apply_parents(graph, config, id, parents)? {
            touched.push(id.clone());
        }
    }
    Ok(recompute_levels_from(graph, &touched))
}

pub fn add_parent(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    id: &NodeId,
    parent_id: &NodeId,
) -> Result<Node, TaxonomyError> {
    let mut parents = graph.node_of_kind(id, HierarchyKind::Dag)?.parents.clone();
    parents.push(parent_id.clone());
    update_parents(graph, config, id, &parents)
}

pub fn remove_parent(
    graph: &mut Graph,
    config: &TaxonomyConfig,
    id: &NodeId,
    parent_id: &NodeId,
) -> Result<Node, TaxonomyError> {
    let parents: Vec<NodeId> = graph
        .node_of_kind(id, HierarchyKind::Dag)?
        .parents
        .iter()
        .filter(|p| *p != parent_id)
        .cloned()
        .collect();
    update_parents(graph, config, id, &parents)
}

pub fn delete_node(graph: &mut Graph, config: &TaxonomyConfig, id: &NodeId) -> Result<Node, TaxonomyError> {
    let node = graph.node_of_kind(id, HierarchyKind::Dag)?;
    if !node.children.is_empty() {
        return Err(StructuralViolation::HasChildren {
            node: node.name.clone(),
            child_count: node.children.len(),
        }
        .into());
    }
    let product_count = graph.direct_product_count(id);
    if config.deletion.dag_requires_productless && product_count > 0 {
        return Err(StructuralViolation::HasProducts {
            node: node.name.clone(),
            product_count,
        }
        .into());
    }
    debug!(node_id = %id, dropped_products = product_count, "dag delete_node");
    graph.remove_node(id).ok_or_else(|| TaxonomyError::NodeNotFound(id.0.clone()))
}

/// Child lists derived from each node's parent list, restricted to `scope`.
/// Built from the parent side so in-degrees and decrements always agree.
fn children_within(graph: &Graph, scope: &HashSet<NodeId>) -> HashMap<NodeId, Vec<NodeId>> {
    let mut kids: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for id in scope {
        if let Some(node) = graph.nodes.get(id) {
            for p in node.parents.iter().filter(|p| scope.contains(*p)) {
                kids.entry(p.clone()).or_default().push(id.clone());
            }
        }
    }
    kids
}

fn in_degrees(graph: &Graph, scope: &HashSet<NodeId>) -> HashMap<NodeId, usize> {
    scope
        .iter()
        .map(|id| {
            let deg = graph
                .nodes
                .get(id)
                .map_or(0, |n| n.parents.iter().filter(|p| scope.contains(*p)).count());
            (id.clone(), deg)
        })
        .collect()
}

/// Re-level `starts` and everything below them in topological order. Nodes
/// outside that set keep their levels, which stay correct because a parent
/// change only affects the changed node's descendants.
pub(crate) fn recompute_levels_from(graph: &mut Graph, starts: &[NodeId]) -> usize {
    let mut scope: HashSet<NodeId> = HashSet::new();
    for start in starts {
        if !graph.nodes.contains_key(start) {
            continue;
        }
        scope.insert(start.clone());
        scope.extend(closure(&*graph, start, Direction::Down, usize::MAX).ids);
    }
    if scope.is_empty() {
        return 0;
    }

    let kids = children_within(graph, &scope);
    let mut indeg = in_degrees(graph, &scope);
    let mut ready: Vec<NodeId> = indeg.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id.clone()).collect();
    ready.sort();

    let mut changed = 0;
    while let Some(id) = ready.pop() {
        let Some(level) = graph.nodes.get(&id).map(|n| expected_level(graph, n)) else { continue };
        if let Some(node) = graph.nodes.get_mut(&id) {
            if node.level != level {
                node.level = level;
                changed += 1;
            }
        }
        for child in kids.get(&id).into_iter().flatten() {
            if let Some(d) = indeg.get_mut(child) {
                *d -= 1;
                if *d == 0 {
                    ready.push(child.clone());
                }
            }
        }
    }
    debug!(scope = scope.len(), changed, "local level recompute");
    changed
}

/// Recompute every DAG level. Wave k assigns level k; the sweep stops after
/// `max_passes` waves. Nodes on or below a cycle never become ready and are
/// reported as unresolved without being modified.
pub fn recompute_levels(graph: &mut Graph, max_passes: usize) -> LevelRepair {
    let scope: HashSet<NodeId> = graph.nodes_of_kind(HierarchyKind::Dag).map(|n| n.id.clone()).collect();
    let kids = children_within(graph, &scope);
    let mut indeg = in_degrees(graph, &scope);

    let mut wave: Vec<NodeId> = indeg.iter().filter(|(_, d)| **d == 0).map(|(id, _)| id.clone()).collect();
    wave.sort();

    let mut report = LevelRepair::default();
    let mut settled: HashSet<NodeId> = HashSet::new();
    while !wave.is_empty() {
        if report.passes >= max_passes {
            warn!(max_passes, remaining = wave.len(), "level recompute hit wave ceiling");
            break;
        }
        let level = report.passes as u32;
        let mut next = Vec::new();
        for id in &wave {
            settled.insert(id.clone());
            if let Some(node) = graph.nodes.get_mut(id) {
                if node.level != level {
                    node.level = level;
                    report.nodes_changed += 1;
                }
            }
            for child in kids.get(id).into_iter().flatten() {
                if let Some(d) = indeg.get_mut(child) {
                    *d -= 1;
                    if *d == 0 {
                        next.push(child.clone());
                    }
                }
            }
        }
        next.sort();
        wave = next;
        report.passes += 1;
    }

    let mut unresolved: Vec<NodeId> = scope.into_iter().filter(|id| !settled.contains(id)).collect();
    unresolved.sort();
    report.converged = unresolved.is_empty();
    report.unresolved = unresolved;
    debug!(
        passes = report.passes,
        changed = report.nodes_changed,
        unresolved = report.unresolved.len(),
        "dag level recompute"
    );
    report
}

// Closure queries walk the whole reachable set. The visited set bounds the
// walk even on corrupt, cyclic data, so no depth cap applies here.

pub fn ancestors_of(graph: &Graph, id: &NodeId) -> Result<Vec<NodeId>, TaxonomyError> {
    graph.node(id)?;
    Ok(closure(graph, id, Direction::Up, usize::MAX).ids)
}

pub fn descendants_of(graph: &Graph, id: &NodeId) -> Result<Vec<NodeId>, TaxonomyError> {
    graph.node(id)?;
    Ok(closure(graph, id, Direction::Down, usize::MAX).ids)
}

/// One root-first path per distinct route to `id`.
pub fn breadcrumbs(graph: &Graph, config: &TaxonomyConfig, id: &NodeId) -> Result<Vec<Vec<NodeId>>, TaxonomyError> {
    graph.node(id)?;
    Ok(traversal::root_paths(
        graph,
        id,
        config.dag.max_breadcrumbs,
        config.dag.max_traversal_depth,
    ))
}

/// Products tagged to any of `ids` or to anything below them.
pub fn products_under(graph: &Graph, ids: &[NodeId]) -> Result<BTreeSet<ProductId>, TaxonomyError> {
    let mut expanded: HashSet<NodeId> = HashSet::new();
    for id in ids {
        graph.node(id)?;
        expanded.insert(id.clone());
        expanded.extend(closure(graph, id, Direction::Down, usize::MAX).ids);
    }
    Ok(expanded.iter().flat_map(|n| graph.products_of(n)).cloned().collect())
}
