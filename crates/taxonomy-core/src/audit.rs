//! Integrity checks over the persisted graph, plus the two maintenance
//! passes that act on their findings: level repair and dangling-reference
//! cleanup. `audit` itself never writes.

use crate::config::TaxonomyConfig;
use crate::dag::{self, LevelRepair};
use crate::model::{str_enum, Graph, HierarchyKind, Node, NodeId};
use crate::traversal::{reach, Direction, Reach};
use crate::tree;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

str_enum!(Severity {
    Error => "error",
    Warning => "warning",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    DagCycle,
    CycleCheckTruncated,
    DagLevelMismatch,
    TreeMultipleParents,
    TreeLevelMismatch,
    NonLeafAttachment,
    CrossKindEdge,
    CrossNamespaceEdge,
    MissingNamespace,
    DanglingEdge,
    AsymmetricEdge,
    OrphanAttachment,
}

str_enum!(IssueCode {
    DagCycle => "dag_cycle",
    CycleCheckTruncated => "cycle_check_truncated",
    DagLevelMismatch => "dag_level_mismatch",
    TreeMultipleParents => "tree_multiple_parents",
    TreeLevelMismatch => "tree_level_mismatch",
    NonLeafAttachment => "non_leaf_attachment",
    CrossKindEdge => "cross_kind_edge",
    CrossNamespaceEdge => "cross_namespace_edge",
    MissingNamespace => "missing_namespace",
    DanglingEdge => "dangling_edge",
    AsymmetricEdge => "asymmetric_edge",
    OrphanAttachment => "orphan_attachment",
});

#[derive(Debug, Clone, Serialize)]
pub struct AuditIssue {
    pub node_id: NodeId,
    pub node_name: String,
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    pub nodes_checked: usize,
    pub errors: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AuditReport {
    pub issues: Vec<AuditIssue>,
    pub summary: AuditSummary,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn has(&self, code: IssueCode) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }
}

struct Findings<'g> {
    graph: &'g Graph,
    issues: Vec<AuditIssue>,
}

impl Findings<'_> {
    fn push(&mut self, node: &Node, severity: Severity, code: IssueCode, message: String) {
        self.issues.push(AuditIssue {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            severity,
            code,
            message,
        });
    }

    fn edges(&mut self, node: &Node) {
        let graph = self.graph;
        for pid in &node.parents {
            let Some(parent) = graph.nodes.get(pid) else {
                self.push(node, Severity::Error, IssueCode::DanglingEdge, format!("parent id '{pid}' does not exist"));
                continue;
            };
            if !parent.children.contains(&node.id) {
                self.push(
                    node,
                    Severity::Error,
                    IssueCode::AsymmetricEdge,
                    format!("'{}' lists '{}' as parent but is missing from its children", node.name, parent.name),
                );
            }
            if parent.kind != node.kind {
                self.push(
                    node,
                    Severity::Error,
                    IssueCode::CrossKindEdge,
                    format!("parent '{}' belongs to the {} hierarchy", parent.name, parent.kind),
                );
            } else if node.kind == HierarchyKind::Tree && parent.namespace != node.namespace {
                self.push(
                    node,
                    Severity::Error,
                    IssueCode::CrossNamespaceEdge,
                    format!(
                        "parent '{}' is in namespace '{}'",
                        parent.name,
                        parent.namespace.as_deref().unwrap_or("")
                    ),
                );
            }
        }
        for cid in &node.children {
            match graph.nodes.get(cid) {
                None => self.push(node, Severity::Error, IssueCode::DanglingEdge, format!("child id '{cid}' does not exist")),
                Some(child) if !child.parents.contains(&node.id) => self.push(
                    node,
                    Severity::Error,
                    IssueCode::AsymmetricEdge,
                    format!("'{}' lists '{}' as child but is missing from its parents", node.name, child.name),
                ),
                Some(_) => {}
            }
        }
    }

    fn dag_node(&mut self, node: &Node, config: &TaxonomyConfig) {
        let graph = self.graph;
        let depth = config.dag.max_traversal_depth;
        let outcomes: Vec<Reach> = node
            .parents
            .iter()
            .map(|p| reach(graph, p, &node.id, Direction::Up, depth))
            .collect();
        if outcomes.contains(&Reach::Found) {
            self.push(
                node,
                Severity::Error,
                IssueCode::DagCycle,
                format!("'{}' is its own ancestor", node.name),
            );
            return;
        }
        if outcomes.contains(&Reach::Truncated) {
            self.push(
                node,
                Severity::Warning,
                IssueCode::CycleCheckTruncated,
                format!("cycle check for '{}' truncated at depth {depth}", node.name),
            );
            return;
        }
        let expected = dag::expected_level(graph, node);
        if node.level != expected {
            self.push(
                node,
                Severity::Warning,
                IssueCode::DagLevelMismatch,
                format!("level is {}, expected {}", node.level, expected),
            );
        }
    }

    fn tree_node(&mut self, node: &Node) {
        let graph = self.graph;
        if node.namespace.as_deref().map_or(true, str::is_empty) {
            self.push(node, Severity::Error, IssueCode::MissingNamespace, "tree node has no namespace".to_string());
        }
        if node.parents.len() > 1 {
            self.push(
                node,
                Severity::Error,
                IssueCode::TreeMultipleParents,
                format!("has {} parents, a category may have at most one", node.parents.len()),
            );
        }
        let expected = node
            .parents
            .first()
            .and_then(|p| graph.nodes.get(p))
            .map_or(0, |p| p.level + 1);
        if node.level != expected {
            self.push(
                node,
                Severity::Warning,
                IssueCode::TreeLevelMismatch,
                format!("level is {}, expected {}", node.level, expected),
            );
        }
        let products = graph.direct_product_count(&node.id);
        if products > 0 && !node.children.is_empty() {
            self.push(
                node,
                Severity::Error,
                IssueCode::NonLeafAttachment,
                format!(
                    "{} products attached to a category with {} children",
                    products,
                    node.children.len()
                ),
            );
        }
    }
}

/// Read-only integrity report.
pub fn audit(graph: &Graph, config: &TaxonomyConfig) -> AuditReport {
    let mut ids: Vec<&NodeId> = graph.nodes.keys().collect();
    ids.sort();

    let mut findings = Findings {
        graph,
        issues: Vec::new(),
    };
    for id in ids {
        let node = &graph.nodes[id];
        findings.edges(node);
        match node.kind {
            HierarchyKind::Dag => findings.dag_node(node, config),
            HierarchyKind::Tree => findings.tree_node(node),
        }
    }

    let mut orphans: Vec<&NodeId> = graph.attachments.keys().filter(|id| !graph.nodes.contains_key(*id)).collect();
    orphans.sort();
    for id in orphans {
        findings.issues.push(AuditIssue {
            node_id: id.clone(),
            node_name: id.0.clone(),
            severity: Severity::Warning,
            code: IssueCode::OrphanAttachment,
            message: format!("{} attachments reference a missing node", graph.direct_product_count(id)),
        });
    }

    let issues = findings.issues;
    let errors = issues.iter().filter(|i| i.severity == Severity::Error).count();
    let summary = AuditSummary {
        nodes_checked: graph.nodes.len(),
        errors,
        warnings: issues.len() - errors,
    };
    if issues.is_empty() {
        info!(nodes = summary.nodes_checked, "audit clean");
    } else {
        warn!(nodes = summary.nodes_checked, errors, warnings = summary.warnings, "audit found issues");
    }
    AuditReport { issues, summary }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub passes: usize,
    pub nodes_changed: usize,
    pub tree_changed: usize,
    pub dag_changed: usize,
    pub converged: bool,
    pub unresolved: Vec<NodeId>,
    pub summary: String,
}

/// Recompute tree levels top-down and DAG levels by topological waves.
/// Cycles are left in place; nodes caught in them are listed as unresolved.
pub fn repair(graph: &mut Graph, config: &TaxonomyConfig) -> RepairReport {
    let tree_changed = tree::recompute_levels(graph);
    let LevelRepair {
        passes,
        nodes_changed: dag_changed,
        converged,
        unresolved,
    } = dag::recompute_levels(graph, config.dag.max_level_passes);

    let nodes_changed = tree_changed + dag_changed;
    let mut summary = format!("{nodes_changed} levels corrected ({tree_changed} tree, {dag_changed} dag) in {passes} passes");
    if !converged {
        summary.push_str(&format!(
            "; {} dag nodes unresolved (on or below a cycle, or past the pass ceiling)",
            unresolved.len()
        ));
    }
    info!(tree_changed, dag_changed, passes, converged, "repair finished");
    RepairReport {
        passes,
        nodes_changed,
        tree_changed,
        dag_changed,
        converged,
        unresolved,
        summary,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub edges_removed: usize,
    pub edges_restored: usize,
    pub attachments_removed: usize,
}

/// Drop references to nodes that no longer exist and rebuild each child list
/// from the parent lists, which are the source of truth for edges.
pub fn cleanup_dangling(graph: &mut Graph) -> CleanupReport {
    let mut report = CleanupReport::default();
    let existing: HashSet<NodeId> = graph.nodes.keys().cloned().collect();

    for node in graph.nodes.values_mut() {
        let before = node.parents.len() + node.children.len();
        node.parents.retain(|p| existing.contains(p));
        node.children.retain(|c| existing.contains(c));
        report.edges_removed += before - node.parents.len() - node.children.len();
    }

    let edges: HashSet<(NodeId, NodeId)> = graph
        .nodes
        .values()
        .flat_map(|n| n.parents.iter().map(move |p| (n.id.clone(), p.clone())))
        .collect();
    let mut ids: Vec<NodeId> = existing.into_iter().collect();
    ids.sort();
    for id in &ids {
        let Some(node) = graph.nodes.get_mut(id) else { continue };
        let before = node.children.len();
        node.children.retain(|c| edges.contains(&(c.clone(), id.clone())));
        report.edges_removed += before - node.children.len();
    }
    let mut missing: Vec<(NodeId, NodeId)> = edges
        .iter()
        .filter(|(child, parent)| graph.nodes.get(parent).map_or(false, |p| !p.children.contains(child)))
        .cloned()
        .collect();
    missing.sort();
    for (child, parent) in missing {
        if let Some(p) = graph.nodes.get_mut(&parent) {
            p.children.push(child);
            report.edges_restored += 1;
        }
    }

    let before = graph.attachments.len();
    graph.attachments.retain(|id, set| graph.nodes.contains_key(id) && !set.is_empty());
    report.attachments_removed = before - graph.attachments.len();

    info!(
        edges_removed = report.edges_removed,
        edges_restored = report.edges_restored,
        attachments_removed = report.attachments_removed,
        "dangling references cleaned"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    fn config() -> TaxonomyConfig {
        TaxonomyConfig::default()
    }

    fn levelled_dag(ids: &[&str], edges: &[(&str, &str)]) -> Graph {
        let mut graph = dag(ids, edges);
        dag::recompute_levels(&mut graph, 1000);
        graph
    }

    fn codes(report: &AuditReport) -> Vec<&str> {
        report.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn test_clean_graph() {
        let graph = levelled_dag(&["a", "b", "c", "d"], &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")]);
        let report = audit(&graph, &config());
        assert!(report.is_clean(), "{:?}", codes(&report));
        assert_eq!(report.summary.nodes_checked, 4);
    }

    #[test]
    fn test_dag_cycle_and_level_mismatch() {
        let mut graph = levelled_dag(&["r", "x", "y", "z"], &[("z", "r")]);
        graph.link(&nid("x"), &nid("y"));
        graph.link(&nid("y"), &nid("x"));
        graph.nodes.get_mut(&nid("z")).unwrap().level = 7;

        let report = audit(&graph, &config());
        let cycles: Vec<&str> = report
            .issues
            .iter()
            .filter(|i| i.code == IssueCode::DagCycle)
            .map(|i| i.node_id.0.as_str())
            .collect();
        assert_eq!(cycles, vec!["x", "y"]);
        assert!(report.has(IssueCode::DagLevelMismatch));
        assert_eq!(report.summary.errors, 2);
        assert_eq!(report.summary.warnings, 1);
    }

    #[test]
    fn test_cycle_longer_than_traversal_depth_is_flagged() {
        // c0 <- c1 <- ... <- c79 <- c0
        let names: Vec<String> = (0..80).map(|i| format!("c{i}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let mut edges: Vec<(&str, &str)> = refs.windows(2).map(|w| (w[1], w[0])).collect();
        edges.push(("c0", "c79"));
        let mut graph = dag(&refs, &edges);

        let report = audit(&graph, &config());
        assert!(!report.has(IssueCode::DagCycle));
        assert_eq!(
            report.issues.iter().filter(|i| i.code == IssueCode::CycleCheckTruncated).count(),
            80
        );
        assert!(report.issues[0].message.contains("depth 64"));
        assert_eq!(report.summary.warnings, 80);

        let mut deep = config();
        deep.dag.max_traversal_depth = 128;
        assert!(audit(&graph, &deep).has(IssueCode::DagCycle));

        let repaired = repair(&mut graph, &config());
        assert_eq!(repaired.unresolved.len(), 80);
    }

    #[test]
    fn test_tree_checks() {
        let config = config();
        let mut graph = Graph::empty();
        let clothing = tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).unwrap();
        let tops = tree::create_node(&mut graph, &config, "Tops", "ladies", Some(&clothing.id), false).unwrap();
        let shoes = tree::create_node(&mut graph, &config, "Shoes", "gents", None, false).unwrap();
        assert!(audit(&graph, &config).is_clean());

        // product attached while Clothing was still a leaf
        graph.attachments.entry(clothing.id.clone()).or_default().insert(pid("p1"));
        graph.link(&tops.id, &shoes.id);
        graph.nodes.get_mut(&shoes.id).unwrap().namespace = None;

        let report = audit(&graph, &config);
        for code in [
            IssueCode::NonLeafAttachment,
            IssueCode::TreeMultipleParents,
            IssueCode::CrossNamespaceEdge,
            IssueCode::MissingNamespace,
        ] {
            assert!(report.has(code), "missing {code}");
        }
    }

    #[test]
    fn test_dangling_asymmetric_and_orphans() {
        let mut graph = levelled_dag(&["a", "b"], &[("b", "a")]);
        graph.nodes.get_mut(&nid("b")).unwrap().parents.push(nid("ghost"));
        graph.nodes.get_mut(&nid("a")).unwrap().children.clear();
        graph.attachments.entry(nid("gone")).or_default().insert(pid("p1"));

        let report = audit(&graph, &config());
        assert!(report.has(IssueCode::DanglingEdge));
        assert!(report.has(IssueCode::AsymmetricEdge));
        assert!(report.has(IssueCode::OrphanAttachment));
    }

    #[test]
    fn test_repair_fixes_levels_not_cycles() {
        let mut graph = dag(&["a", "b", "x", "y"], &[("b", "a"), ("x", "y"), ("y", "x")]);
        let report = repair(&mut graph, &config());
        assert_eq!(report.dag_changed, 1);
        assert!(!report.converged);
        assert_eq!(report.unresolved, vec![nid("x"), nid("y")]);
        assert!(report.summary.contains("2 dag nodes unresolved"));
        assert!(audit(&graph, &config()).has(IssueCode::DagCycle));
    }

    #[test]
    fn test_repair_tree_levels() {
        let config = config();
        let mut graph = Graph::empty();
        let root = tree::create_node(&mut graph, &config, "Clothing", "ladies", None, false).unwrap();
        let tops = tree::create_node(&mut graph, &config, "Tops", "ladies", Some(&root.id), false).unwrap();
        graph.nodes.get_mut(&tops.id).unwrap().level = 4;

        let report = repair(&mut graph, &config);
        assert_eq!(report.tree_changed, 1);
        assert!(report.converged);
        assert!(audit(&graph, &config).is_clean());
    }

    #[test]
    fn test_cleanup_dangling() {
        let mut graph = levelled_dag(&["a", "b", "c"], &[("b", "a"), ("c", "a")]);
        graph.nodes.get_mut(&nid("b")).unwrap().parents.push(nid("ghost"));
        graph.nodes.get_mut(&nid("a")).unwrap().children.retain(|c| c.0 != "c");
        graph.nodes.get_mut(&nid("c")).unwrap().children.push(nid("b"));
        graph.attachments.entry(nid("gone")).or_default().insert(pid("p1"));
        graph.attachments.entry(nid("a")).or_default().insert(pid("p2"));

        let report = cleanup_dangling(&mut graph);
        assert_eq!(
            report,
            CleanupReport {
                edges_removed: 2,
                edges_restored: 1,
                attachments_removed: 1,
            }
        );
        assert!(audit(&graph, &config()).is_clean());
    }
}
