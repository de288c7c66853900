use crate::audit;
use crate::dag::LevelRepair;
use crate::model::{self, HierarchyKind};
use crate::napi_dto::*;
use crate::query;
use crate::search;
use crate::snapshot::SnapshotInfo;
use crate::tree::LeafValidation;

/// JS numbers cross the boundary as u32; saturate rather than wrap.
pub fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn ids(ids: &[model::NodeId]) -> Vec<String> {
    ids.iter().map(|id| id.0.clone()).collect()
}

pub fn parse_kind(kind: &str) -> napi::Result<HierarchyKind> {
    HierarchyKind::from_str(kind)
        .ok_or_else(|| napi::Error::from_reason(format!("Unknown hierarchy kind: {kind} (expected 'tree' or 'dag')")))
}

pub fn convert_vec<'a, T, U>(items: &'a [T]) -> Vec<U>
where
    U: From<&'a T>,
{
    items.iter().map(U::from).collect()
}

// ---- From impls: domain -> JS ----

impl From<&model::Node> for JsNode {
    fn from(node: &model::Node) -> Self {
        JsNode {
            id: node.id.0.clone(),
            name: node.name.clone(),
            kind: node.kind.as_str().to_string(),
            namespace: node.namespace.clone(),
            level: node.level,
            parent_ids: ids(&node.parents),
            child_ids: ids(&node.children),
            is_active: node.is_active,
            is_featured: node.is_featured,
            product_count: node.product_count,
            created_at: node.created_at.to_rfc3339(),
            updated_at: node.updated_at.to_rfc3339(),
        }
    }
}

impl From<&query::Crumb> for JsCrumb {
    fn from(c: &query::Crumb) -> Self {
        JsCrumb {
            id: c.id.0.clone(),
            name: c.name.clone(),
        }
    }
}

pub fn breadcrumbs_to_js(node_id: &model::NodeId, paths: &[Vec<query::Crumb>]) -> JsBreadcrumbs {
    JsBreadcrumbs {
        node_id: node_id.0.clone(),
        paths: paths.iter().map(|p| convert_vec(p)).collect(),
    }
}

impl From<&query::HierarchyEntry> for JsHierarchyEntry {
    fn from(e: &query::HierarchyEntry) -> Self {
        JsHierarchyEntry {
            node: JsNode::from(&e.node),
            children: convert_vec(&e.children),
            repeated: e.repeated,
        }
    }
}

impl From<&query::DuplicateGroup> for JsDuplicateGroup {
    fn from(g: &query::DuplicateGroup) -> Self {
        JsDuplicateGroup {
            kind: g.kind.as_str().to_string(),
            name: g.name.clone(),
            node_ids: ids(&g.node_ids),
        }
    }
}

impl From<&query::TaxonomyStats> for JsStats {
    fn from(s: &query::TaxonomyStats) -> Self {
        JsStats {
            total: count(s.total),
            tree_nodes: count(s.tree_nodes),
            dag_nodes: count(s.dag_nodes),
            by_namespace: s.by_namespace.iter().map(|(k, v)| (k.clone(), count(*v))).collect(),
            featured: count(s.featured),
            not_featured: count(s.not_featured),
            active: count(s.active),
            inactive: count(s.inactive),
            with_products: count(s.with_products),
            without_products: count(s.without_products),
            attachments: count(s.attachments),
        }
    }
}

impl From<&search::SearchResult> for JsSearchResult {
    fn from(r: &search::SearchResult) -> Self {
        JsSearchResult {
            node_id: r.node_id.0.clone(),
            name: r.name.clone(),
            kind: r.kind.as_str().to_string(),
            namespace: r.namespace.clone(),
            level: r.level,
            score: r.score,
        }
    }
}

impl From<&LeafValidation> for JsLeafValidation {
    fn from(v: &LeafValidation) -> Self {
        JsLeafValidation {
            node_id: v.node_id.0.clone(),
            node_name: v.node_name.clone(),
            child_count: count(v.child_count),
            eligible: v.eligible,
            message: v.message.clone(),
        }
    }
}

impl From<&audit::AuditIssue> for JsAuditIssue {
    fn from(i: &audit::AuditIssue) -> Self {
        JsAuditIssue {
            node_id: i.node_id.0.clone(),
            node_name: i.node_name.clone(),
            severity: i.severity.as_str().to_string(),
            code: i.code.as_str().to_string(),
            message: i.message.clone(),
        }
    }
}

impl From<&audit::AuditReport> for JsAuditReport {
    fn from(r: &audit::AuditReport) -> Self {
        JsAuditReport {
            issues: convert_vec(&r.issues),
            nodes_checked: count(r.summary.nodes_checked),
            errors: count(r.summary.errors),
            warnings: count(r.summary.warnings),
        }
    }
}

impl From<&LevelRepair> for JsLevelRepair {
    fn from(r: &LevelRepair) -> Self {
        JsLevelRepair {
            passes: count(r.passes),
            nodes_changed: count(r.nodes_changed),
            converged: r.converged,
            unresolved: ids(&r.unresolved),
        }
    }
}

impl From<&audit::RepairReport> for JsRepairReport {
    fn from(r: &audit::RepairReport) -> Self {
        JsRepairReport {
            passes: count(r.passes),
            nodes_changed: count(r.nodes_changed),
            tree_changed: count(r.tree_changed),
            dag_changed: count(r.dag_changed),
            converged: r.converged,
            unresolved: ids(&r.unresolved),
            summary: r.summary.clone(),
        }
    }
}

impl From<&audit::CleanupReport> for JsCleanupReport {
    fn from(r: &audit::CleanupReport) -> Self {
        JsCleanupReport {
            edges_removed: count(r.edges_removed),
            edges_restored: count(r.edges_restored),
            attachments_removed: count(r.attachments_removed),
        }
    }
}

impl From<&SnapshotInfo> for JsSnapshotInfo {
    fn from(s: &SnapshotInfo) -> Self {
        JsSnapshotInfo {
            id: s.id.0.clone(),
            size_bytes: s.size_bytes as f64,
            created_at: s.created_at.to_rfc3339(),
        }
    }
}
