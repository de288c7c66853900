use std::collections::HashMap;

// ---- Node DTO structs ----

#[napi(object)]
pub struct JsNode {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub level: u32,
    pub parent_ids: Vec<String>,
    pub child_ids: Vec<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub product_count: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[napi(object)]
pub struct JsCreateCategoryInput {
    pub name: String,
    pub namespace: String,
    pub parent_id: Option<String>,
    pub featured: Option<bool>,
}

#[napi(object)]
pub struct JsCreateFilterInput {
    pub name: String,
    pub parent_ids: Option<Vec<String>>,
    pub featured: Option<bool>,
}

#[napi(object)]
pub struct JsParentUpdate {
    pub node_id: String,
    pub parent_ids: Vec<String>,
}

// ---- Query DTO structs ----

#[napi(object)]
pub struct JsCrumb {
    pub id: String,
    pub name: String,
}

#[napi(object)]
pub struct JsBreadcrumbs {
    pub node_id: String,
    pub paths: Vec<Vec<JsCrumb>>,
}

#[napi(object)]
pub struct JsHierarchyEntry {
    pub node: JsNode,
    pub children: Vec<JsHierarchyEntry>,
    pub repeated: bool,
}

#[napi(object)]
pub struct JsDuplicateGroup {
    pub kind: String,
    pub name: String,
    pub node_ids: Vec<String>,
}

#[napi(object)]
pub struct JsStats {
    pub total: u32,
    pub tree_nodes: u32,
    pub dag_nodes: u32,
    pub by_namespace: HashMap<String, u32>,
    pub featured: u32,
    pub not_featured: u32,
    pub active: u32,
    pub inactive: u32,
    pub with_products: u32,
    pub without_products: u32,
    pub attachments: u32,
}

#[napi(object)]
pub struct JsSearchResult {
    pub node_id: String,
    pub name: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub level: u32,
    pub score: f64,
}

#[napi(object)]
pub struct JsLeafValidation {
    pub node_id: String,
    pub node_name: String,
    pub child_count: u32,
    pub eligible: bool,
    pub message: Option<String>,
}

// ---- Maintenance DTO structs ----

#[napi(object)]
pub struct JsAuditIssue {
    pub node_id: String,
    pub node_name: String,
    pub severity: String,
    pub code: String,
    pub message: String,
}

#[napi(object)]
pub struct JsAuditReport {
    pub issues: Vec<JsAuditIssue>,
    pub nodes_checked: u32,
    pub errors: u32,
    pub warnings: u32,
}

#[napi(object)]
pub struct JsLevelRepair {
    pub passes: u32,
    pub nodes_changed: u32,
    pub converged: bool,
    pub unresolved: Vec<String>,
}

#[napi(object)]
pub struct JsRepairReport {
    pub passes: u32,
    pub nodes_changed: u32,
    pub tree_changed: u32,
    pub dag_changed: u32,
    pub converged: bool,
    pub unresolved: Vec<String>,
    pub summary: String,
}

#[napi(object)]
pub struct JsCleanupReport {
    pub edges_removed: u32,
    pub edges_restored: u32,
    pub attachments_removed: u32,
}

#[napi(object)]
pub struct JsSnapshotInfo {
    pub id: String,
    pub size_bytes: f64,
    pub created_at: String,
}
