use crate::config::TaxonomyConfig;
use crate::model::{HierarchyKind, ProductId};
use crate::napi_convert::*;
use crate::napi_dto::*;
use crate::search::SearchScope;
use crate::store;
use std::path::Path;
use tracing::{debug, info};

fn load_config(config_path: Option<String>) -> napi::Result<TaxonomyConfig> {
    match config_path {
        Some(p) => TaxonomyConfig::load(Path::new(&p)).map_err(napi::Error::from),
        None => Ok(TaxonomyConfig::default()),
    }
}

fn parse_kind_opt(kind: Option<String>) -> napi::Result<Option<HierarchyKind>> {
    kind.as_deref().map(parse_kind).transpose()
}

// ---- JsTaxonomyStore ----

#[napi]
pub struct JsTaxonomyStore {
    inner: store::GraphStore,
}

#[napi]
impl JsTaxonomyStore {
    #[napi(factory)]
    pub fn open(file_path: String, config_path: Option<String>) -> napi::Result<Self> {
        crate::init_tracing();
        let config = load_config(config_path)?;
        let inner = store::GraphStore::open(Path::new(&file_path), config).map_err(napi::Error::from)?;
        info!(path = %file_path, "TaxonomyStore opened");
        Ok(JsTaxonomyStore { inner })
    }

    #[napi(factory)]
    pub fn in_memory(config_path: Option<String>) -> napi::Result<Self> {
        crate::init_tracing();
        let config = load_config(config_path)?;
        Ok(JsTaxonomyStore {
            inner: store::GraphStore::in_memory(config),
        })
    }

    // ---- Nodes ----

    #[napi]
    pub fn get_node(&self, node_id: String) -> napi::Result<JsNode> {
        let node = self.inner.get_node(&node_id).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn create_category(&mut self, input: JsCreateCategoryInput) -> napi::Result<JsNode> {
        debug!(namespace = %input.namespace, "create_category");
        let node = self
            .inner
            .create_tree_node(
                &input.name,
                &input.namespace,
                input.parent_id.as_deref(),
                input.featured.unwrap_or(false),
            )
            .map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn create_filter(&mut self, input: JsCreateFilterInput) -> napi::Result<JsNode> {
        debug!("create_filter");
        let parents = input.parent_ids.unwrap_or_default();
        let node = self
            .inner
            .create_dag_node(&input.name, &parents, input.featured.unwrap_or(false))
            .map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn rename(&mut self, node_id: String, name: String) -> napi::Result<JsNode> {
        let node = self.inner.rename(&node_id, &name).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn set_active(&mut self, node_id: String, active: bool) -> napi::Result<JsNode> {
        let node = self.inner.set_active(&node_id, active).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn set_featured(&mut self, node_id: String, featured: bool) -> napi::Result<JsNode> {
        let node = self.inner.set_featured(&node_id, featured).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn delete_node(&mut self, node_id: String) -> napi::Result<JsNode> {
        let node = self.inner.delete_node(&node_id).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    // ---- Structure ----

    #[napi]
    pub fn move_category(&mut self, node_id: String, new_parent_id: Option<String>) -> napi::Result<JsNode> {
        let node = self
            .inner
            .move_node(&node_id, new_parent_id.as_deref())
            .map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn update_parents(&mut self, node_id: String, parent_ids: Vec<String>) -> napi::Result<JsNode> {
        let node = self
            .inner
            .update_parents(&node_id, &parent_ids)
            .map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn add_parent(&mut self, node_id: String, parent_id: String) -> napi::Result<JsNode> {
        let node = self.inner.add_parent(&node_id, &parent_id).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    #[napi]
    pub fn remove_parent(&mut self, node_id: String, parent_id: String) -> napi::Result<JsNode> {
        let node = self.inner.remove_parent(&node_id, &parent_id).map_err(napi::Error::from)?;
        Ok(JsNode::from(&node))
    }

    /// Returns how many levels changed.
    #[napi]
    pub fn update_parents_batch(&mut self, updates: Vec<JsParentUpdate>) -> napi::Result<u32> {
        let changes: Vec<(String, Vec<String>)> = updates
            .into_iter()
            .map(|u| (u.node_id, u.parent_ids))
            .collect();
        let changed = self.inner.update_parents_batch(&changes).map_err(napi::Error::from)?;
        Ok(count(changed))
    }

    #[napi]
    pub fn would_create_cycle(&self, node_id: String, candidate_parent_id: String) -> napi::Result<bool> {
        self.inner
            .would_create_cycle(&node_id, &candidate_parent_id)
            .map_err(napi::Error::from)
    }

    // ---- Queries ----

    #[napi]
    pub fn ancestors(&self, node_id: String) -> napi::Result<Vec<JsNode>> {
        let nodes = self.inner.ancestors(&node_id).map_err(napi::Error::from)?;
        Ok(convert_vec(&nodes))
    }

    #[napi]
    pub fn descendants(&self, node_id: String) -> napi::Result<Vec<JsNode>> {
        let nodes = self.inner.descendants(&node_id).map_err(napi::Error::from)?;
        Ok(convert_vec(&nodes))
    }

    #[napi]
    pub fn breadcrumbs(&self, node_ids: Vec<String>) -> napi::Result<Vec<JsBreadcrumbs>> {
        let all = self.inner.breadcrumbs_many(&node_ids).map_err(napi::Error::from)?;
        Ok(all.iter().map(|(id, paths)| breadcrumbs_to_js(id, paths)).collect())
    }

    #[napi]
    pub fn roots(&self, kind: String, namespace: Option<String>, active_only: Option<bool>) -> napi::Result<Vec<JsNode>> {
        let kind = parse_kind(&kind)?;
        let nodes = self
            .inner
            .roots(kind, namespace.as_deref(), active_only.unwrap_or(false));
        Ok(convert_vec(&nodes))
    }

    #[napi]
    pub fn children(&self, node_id: String, active_only: Option<bool>) -> napi::Result<Vec<JsNode>> {
        let nodes = self
            .inner
            .children(&node_id, active_only.unwrap_or(false))
            .map_err(napi::Error::from)?;
        Ok(convert_vec(&nodes))
    }

    #[napi]
    pub fn leaves(&self, kind: String, namespace: Option<String>) -> napi::Result<Vec<JsNode>> {
        let kind = parse_kind(&kind)?;
        Ok(convert_vec(&self.inner.leaves(kind, namespace.as_deref())))
    }

    #[napi]
    pub fn hierarchy(
        &self,
        kind: String,
        namespace: Option<String>,
        active_only: Option<bool>,
    ) -> napi::Result<Vec<JsHierarchyEntry>> {
        let kind = parse_kind(&kind)?;
        let entries = self
            .inner
            .hierarchy(kind, namespace.as_deref(), active_only.unwrap_or(false));
        Ok(convert_vec(&entries))
    }

    #[napi]
    pub fn duplicate_names(&self) -> Vec<JsDuplicateGroup> {
        convert_vec(&self.inner.duplicate_names())
    }

    #[napi]
    pub fn stats(&self) -> JsStats {
        JsStats::from(&self.inner.stats())
    }

    #[napi]
    pub fn search(
        &self,
        query: String,
        kind: Option<String>,
        namespace: Option<String>,
        max_results: Option<u32>,
    ) -> napi::Result<Vec<JsSearchResult>> {
        debug!(query = %query, "search");
        let scope = SearchScope {
            kind: parse_kind_opt(kind)?,
            namespace: namespace.as_deref(),
            active_only: false,
        };
        let results = self
            .inner
            .search(&query, scope, max_results.map_or(20, |n| n as usize));
        Ok(convert_vec(&results))
    }

    // ---- Products ----

    #[napi]
    pub fn validate_attachment(&self, node_id: String) -> napi::Result<JsLeafValidation> {
        let v = self.inner.validate_attachment(&node_id).map_err(napi::Error::from)?;
        Ok(JsLeafValidation::from(&v))
    }

    /// Returns false when the product was already attached.
    #[napi]
    pub fn attach_product(&mut self, product_id: String, node_id: String) -> napi::Result<bool> {
        self.inner
            .attach_product(&product_id, &node_id)
            .map_err(napi::Error::from)
    }

    #[napi]
    pub fn detach_product(&mut self, product_id: String, node_id: String) -> napi::Result<bool> {
        self.inner
            .detach_product(&product_id, &node_id)
            .map_err(napi::Error::from)
    }

    #[napi]
    pub fn products_of(&self, node_id: String, expand: Option<bool>) -> napi::Result<Vec<String>> {
        let products: Vec<ProductId> = if expand.unwrap_or(false) {
            self.inner.expanded_products(&node_id).map_err(napi::Error::from)?.into_iter().collect()
        } else {
            self.inner.products_of(&node_id).map_err(napi::Error::from)?
        };
        Ok(products.into_iter().map(|p| p.0).collect())
    }

    #[napi]
    pub fn products_under(&self, node_ids: Vec<String>) -> napi::Result<Vec<String>> {
        let products = self.inner.products_under(&node_ids).map_err(napi::Error::from)?;
        Ok(products.into_iter().map(|p| p.0).collect())
    }

    #[napi]
    pub fn nodes_for_product(&self, product_id: String, kind: Option<String>) -> napi::Result<Vec<JsNode>> {
        let kind = parse_kind_opt(kind)?;
        Ok(convert_vec(&self.inner.nodes_for_product(&product_id, kind)))
    }

    #[napi]
    pub fn recompute_product_counts(&mut self) -> napi::Result<u32> {
        let changed = self.inner.recompute_product_counts().map_err(napi::Error::from)?;
        Ok(count(changed))
    }

    // ---- Maintenance ----

    #[napi]
    pub fn audit(&self) -> JsAuditReport {
        JsAuditReport::from(&self.inner.audit())
    }

    #[napi]
    pub fn recompute_levels(&mut self) -> napi::Result<JsLevelRepair> {
        let report = self.inner.recompute_levels().map_err(napi::Error::from)?;
        Ok(JsLevelRepair::from(&report))
    }

    #[napi]
    pub fn repair(&mut self) -> napi::Result<JsRepairReport> {
        info!("repair");
        let report = self.inner.repair().map_err(napi::Error::from)?;
        Ok(JsRepairReport::from(&report))
    }

    #[napi]
    pub fn cleanup_dangling(&mut self) -> napi::Result<JsCleanupReport> {
        info!("cleanup_dangling");
        let report = self.inner.cleanup_dangling().map_err(napi::Error::from)?;
        Ok(JsCleanupReport::from(&report))
    }

    #[napi]
    pub fn snapshot(&self) -> napi::Result<String> {
        let id = self.inner.snapshot().map_err(napi::Error::from)?;
        Ok(id.0)
    }

    #[napi]
    pub fn list_snapshots(&self) -> napi::Result<Vec<JsSnapshotInfo>> {
        let list = self.inner.list_snapshots().map_err(napi::Error::from)?;
        Ok(convert_vec(&list))
    }

    #[napi]
    pub fn restore_snapshot(&mut self, snapshot_id: String) -> napi::Result<()> {
        info!(snapshot = %snapshot_id, "restore_snapshot");
        self.inner.restore_snapshot(&snapshot_id).map_err(napi::Error::from)
    }
}
