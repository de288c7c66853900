use crate::audit::{self, AuditReport, CleanupReport, RepairReport};
use crate::binding;
use crate::config::TaxonomyConfig;
use crate::dag::{self, LevelRepair};
use crate::error::TaxonomyError;
use crate::model::{Graph, HierarchyKind, Node, NodeId, ProductId};
use crate::nodes;
use crate::query::{self, Crumb, DuplicateGroup, HierarchyEntry, TaxonomyStats};
use crate::search::{self, SearchResult, SearchScope};
use crate::snapshot::{SnapshotId, SnapshotInfo, SnapshotStore};
use crate::storage;
use crate::tree::{self, LeafValidation};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

fn nid(id: &str) -> NodeId {
    NodeId(id.to_string())
}

fn nids(ids: &[impl AsRef<str>]) -> Vec<NodeId> {
    ids.iter().map(|id| nid(id.as_ref())).collect()
}

/// Owner of the live graph. Readers get an immutable `Arc<Graph>`; every
/// write runs in [`GraphStore::transaction`] against a private copy that is
/// persisted and then published, or dropped on error.
pub struct GraphStore {
    graph: Arc<Graph>,
    path: Option<PathBuf>,
    config: TaxonomyConfig,
    snapshots: Option<SnapshotStore>,
}

impl GraphStore {
    /// Open the JSON document at `path`, creating an empty one when absent.
    /// A relative `maintenance.snapshot_dir` resolves against the document's
    /// directory.
    pub fn open(path: &Path, config: TaxonomyConfig) -> Result<Self, TaxonomyError> {
        let graph = if path.exists() {
            storage::load_graph(path)?
        } else {
            let graph = storage::create_default_graph();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            storage::save_graph(path, &graph)?;
            graph
        };

        let snapshots = config.maintenance.snapshot_dir.as_ref().map(|dir| {
            let dir = match path.parent() {
                Some(parent) if dir.is_relative() => parent.join(dir),
                _ => dir.clone(),
            };
            SnapshotStore::new(&dir)
        });

        info!(
            path = %path.display(),
            nodes = graph.nodes.len(),
            snapshots = snapshots.is_some(),
            "store opened"
        );
        Ok(GraphStore {
            graph: Arc::new(graph),
            path: Some(path.to_path_buf()),
            config,
            snapshots,
        })
    }

    /// A store that never touches disk, apart from an explicitly configured
    /// snapshot directory.
    pub fn in_memory(config: TaxonomyConfig) -> Self {
        let snapshots = config.maintenance.snapshot_dir.as_deref().map(SnapshotStore::new);
        GraphStore {
            graph: Arc::new(storage::create_default_graph()),
            path: None,
            config,
            snapshots,
        }
    }

    pub fn config(&self) -> &TaxonomyConfig {
        &self.config
    }

    /// Point-in-time view; later writes publish a new graph and leave this one
    /// untouched.
    pub fn read(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }

    /// Run `f` on a draft copy. On `Ok` the draft is saved and becomes the
    /// live graph; on `Err`, or if saving fails, nothing changes.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&mut Graph, &TaxonomyConfig) -> Result<T, TaxonomyError>,
    ) -> Result<T, TaxonomyError> {
        let mut draft = Graph::clone(&self.graph);
        let out = match f(&mut draft, &self.config) {
            Ok(out) => out,
            Err(e) => {
                debug!(error = %e, "transaction rolled back");
                return Err(e);
            }
        };
        if let Some(path) = &self.path {
            storage::save_graph(path, &draft)?;
        }
        self.graph = Arc::new(draft);
        Ok(out)
    }

    pub fn get_node(&self, id: &str) -> Result<Node, TaxonomyError> {
        Ok(self.graph.node(&nid(id))?.clone())
    }

    fn nodes_for(&self, ids: Vec<NodeId>) -> Vec<Node> {
        ids.iter().filter_map(|id| self.graph.nodes.get(id)).cloned().collect()
    }

    // ---- Node repository ----

    pub fn create_tree_node(
        &mut self,
        name: &str,
        namespace: &str,
        parent_id: Option<&str>,
        featured: bool,
    ) -> Result<Node, TaxonomyError> {
        let parent = parent_id.map(nid);
        let node = self.transaction(|g, c| tree::create_node(g, c, name, namespace, parent.as_ref(), featured))?;
        info!(node_id = %node.id, namespace = %namespace, level = node.level, "category created");
        Ok(node)
    }

    pub fn create_dag_node(
        &mut self,
        name: &str,
        parent_ids: &[impl AsRef<str>],
        featured: bool,
    ) -> Result<Node, TaxonomyError> {
        let parents = nids(parent_ids);
        let node = self.transaction(|g, c| dag::create_node(g, c, name, &parents, featured))?;
        info!(node_id = %node.id, parents = parents.len(), level = node.level, "filter created");
        Ok(node)
    }

    pub fn rename(&mut self, id: &str, name: &str) -> Result<Node, TaxonomyError> {
        let id = nid(id);
        let node = self.transaction(|g, c| nodes::rename(g, c, &id, name))?;
        info!(node_id = %id, name = %node.name, "node renamed");
        Ok(node)
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> Result<Node, TaxonomyError> {
        let id = nid(id);
        let node = self.transaction(|g, _| nodes::set_active(g, &id, active))?;
        info!(node_id = %id, active, "node active flag set");
        Ok(node)
    }

    pub fn set_featured(&mut self, id: &str, featured: bool) -> Result<Node, TaxonomyError> {
        let id = nid(id);
        let node = self.transaction(|g, _| nodes::set_featured(g, &id, featured))?;
        info!(node_id = %id, featured, "node featured flag set");
        Ok(node)
    }

    pub fn delete_node(&mut self, id: &str) -> Result<Node, TaxonomyError> {
        let id = nid(id);
        let node = self.transaction(|g, c| nodes::delete(g, c, &id))?;
        info!(node_id = %id, kind = %node.kind, "node deleted");
        Ok(node)
    }

    // ---- Structure ----

    pub fn move_node(&mut self, id: &str, new_parent_id: Option<&str>) -> Result<Node, TaxonomyError> {
        let id = nid(id);
        let parent = new_parent_id.map(nid);
        let node = self.transaction(|g, c| tree::move_node(g, c, &id, parent.as_ref()))?;
        info!(node_id = %id, level = node.level, "category moved");
        Ok(node)
    }

    pub fn update_parents(&mut self, id: &str, parent_ids: &[impl AsRef<str>]) -> Result<Node, TaxonomyError> {
        let id = nid(id);
        let parents = nids(parent_ids);
        let node = self.transaction(|g, c| dag::update_parents(g, c, &id, &parents))?;
        info!(node_id = %id, parents = node.parents.len(), level = node.level, "filter parents updated");
        Ok(node)
    }

    pub fn add_parent(&mut self, id: &str, parent_id: &str) -> Result<Node, TaxonomyError> {
        let (id, parent) = (nid(id), nid(parent_id));
        let node = self.transaction(|g, c| dag::add_parent(g, c, &id, &parent))?;
        info!(node_id = %id, parent_id = %parent, "filter parent added");
        Ok(node)
    }

    pub fn remove_parent(&mut self, id: &str, parent_id: &str) -> Result<Node, TaxonomyError> {
        let (id, parent) = (nid(id), nid(parent_id));
        let node = self.transaction(|g, c| dag::remove_parent(g, c, &id, &parent))?;
        info!(node_id = %id, parent_id = %parent, "filter parent removed");
        Ok(node)
    }

    /// All-or-nothing: one failing entry leaves every node as it was.
    pub fn update_parents_batch(&mut self, changes: &[(String, Vec<String>)]) -> Result<usize, TaxonomyError> {
        let changes: Vec<(NodeId, Vec<NodeId>)> = changes
            .iter()
            .map(|(id, parents)| (nid(id), nids(parents)))
            .collect();
        let relevelled = self.transaction(|g, c| dag::update_parents_batch(g, c, &changes))?;
        info!(changes = changes.len(), relevelled, "filter parents updated in batch");
        Ok(relevelled)
    }

    pub fn would_create_cycle(&self, id: &str, candidate_parent_id: &str) -> Result<bool, TaxonomyError> {
        let (id, candidate) = (nid(id), nid(candidate_parent_id));
        self.graph.node(&id)?;
        self.graph.node(&candidate)?;
        dag::would_create_cycle(&*self.graph, &id, &candidate, self.config.dag.max_traversal_depth)
    }

    // ---- Closure queries ----

    pub fn ancestors(&self, id: &str) -> Result<Vec<Node>, TaxonomyError> {
        let ids = dag::ancestors_of(&self.graph, &nid(id))?;
        Ok(self.nodes_for(ids))
    }

    pub fn descendants(&self, id: &str) -> Result<Vec<Node>, TaxonomyError> {
        let ids = dag::descendants_of(&self.graph, &nid(id))?;
        Ok(self.nodes_for(ids))
    }

    pub fn breadcrumbs(&self, id: &str) -> Result<Vec<Vec<Crumb>>, TaxonomyError> {
        query::breadcrumbs(&self.graph, &self.config, &nid(id))
    }

    pub fn breadcrumbs_many(&self, ids: &[impl AsRef<str>]) -> Result<Vec<(NodeId, Vec<Vec<Crumb>>)>, TaxonomyError> {
        query::breadcrumbs_many(&self.graph, &self.config, &nids(ids))
    }

    // ---- Listings ----

    pub fn roots(&self, kind: HierarchyKind, namespace: Option<&str>, active_only: bool) -> Vec<Node> {
        query::roots(&self.graph, kind, namespace, active_only)
    }

    pub fn children(&self, id: &str, active_only: bool) -> Result<Vec<Node>, TaxonomyError> {
        query::children(&self.graph, &nid(id), active_only)
    }

    pub fn leaves(&self, kind: HierarchyKind, namespace: Option<&str>) -> Vec<Node> {
        query::leaves(&self.graph, kind, namespace)
    }

    pub fn hierarchy(&self, kind: HierarchyKind, namespace: Option<&str>, active_only: bool) -> Vec<HierarchyEntry> {
        query::hierarchy(&self.graph, &self.config, kind, namespace, active_only)
    }

    pub fn duplicate_names(&self) -> Vec<DuplicateGroup> {
        query::duplicate_names(&self.graph)
    }

    pub fn stats(&self) -> TaxonomyStats {
        query::stats(&self.graph)
    }

    pub fn search(&self, query: &str, scope: SearchScope<'_>, max_results: usize) -> Vec<SearchResult> {
        search::search_nodes(&self.graph, query, scope, max_results)
    }

    // ---- Products ----

    pub fn validate_attachment(&self, id: &str) -> Result<LeafValidation, TaxonomyError> {
        binding::validate_attachment(&self.graph, &nid(id))
    }

    pub fn attach_product(&mut self, product_id: &str, id: &str) -> Result<bool, TaxonomyError> {
        let (id, product) = (nid(id), ProductId(product_id.to_string()));
        let created = self.transaction(|g, _| binding::attach(g, &product, &id))?;
        info!(node_id = %id, product_id = %product, created, "product attached");
        Ok(created)
    }

    pub fn detach_product(&mut self, product_id: &str, id: &str) -> Result<bool, TaxonomyError> {
        let (id, product) = (nid(id), ProductId(product_id.to_string()));
        let removed = self.transaction(|g, _| binding::detach(g, &product, &id))?;
        info!(node_id = %id, product_id = %product, removed, "product detached");
        Ok(removed)
    }

    pub fn products_of(&self, id: &str) -> Result<Vec<ProductId>, TaxonomyError> {
        binding::products_of(&self.graph, &nid(id))
    }

    pub fn nodes_for_product(&self, product_id: &str, kind: Option<HierarchyKind>) -> Vec<Node> {
        let ids = binding::nodes_for_product(&self.graph, &ProductId(product_id.to_string()), kind);
        self.nodes_for(ids)
    }

    pub fn expanded_products(&self, id: &str) -> Result<BTreeSet<ProductId>, TaxonomyError> {
        binding::expanded_products(&self.graph, &nid(id))
    }

    /// Filter lookup: products under any of `ids`, each expanded downward.
    pub fn products_under(&self, ids: &[impl AsRef<str>]) -> Result<BTreeSet<ProductId>, TaxonomyError> {
        dag::products_under(&self.graph, &nids(ids))
    }

    pub fn recompute_product_counts(&mut self) -> Result<usize, TaxonomyError> {
        let changed = self.transaction(|g, _| Ok(binding::recompute_product_counts(g)))?;
        info!(changed, "product counts recomputed");
        Ok(changed)
    }

    // ---- Diagnostics ----

    pub fn audit(&self) -> AuditReport {
        audit::audit(&self.graph, &self.config)
    }

    /// DAG levels only; see [`GraphStore::repair`] for both hierarchies.
    pub fn recompute_levels(&mut self) -> Result<LevelRepair, TaxonomyError> {
        self.transaction(|g, c| Ok(dag::recompute_levels(g, c.dag.max_level_passes)))
    }

    pub fn repair(&mut self) -> Result<RepairReport, TaxonomyError> {
        if self.config.maintenance.snapshot_before_repair && self.snapshots.is_some() {
            let id = self.snapshot()?;
            info!(snapshot = %id, "pre-repair snapshot taken");
        }
        let report = self.transaction(|g, c| Ok(audit::repair(g, c)))?;
        info!(summary = %report.summary, "repair committed");
        Ok(report)
    }

    pub fn cleanup_dangling(&mut self) -> Result<CleanupReport, TaxonomyError> {
        self.transaction(|g, _| Ok(audit::cleanup_dangling(g)))
    }

    // ---- Snapshots ----

    fn require_snapshots(&self) -> Result<&SnapshotStore, TaxonomyError> {
        self.snapshots.as_ref().ok_or(TaxonomyError::SnapshotsDisabled)
    }

    pub fn snapshot(&self) -> Result<SnapshotId, TaxonomyError> {
        self.require_snapshots()?.write(&self.graph)
    }

    pub fn list_snapshots(&self) -> Result<Vec<SnapshotInfo>, TaxonomyError> {
        self.require_snapshots()?.list()
    }

    /// Replace the live graph with a stored snapshot in one transaction.
    pub fn restore_snapshot(&mut self, id: &str) -> Result<(), TaxonomyError> {
        let id = SnapshotId(id.to_string());
        let restored = self.require_snapshots()?.read(&id)?;
        let nodes = restored.nodes.len();
        self.transaction(move |g, _| {
            *g = restored;
            Ok(())
        })?;
        info!(snapshot = %id, nodes, "snapshot restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StructuralViolation;
    use tempfile::TempDir;

    fn temp_store(dir: &TempDir) -> GraphStore {
        GraphStore::open(&dir.path().join("taxonomy.json"), TaxonomyConfig::default()).unwrap()
    }

    fn snapshot_config() -> TaxonomyConfig {
        let mut config = TaxonomyConfig::default();
        config.maintenance.snapshot_dir = Some(PathBuf::from("snapshots"));
        config.maintenance.snapshot_before_repair = true;
        config
    }

    #[test]
    fn test_open_creates_empty_document() {
        let dir = TempDir::new().unwrap();
        let store = temp_store(&dir);
        assert!(store.read().nodes.is_empty());
        assert!(dir.path().join("taxonomy.json").exists());
    }

    #[test]
    fn test_clothing_scenario() {
        let mut store = GraphStore::in_memory(TaxonomyConfig::default());
        let clothing = store.create_tree_node("Clothing", "ladies", None, false).unwrap();
        let tops = store.create_tree_node("Tops", "ladies", Some(&clothing.id.0), false).unwrap();
        let tees = store.create_tree_node("T-Shirts", "ladies", Some(&tops.id.0), false).unwrap();
        assert_eq!(tees.level, 2);

        let check = store.validate_attachment(&tops.id.0).unwrap();
        assert!(!check.eligible);
        assert_eq!(
            check.message.as_deref(),
            Some("category 'Tops' has 1 child category; attach to a leaf instead")
        );
        assert!(store.attach_product("P1", &tops.id.0).is_err());
        assert!(store.products_of(&tops.id.0).unwrap().is_empty());

        assert!(store.attach_product("P1", &tees.id.0).unwrap());
        assert!(!store.attach_product("P1", &tees.id.0).unwrap());
        assert_eq!(store.expanded_products(&clothing.id.0).unwrap().len(), 1);
    }

    #[test]
    fn test_winter_sale_scenario() {
        let mut store = GraphStore::in_memory(TaxonomyConfig::default());
        let winter = store.create_dag_node("Winter", &[] as &[&str], false).unwrap();
        let sale = store.create_dag_node("Sale", &[] as &[&str], false).unwrap();
        let both = store.create_dag_node("WinterSale", &[&winter.id.0, &sale.id.0], false).unwrap();
        assert_eq!(both.level, 1);

        assert!(store.would_create_cycle(&winter.id.0, &both.id.0).unwrap());
        let err = store.update_parents(&winter.id.0, &[&both.id.0]).unwrap_err();
        assert!(matches!(
            err,
            TaxonomyError::Structural(StructuralViolation::CycleWouldForm { .. })
        ));
        assert!(store.get_node(&winter.id.0).unwrap().parents.is_empty());
        assert_eq!(store.breadcrumbs(&both.id.0).unwrap().len(), 2);
        assert_eq!(store.ancestors(&both.id.0).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_transaction_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let mut store = temp_store(&dir);
        let a = store.create_dag_node("A", &[] as &[&str], false).unwrap();
        let b = store.create_dag_node("B", &[&a.id.0], false).unwrap();
        let c = store.create_dag_node("C", &[] as &[&str], false).unwrap();
        let before = store.read();

        let err = store
            .update_parents_batch(&[
                (c.id.0.clone(), vec![b.id.0.clone()]),
                (a.id.0.clone(), vec![c.id.0.clone()]),
            ])
            .unwrap_err();
        assert!(matches!(err, TaxonomyError::Structural(_)));

        let after = store.read();
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.nodes[&c.id].parents.is_empty());

        let reopened = temp_store(&dir);
        assert!(reopened.get_node(&c.id.0).unwrap().parents.is_empty());
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let mut store = GraphStore::in_memory(TaxonomyConfig::default());
        let view = store.read();
        store.create_dag_node("Winter", &[] as &[&str], false).unwrap();
        assert!(view.nodes.is_empty());
        assert_eq!(store.read().nodes.len(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = TempDir::new().unwrap();
        let id = {
            let mut store = temp_store(&dir);
            let node = store.create_tree_node("Persistent", "kids", None, true).unwrap();
            store.attach_product("P9", &node.id.0).unwrap();
            node.id
        };

        let store = temp_store(&dir);
        let node = store.get_node(&id.0).unwrap();
        assert_eq!(node.name, "Persistent");
        assert!(node.is_featured);
        assert_eq!(store.products_of(&id.0).unwrap(), vec![ProductId("P9".to_string())]);
    }

    #[test]
    fn test_delete_and_flags() {
        let mut store = GraphStore::in_memory(TaxonomyConfig::default());
        let tag = store.create_dag_node("Sale", &[] as &[&str], false).unwrap();
        store.attach_product("P1", &tag.id.0).unwrap();
        assert!(store.delete_node(&tag.id.0).is_err());

        store.set_featured(&tag.id.0, true).unwrap();
        let node = store.set_active(&tag.id.0, false).unwrap();
        assert!(node.is_featured && !node.is_active);

        assert!(store.detach_product("P1", &tag.id.0).unwrap());
        store.delete_node(&tag.id.0).unwrap();
        assert!(store.get_node(&tag.id.0).unwrap_err().is_not_found());
    }

    #[test]
    fn test_repair_snapshots_first_and_restore() {
        let dir = TempDir::new().unwrap();
        let mut store = GraphStore::open(&dir.path().join("taxonomy.json"), snapshot_config()).unwrap();
        let a = store.create_dag_node("A", &[] as &[&str], false).unwrap();
        let b = store.create_dag_node("B", &[&a.id.0], false).unwrap();

        // corrupt a level out of band, then repair
        store
            .transaction(|g, _| {
                g.node_mut(&b.id)?.level = 9;
                Ok(())
            })
            .unwrap();
        assert!(!store.audit().is_clean());

        let report = store.repair().unwrap();
        assert_eq!(report.nodes_changed, 1);
        assert!(store.audit().is_clean());

        let snapshots = store.list_snapshots().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(dir.path().join("snapshots").exists());

        store.restore_snapshot(&snapshots[0].id.0).unwrap();
        assert_eq!(store.get_node(&b.id.0).unwrap().level, 9);
    }

    #[test]
    fn test_snapshots_disabled_without_dir() {
        let store = GraphStore::in_memory(TaxonomyConfig::default());
        assert!(matches!(store.snapshot(), Err(TaxonomyError::SnapshotsDisabled)));
    }

    #[test]
    fn test_queries_through_store() {
        let mut store = GraphStore::in_memory(TaxonomyConfig::default());
        let root = store.create_tree_node("Clothing", "ladies", None, false).unwrap();
        let tops = store.create_tree_node("Tops", "ladies", Some(&root.id.0), false).unwrap();
        store.create_tree_node("Tops", "gents", None, false).unwrap();

        assert_eq!(store.roots(HierarchyKind::Tree, Some("ladies"), false).len(), 1);
        assert_eq!(store.children(&root.id.0, false).unwrap().len(), 1);
        assert_eq!(store.leaves(HierarchyKind::Tree, None).len(), 2);
        assert_eq!(store.hierarchy(HierarchyKind::Tree, Some("ladies"), false)[0].children.len(), 1);
        assert_eq!(store.duplicate_names().len(), 1);
        assert_eq!(store.stats().tree_nodes, 3);
        assert_eq!(store.descendants(&root.id.0).unwrap()[0].id, tops.id);

        let moved = store.move_node(&tops.id.0, None).unwrap();
        assert_eq!(moved.level, 0);
        let hits = store.search("tops", SearchScope::default(), 10);
        assert_eq!(hits.len(), 2);
    }
}
