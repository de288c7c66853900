use crate::error::TaxonomyError;
use crate::model::HierarchyKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Engine policy, matching `taxonomy.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default)]
    pub tree: TreeSection,
    #[serde(default)]
    pub dag: DagSection,
    #[serde(default)]
    pub deletion: DeletionSection,
    #[serde(default)]
    pub maintenance: MaintenanceSection,
    #[serde(default)]
    pub query: QuerySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSection {
    /// Allowed namespaces. Empty accepts any non-empty namespace.
    pub namespaces: Vec<String>,
    pub unique_sibling_names: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DagSection {
    pub unique_sibling_names: bool,
    /// Hop limit for cycle checks, audit cycle detection and breadcrumb routes.
    pub max_traversal_depth: usize,
    /// Ceiling on topological waves per level recompute.
    pub max_level_passes: usize,
    pub max_breadcrumbs: usize,
}

impl Default for DagSection {
    fn default() -> Self {
        Self {
            unique_sibling_names: false,
            max_traversal_depth: 64,
            max_level_passes: 1000,
            max_breadcrumbs: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeletionSection {
    pub dag_requires_productless: bool,
}

impl Default for DeletionSection {
    fn default() -> Self {
        Self {
            dag_requires_productless: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceSection {
    pub snapshot_dir: Option<PathBuf>,
    pub snapshot_before_repair: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySection {
    pub max_tree_depth: usize,
}

impl Default for QuerySection {
    fn default() -> Self {
        Self { max_tree_depth: 32 }
    }
}

impl TaxonomyConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, TaxonomyError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from disk; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, TaxonomyError> {
        if !path.exists() {
            debug!(path = %path.display(), "config file absent, using defaults");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    pub fn namespace_allowed(&self, namespace: &str) -> bool {
        self.tree.namespaces.is_empty() || self.tree.namespaces.iter().any(|ns| ns == namespace)
    }

    pub fn unique_sibling_names(&self, kind: HierarchyKind) -> bool {
        match kind {
            HierarchyKind::Tree => self.tree.unique_sibling_names,
            HierarchyKind::Dag => self.dag.unique_sibling_names,
        }
    }
}
