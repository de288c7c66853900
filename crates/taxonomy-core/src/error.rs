use thiserror::Error;

/// Structural rules that block a mutation. Every variant carries the display
/// names and counts needed to render a message without a second lookup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralViolation {
    #[error("cannot make '{parent}' a parent of '{node}': '{parent}' is '{node}' itself or one of its descendants")]
    CycleWouldForm { node: String, parent: String },

    #[error("cannot delete '{node}': it has {child_count} {}", plural(*child_count, "child node", "child nodes"))]
    HasChildren { node: String, child_count: usize },

    #[error("cannot delete '{node}': it has {product_count} attached {}", plural(*product_count, "product", "products"))]
    HasProducts { node: String, product_count: usize },

    #[error("category '{node}' has {child_count} {}; attach to a leaf instead", plural(*child_count, "child category", "child categories"))]
    NonLeafAttachment { node: String, child_count: usize },

    #[error("a sibling named '{name}' already exists under {}", parent.as_deref().map(|p| format!("'{p}'")).unwrap_or_else(|| "the root".to_string()))]
    DuplicateSiblingName { name: String, parent: Option<String> },
}

pub(crate) fn plural(count: usize, one: &'static str, many: &'static str) -> &'static str {
    if count == 1 {
        one
    } else {
        many
    }
}

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Parent node not found: {parent_id} (expected a {kind} node{})", namespace.as_deref().map(|ns| format!(" in namespace '{ns}'")).unwrap_or_default())]
    ParentNotFound {
        parent_id: String,
        kind: String,
        namespace: Option<String>,
    },

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error(transparent)]
    Structural(#[from] StructuralViolation),

    #[error("Node '{node}' belongs to the {actual} hierarchy, expected {expected}")]
    WrongHierarchy {
        node: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid node name: {0:?}")]
    InvalidName(String),

    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("Tree nodes require a namespace")]
    MissingNamespace,

    #[error("Traversal from '{node}' stopped at the depth limit of {depth}; raise dag.max_traversal_depth or audit the graph for cycles")]
    TraversalLimit { node: String, depth: usize },

    #[error("No snapshot directory configured")]
    SnapshotsDisabled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

impl TaxonomyError {
    /// Storage failures that leave no partial state behind and may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, TaxonomyError::Io(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TaxonomyError::NodeNotFound(_)
                | TaxonomyError::ParentNotFound { .. }
                | TaxonomyError::SnapshotNotFound(_)
        )
    }
}

impl From<TaxonomyError> for napi::Error {
    fn from(e: TaxonomyError) -> Self {
        napi::Error::from_reason(e.to_string())
    }
}
