#[macro_use]
extern crate napi_derive;

pub mod audit;
pub mod binding;
pub mod config;
pub mod dag;
pub mod error;
pub mod model;
mod napi_convert;
mod napi_dto;
mod napi_exports;
pub mod nodes;
pub mod query;
pub mod search;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod traversal;
pub mod tree;

pub use config::TaxonomyConfig;
pub use error::{StructuralViolation, TaxonomyError};
pub use model::{Graph, HierarchyKind, Node, NodeId, ProductId};
pub use store::GraphStore;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("taxonomy_core=info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .init();
    });
}
