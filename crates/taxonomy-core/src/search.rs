use crate::model::{Graph, HierarchyKind, Node, NodeId};
use tracing::debug;

/// Which part of the graph a search looks at. The default covers everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchScope<'a> {
    pub kind: Option<HierarchyKind>,
    pub namespace: Option<&'a str>,
    pub active_only: bool,
}

impl SearchScope<'_> {
    fn admits(&self, node: &Node) -> bool {
        self.kind.map_or(true, |k| node.kind == k)
            && self.namespace.map_or(true, |ns| node.namespace.as_deref() == Some(ns))
            && (!self.active_only || node.is_active)
    }
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub node_id: NodeId,
    pub name: String,
    pub kind: HierarchyKind,
    pub namespace: Option<String>,
    pub level: u32,
    pub score: f64,
}

/// Score every node name in scope against `query`. Best matches first; ties
/// go to the shallower node.
pub fn search_nodes(graph: &Graph, query: &str, scope: SearchScope<'_>, max_results: usize) -> Vec<SearchResult> {
    let query_lower = query.trim().to_lowercase();
    let terms: Vec<&str> = query_lower.split_whitespace().collect();

    if terms.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<SearchResult> = graph
        .nodes
        .values()
        .filter(|n| scope.admits(n))
        .filter_map(|node| {
            let score = score_text(&node.name, &query_lower, &terms);
            (score > 0.0).then(|| SearchResult {
                node_id: node.id.clone(),
                name: node.name.clone(),
                kind: node.kind,
                namespace: node.namespace.clone(),
                level: node.level,
                score,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.level.cmp(&b.level))
            .then_with(|| a.name.cmp(&b.name))
    });
    results.truncate(max_results);
    debug!(query = %query, results = results.len(), "search complete");
    results
}

fn score_text(text: &str, query_lower: &str, terms: &[&str]) -> f64 {
    let text_lower = text.to_lowercase();

    if text_lower.contains(query_lower) {
        return 1.0;
    }

    let matched = terms.iter().filter(|t| text_lower.contains(**t)).count();

    match matched {
        n if n == terms.len() => 0.6,
        0 => 0.0,
        n => 0.3 * (n as f64 / terms.len() as f64),
    }
}
