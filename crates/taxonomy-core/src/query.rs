//! Read-side views: listings, tree-of-trees, breadcrumbs and diagnostics
//! reports. Nothing here mutates the graph.

use crate::config::TaxonomyConfig;
use crate::error::TaxonomyError;
use crate::model::{Graph, HierarchyKind, Node, NodeId};
use crate::traversal::root_paths;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// One node in a nested hierarchy listing. A DAG node with several parents
/// appears once under each of them, but its subtree is only expanded the
/// first time; later occurrences are marked `repeated` and carry no children.
#[derive(Debug, Clone, Serialize)]
pub struct HierarchyEntry {
    pub node: Node,
    pub children: Vec<HierarchyEntry>,
    pub repeated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Crumb {
    pub id: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub kind: HierarchyKind,
    /// Normalized form shared by every member (trimmed, lowercased).
    pub name: String,
    pub node_ids: Vec<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonomyStats {
    pub total: usize,
    pub tree_nodes: usize,
    pub dag_nodes: usize,
    pub by_namespace: BTreeMap<String, usize>,
    pub featured: usize,
    pub not_featured: usize,
    pub active: usize,
    pub inactive: usize,
    pub with_products: usize,
    pub without_products: usize,
    pub attachments: usize,
}

fn in_scope(node: &Node, kind: HierarchyKind, namespace: Option<&str>) -> bool {
    node.kind == kind && namespace.map_or(true, |ns| node.namespace.as_deref() == Some(ns))
}

fn by_name(mut nodes: Vec<Node>) -> Vec<Node> {
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    nodes
}

pub fn roots(graph: &Graph, kind: HierarchyKind, namespace: Option<&str>, active_only: bool) -> Vec<Node> {
    by_name(
        graph
            .nodes
            .values()
            .filter(|n| in_scope(n, kind, namespace) && n.is_root())
            .filter(|n| !active_only || n.is_active)
            .cloned()
            .collect(),
    )
}

pub fn children(graph: &Graph, id: &NodeId, active_only: bool) -> Result<Vec<Node>, TaxonomyError> {
    let node = graph.node(id)?;
    Ok(by_name(
        node.children
            .iter()
            .filter_map(|c| graph.nodes.get(c))
            .filter(|n| !active_only || n.is_active)
            .cloned()
            .collect(),
    ))
}

pub fn leaves(graph: &Graph, kind: HierarchyKind, namespace: Option<&str>) -> Vec<Node> {
    by_name(
        graph
            .nodes
            .values()
            .filter(|n| in_scope(n, kind, namespace) && n.is_leaf())
            .cloned()
            .collect(),
    )
}

/// Every root of the scope expanded into nested entries, at most
/// `query.max_tree_depth` levels deep. Each node's subtree is expanded once,
/// so the listing holds at most one entry per root plus one per edge.
pub fn hierarchy(
    graph: &Graph,
    config: &TaxonomyConfig,
    kind: HierarchyKind,
    namespace: Option<&str>,
    active_only: bool,
) -> Vec<HierarchyEntry> {
    let mut walk = Expansion {
        graph,
        active_only,
        path: HashSet::new(),
        listed: HashSet::new(),
    };
    let entries: Vec<HierarchyEntry> = roots(graph, kind, namespace, active_only)
        .into_iter()
        .map(|root| walk.expand(root, config.query.max_tree_depth))
        .collect();
    debug!(kind = %kind, roots = entries.len(), expanded = walk.listed.len(), "hierarchy listing");
    entries
}

struct Expansion<'g> {
    graph: &'g Graph,
    active_only: bool,
    /// Nodes on the current root-to-entry route; guards corrupt cycles.
    path: HashSet<NodeId>,
    /// Nodes whose subtree has already been emitted.
    listed: HashSet<NodeId>,
}

impl Expansion<'_> {
    fn expand(&mut self, node: Node, depth_left: usize) -> HierarchyEntry {
        if depth_left == 0 {
            return HierarchyEntry {
                node,
                children: Vec::new(),
                repeated: false,
            };
        }
        if !self.listed.insert(node.id.clone()) {
            return HierarchyEntry {
                node,
                children: Vec::new(),
                repeated: true,
            };
        }
        self.path.insert(node.id.clone());
        let graph = self.graph;
        let kids: Vec<Node> = node
            .children
            .iter()
            .filter(|c| !self.path.contains(*c))
            .filter_map(|c| graph.nodes.get(c))
            .filter(|n| !self.active_only || n.is_active)
            .cloned()
            .collect();
        let children = by_name(kids)
            .into_iter()
            .map(|child| self.expand(child, depth_left - 1))
            .collect();
        self.path.remove(&node.id);
        HierarchyEntry {
            node,
            children,
            repeated: false,
        }
    }
}

/// Root-first name trails for `id`; one per distinct route.
pub fn breadcrumbs(graph: &Graph, config: &TaxonomyConfig, id: &NodeId) -> Result<Vec<Vec<Crumb>>, TaxonomyError> {
    graph.node(id)?;
    let paths = root_paths(graph, id, config.dag.max_breadcrumbs, config.dag.max_traversal_depth);
    Ok(paths
        .into_iter()
        .map(|path| {
            path.into_iter()
                .map(|id| Crumb {
                    name: graph.name_of(&id),
                    id,
                })
                .collect()
        })
        .collect())
}

pub fn breadcrumbs_many(
    graph: &Graph,
    config: &TaxonomyConfig,
    ids: &[NodeId],
) -> Result<Vec<(NodeId, Vec<Vec<Crumb>>)>, TaxonomyError> {
    ids.iter()
        .map(|id| Ok((id.clone(), breadcrumbs(graph, config, id)?)))
        .collect()
}

/// Names used by more than one node of the same hierarchy, compared trimmed
/// and case-insensitively.
pub fn duplicate_names(graph: &Graph) -> Vec<DuplicateGroup> {
    let mut groups: BTreeMap<(&str, String), Vec<NodeId>> = BTreeMap::new();
    for node in graph.nodes.values() {
        groups
            .entry((node.kind.as_str(), node.name.trim().to_lowercase()))
            .or_default()
            .push(node.id.clone());
    }
    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .filter_map(|((kind, name), mut node_ids)| {
            node_ids.sort();
            Some(DuplicateGroup {
                kind: HierarchyKind::from_str(kind)?,
                name,
                node_ids,
            })
        })
        .collect()
}

pub fn stats(graph: &Graph) -> TaxonomyStats {
    let mut s = TaxonomyStats {
        total: graph.nodes.len(),
        attachments: graph.attachments.values().map(|set| set.len()).sum(),
        ..Default::default()
    };
    for node in graph.nodes.values() {
        match node.kind {
            HierarchyKind::Tree => s.tree_nodes += 1,
            HierarchyKind::Dag => s.dag_nodes += 1,
        }
        if let Some(ns) = &node.namespace {
            *s.by_namespace.entry(ns.clone()).or_default() += 1;
        }
        if node.is_featured {
            s.featured += 1;
        } else {
            s.not_featured += 1;
        }
        if node.is_active {
            s.active += 1;
        } else {
            s.inactive += 1;
        }
        if graph.direct_product_count(&node.id) > 0 {
            s.with_products += 1;
        } else {
            s.without_products += 1;
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;
    use crate::{dag, nodes, tree};

    struct Shop {
        graph: Graph,
        config: TaxonomyConfig,
        clothing: NodeId,
        tops: NodeId,
        winter: NodeId,
        winter_sale: NodeId,
    }

    fn shop() -> Shop {
        let config = TaxonomyConfig::default();
        let mut graph = Graph::empty();
        let clothing = tree::create_node(&mut graph, &config, "Clothing", "ladies", None, true).unwrap().id;
        let tops = tree::create_node(&mut graph, &config, "Tops", "ladies", Some(&clothing), false).unwrap().id;
        tree::create_node(&mut graph, &config, "Dresses", "ladies", Some(&clothing), false).unwrap();
        tree::create_node(&mut graph, &config, "Shoes", "gents", None, false).unwrap();
        let winter = dag::create_node(&mut graph, &config, "Winter", &[], false).unwrap().id;
        let sale = dag::create_node(&mut graph, &config, "Sale", &[], false).unwrap().id;
        let winter_sale = dag::create_node(&mut graph, &config, "WinterSale", &[winter.clone(), sale], false)
            .unwrap()
            .id;
        Shop {
            graph,
            config,
            clothing,
            tops,
            winter,
            winter_sale,
        }
    }

    fn names(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.name.as_str()).collect()
    }

    #[test]
    fn test_roots_scoped_and_filtered() {
        let mut s = shop();
        assert_eq!(names(&roots(&s.graph, HierarchyKind::Tree, Some("ladies"), false)), vec!["Clothing"]);
        assert_eq!(names(&roots(&s.graph, HierarchyKind::Tree, None, false)), vec!["Clothing", "Shoes"]);
        assert_eq!(names(&roots(&s.graph, HierarchyKind::Dag, None, false)), vec!["Sale", "Winter"]);

        nodes::set_active(&mut s.graph, &s.winter, false).unwrap();
        assert_eq!(names(&roots(&s.graph, HierarchyKind::Dag, None, true)), vec!["Sale"]);
    }

    #[test]
    fn test_children_and_leaves() {
        let s = shop();
        assert_eq!(names(&children(&s.graph, &s.clothing, false).unwrap()), vec!["Dresses", "Tops"]);
        assert_eq!(
            names(&leaves(&s.graph, HierarchyKind::Tree, Some("ladies"))),
            vec!["Dresses", "Tops"]
        );
        assert_eq!(names(&leaves(&s.graph, HierarchyKind::Dag, None)), vec!["WinterSale"]);
        assert!(children(&s.graph, &nid("ghost"), false).is_err());
    }

    #[test]
    fn test_hierarchy_repeats_multi_parent_nodes() {
        let s = shop();
        let forest = hierarchy(&s.graph, &s.config, HierarchyKind::Dag, None, false);
        assert_eq!(forest.len(), 2);
        for root in &forest {
            assert_eq!(root.children.len(), 1);
            assert_eq!(root.children[0].node.id, s.winter_sale);
        }
        // roots sort by name: Sale lists WinterSale first, Winter refers back to it
        assert!(!forest[0].children[0].repeated);
        assert!(forest[1].children[0].repeated);

        let mut shallow = s.config.clone();
        shallow.query.max_tree_depth = 0;
        let capped = hierarchy(&s.graph, &shallow, HierarchyKind::Tree, Some("ladies"), false);
        assert!(capped[0].children.is_empty());
    }

    fn count_entries(entries: &[HierarchyEntry]) -> (usize, usize) {
        entries.iter().fold((0, 0), |(all, repeated), e| {
            let (a, r) = count_entries(&e.children);
            (all + 1 + a, repeated + usize::from(e.repeated) + r)
        })
    }

    #[test]
    fn test_hierarchy_stacked_diamonds_stay_linear() {
        // t0 -> {l0, r0} -> t1 -> {l1, r1} -> t2 ... sixteen layers deep
        const LAYERS: usize = 16;
        let mut names = vec!["t0".to_string()];
        let mut edges = Vec::new();
        for i in 0..LAYERS {
            let (top, l, r, next) = (format!("t{i}"), format!("l{i}"), format!("r{i}"), format!("t{}", i + 1));
            edges.push((l.clone(), top.clone()));
            edges.push((r.clone(), top));
            edges.push((next.clone(), l.clone()));
            edges.push((next.clone(), r.clone()));
            names.extend([l, r, next]);
        }
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let edge_refs: Vec<(&str, &str)> = edges.iter().map(|(c, p)| (c.as_str(), p.as_str())).collect();
        let graph = dag(&refs, &edge_refs);

        let mut config = TaxonomyConfig::default();
        config.query.max_tree_depth = 100;
        let forest = hierarchy(&graph, &config, HierarchyKind::Dag, None, false);
        let (entries, repeated) = count_entries(&forest);
        assert_eq!(entries, 1 + edges.len());
        assert_eq!(repeated, LAYERS);
    }

    #[test]
    fn test_breadcrumbs_tree_and_dag() {
        let s = shop();
        let trail = breadcrumbs(&s.graph, &s.config, &s.tops).unwrap();
        assert_eq!(trail.len(), 1);
        let trail_names: Vec<&str> = trail[0].iter().map(|c| c.name.as_str()).collect();
        assert_eq!(trail_names, vec!["Clothing", "Tops"]);

        let many = breadcrumbs_many(&s.graph, &s.config, &[s.tops.clone(), s.winter_sale.clone()]).unwrap();
        assert_eq!(many.len(), 2);
        assert_eq!(many[1].1.len(), 2);
        assert!(breadcrumbs_many(&s.graph, &s.config, &[nid("ghost")]).is_err());
    }

    #[test]
    fn test_duplicate_names_grouped_per_kind() {
        let mut s = shop();
        tree::create_node(&mut s.graph, &s.config, " tops", "gents", None, false).unwrap();
        dag::create_node(&mut s.graph, &s.config, "Tops", &[], false).unwrap();

        let dups = duplicate_names(&s.graph);
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].kind, HierarchyKind::Tree);
        assert_eq!(dups[0].name, "tops");
        assert_eq!(dups[0].node_ids.len(), 2);
    }

    #[test]
    fn test_stats() {
        let mut s = shop();
        s.graph.attachments.entry(s.tops.clone()).or_default().insert(pid("p1"));
        let st = stats(&s.graph);
        assert_eq!(st.total, 7);
        assert_eq!(st.tree_nodes, 4);
        assert_eq!(st.dag_nodes, 3);
        assert_eq!(st.by_namespace.get("ladies"), Some(&3));
        assert_eq!(st.featured, 1);
        assert_eq!(st.with_products, 1);
        assert_eq!(st.without_products, 6);
        assert_eq!(st.attachments, 1);
    }
}
