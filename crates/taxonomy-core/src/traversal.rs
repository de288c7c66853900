//! Store-agnostic graph walks over parent/child adjacency.
//!
//! Everything here is written against [`Adjacency`], so the same closure,
//! reachability and path code runs over the committed [`Graph`] and over a
//! [`ProposedParents`] overlay that describes an edge set not yet written.

use crate::model::{Graph, NodeId};
use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};

pub trait Adjacency {
    fn parents_of(&self, id: &NodeId) -> Cow<'_, [NodeId]>;
    fn children_of(&self, id: &NodeId) -> Cow<'_, [NodeId]>;
}

impl Adjacency for Graph {
    fn parents_of(&self, id: &NodeId) -> Cow<'_, [NodeId]> {
        match self.nodes.get(id) {
            Some(n) => Cow::Borrowed(n.parents.as_slice()),
            None => Cow::Borrowed(&[]),
        }
    }

    fn children_of(&self, id: &NodeId) -> Cow<'_, [NodeId]> {
        match self.nodes.get(id) {
            Some(n) => Cow::Borrowed(n.children.as_slice()),
            None => Cow::Borrowed(&[]),
        }
    }
}

/// The committed graph with one node's parent set replaced.
pub struct ProposedParents<'a> {
    base: &'a Graph,
    node: &'a NodeId,
    parents: &'a [NodeId],
}

impl<'a> ProposedParents<'a> {
    pub fn new(base: &'a Graph, node: &'a NodeId, parents: &'a [NodeId]) -> Self {
        ProposedParents { base, node, parents }
    }
}

impl Adjacency for ProposedParents<'_> {
    fn parents_of(&self, id: &NodeId) -> Cow<'_, [NodeId]> {
        if id == self.node {
            Cow::Borrowed(self.parents)
        } else {
            self.base.parents_of(id)
        }
    }

    fn children_of(&self, id: &NodeId) -> Cow<'_, [NodeId]> {
        let base = self.base.children_of(id);
        let was_parent = base.contains(self.node);
        let is_parent = self.parents.contains(id);
        match (was_parent, is_parent) {
            (true, false) => Cow::Owned(base.iter().filter(|c| *c != self.node).cloned().collect()),
            (false, true) => {
                let mut owned = base.into_owned();
                owned.push(self.node.clone());
                Cow::Owned(owned)
            }
            _ => base,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow parent edges towards the roots.
    Up,
    /// Follow child edges towards the leaves.
    Down,
}

fn step<'a, A: Adjacency + ?Sized>(adj: &'a A, id: &NodeId, dir: Direction) -> Cow<'a, [NodeId]> {
    match dir {
        Direction::Up => adj.parents_of(id),
        Direction::Down => adj.children_of(id),
    }
}

/// Result of a bounded closure walk.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    /// Reached nodes in BFS discovery order, start excluded, each id once.
    pub ids: Vec<NodeId>,
    /// True when the depth cap stopped the walk before it ran out of edges.
    pub truncated: bool,
}

impl Closure {
    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }
}

/// Breadth-first closure from `start` in one direction, deduplicated by id.
pub fn closure<A: Adjacency + ?Sized>(adj: &A, start: &NodeId, dir: Direction, max_depth: usize) -> Closure {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut out = Closure::default();
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
    visited.insert(start.clone());
    queue.push_back((start.clone(), 0));

    while let Some((id, depth)) = queue.pop_front() {
        let next = step(adj, &id, dir);
        if next.is_empty() {
            continue;
        }
        if depth >= max_depth {
            out.truncated = true;
            continue;
        }
        for n in next.iter() {
            if visited.insert(n.clone()) {
                out.ids.push(n.clone());
                queue.push_back((n.clone(), depth + 1));
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    Found,
    NotFound,
    /// The depth cap was hit before the search could rule the target out.
    Truncated,
}

/// Bounded search for a route `from -> ... -> to` in direction `dir`.
/// `from == to` counts as found.
pub fn reach<A: Adjacency + ?Sized>(adj: &A, from: &NodeId, to: &NodeId, dir: Direction, max_depth: usize) -> Reach {
    if from == to {
        return Reach::Found;
    }
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::new();
    let mut truncated = false;
    visited.insert(from.clone());
    queue.push_back((from.clone(), 0));

    while let Some((id, depth)) = queue.pop_front() {
        let next = step(adj, &id, dir);
        if next.is_empty() {
            continue;
        }
        if depth >= max_depth {
            truncated = true;
            continue;
        }
        for n in next.iter() {
            if n == to {
                return Reach::Found;
            }
            if visited.insert(n.clone()) {
                queue.push_back((n.clone(), depth + 1));
            }
        }
    }
    if truncated {
        Reach::Truncated
    } else {
        Reach::NotFound
    }
}

/// Every distinct root-to-`target` route, each ordered root first and ending
/// with `target`. Stops collecting after `max_paths` routes; edges that would
/// revisit a node already on the current route are skipped.
pub fn root_paths<A: Adjacency + ?Sized>(adj: &A, target: &NodeId, max_paths: usize, max_depth: usize) -> Vec<Vec<NodeId>> {
    let mut paths = Vec::new();
    let mut stack = vec![target.clone()];
    collect_root_paths(adj, &mut stack, &mut paths, max_paths, max_depth);
    for path in &mut paths {
        path.reverse();
    }
    paths
}

fn collect_root_paths<A: Adjacency + ?Sized>(
    adj: &A,
    stack: &mut Vec<NodeId>,
    paths: &mut Vec<Vec<NodeId>>,
    max_paths: usize,
    max_depth: usize,
) {
    if paths.len() >= max_paths {
        return;
    }
    let Some(current) = stack.last().cloned() else { return };
    let parents = adj.parents_of(&current);
    if parents.is_empty() || stack.len() > max_depth {
        paths.push(stack.clone());
        return;
    }
    let mut extended = false;
    for parent in parents.iter() {
        if stack.contains(parent) {
            continue;
        }
        extended = true;
        stack.push(parent.clone());
        collect_root_paths(adj, stack, paths, max_paths, max_depth);
        stack.pop();
        if paths.len() >= max_paths {
            return;
        }
    }
    if !extended {
        // Only back-edges remain; treat the current node as the route's top.
        paths.push(stack.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::*;

    fn diamond() -> Graph {
        dag(&["a", "b", "c", "d"], &[("b", "a"), ("c", "a"), ("d", "b"), ("d", "c")])
    }

    #[test]
    fn test_descendants_deduplicated() {
        let g = diamond();
        let c = closure(&g, &nid("a"), Direction::Down, 64);
        assert_eq!(c.ids.len(), 3);
        for id in ["b", "c", "d"] {
            assert_eq!(c.ids.iter().filter(|x| **x == nid(id)).count(), 1);
        }
        assert!(!c.truncated);
    }

    #[test]
    fn test_ancestors_closure() {
        let g = diamond();
        let c = closure(&g, &nid("d"), Direction::Up, 64);
        let mut ids: Vec<_> = c.ids.iter().map(|n| n.0.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_closure_depth_cap_marks_truncated() {
        let g = dag(&["a", "b", "c"], &[("b", "a"), ("c", "b")]);
        let c = closure(&g, &nid("a"), Direction::Down, 1);
        assert_eq!(c.ids, vec![nid("b")]);
        assert!(c.truncated);
    }

    #[test]
    fn test_root_paths_one_per_route() {
        let g = diamond();
        let mut paths = root_paths(&g, &nid("d"), 64, 64);
        paths.sort();
        assert_eq!(
            paths,
            vec![
                vec![nid("a"), nid("b"), nid("d")],
                vec![nid("a"), nid("c"), nid("d")],
            ]
        );
    }

    #[test]
    fn test_root_paths_of_root_is_itself() {
        let g = diamond();
        assert_eq!(root_paths(&g, &nid("a"), 64, 64), vec![vec![nid("a")]]);
    }

    #[test]
    fn test_root_paths_survive_corrupt_cycle() {
        // b <-> c loop hanging off root a
        let g = dag(&["a", "b", "c"], &[("b", "a"), ("b", "c"), ("c", "b")]);
        let paths = root_paths(&g, &nid("c"), 64, 64);
        assert!(paths.contains(&vec![nid("a"), nid("b"), nid("c")]));
    }

    #[test]
    fn test_reach() {
        let g = diamond();
        assert_eq!(reach(&g, &nid("a"), &nid("d"), Direction::Down, 64), Reach::Found);
        assert_eq!(reach(&g, &nid("d"), &nid("a"), Direction::Down, 64), Reach::NotFound);
        assert_eq!(reach(&g, &nid("a"), &nid("a"), Direction::Down, 64), Reach::Found);
        assert_eq!(reach(&g, &nid("a"), &nid("x"), Direction::Down, 1), Reach::Truncated);
    }

    #[test]
    fn test_proposed_parents_overlay() {
        let g = diamond();
        let b = nid("b");
        let proposed = vec![nid("c")];
        let overlay = ProposedParents::new(&g, &b, &proposed);
        assert_eq!(overlay.parents_of(&nid("b")).to_vec(), vec![nid("c")]);
        assert!(!overlay.children_of(&nid("a")).contains(&nid("b")));
        assert!(overlay.children_of(&nid("c")).contains(&nid("b")));
        // untouched nodes read straight through
        assert_eq!(overlay.parents_of(&nid("d")).len(), 2);
    }
}
