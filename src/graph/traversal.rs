//! Graph traversal algorithms over node ids

use std::collections::{HashSet, VecDeque};

use super::NodeId;

/// BFS traversal from start nodes; start nodes are included in the result
pub fn bfs<F>(start: &[NodeId], max_depth: usize, mut get_neighbors: F) -> Vec<NodeId>
where
    F: FnMut(&str) -> Vec<NodeId>,
{
    let mut visited = HashSet::new();
    let mut queue: VecDeque<NodeId> = start.iter().cloned().collect();
    let mut result = Vec::new();
    let mut depth = 0;

    while !queue.is_empty() && depth <= max_depth {
        let level_size = queue.len();

        for _ in 0..level_size {
            if let Some(node) = queue.pop_front() {
                if !visited.insert(node.clone()) {
                    continue;
                }

                for neighbor in get_neighbors(&node) {
                    if !visited.contains(&neighbor) {
                        queue.push_back(neighbor);
                    }
                }

                result.push(node);
            }
        }

        depth += 1;
    }

    result
}

/// Outcome of searching backwards from a node for a designated root
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    /// Some root reaches the node
    Reachable,
    /// No root reaches the node; every id here (the node included) is unreachable
    Unreachable(Vec<NodeId>),
}

/// Walk inbound edges from `start` until a root is found.
///
/// If no root is met, every node that can reach `start` is itself cut off from
/// the roots, so the whole visited set is returned.
pub fn backward_reachability<F, R>(start: &str, mut get_sources: F, is_root: R) -> Reachability
where
    F: FnMut(&str) -> Vec<NodeId>,
    R: Fn(&str) -> bool,
{
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    let mut result = Vec::new();

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.clone()) {
            continue;
        }
        if is_root(&node) {
            return Reachability::Reachable;
        }
        for source in get_sources(&node) {
            if !visited.contains(&source) {
                queue.push_back(source);
            }
        }
        result.push(node);
    }

    Reachability::Unreachable(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(id, targets)| (id.to_string(), targets.iter().map(|t| t.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_bfs_simple_graph() {
        // 1 -> 2 -> 3, 1 -> 4
        let edges = graph(&[("1", &["2", "4"]), ("2", &["3"]), ("3", &[]), ("4", &[])]);

        let result = bfs(&["1".to_string()], usize::MAX, |id| {
            edges.get(id).cloned().unwrap_or_default()
        });

        assert_eq!(result.len(), 4);
        assert_eq!(result[0], "1");
    }

    #[test]
    fn test_bfs_max_depth() {
        // 1 -> 2 -> 3 -> 4
        let edges = graph(&[("1", &["2"]), ("2", &["3"]), ("3", &["4"])]);

        let result = bfs(&["1".to_string()], 2, |id| edges.get(id).cloned().unwrap_or_default());

        assert_eq!(result, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_bfs_terminates_on_cycle() {
        let edges = graph(&[("a", &["b"]), ("b", &["a"])]);
        let result = bfs(&["a".to_string()], usize::MAX, |id| edges.get(id).cloned().unwrap_or_default());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_backward_reachability_finds_root() {
        // sources: c <- b <- ROOT
        let sources = graph(&[("c", &["b"]), ("b", &["ROOT"])]);
        let result = backward_reachability("c", |id| sources.get(id).cloned().unwrap_or_default(), |id| id == "ROOT");
        assert_eq!(result, Reachability::Reachable);
    }

    #[test]
    fn test_backward_reachability_detached_cycle() {
        // a <-> b, nothing else points at them
        let sources = graph(&[("a", &["b"]), ("b", &["a"])]);
        let result = backward_reachability("a", |id| sources.get(id).cloned().unwrap_or_default(), |id| id == "ROOT");
        match result {
            Reachability::Unreachable(ids) => {
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&"a".to_string()));
                assert!(ids.contains(&"b".to_string()));
            }
            Reachability::Reachable => panic!("cycle should be unreachable"),
        }
    }
}
