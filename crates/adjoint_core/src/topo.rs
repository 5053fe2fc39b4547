use crate::error::Result;
use crate::graph::{Graph, NodeId};

/// Returns every node reachable from `roots` such that each node comes after
/// all of its inputs.
///
/// This is a post-order depth-first walk over input edges, visiting roots and
/// inputs in their stored order, so the result is fully determined by the
/// graph and the root list. Nodes reachable along several paths appear once.
/// The walk keeps its own stack, so very deep graphs do not exhaust the
/// thread stack.
pub fn find_topo_sort(graph: &Graph, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    for &root in roots {
        graph.node(root)?;
    }

    let mut visited = vec![false; graph.len()];
    let mut order = Vec::new();
    // (node, index of the next input to visit)
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    for &root in roots {
        if visited[root.index()] {
            continue;
        }
        visited[root.index()] = true;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (id, next) = *frame;
            let inputs = graph.get(id).inputs();
            if next < inputs.len() {
                frame.1 += 1;
                let input = inputs[next];
                if !visited[input.index()] {
                    visited[input.index()] = true;
                    stack.push((input, 0));
                }
            } else {
                order.push(id);
                stack.pop();
            }
        }
    }

    Ok(order)
}

/// [`find_topo_sort`] reversed: every node comes before all of its inputs.
pub fn reverse_topo_sort(graph: &Graph, roots: &[NodeId]) -> Result<Vec<NodeId>> {
    let mut order = find_topo_sort(graph, roots)?;
    order.reverse();
    Ok(order)
}

/// Marks the nodes reachable from `root`, indexed by node id.
pub fn reachable_from(graph: &Graph, root: NodeId) -> Result<Vec<bool>> {
    let mut mask = vec![false; graph.len()];
    for id in find_topo_sort(graph, &[root])? {
        mask[id.index()] = true;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    fn position(order: &[NodeId], id: NodeId) -> usize {
        order.iter().position(|&n| n == id).expect("node should be in order")
    }

    fn assert_topological(graph: &Graph, order: &[NodeId]) {
        for (i, &id) in order.iter().enumerate() {
            for &input in graph.node(id).unwrap().inputs() {
                assert!(position(order, input) < i, "{input} must precede {id}");
            }
        }
    }

    #[test]
    fn inputs_precede_consumers() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let p = g.mul(x, y).unwrap();
        let s = g.sin(p).unwrap();
        let z = g.add(s, p).unwrap();
        let w = g.mul(z, x).unwrap();

        let order = find_topo_sort(&g, &[w]).unwrap();
        assert_topological(&g, &order);
        assert_eq!(order, vec![x, y, p, s, z, w]);
    }

    #[test]
    fn shared_nodes_appear_once() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let sq = g.mul(x, x).unwrap();
        let f = g.add(sq, x).unwrap();

        let order = find_topo_sort(&g, &[f, sq, f]).unwrap();
        assert_eq!(order, vec![x, sq, f]);
    }

    #[test]
    fn ordering_is_deterministic_and_follows_root_order() {
        let mut g = Graph::new();
        let a = g.variable("a");
        let b = g.variable("b");
        let sa = g.sin(a).unwrap();
        let sb = g.sin(b).unwrap();

        let first = find_topo_sort(&g, &[sb, sa]).unwrap();
        let second = find_topo_sort(&g, &[sb, sa]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, vec![b, sb, a, sa]);
        assert_eq!(reverse_topo_sort(&g, &[sb, sa]).unwrap(), vec![sa, a, sb, b]);
    }

    #[test]
    fn unreferenced_nodes_are_skipped() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let unused = g.variable("unused");
        let s = g.sin(x).unwrap();
        let mask = reachable_from(&g, s).unwrap();
        assert!(mask[x.index()]);
        assert!(!mask[unused.index()]);
    }

    #[test]
    fn deep_chains_do_not_overflow() {
        let mut g = Graph::new();
        let mut node = g.variable("x");
        for _ in 0..200_000 {
            node = g.add(node, 1.0).unwrap();
        }
        let order = find_topo_sort(&g, &[node]).unwrap();
        assert_eq!(order.len(), 200_001);
        assert_eq!(order.last(), Some(&node));
    }

    #[test]
    fn foreign_roots_are_rejected() {
        let g = Graph::new();
        let mut other = Graph::new();
        let x = other.variable("x");
        assert_eq!(find_topo_sort(&g, &[x]).unwrap_err(), GraphError::UnknownNode(x));
    }
}
