//! Reverse-mode gradient synthesis.
//!
//! Gradients are built as new nodes in the same graph, so they can be
//! evaluated with an [`Executor`](crate::executor::Executor) like any other
//! node. The output is seeded with `OnesLike(output)`: for a non-scalar
//! output this differentiates the implicit sum of its elements, not a
//! general vector-Jacobian product.

use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId};
use crate::topo::{reachable_from, reverse_topo_sort};
use log::{debug, trace};

/// Builds one gradient node per entry of `wrt`, in order, for the sum of
/// `output`'s elements.
///
/// Fails with [`GraphError::Disconnected`] for a requested node that the
/// output does not depend on, and with [`GraphError::NonDifferentiable`] if
/// an operator without a gradient rule sits upstream of `output`. On failure
/// the graph is left exactly as it was.
pub fn gradients(graph: &mut Graph, output: NodeId, wrt: &[NodeId]) -> Result<Vec<NodeId>> {
    let reachable = reachable_from(graph, output)?;
    for &id in wrt {
        let node = graph.node(id)?;
        if !reachable[id.index()] {
            return Err(GraphError::Disconnected {
                node: id,
                name: node.name().to_string(),
            });
        }
    }

    let start_len = graph.len();
    let result = synthesize(graph, output, wrt);
    if result.is_err() {
        debug!(
            "Gradient synthesis failed, discarding {} node(s)",
            graph.len() - start_len
        );
        graph.truncate(start_len);
    }
    result
}

fn synthesize(graph: &mut Graph, output: NodeId, wrt: &[NodeId]) -> Result<Vec<NodeId>> {
    let reverse_order = reverse_topo_sort(graph, &[output])?;
    let start_len = graph.len();
    let seed = graph.ones_like(output)?;
    debug!(
        "Synthesizing gradients of {} over {} node(s) for {} target(s)",
        output,
        reverse_order.len(),
        wrt.len()
    );

    // Contributions flow only into nodes that existed before synthesis.
    let mut contributions: Vec<Vec<NodeId>> = vec![Vec::new(); start_len];
    let mut node_grads: Vec<Option<NodeId>> = vec![None; start_len];
    contributions[output.index()].push(seed);

    for &id in &reverse_order {
        let parts = std::mem::take(&mut contributions[id.index()]);
        let grad = sum_node_list(graph, parts, id)?;
        node_grads[id.index()] = Some(grad);

        let node = graph.get(id);
        let kind = node.kind();
        let inputs = node.inputs().to_vec();
        trace!("{} `{}` receives gradient {}", id, node.name(), grad);

        let input_grads = kind.operator().gradient(graph, id, grad)?;
        for (input, input_grad) in inputs.into_iter().zip(input_grads) {
            contributions[input.index()].push(input_grad);
        }
    }

    debug!("Gradient synthesis added {} node(s)", graph.len() - start_len);

    wrt.iter()
        .map(|&id| {
            node_grads
                .get(id.index())
                .copied()
                .flatten()
                .ok_or_else(|| GraphError::Disconnected {
                    node: id,
                    name: graph.get(id).name().to_string(),
                })
        })
        .collect()
}

/// Sums gradient contributions symbolically with a balanced tree of `Add`
/// nodes, keeping the depth logarithmic in the fan-in.
fn sum_node_list(graph: &mut Graph, mut nodes: Vec<NodeId>, target: NodeId) -> Result<NodeId> {
    while nodes.len() > 1 {
        let mut next = Vec::with_capacity(nodes.len().div_ceil(2));
        for pair in nodes.chunks(2) {
            if let [a, b] = *pair {
                next.push(graph.add(a, b)?);
            } else {
                next.extend_from_slice(pair);
            }
        }
        nodes = next;
    }
    nodes.pop().ok_or_else(|| GraphError::Disconnected {
        node: target,
        name: graph.get(target).name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{from_rows, scalar, Array};
    use crate::executor::{Executor, FeedDict};
    use crate::ops::OpKind;

    fn eval(g: &Graph, nodes: Vec<NodeId>, feed: &FeedDict) -> Vec<Array> {
        Executor::new(nodes).run(g, feed).expect("evaluation should succeed")
    }

    #[test]
    fn product_rule() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let f = g.mul(x, y).unwrap();
        let grads = gradients(&mut g, f, &[x, y]).unwrap();

        let feed = FeedDict::from([(x, scalar(3.0)), (y, scalar(4.0))]);
        assert_eq!(eval(&g, grads, &feed), vec![scalar(4.0), scalar(3.0)]);
    }

    #[test]
    fn fan_in_contributions_are_summed() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let sq = g.mul(x, x).unwrap();
        let f = g.add(sq, x).unwrap();
        let grads = gradients(&mut g, f, &[x]).unwrap();

        let feed = FeedDict::from([(x, scalar(5.0))]);
        assert_eq!(eval(&g, grads, &feed), vec![scalar(11.0)]);
    }

    #[test]
    fn wide_fan_in_uses_balanced_sum() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let mut acc = g.mul(x, 1.0).unwrap();
        for k in 2..=9 {
            let term = g.mul(x, f64::from(k)).unwrap();
            acc = g.add(acc, term).unwrap();
        }
        let grads = gradients(&mut g, acc, &[x]).unwrap();

        // The 9 contributions into x reduce through 8 adds in 4 levels.
        let grad = g.node(grads[0]).unwrap();
        assert_eq!(grad.kind(), OpKind::Add);

        let feed = FeedDict::from([(x, scalar(2.0))]);
        assert_eq!(eval(&g, grads, &feed), vec![scalar(45.0)]);
    }

    #[test]
    fn gradient_of_output_wrt_itself_is_ones() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let s = g.sin(x).unwrap();
        let grads = gradients(&mut g, s, &[s]).unwrap();
        assert_eq!(g.node(grads[0]).unwrap().kind(), OpKind::OnesLike);
    }

    #[test]
    fn matrix_output_differentiates_the_sum() {
        let mut g = Graph::new();
        let a = g.variable("A");
        let b = g.variable("B");
        let y = g.matmul(a, b, false, false).unwrap();
        let grads = gradients(&mut g, y, &[a]).unwrap();

        let bv = from_rows(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let feed = FeedDict::from([
            (a, from_rows(&[&[0.5, -1.0], &[2.0, 0.0]])),
            (b, bv.clone()),
        ]);
        let ones = Array::from_element(2, 2, 1.0);
        assert_eq!(eval(&g, grads, &feed), vec![ones * bv.transpose()]);
    }

    #[test]
    fn gradients_can_be_differentiated_again() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let cube = g.pow(x, 3.0).unwrap();
        let first = gradients(&mut g, cube, &[x]).unwrap();
        let second = gradients(&mut g, first[0], &[x]).unwrap();

        let feed = FeedDict::from([(x, scalar(2.0))]);
        assert_eq!(
            eval(&g, vec![first[0], second[0]], &feed),
            vec![scalar(12.0), scalar(12.0)]
        );
    }

    #[test]
    fn disconnected_nodes_are_errors_not_zeros() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let f = g.sin(x).unwrap();
        let err = gradients(&mut g, f, &[x, y]).unwrap_err();
        assert_eq!(
            err,
            GraphError::Disconnected {
                node: y,
                name: "y".to_string()
            }
        );
    }

    #[test]
    fn equality_upstream_is_not_differentiable() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let mask = g.eq(x, y).unwrap();
        let f = g.mul(mask, x).unwrap();
        let err = gradients(&mut g, f, &[x]).unwrap_err();
        assert!(
            matches!(err, GraphError::NonDifferentiable { op: "Equal", node, .. } if node == mask)
        );
    }

    #[test]
    fn failed_synthesis_leaves_graph_unchanged() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let mut f = g.sin(x).unwrap();
        for _ in 0..50 {
            f = g.mul(f, x).unwrap();
        }

        let before = g.len();
        let err = gradients(&mut g, f, &[x, y]).unwrap_err();
        assert!(matches!(err, GraphError::Disconnected { node, .. } if node == y));
        assert_eq!(g.len(), before);

        let mask = g.eq(x, y).unwrap();
        let masked = g.mul(f, mask).unwrap();
        let before = g.len();
        let err = gradients(&mut g, masked, &[x]).unwrap_err();
        assert!(matches!(err, GraphError::NonDifferentiable { .. }));
        assert_eq!(g.len(), before);

        // The graph stays usable after a failed call.
        let grads = gradients(&mut g, f, &[x]).unwrap();
        assert_eq!(grads.len(), 1);
        assert!(g.len() > before);
    }

    #[test]
    fn constant_like_nodes_pass_zero_gradients() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let ones = g.ones_like(x).unwrap();
        let f = g.add(ones, x).unwrap();
        let grads = gradients(&mut g, f, &[x]).unwrap();

        let feed = FeedDict::from([(x, scalar(7.0))]);
        assert_eq!(eval(&g, grads, &feed), vec![scalar(1.0)]);
    }
}
