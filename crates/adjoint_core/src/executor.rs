use crate::array::{Array, EQUALITY_TOLERANCE};
use crate::error::{GraphError, Result};
use crate::graph::{Graph, NodeId};
use crate::ops::{EvalContext, OpKind};
use crate::topo::find_topo_sort;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Values for placeholder nodes, supplied fresh for each evaluation.
pub type FeedDict = HashMap<NodeId, Array>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Absolute tolerance of the elementwise equality operator.
    pub equality_tolerance: f64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            equality_tolerance: EQUALITY_TOLERANCE,
        }
    }
}

/// Computes the values of a fixed list of nodes.
///
/// The executor holds no graph state of its own: every `run` walks the
/// graph in topological order with a fresh value table, so the same graph
/// can be evaluated repeatedly, or from several threads at once.
#[derive(Debug, Clone)]
pub struct Executor {
    eval_nodes: Vec<NodeId>,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(eval_nodes: Vec<NodeId>) -> Self {
        Self {
            eval_nodes,
            settings: ExecutorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ExecutorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn eval_nodes(&self) -> &[NodeId] {
        &self.eval_nodes
    }

    /// Evaluates the requested nodes and returns their values in request order.
    ///
    /// Fails if a reachable placeholder has no feed entry, if the feed names
    /// a node that is not a placeholder, or if any operator fails.
    pub fn run(&self, graph: &Graph, feed: &FeedDict) -> Result<Vec<Array>> {
        let mut values: Vec<Option<Array>> = vec![None; graph.len()];
        for (&id, value) in feed {
            let node = graph.node(id)?;
            if node.kind() != OpKind::Placeholder {
                return Err(GraphError::NotAPlaceholder {
                    node: id,
                    name: node.name().to_string(),
                });
            }
            values[id.index()] = Some(value.clone());
        }

        let topo_order = find_topo_sort(graph, &self.eval_nodes)?;
        debug!(
            "Evaluating {} node(s) for {} output(s)",
            topo_order.len(),
            self.eval_nodes.len()
        );

        for &id in &topo_order {
            let node = graph.get(id);
            if node.kind() == OpKind::Placeholder {
                if values[id.index()].is_none() {
                    return Err(GraphError::UnboundPlaceholder {
                        node: id,
                        name: node.name().to_string(),
                    });
                }
                continue;
            }

            let inputs: Vec<&Array> = node
                .inputs()
                .iter()
                .map(|input| {
                    values[input.index()]
                        .as_ref()
                        .ok_or(GraphError::UnknownNode(*input))
                })
                .collect::<Result<_>>()?;
            let ctx = EvalContext {
                id,
                node,
                settings: &self.settings,
            };
            let value = node.kind().operator().compute(&ctx, &inputs)?;
            trace!("{} `{}` -> shape {:?}", id, node.name(), value.shape());
            values[id.index()] = Some(value);
        }

        self.eval_nodes
            .iter()
            .map(|id| {
                values[id.index()]
                    .clone()
                    .ok_or(GraphError::UnknownNode(*id))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{from_rows, scalar};

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn evaluates_affine_expression() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let prod = g.mul(x, y).unwrap();
        let z = g.add(prod, 2.0).unwrap();

        let feed = FeedDict::from([(x, scalar(3.0)), (y, scalar(4.0))]);
        let values = Executor::new(vec![z]).run(&g, &feed).unwrap();
        assert_eq!(values[0], scalar(14.0));
    }

    #[test]
    fn returns_values_in_request_order() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let double = g.mul(x, 2.0).unwrap();
        let triple = g.mul(x, 3.0).unwrap();

        let feed = FeedDict::from([(x, scalar(1.0))]);
        let values = Executor::new(vec![triple, x, double]).run(&g, &feed).unwrap();
        assert_eq!(values, vec![scalar(3.0), scalar(1.0), scalar(2.0)]);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let mut g = Graph::new();
        let a = g.variable("A");
        let s = g.sin(a).unwrap();
        let m = g.matmul(s, a, true, false).unwrap();
        let executor = Executor::new(vec![m, s]);
        let feed = FeedDict::from([(a, from_rows(&[&[0.1, 0.2], &[0.3, 0.4]]))]);

        let first = executor.run(&g, &feed).unwrap();
        let second = executor.run(&g, &feed).unwrap();
        assert_eq!(first, second);
        assert_eq!(feed.len(), 1);
    }

    #[test]
    fn missing_placeholder_is_an_error() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let y = g.variable("y");
        let z = g.add(x, y).unwrap();

        let feed = FeedDict::from([(x, scalar(1.0))]);
        let err = Executor::new(vec![z]).run(&g, &feed).unwrap_err();
        assert_eq!(
            err,
            GraphError::UnboundPlaceholder {
                node: y,
                name: "y".to_string()
            }
        );
    }

    #[test]
    fn unreachable_placeholders_need_no_feed() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let _unused = g.variable("unused");
        let s = g.mul(x, 2.0).unwrap();
        let feed = FeedDict::from([(x, scalar(1.5))]);
        assert_eq!(Executor::new(vec![s]).run(&g, &feed).unwrap()[0], scalar(3.0));
    }

    #[test]
    fn feeding_a_computed_node_is_rejected() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let s = g.sin(x).unwrap();
        let feed = FeedDict::from([(x, scalar(1.0)), (s, scalar(0.0))]);
        assert_err_contains(Executor::new(vec![s]).run(&g, &feed), "not a placeholder");
    }

    #[test]
    fn domain_error_names_the_node() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let l = g.ln(x).unwrap();
        let feed = FeedDict::from([(x, scalar(0.0))]);
        assert_err_contains(
            Executor::new(vec![l]).run(&g, &feed),
            "log(2.718281828459045,x)",
        );
    }

    #[test]
    fn graph_can_be_shared_across_threads() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let sq = g.pow(x, 2.0).unwrap();
        let executor = Executor::new(vec![sq]);

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let (g, executor) = (&g, &executor);
                    scope.spawn(move || {
                        let feed = FeedDict::from([(x, scalar(i as f64))]);
                        executor.run(g, &feed).unwrap()[0][(0, 0)]
                    })
                })
                .collect();
            for (i, handle) in handles.into_iter().enumerate() {
                let value = handle.join().unwrap();
                assert_eq!(value, (i * i) as f64);
            }
        });
    }
}
