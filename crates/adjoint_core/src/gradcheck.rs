use crate::array::{self, Array};
use crate::executor::{Executor, FeedDict};
use crate::gradient::gradients;
use crate::graph::{Graph, NodeId};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GradCheckSettings {
    /// Central-difference step.
    pub epsilon: f64,
    /// Largest accepted absolute difference per element.
    pub tolerance: f64,
}

impl Default for GradCheckSettings {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradCheckReport {
    /// Largest absolute error per checked variable, in request order.
    pub max_errors: Vec<f64>,
    pub passed: bool,
}

/// Central-difference estimate of d sum(output) / d wrt, one element at a time.
pub fn numerical_gradient(
    graph: &Graph,
    output: NodeId,
    wrt: NodeId,
    feed: &FeedDict,
    epsilon: f64,
) -> Result<Array> {
    if epsilon <= 0.0 {
        bail!("epsilon must be positive.");
    }
    let base = feed
        .get(&wrt)
        .ok_or_else(|| anyhow!("Variable {} has no value in the feed.", wrt))?;
    let executor = Executor::new(vec![output]);
    let mut probe = feed.clone();
    let mut estimate = array::zeros_like(base);

    let eval_sum = |probe: &FeedDict| -> Result<f64> {
        let values = executor
            .run(graph, probe)
            .context("Failed to evaluate perturbed output.")?;
        Ok(array::sum(&values[0]))
    };

    for i in 0..base.len() {
        let mut shifted = base.clone();
        shifted[i] += epsilon;
        probe.insert(wrt, shifted.clone());
        let upper = eval_sum(&probe)?;

        shifted[i] -= 2.0 * epsilon;
        probe.insert(wrt, shifted);
        let lower = eval_sum(&probe)?;

        estimate[i] = (upper - lower) / (2.0 * epsilon);
    }
    Ok(estimate)
}

/// Compares symbolic gradients of `output` against central differences.
pub fn check_gradients(
    graph: &mut Graph,
    output: NodeId,
    wrt: &[NodeId],
    feed: &FeedDict,
    settings: GradCheckSettings,
) -> Result<GradCheckReport> {
    let grad_nodes = gradients(graph, output, wrt)
        .context("Failed to build symbolic gradients.")?;
    let symbolic = Executor::new(grad_nodes)
        .run(graph, feed)
        .context("Failed to evaluate gradients.")?;

    let mut max_errors = Vec::with_capacity(wrt.len());
    for (&var, exact) in wrt.iter().zip(&symbolic) {
        let estimate = numerical_gradient(graph, output, var, feed, settings.epsilon)?;
        if estimate.shape() != exact.shape() {
            bail!(
                "Gradient shape {:?} does not match variable shape {:?}.",
                exact.shape(),
                estimate.shape()
            );
        }
        let max_error = exact
            .iter()
            .zip(estimate.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        max_errors.push(max_error);
    }

    let passed = max_errors.iter().all(|&e| e <= settings.tolerance);
    Ok(GradCheckReport { max_errors, passed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{column, from_rows, scalar};

    #[test]
    fn matmul_adjoint_matches_finite_differences() {
        let mut g = Graph::new();
        let a = g.variable("A");
        let b = g.variable("B");
        let y = g.matmul(a, b, false, false).unwrap();
        let feed = FeedDict::from([
            (a, from_rows(&[&[1.0, 2.0], &[3.0, 4.0]])),
            (b, from_rows(&[&[-0.5, 1.5], &[2.0, 0.25]])),
        ]);

        let settings = GradCheckSettings::default();
        let report = check_gradients(&mut g, y, &[a, b], &feed, settings)
            .expect("gradient check should run");
        assert!(report.passed, "{:?}", report.max_errors);
    }

    #[test]
    fn transcendental_chain_matches_finite_differences() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let s = g.sin(x).unwrap();
        let e = g.exp(s).unwrap();
        let l = g.logistic(x).unwrap();
        let p = g.mul(e, l).unwrap();
        let t = g.arctan(p).unwrap();
        let feed = FeedDict::from([(x, column(&[-0.7, 0.1, 1.3]))]);

        let settings = GradCheckSettings::default();
        let report = check_gradients(&mut g, t, &[x], &feed, settings)
            .expect("gradient check should run");
        assert!(report.passed, "{:?}", report.max_errors);
    }

    #[test]
    fn numerical_gradient_of_square() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let sq = g.pow(x, 2.0).unwrap();
        let feed = FeedDict::from([(x, scalar(3.0))]);
        let estimate = numerical_gradient(&g, sq, x, &feed, 1e-5).unwrap();
        assert!((estimate[0] - 6.0).abs() < 1e-6);
    }

    #[test]
    fn missing_feed_entry_is_reported() {
        let mut g = Graph::new();
        let x = g.variable("x");
        let sq = g.pow(x, 2.0).unwrap();
        let err = numerical_gradient(&g, sq, x, &FeedDict::new(), 1e-5).unwrap_err();
        assert!(format!("{err}").contains("no value in the feed"));
    }
}
