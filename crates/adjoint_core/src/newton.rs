use crate::array::scalar;
use crate::executor::{Executor, FeedDict};
use crate::gradient::gradients;
use crate::graph::{Graph, NodeId};
use crate::ops::OpKind;
use crate::topo::reachable_from;
use anyhow::{anyhow, bail, Context, Result};
use log::debug;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewtonSettings {
    pub max_steps: usize,
    pub damping: f64,
    pub tolerance: f64,
}

impl Default for NewtonSettings {
    fn default() -> Self {
        Self {
            max_steps: 25,
            damping: 1.0,
            tolerance: 1e-9,
        }
    }
}

impl NewtonSettings {
    fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            bail!("Newton settings need max_steps >= 1.");
        }
        if !(self.damping > 0.0) {
            bail!("Newton damping {} is not positive.", self.damping);
        }
        if !(self.tolerance > 0.0) {
            bail!("Newton residual tolerance {} is not positive.", self.tolerance);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResult {
    pub state: Vec<f64>,
    pub residual_norm: f64,
    pub iterations: usize,
    /// Row-major Jacobian at `state`.
    pub jacobian: Vec<f64>,
}

/// Solves `equations(variables) = 0` with Newton's method.
///
/// Every equation and variable is a scalar (1×1) node and every variable must
/// be a placeholder. The Jacobian is synthesized once as gradient nodes;
/// partials of an equation with respect to a variable it does not depend on
/// are exactly zero.
pub fn solve_roots(
    graph: &mut Graph,
    equations: &[NodeId],
    variables: &[NodeId],
    initial_guess: &[f64],
    settings: NewtonSettings,
) -> Result<RootResult> {
    let dim = variables.len();
    if dim == 0 {
        bail!("No variables to solve for.");
    }
    if equations.len() != dim {
        bail!(
            "{} equation(s) given for {} variable(s); the system must be square.",
            equations.len(),
            dim
        );
    }
    if initial_guess.len() != dim {
        bail!(
            "Initial guess has {} value(s) for {} variable(s).",
            initial_guess.len(),
            dim
        );
    }
    settings.validate()?;
    for &var in variables {
        let node = graph.node(var)?;
        if node.kind() != OpKind::Placeholder {
            bail!("Variable `{}` is not a placeholder.", node.name());
        }
    }

    let system = System::build(graph, equations, variables)?;
    let mut state = DVector::from_column_slice(initial_guess);
    let (mut residual, mut jacobian) = system.evaluate(graph, &state)?;
    let mut iterations = 0usize;

    while residual.norm() > settings.tolerance {
        if iterations == settings.max_steps {
            bail!(
                "No root within {} Newton step(s); residual norm is still {}.",
                settings.max_steps,
                residual.norm()
            );
        }
        let step = jacobian
            .clone()
            .lu()
            .solve(&residual)
            .ok_or_else(|| anyhow!("Singular Jacobian at {:?}.", state.as_slice()))?;
        state.axpy(-settings.damping, &step, 1.0);
        iterations += 1;

        (residual, jacobian) = system.evaluate(graph, &state)?;
        debug!("Newton step {}: residual norm {}", iterations, residual.norm());
    }

    Ok(RootResult {
        state: state.iter().copied().collect(),
        residual_norm: residual.norm(),
        iterations,
        jacobian: jacobian.transpose().iter().copied().collect(),
    })
}

/// Scalar convenience wrapper around [`solve_roots`].
pub fn find_root(
    graph: &mut Graph,
    equation: NodeId,
    variable: NodeId,
    initial_guess: f64,
    settings: NewtonSettings,
) -> Result<f64> {
    let guess = [initial_guess];
    let result = solve_roots(graph, &[equation], &[variable], &guess, settings)?;
    Ok(result.state[0])
}

/// Equations, variables and the gradient nodes of their Jacobian, evaluated
/// together by one executor.
struct System<'a> {
    variables: &'a [NodeId],
    /// Row-major; `None` marks a structurally zero partial.
    partials: Vec<Option<NodeId>>,
    executor: Executor,
}

impl<'a> System<'a> {
    fn build(graph: &mut Graph, equations: &[NodeId], variables: &'a [NodeId]) -> Result<Self> {
        let mut partials = Vec::with_capacity(equations.len() * variables.len());
        for (row, &equation) in equations.iter().enumerate() {
            let reachable = reachable_from(graph, equation)?;
            let connected: Vec<NodeId> = variables
                .iter()
                .copied()
                .filter(|v| reachable[v.index()])
                .collect();
            let mut grads = gradients(graph, equation, &connected)
                .with_context(|| format!("Failed to differentiate equation {}.", row))?
                .into_iter();
            for var in variables {
                partials.push(if reachable[var.index()] {
                    grads.next()
                } else {
                    None
                });
            }
        }

        let mut eval_nodes = equations.to_vec();
        eval_nodes.extend(partials.iter().flatten().copied());
        Ok(Self {
            variables,
            partials,
            executor: Executor::new(eval_nodes),
        })
    }

    /// Residual vector and Jacobian matrix at `state`.
    fn evaluate(
        &self,
        graph: &Graph,
        state: &DVector<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let dim = self.variables.len();
        let feed: FeedDict = self
            .variables
            .iter()
            .zip(state.iter())
            .map(|(&var, &value)| (var, scalar(value)))
            .collect();
        let values = self
            .executor
            .run(graph, &feed)
            .context("Failed to evaluate the system.")?;

        let mut values = values.into_iter();
        let mut residual = DVector::zeros(dim);
        for i in 0..dim {
            let value = values
                .next()
                .ok_or_else(|| anyhow!("Missing value for equation {}.", i))?;
            if value.shape() != (1, 1) {
                bail!(
                    "Equation {} must evaluate to a scalar, got shape {:?}.",
                    i,
                    value.shape()
                );
            }
            residual[i] = value[(0, 0)];
        }

        let mut jacobian = DMatrix::zeros(dim, dim);
        for (k, partial) in self.partials.iter().enumerate() {
            if partial.is_some() {
                let value = values
                    .next()
                    .ok_or_else(|| anyhow!("Missing Jacobian entry {}.", k))?;
                jacobian[(k / dim, k % dim)] = value[(0, 0)];
            }
        }
        Ok((residual, jacobian))
    }
}
