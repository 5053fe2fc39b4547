use super::{inputs_of, EvalContext, Operator};
use crate::array::{self, Array};
use crate::error::{GraphError, Result};
use crate::graph::{ConstAttr, Graph, NodeId};

/// Elementwise near-equality within the executor's absolute tolerance.
/// Produces a 0/1 mask and has no gradient.
pub struct Equal;

impl Operator for Equal {
    fn name(&self) -> &'static str {
        "Equal"
    }

    fn arity(&self) -> usize {
        2
    }

    fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
        format!("({}=={})", inputs[0], inputs[1])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        ctx.same_shape(inputs[0], inputs[1])?;
        Ok(array::near_equal(
            inputs[0],
            inputs[1],
            ctx.settings.equality_tolerance,
        ))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        _output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let n = graph.node(node)?;
        Err(GraphError::NonDifferentiable {
            node,
            name: n.name().to_string(),
            op: self.name(),
        })
    }
}

/// A leaf whose value comes from the feed.
pub struct Placeholder;

impl Operator for Placeholder {
    fn name(&self) -> &'static str {
        "Placeholder"
    }

    fn arity(&self) -> usize {
        0
    }

    fn display_name(&self, _inputs: &[String], _attr: &ConstAttr) -> String {
        "placeholder".to_string()
    }

    fn compute(&self, ctx: &EvalContext<'_>, _inputs: &[&Array]) -> Result<Array> {
        Err(GraphError::UnboundPlaceholder {
            node: ctx.id,
            name: ctx.node.name().to_string(),
        })
    }

    fn gradient(
        &self,
        _graph: &mut Graph,
        _node: NodeId,
        _output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        Ok(Vec::new())
    }
}

pub struct OnesLike;

impl Operator for OnesLike {
    fn name(&self) -> &'static str {
        "OnesLike"
    }

    fn arity(&self) -> usize {
        1
    }

    fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
        format!("Oneslike({})", inputs[0])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        Ok(array::ones_like(inputs[0]))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        _output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [x] = inputs_of::<1>(graph, node)?;
        Ok(vec![graph.zeros_like(x)?])
    }
}

pub struct ZerosLike;

impl Operator for ZerosLike {
    fn name(&self) -> &'static str {
        "ZerosLike"
    }

    fn arity(&self) -> usize {
        1
    }

    fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
        format!("Zeroslike({})", inputs[0])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        Ok(array::zeros_like(inputs[0]))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        _output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [x] = inputs_of::<1>(graph, node)?;
        Ok(vec![graph.zeros_like(x)?])
    }
}
