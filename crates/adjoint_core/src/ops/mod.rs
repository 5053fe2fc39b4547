//! The operator registry.
//!
//! Each operator is a zero-sized value implementing [`Operator`]; nodes only
//! store the [`OpKind`] tag and resolve it through [`OpKind::operator`].
//! Gradient rules never compute numbers: they append new nodes to the graph
//! that evaluate to the contribution for each input.

mod arith;
mod special;
mod transcendental;
mod trig;

use crate::array::Array;
use crate::error::{GraphError, Result};
use crate::executor::ExecutorSettings;
use crate::graph::{ConstAttr, Graph, Node, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Add,
    AddConst,
    Mul,
    MulConst,
    MatMul,
    Power,
    Exp,
    Log,
    Sin,
    Cos,
    Tan,
    Sinh,
    Cosh,
    Tanh,
    ArcSin,
    ArcCos,
    ArcTan,
    Logistic,
    Equal,
    Placeholder,
    OnesLike,
    ZerosLike,
}

impl OpKind {
    pub fn operator(self) -> &'static dyn Operator {
        match self {
            OpKind::Add => &arith::Add,
            OpKind::AddConst => &arith::AddConst,
            OpKind::Mul => &arith::Mul,
            OpKind::MulConst => &arith::MulConst,
            OpKind::MatMul => &arith::MatMul,
            OpKind::Power => &arith::Power,
            OpKind::Exp => &transcendental::Exp,
            OpKind::Log => &transcendental::Log,
            OpKind::Logistic => &transcendental::Logistic,
            OpKind::Sin => &trig::Sin,
            OpKind::Cos => &trig::Cos,
            OpKind::Tan => &trig::Tan,
            OpKind::Sinh => &trig::Sinh,
            OpKind::Cosh => &trig::Cosh,
            OpKind::Tanh => &trig::Tanh,
            OpKind::ArcSin => &trig::ArcSin,
            OpKind::ArcCos => &trig::ArcCos,
            OpKind::ArcTan => &trig::ArcTan,
            OpKind::Equal => &special::Equal,
            OpKind::Placeholder => &special::Placeholder,
            OpKind::OnesLike => &special::OnesLike,
            OpKind::ZerosLike => &special::ZerosLike,
        }
    }
}

/// The three-part contract every operator variant fulfils.
pub trait Operator: Sync {
    fn name(&self) -> &'static str;

    /// Exact number of inputs a node of this kind takes.
    fn arity(&self) -> usize;

    /// Checks the constant attribute at construction time.
    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        match attr {
            ConstAttr::None => Ok(()),
            other => Err(format!("takes no attribute, got {:?}", other)),
        }
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String;

    /// Computes the node value from the values of its inputs.
    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array>;

    /// Returns one gradient node per input, in input order, given the node
    /// holding the summed gradient of this node's output.
    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>>;
}

/// The node being evaluated, passed to [`Operator::compute`].
pub struct EvalContext<'a> {
    pub id: NodeId,
    pub node: &'a Node,
    pub settings: &'a ExecutorSettings,
}

impl EvalContext<'_> {
    fn op_name(&self) -> &'static str {
        self.node.kind().operator().name()
    }

    pub fn check_arity(&self, inputs: &[&Array]) -> Result<()> {
        let expected = self.node.kind().operator().arity();
        if inputs.len() != expected {
            return Err(GraphError::Arity {
                op: self.op_name(),
                expected,
                actual: inputs.len(),
            });
        }
        Ok(())
    }

    pub fn domain(&self, reason: impl Into<String>) -> GraphError {
        GraphError::Domain {
            node: self.id,
            name: self.node.name().to_string(),
            op: self.op_name(),
            reason: reason.into(),
        }
    }

    pub fn shape(&self, lhs: (usize, usize), rhs: (usize, usize)) -> GraphError {
        GraphError::Shape {
            node: self.id,
            name: self.node.name().to_string(),
            op: self.op_name(),
            lhs,
            rhs,
        }
    }

    fn same_shape(&self, a: &Array, b: &Array) -> Result<()> {
        if a.shape() != b.shape() {
            return Err(self.shape(a.shape(), b.shape()));
        }
        Ok(())
    }
}

/// Reads the inputs of `node` as a fixed-size array.
pub(crate) fn inputs_of<const N: usize>(graph: &Graph, node: NodeId) -> Result<[NodeId; N]> {
    let n = graph.node(node)?;
    <[NodeId; N]>::try_from(n.inputs()).map_err(|_| GraphError::Arity {
        op: n.kind().operator().name(),
        expected: N,
        actual: n.inputs().len(),
    })
}

fn check_finite_scalar(attr: &ConstAttr) -> std::result::Result<f64, String> {
    match attr {
        ConstAttr::Scalar(value) if value.is_finite() => Ok(*value),
        ConstAttr::Scalar(value) => Err(format!("constant must be finite, got {}", value)),
        other => Err(format!("expected a scalar constant, got {:?}", other)),
    }
}

fn scalar_display(attr: &ConstAttr) -> String {
    match attr {
        ConstAttr::Scalar(value) => value.to_string(),
        other => format!("{:?}", other),
    }
}
