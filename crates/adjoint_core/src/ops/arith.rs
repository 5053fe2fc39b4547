use super::{check_finite_scalar, inputs_of, scalar_display, EvalContext, Operator};
use crate::array::Array;
use crate::error::Result;
use crate::graph::{ConstAttr, Graph, NodeId};

pub struct Add;

impl Operator for Add {
    fn name(&self) -> &'static str {
        "Add"
    }

    fn arity(&self) -> usize {
        2
    }

    fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
        format!("({}+{})", inputs[0], inputs[1])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        ctx.same_shape(inputs[0], inputs[1])?;
        Ok(inputs[0] + inputs[1])
    }

    fn gradient(
        &self,
        _graph: &mut Graph,
        _node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        Ok(vec![output_grad, output_grad])
    }
}

pub struct AddConst;

impl Operator for AddConst {
    fn name(&self) -> &'static str {
        "AddConst"
    }

    fn arity(&self) -> usize {
        1
    }

    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        check_finite_scalar(attr).map(|_| ())
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String {
        format!("({}+{})", inputs[0], scalar_display(attr))
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        let c = ctx.node.scalar_attr()?;
        Ok(inputs[0].add_scalar(c))
    }

    fn gradient(
        &self,
        _graph: &mut Graph,
        _node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        Ok(vec![output_grad])
    }
}

pub struct Mul;

impl Operator for Mul {
    fn name(&self) -> &'static str {
        "Mul"
    }

    fn arity(&self) -> usize {
        2
    }

    fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
        format!("({}*{})", inputs[0], inputs[1])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        ctx.same_shape(inputs[0], inputs[1])?;
        Ok(inputs[0].component_mul(inputs[1]))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [a, b] = inputs_of::<2>(graph, node)?;
        let da = graph.mul(output_grad, b)?;
        let db = graph.mul(output_grad, a)?;
        Ok(vec![da, db])
    }
}

pub struct MulConst;

impl Operator for MulConst {
    fn name(&self) -> &'static str {
        "MulConst"
    }

    fn arity(&self) -> usize {
        1
    }

    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        check_finite_scalar(attr).map(|_| ())
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String {
        format!("({}*{})", inputs[0], scalar_display(attr))
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        let c = ctx.node.scalar_attr()?;
        Ok(inputs[0] * c)
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let c = graph.node(node)?.scalar_attr()?;
        Ok(vec![graph.mul(output_grad, c)?])
    }
}

/// Matrix product `op(A) · op(B)` where `op` transposes when the matching
/// flag is set.
pub struct MatMul;

impl Operator for MatMul {
    fn name(&self) -> &'static str {
        "MatMul"
    }

    fn arity(&self) -> usize {
        2
    }

    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        match attr {
            ConstAttr::Transpose { .. } => Ok(()),
            other => Err(format!("expected transpose flags, got {:?}", other)),
        }
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String {
        let (ta, tb) = match attr {
            ConstAttr::Transpose { a, b } => (*a, *b),
            _ => (false, false),
        };
        format!("MatMul({},{},{},{})", inputs[0], inputs[1], ta, tb)
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        let (ta, tb) = ctx.node.transpose_attr()?;
        let a = if ta { inputs[0].transpose() } else { inputs[0].clone() };
        let b = if tb { inputs[1].transpose() } else { inputs[1].clone() };
        if a.ncols() != b.nrows() {
            return Err(ctx.shape(a.shape(), b.shape()));
        }
        Ok(a * b)
    }

    // With Y = A·B: dA = dY·Bᵀ and dB = Aᵀ·dY. The transposed cases follow by
    // transposing those identities back onto the stored operands.
    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [a, b] = inputs_of::<2>(graph, node)?;
        let (ta, tb) = graph.node(node)?.transpose_attr()?;
        let g = output_grad;
        let (da, db) = match (ta, tb) {
            (false, false) => (graph.matmul(g, b, false, true)?, graph.matmul(a, g, true, false)?),
            (false, true) => (graph.matmul(g, b, false, false)?, graph.matmul(g, a, true, false)?),
            (true, false) => (graph.matmul(b, g, false, true)?, graph.matmul(a, g, false, false)?),
            (true, true) => (graph.matmul(b, g, true, true)?, graph.matmul(g, a, true, true)?),
        };
        Ok(vec![da, db])
    }
}

/// Elementwise `x ** c` for a constant exponent `c`.
pub struct Power;

impl Operator for Power {
    fn name(&self) -> &'static str {
        "Power"
    }

    fn arity(&self) -> usize {
        1
    }

    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        check_finite_scalar(attr).map(|_| ())
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String {
        format!("{}**{}", inputs[0], scalar_display(attr))
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        let c = ctx.node.scalar_attr()?;
        let integral = c.fract() == 0.0;
        for &v in inputs[0].iter() {
            if v < 0.0 && !integral {
                return Err(ctx.domain(format!(
                    "negative base {} with non-integer exponent {}",
                    v, c
                )));
            }
            if v == 0.0 && c < 0.0 {
                return Err(ctx.domain(format!("zero base with negative exponent {}", c)));
            }
        }
        Ok(inputs[0].map(|v| v.powf(c)))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [x] = inputs_of::<1>(graph, node)?;
        let c = graph.node(node)?.scalar_attr()?;
        if c == 0.0 {
            return Ok(vec![graph.zeros_like(x)?]);
        }
        let lowered = graph.pow(x, c - 1.0)?;
        let slope = graph.mul(lowered, c)?;
        Ok(vec![graph.mul(output_grad, slope)?])
    }
}
