use super::{inputs_of, scalar_display, EvalContext, Operator};
use crate::array::Array;
use crate::error::Result;
use crate::graph::{ConstAttr, Graph, NodeId};
use std::f64::consts::E;

fn check_base(attr: &ConstAttr, allow_one: bool) -> std::result::Result<(), String> {
    match attr {
        ConstAttr::Scalar(base) if base.is_finite() && *base > 0.0 => {
            if !allow_one && *base == 1.0 {
                Err("base must not be 1".to_string())
            } else {
                Ok(())
            }
        }
        ConstAttr::Scalar(base) => Err(format!("base must be finite and positive, got {}", base)),
        other => Err(format!("expected a scalar base, got {:?}", other)),
    }
}

/// Elementwise `base ** x` for a constant base.
pub struct Exp;

impl Operator for Exp {
    fn name(&self) -> &'static str {
        "Exp"
    }

    fn arity(&self) -> usize {
        1
    }

    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        check_base(attr, true)
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String {
        format!("{}**{}", scalar_display(attr), inputs[0])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        let base = ctx.node.scalar_attr()?;
        Ok(inputs[0].map(|v| base.powf(v)))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [x] = inputs_of::<1>(graph, node)?;
        let base = graph.node(node)?.scalar_attr()?;
        let power = graph.exp_base(base, x)?;
        let slope = graph.mul(power, base.ln())?;
        Ok(vec![graph.mul(output_grad, slope)?])
    }
}

/// Elementwise logarithm in a constant base.
pub struct Log;

impl Operator for Log {
    fn name(&self) -> &'static str {
        "Log"
    }

    fn arity(&self) -> usize {
        1
    }

    fn check_attr(&self, attr: &ConstAttr) -> std::result::Result<(), String> {
        check_base(attr, false)
    }

    fn display_name(&self, inputs: &[String], attr: &ConstAttr) -> String {
        format!("log({},{})", scalar_display(attr), inputs[0])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        let base = ctx.node.scalar_attr()?;
        if let Some(v) = inputs[0].iter().find(|v| !(**v > 0.0)) {
            return Err(ctx.domain(format!("input must be strictly positive, got {}", v)));
        }
        let scale = base.ln();
        Ok(inputs[0].map(|v| v.ln() / scale))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [x] = inputs_of::<1>(graph, node)?;
        let base = graph.node(node)?.scalar_attr()?;
        let scaled = graph.mul(x, base.ln())?;
        let slope = graph.pow(scaled, -1.0)?;
        Ok(vec![graph.mul(output_grad, slope)?])
    }
}

/// Elementwise `1 / (1 + e^-x)`.
pub struct Logistic;

impl Operator for Logistic {
    fn name(&self) -> &'static str {
        "Logistic"
    }

    fn arity(&self) -> usize {
        1
    }

    fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
        format!("logistic({})", inputs[0])
    }

    fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
        ctx.check_arity(inputs)?;
        Ok(inputs[0].map(|v| 1.0 / (1.0 + (-v).exp())))
    }

    fn gradient(
        &self,
        graph: &mut Graph,
        node: NodeId,
        output_grad: NodeId,
    ) -> Result<Vec<NodeId>> {
        let [x] = inputs_of::<1>(graph, node)?;
        let neg_x = graph.neg(x)?;
        let decay = graph.exp_base(E, neg_x)?;
        let denom = graph.add(decay, 1.0)?;
        let sigma = graph.pow(denom, -1.0)?;
        let complement = graph.rsub(sigma, 1.0)?;
        let slope = graph.mul(sigma, complement)?;
        Ok(vec![graph.mul(output_grad, slope)?])
    }
}
