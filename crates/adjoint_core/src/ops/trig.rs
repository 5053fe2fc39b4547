//! Trigonometric and hyperbolic functions. Each derivative is expressed
//! through companion operators so the gradient stays a graph.

use super::{inputs_of, EvalContext, Operator};
use crate::array::Array;
use crate::error::Result;
use crate::graph::{ConstAttr, Graph, NodeId};

macro_rules! elementwise_unary {
    ($op:ident, $label:literal, $fmt:literal, $eval:expr, $slope:expr) => {
        pub struct $op;

        impl Operator for $op {
            fn name(&self) -> &'static str {
                $label
            }

            fn arity(&self) -> usize {
                1
            }

            fn display_name(&self, inputs: &[String], _attr: &ConstAttr) -> String {
                format!($fmt, inputs[0])
            }

            fn compute(&self, ctx: &EvalContext<'_>, inputs: &[&Array]) -> Result<Array> {
                ctx.check_arity(inputs)?;
                let check: fn(&EvalContext<'_>, &Array) -> Result<()> = $eval.0;
                check(ctx, inputs[0])?;
                let f: fn(f64) -> f64 = $eval.1;
                Ok(inputs[0].map(f))
            }

            fn gradient(
                &self,
                graph: &mut Graph,
                node: NodeId,
                output_grad: NodeId,
            ) -> Result<Vec<NodeId>> {
                let [x] = inputs_of::<1>(graph, node)?;
                let slope: fn(&mut Graph, NodeId) -> Result<NodeId> = $slope;
                let slope = slope(graph, x)?;
                Ok(vec![graph.mul(output_grad, slope)?])
            }
        }
    };
}

fn any_input(_ctx: &EvalContext<'_>, _x: &Array) -> Result<()> {
    Ok(())
}

fn open_unit_interval(ctx: &EvalContext<'_>, x: &Array) -> Result<()> {
    if let Some(v) = x.iter().find(|v| !(**v > -1.0 && **v < 1.0)) {
        return Err(ctx.domain(format!("input must lie in (-1, 1), got {}", v)));
    }
    Ok(())
}

/// `(1 - x^2)^-0.5`
fn inverse_sqrt_one_minus_square(graph: &mut Graph, x: NodeId) -> Result<NodeId> {
    let square = graph.pow(x, 2.0)?;
    let complement = graph.rsub(square, 1.0)?;
    graph.pow(complement, -0.5)
}

elementwise_unary!(Sin, "Sin", "sin({})", (any_input, f64::sin), |g, x| g.cos(x));

elementwise_unary!(Cos, "Cos", "cos({})", (any_input, f64::cos), |g, x| {
    let s = g.sin(x)?;
    g.neg(s)
});

elementwise_unary!(Tan, "Tan", "tan({})", (any_input, f64::tan), |g, x| {
    let c = g.cos(x)?;
    g.pow(c, -2.0)
});

elementwise_unary!(Sinh, "Sinh", "sinh({})", (any_input, f64::sinh), |g, x| g.cosh(x));

elementwise_unary!(Cosh, "Cosh", "cosh({})", (any_input, f64::cosh), |g, x| g.sinh(x));

elementwise_unary!(Tanh, "Tanh", "tanh({})", (any_input, f64::tanh), |g, x| {
    let c = g.cosh(x)?;
    g.pow(c, -2.0)
});

elementwise_unary!(
    ArcSin,
    "ArcSin",
    "arcsin({})",
    (open_unit_interval, f64::asin),
    inverse_sqrt_one_minus_square
);

elementwise_unary!(
    ArcCos,
    "ArcCos",
    "arccos({})",
    (open_unit_interval, f64::acos),
    |g, x| {
        let slope = inverse_sqrt_one_minus_square(g, x)?;
        g.neg(slope)
    }
);

elementwise_unary!(ArcTan, "ArcTan", "arctan({})", (any_input, f64::atan), |g, x| {
    let square = g.pow(x, 2.0)?;
    let denom = g.add(square, 1.0)?;
    g.pow(denom, -1.0)
});
