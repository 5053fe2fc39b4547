use crate::error::{GraphError, Result};
use crate::ops::OpKind;
use serde::{Deserialize, Serialize};
use std::f64::consts::E;
use std::fmt;

/// Operand names longer than this are replaced by the operand id in
/// display names, which otherwise grow exponentially on shared subgraphs.
const MAX_OPERAND_NAME_LEN: usize = 64;

/// Index of a node inside its owning [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Operator-specific constant payload stored on a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConstAttr {
    None,
    /// Constant operand, exponent or base.
    Scalar(f64),
    /// Transposition flags applied to the matmul operands before multiplying.
    Transpose { a: bool, b: bool },
}

/// A graph vertex. Immutable once pushed into the arena.
#[derive(Debug, Clone)]
pub struct Node {
    kind: OpKind,
    inputs: Vec<NodeId>,
    attr: ConstAttr,
    name: String,
}

impl Node {
    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn attr(&self) -> ConstAttr {
        self.attr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn scalar_attr(&self) -> Result<f64> {
        match self.attr {
            ConstAttr::Scalar(value) => Ok(value),
            other => Err(GraphError::InvalidAttribute {
                op: self.kind.operator().name(),
                reason: format!("expected a scalar attribute, found {:?}", other),
            }),
        }
    }

    pub(crate) fn transpose_attr(&self) -> Result<(bool, bool)> {
        match self.attr {
            ConstAttr::Transpose { a, b } => Ok((a, b)),
            other => Err(GraphError::InvalidAttribute {
                op: self.kind.operator().name(),
                reason: format!("expected transpose flags, found {:?}", other),
            }),
        }
    }
}

/// Second operand of an arithmetic call: either another node or a constant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Node(NodeId),
    Const(f64),
}

impl From<NodeId> for Operand {
    fn from(id: NodeId) -> Self {
        Operand::Node(id)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Const(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Const(f64::from(value))
    }
}

/// Serializable view of one node, as returned by [`Graph::describe`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    pub op: OpKind,
    pub inputs: Vec<NodeId>,
    pub attr: ConstAttr,
    pub name: String,
}

/// Append-only arena of nodes.
///
/// Nodes can only reference nodes pushed before them, so the graph is a DAG
/// by construction. Structurally identical nodes are never merged.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownNode(id))
    }

    /// Unchecked access for ids that were already validated, or that were
    /// read from the inputs of a validated node.
    pub(crate) fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Drops every node from index `len` on. Only used to discard nodes
    /// appended by a failed multi-node construction.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    pub fn describe(&self) -> Vec<NodeInfo> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| NodeInfo {
                id: NodeId(i),
                op: node.kind,
                inputs: node.inputs.clone(),
                attr: node.attr,
                name: node.name.clone(),
            })
            .collect()
    }

    /// Creates a named placeholder leaf whose value is supplied at evaluation time.
    pub fn variable(&mut self, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind: OpKind::Placeholder,
            inputs: Vec::new(),
            attr: ConstAttr::None,
            name: name.into(),
        });
        id
    }

    /// Validates arity, operands and attribute, then appends a new node.
    pub fn apply(&mut self, kind: OpKind, inputs: &[NodeId], attr: ConstAttr) -> Result<NodeId> {
        let op = kind.operator();
        if inputs.len() != op.arity() {
            return Err(GraphError::Arity {
                op: op.name(),
                expected: op.arity(),
                actual: inputs.len(),
            });
        }
        for &input in inputs {
            self.node(input)?;
        }
        op.check_attr(&attr)
            .map_err(|reason| GraphError::InvalidAttribute {
                op: op.name(),
                reason,
            })?;

        let operand_names: Vec<String> = inputs.iter().map(|&id| self.operand_name(id)).collect();
        let name = op.display_name(&operand_names, &attr);

        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            inputs: inputs.to_vec(),
            attr,
            name,
        });
        Ok(id)
    }

    fn operand_name(&self, id: NodeId) -> String {
        let name = &self.nodes[id.0].name;
        if name.len() > MAX_OPERAND_NAME_LEN {
            id.to_string()
        } else {
            name.clone()
        }
    }

    fn unary(&mut self, kind: OpKind, a: NodeId) -> Result<NodeId> {
        self.apply(kind, &[a], ConstAttr::None)
    }

    fn with_const(&mut self, kind: OpKind, a: NodeId, value: f64) -> Result<NodeId> {
        self.apply(kind, &[a], ConstAttr::Scalar(value))
    }

    // --- Primitive operators ---

    pub fn add(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        match b.into() {
            Operand::Node(b) => self.apply(OpKind::Add, &[a, b], ConstAttr::None),
            Operand::Const(c) => self.with_const(OpKind::AddConst, a, c),
        }
    }

    pub fn mul(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        match b.into() {
            Operand::Node(b) => self.apply(OpKind::Mul, &[a, b], ConstAttr::None),
            Operand::Const(c) => self.with_const(OpKind::MulConst, a, c),
        }
    }

    pub fn matmul(&mut self, a: NodeId, b: NodeId, trans_a: bool, trans_b: bool) -> Result<NodeId> {
        self.apply(
            OpKind::MatMul,
            &[a, b],
            ConstAttr::Transpose {
                a: trans_a,
                b: trans_b,
            },
        )
    }

    /// Elementwise `a ** exponent` for a constant exponent.
    pub fn pow(&mut self, a: NodeId, exponent: f64) -> Result<NodeId> {
        self.with_const(OpKind::Power, a, exponent)
    }

    /// Elementwise `base ** a` for a constant positive base.
    pub fn exp_base(&mut self, base: f64, a: NodeId) -> Result<NodeId> {
        self.with_const(OpKind::Exp, a, base)
    }

    /// Elementwise logarithm of `a` in a constant base.
    pub fn log_base(&mut self, base: f64, a: NodeId) -> Result<NodeId> {
        self.with_const(OpKind::Log, a, base)
    }

    pub fn sin(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Sin, a)
    }

    pub fn cos(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Cos, a)
    }

    pub fn tan(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Tan, a)
    }

    pub fn sinh(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Sinh, a)
    }

    pub fn cosh(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Cosh, a)
    }

    pub fn tanh(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Tanh, a)
    }

    pub fn arcsin(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::ArcSin, a)
    }

    pub fn arccos(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::ArcCos, a)
    }

    pub fn arctan(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::ArcTan, a)
    }

    pub fn logistic(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::Logistic, a)
    }

    pub fn ones_like(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::OnesLike, a)
    }

    pub fn zeros_like(&mut self, a: NodeId) -> Result<NodeId> {
        self.unary(OpKind::ZerosLike, a)
    }

    /// Elementwise near-equality mask. Comparing against a constant compares
    /// against `OnesLike(a) * c`.
    pub fn eq(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        let b = match b.into() {
            Operand::Node(b) => b,
            Operand::Const(c) => {
                let ones = self.ones_like(a)?;
                self.mul(ones, c)?
            }
        };
        self.apply(OpKind::Equal, &[a, b], ConstAttr::None)
    }

    // --- Sugar, composed from the primitives above ---

    pub fn neg(&mut self, a: NodeId) -> Result<NodeId> {
        self.mul(a, -1.0)
    }

    /// `a - b`
    pub fn sub(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        match b.into() {
            Operand::Node(b) => {
                let neg_b = self.neg(b)?;
                self.add(a, neg_b)
            }
            Operand::Const(c) => self.add(a, -c),
        }
    }

    /// `b - a`
    pub fn rsub(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        let neg_a = self.neg(a)?;
        self.add(neg_a, b)
    }

    /// `a / b`
    pub fn div(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        match b.into() {
            Operand::Node(b) => {
                let recip = self.pow(b, -1.0)?;
                self.mul(a, recip)
            }
            Operand::Const(c) if c == 0.0 => Err(GraphError::InvalidAttribute {
                op: "Div",
                reason: format!("division of `{}` by constant zero", self.node(a)?.name()),
            }),
            Operand::Const(c) => self.mul(a, 1.0 / c),
        }
    }

    /// `b / a`
    pub fn rdiv(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        let recip = self.pow(a, -1.0)?;
        self.mul(recip, b)
    }

    pub fn sqrt(&mut self, a: NodeId) -> Result<NodeId> {
        self.pow(a, 0.5)
    }

    pub fn exp(&mut self, a: NodeId) -> Result<NodeId> {
        self.exp_base(E, a)
    }

    pub fn ln(&mut self, a: NodeId) -> Result<NodeId> {
        self.log_base(E, a)
    }

    /// Elementwise "not near-equal" mask: `(a == b) == 0`.
    pub fn ne(&mut self, a: NodeId, b: impl Into<Operand>) -> Result<NodeId> {
        let equal = self.eq(a, b)?;
        self.eq(equal, 0.0)
    }
}
