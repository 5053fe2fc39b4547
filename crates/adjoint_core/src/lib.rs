/// The `adjoint_core` crate builds symbolic computation graphs and
/// differentiates them in reverse mode.
///
/// Key components:
/// - **Graph**: An append-only arena of operator nodes addressed by `NodeId`.
/// - **Operators**: A registry of stateless operators, each with a forward rule and a
///   gradient rule that emits new nodes.
/// - **Executor**: Evaluates requested nodes in topological order against a feed of
///   placeholder values.
/// - **Gradients**: Synthesizes gradient nodes for any set of inputs, so gradients
///   can themselves be evaluated or differentiated again.
/// - **Drivers**: A Newton root solver, a finite-difference gradient check and an
///   infix expression parser built on top of the graph.
pub mod array;
pub mod error;
pub mod executor;
pub mod gradcheck;
pub mod gradient;
pub mod graph;
pub mod newton;
pub mod ops;
pub mod parser;
pub mod topo;

pub use array::Array;
pub use error::{GraphError, Result};
pub use executor::{Executor, ExecutorSettings, FeedDict};
pub use gradcheck::{check_gradients, numerical_gradient, GradCheckReport, GradCheckSettings};
pub use gradient::gradients;
pub use graph::{ConstAttr, Graph, Node, NodeId, NodeInfo, Operand};
pub use newton::{find_root, solve_roots, NewtonSettings, RootResult};
pub use ops::{OpKind, Operator};
pub use parser::{parse_expression, parse_with_variables, ParsedExpression};
pub use topo::find_topo_sort;
