//! XPath 1.0 for weft: a `nom` parser, a binding pass against a static context, and an
//! evaluator over `weft-tree` nodes.

pub mod ast;
pub mod axes;
pub mod bind;
pub mod engine;
pub mod error;
pub mod functions;
pub mod operators;
pub mod parser;
pub mod sequence;

pub use ast::{Axis, BinaryOperator, Binding, BindingScope, Expression, LocationPath, NodeTest, Step, VariableRef};
pub use bind::{BasicStaticContext, StaticContext, compile};
pub use engine::{EvaluationContext, MapHost, XPathHost, XPathValue, evaluate, evaluate_sequence};
pub use error::XPathError;
pub use parser::parse_expression;
pub use sequence::{LastPosition, LastPositionFinder, Lookahead, NodeSequence};
