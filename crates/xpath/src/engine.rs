//! The evaluation engine for executing a bound XPath AST against `weft-tree` nodes.

use crate::ast::{Axis, BinaryOperator, Expression, LocationPath, Step, UnaryOperator, VariableRef};
use crate::axes;
use crate::error::XPathError;
use crate::functions;
use crate::operators;
use crate::sequence::{LastPosition, NodeSequence};
use std::collections::HashMap;
use std::fmt;
use weft_tree::Node;

/// Represents the possible result types of an XPath expression evaluation.
///
/// A result tree fragment travels as a node-set holding the fragment's document node.
#[derive(Debug, Clone, PartialEq)]
pub enum XPathValue {
    NodeSet(Vec<Node>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl XPathValue {
    pub fn empty() -> Self {
        XPathValue::NodeSet(Vec::new())
    }

    /// Coerces the value to a boolean as per XPath 1.0 rules.
    pub fn to_bool(&self) -> bool {
        match self {
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::Number(n) => *n != 0.0 && !n.is_nan(),
            XPathValue::Boolean(b) => *b,
        }
    }

    /// Coerces the value to a number as per XPath 1.0 rules.
    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::String(s) => string_to_number(s),
            XPathValue::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            XPathValue::NodeSet(nodes) => nodes
                .first()
                .map(|n| string_to_number(&n.string_value()))
                .unwrap_or(f64::NAN),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            XPathValue::NodeSet(_) => "node-set",
            XPathValue::String(_) => "string",
            XPathValue::Number(_) => "number",
            XPathValue::Boolean(_) => "boolean",
        }
    }

    pub fn into_nodes(self) -> Result<Vec<Node>, XPathError> {
        match self {
            XPathValue::NodeSet(nodes) => Ok(nodes),
            other => Err(XPathError::TypeError(format!(
                "expected a node-set, found a {}",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for XPathValue {
    /// Coerces the value to a string as per XPath 1.0 rules.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XPathValue::NodeSet(nodes) => match nodes.first() {
                Some(node) => f.write_str(&node.string_value()),
                None => Ok(()),
            },
            XPathValue::String(s) => f.write_str(s),
            XPathValue::Number(n) => f.write_str(&format_number(*n)),
            XPathValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Parses a string as an XPath number: optional minus, digits, optional fraction.
/// Anything else, including exponents and a leading plus, is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let unsigned = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut digits = 0;
    let mut dots = 0;
    for c in unsigned.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return f64::NAN,
        }
    }
    if digits == 0 || dots > 1 {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Formats a number the way XPath's `string()` does.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// The focus an expression is evaluated in.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub context_node: Node,
    /// 1-based.
    pub position: usize,
    pub last: LastPosition,
}

impl EvaluationContext {
    /// A focus on a single node: position 1 of 1.
    pub fn new(context_node: Node) -> Self {
        Self {
            context_node,
            position: 1,
            last: LastPosition::Known(1),
        }
    }

    pub fn at(context_node: Node, position: usize, last: LastPosition) -> Self {
        Self {
            context_node,
            position,
            last,
        }
    }

    pub fn last(&self) -> usize {
        self.last.resolve()
    }
}

/// Supplies what the expression language leaves to its host: variable values and
/// functions beyond the core library.
pub trait XPathHost {
    fn variable(&mut self, var: &VariableRef) -> Result<XPathValue, XPathError>;

    fn call_function(
        &mut self,
        name: &str,
        _args: Vec<XPathValue>,
        _ctx: &EvaluationContext,
    ) -> Result<XPathValue, XPathError> {
        Err(XPathError::UnknownFunction(name.to_string()))
    }
}

/// A host that resolves variables by name from a map.
#[derive(Default)]
pub struct MapHost {
    variables: HashMap<String, XPathValue>,
}

impl MapHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: &str, value: XPathValue) -> Self {
        self.variables.insert(name.to_string(), value);
        self
    }
}

impl XPathHost for MapHost {
    fn variable(&mut self, var: &VariableRef) -> Result<XPathValue, XPathError> {
        self.variables
            .get(&var.name)
            .cloned()
            .ok_or_else(|| XPathError::UnknownVariable(var.name.clone()))
    }
}

/// Evaluates an expression and returns a concrete `XPathValue`.
pub fn evaluate(
    expr: &Expression,
    ctx: &EvaluationContext,
    host: &mut dyn XPathHost,
) -> Result<XPathValue, XPathError> {
    match expr {
        Expression::Literal(s) => Ok(XPathValue::String(s.clone())),
        Expression::Number(n) => Ok(XPathValue::Number(*n)),
        Expression::LocationPath(path) => {
            Ok(XPathValue::NodeSet(evaluate_location_path(path, ctx, host)?))
        }
        Expression::Filter {
            primary,
            predicates,
        } => {
            let mut nodes = evaluate(primary, ctx, host)?.into_nodes()?;
            nodes.sort();
            nodes.dedup();
            Ok(XPathValue::NodeSet(apply_predicates(nodes, predicates, host)?))
        }
        Expression::Variable(var) => host.variable(var),
        Expression::FunctionCall { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, ctx, host)?);
            }
            if functions::is_core_function(name) {
                functions::call_core(name, values, ctx)
            } else {
                host.call_function(name, values, ctx)
            }
        }
        Expression::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => Ok(XPathValue::Boolean(
                evaluate(left, ctx, host)?.to_bool() && evaluate(right, ctx, host)?.to_bool(),
            )),
            BinaryOperator::Or => Ok(XPathValue::Boolean(
                evaluate(left, ctx, host)?.to_bool() || evaluate(right, ctx, host)?.to_bool(),
            )),
            _ => {
                let left_val = evaluate(left, ctx, host)?;
                let right_val = evaluate(right, ctx, host)?;
                operators::evaluate(*op, left_val, right_val)
            }
        },
        Expression::UnaryOp { op, expr } => {
            let val = evaluate(expr, ctx, host)?;
            match op {
                UnaryOperator::Minus => Ok(XPathValue::Number(-val.to_number())),
            }
        }
    }
}

/// Evaluates an expression that must produce nodes. A single predicate-free step along a
/// forward axis is returned lazily; everything else is materialized in document order.
pub fn evaluate_sequence(
    expr: &Expression,
    ctx: &EvaluationContext,
    host: &mut dyn XPathHost,
) -> Result<NodeSequence, XPathError> {
    if let Expression::LocationPath(path) = expr {
        if let Some(step) = lazy_step(path) {
            log::trace!("evaluating {:?} step lazily", step.axis);
            let principal = axes::principal_node_type(step.axis);
            let test = step.node_test.clone();
            let walk = axes::axis_iter(&ctx.context_node, step.axis)
                .filter(move |n| axes::matches_node_test(n, &test, principal));
            return Ok(NodeSequence::Lazy(Box::new(walk)));
        }
    }
    let nodes = evaluate(expr, ctx, host)?.into_nodes()?;
    Ok(NodeSequence::from_vec(nodes))
}

fn lazy_step(path: &LocationPath) -> Option<&Step> {
    match path.steps.as_slice() {
        [step]
            if path.start_point.is_none()
                && !path.is_absolute
                && step.predicates.is_empty()
                && !step.axis.is_reverse()
                && step.axis != Axis::Namespace =>
        {
            Some(step)
        }
        _ => None,
    }
}

fn evaluate_location_path(
    path: &LocationPath,
    ctx: &EvaluationContext,
    host: &mut dyn XPathHost,
) -> Result<Vec<Node>, XPathError> {
    let mut current = if let Some(start) = &path.start_point {
        let mut nodes = evaluate(start, ctx, host)?.into_nodes()?;
        nodes.sort();
        nodes.dedup();
        nodes
    } else if path.is_absolute {
        vec![ctx.context_node.root()]
    } else {
        vec![ctx.context_node.clone()]
    };
    for step in &path.steps {
        current = evaluate_step(step, &current, host)?;
    }
    Ok(current)
}

/// Applies one step to every input node. Predicates are evaluated per input node, with
/// proximity positions counted along the axis.
pub(crate) fn evaluate_step(
    step: &Step,
    inputs: &[Node],
    host: &mut dyn XPathHost,
) -> Result<Vec<Node>, XPathError> {
    let principal = axes::principal_node_type(step.axis);
    let mut result = Vec::new();
    for node in inputs {
        let candidates: Vec<Node> = axes::axis_iter(node, step.axis)
            .filter(|n| axes::matches_node_test(n, &step.node_test, principal))
            .collect();
        result.extend(apply_predicates(candidates, &step.predicates, host)?);
    }
    if inputs.len() > 1 || step.axis.is_reverse() {
        result.sort();
        result.dedup();
    }
    Ok(result)
}

/// Filters `nodes` (in the order positions count along) by each predicate in turn.
pub fn apply_predicates(
    mut nodes: Vec<Node>,
    predicates: &[Expression],
    host: &mut dyn XPathHost,
) -> Result<Vec<Node>, XPathError> {
    for predicate in predicates {
        let size = nodes.len();
        let mut kept = Vec::with_capacity(size);
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = EvaluationContext::at(node, i + 1, LastPosition::Known(size));
            let value = evaluate(predicate, &focus, host)?;
            if predicate_holds(&value, i + 1) {
                kept.push(focus.context_node);
            }
        }
        nodes = kept;
    }
    Ok(nodes)
}

/// A numeric predicate value selects by position; anything else is converted to boolean.
pub fn predicate_holds(value: &XPathValue, position: usize) -> bool {
    match value {
        XPathValue::Number(n) => *n == position as f64,
        other => other.to_bool(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use weft_tree::{NamePool, parse_document};

    fn doc_context(xml: &str) -> EvaluationContext {
        let pool = NamePool::new();
        let doc = parse_document(xml, &pool).unwrap();
        EvaluationContext::new(doc.root())
    }

    fn eval(xpath: &str, ctx: &EvaluationContext) -> XPathValue {
        let expr = parse_expression(xpath).unwrap();
        evaluate(&expr, ctx, &mut MapHost::new()).unwrap()
    }

    fn names(value: XPathValue) -> Vec<String> {
        value
            .into_nodes()
            .unwrap()
            .into_iter()
            .map(|n| n.display_name())
            .collect()
    }

    #[test]
    fn test_predicate_by_attribute_and_position() {
        let ctx = doc_context("<doc><para id='p1'/><para id='p2'/><note/></doc>");
        let found = eval("/doc/para[@id='p2']", &ctx).into_nodes().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].string_value(), "");
        assert_eq!(names(eval("doc/*[2]", &ctx)), vec!["para"]);
        assert_eq!(names(eval("doc/*[last()]", &ctx)), vec!["note"]);
        assert_eq!(names(eval("doc/*[position() > 1]", &ctx)).len(), 2);
    }

    #[test]
    fn test_predicates_count_per_context_node() {
        let ctx = doc_context("<r><s><i>a</i><i>b</i></s><s><i>c</i></s></r>");
        let firsts = eval("//s/i[1]", &ctx).into_nodes().unwrap();
        let values: Vec<_> = firsts.iter().map(|n| n.string_value()).collect();
        assert_eq!(values, vec!["a", "c"]);
        assert_eq!(eval("(//i)[1]", &ctx).to_string(), "a");
        assert_eq!(eval("(//i)[last()]", &ctx).to_string(), "c");
    }

    #[test]
    fn test_reverse_axis_positions() {
        let ctx = doc_context("<r><a/><b/><c/></r>");
        assert_eq!(names(eval("/r/c/preceding-sibling::*[1]", &ctx)), vec!["b"]);
        assert_eq!(names(eval("/r/c/preceding-sibling::*", &ctx)), vec!["a", "b"]);
        assert_eq!(names(eval("//c/ancestor::*[1]", &ctx)), vec!["r"]);
    }

    #[test]
    fn test_unions_are_in_document_order() {
        let ctx = doc_context("<r><a/><b/><c/></r>");
        assert_eq!(names(eval("//c | //a | //a", &ctx)), vec!["a", "c"]);
    }

    #[test]
    fn test_variable_evaluation() {
        let ctx = doc_context("<r><a>1</a><a>2</a></r>");
        let items = eval("/r/a", &ctx);
        let mut host = MapHost::new()
            .with_variable("items", items)
            .with_variable("label", XPathValue::String("total".into()));
        let expr = parse_expression("concat($label, ':', sum($items))").unwrap();
        assert_eq!(evaluate(&expr, &ctx, &mut host).unwrap().to_string(), "total:3");
        let expr = parse_expression("$items[2]/text()").unwrap();
        assert_eq!(evaluate(&expr, &ctx, &mut host).unwrap().to_string(), "2");
        let expr = parse_expression("$missing").unwrap();
        assert!(matches!(
            evaluate(&expr, &ctx, &mut host),
            Err(XPathError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_number_conversions() {
        assert_eq!(string_to_number(" 12.5 "), 12.5);
        assert_eq!(string_to_number("-3"), -3.0);
        assert!(string_to_number("1e3").is_nan());
        assert!(string_to_number("+1").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("").is_nan());
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(1e21), "1000000000000000000000");
    }

    #[test]
    fn test_lazy_sequence_for_simple_steps() {
        let ctx = doc_context("<r><a/><b/></r>");
        let focus = EvaluationContext::new(ctx.context_node.first_child().unwrap());
        let lazy = evaluate_sequence(&parse_expression("*").unwrap(), &focus, &mut MapHost::new())
            .unwrap();
        assert!(lazy.is_lazy());
        assert_eq!(lazy.into_vec().len(), 2);
        let eager =
            evaluate_sequence(&parse_expression("*[1]").unwrap(), &focus, &mut MapHost::new())
                .unwrap();
        assert_eq!(eager.known_len(), Some(1));
    }

    #[test]
    fn test_path_from_non_node_set_is_a_type_error() {
        let ctx = doc_context("<r/>");
        let expr = parse_expression("string('x')/a").unwrap();
        assert!(matches!(
            evaluate(&expr, &ctx, &mut MapHost::new()),
            Err(XPathError::TypeError(_))
        ));
    }
}
