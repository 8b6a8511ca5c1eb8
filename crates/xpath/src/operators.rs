//! Binary operators: comparisons with XPath 1.0 node-set semantics, arithmetic and union.

use crate::ast::BinaryOperator;
use crate::engine::{XPathValue, string_to_number};
use crate::error::XPathError;

pub fn evaluate(
    op: BinaryOperator,
    left: XPathValue,
    right: XPathValue,
) -> Result<XPathValue, XPathError> {
    match op {
        BinaryOperator::Or => Ok(XPathValue::Boolean(left.to_bool() || right.to_bool())),
        BinaryOperator::And => Ok(XPathValue::Boolean(left.to_bool() && right.to_bool())),
        BinaryOperator::Equals
        | BinaryOperator::NotEquals
        | BinaryOperator::LessThan
        | BinaryOperator::LessThanOrEqual
        | BinaryOperator::GreaterThan
        | BinaryOperator::GreaterThanOrEqual => Ok(XPathValue::Boolean(compare(op, &left, &right))),
        BinaryOperator::Plus => arithmetic(left, right, |a, b| a + b),
        BinaryOperator::Minus => arithmetic(left, right, |a, b| a - b),
        BinaryOperator::Multiply => arithmetic(left, right, |a, b| a * b),
        BinaryOperator::Divide => arithmetic(left, right, |a, b| a / b),
        // `%` on floats truncates toward zero, keeping the dividend's sign.
        BinaryOperator::Modulo => arithmetic(left, right, |a, b| a % b),
        BinaryOperator::Union => union(left, right),
    }
}

fn arithmetic(
    left: XPathValue,
    right: XPathValue,
    apply: impl Fn(f64, f64) -> f64,
) -> Result<XPathValue, XPathError> {
    Ok(XPathValue::Number(apply(left.to_number(), right.to_number())))
}

fn union(left: XPathValue, right: XPathValue) -> Result<XPathValue, XPathError> {
    let (XPathValue::NodeSet(mut nodes), XPathValue::NodeSet(more)) = (left, right) else {
        return Err(XPathError::TypeError(
            "the operands of '|' must be node-sets".to_string(),
        ));
    };
    nodes.extend(more);
    nodes.sort();
    nodes.dedup();
    Ok(XPathValue::NodeSet(nodes))
}

/// Compares two values. A node-set compares true if any of its members does.
pub fn compare(op: BinaryOperator, left: &XPathValue, right: &XPathValue) -> bool {
    match (left, right) {
        (XPathValue::NodeSet(a), XPathValue::NodeSet(b)) => {
            let right_values: Vec<String> = b.iter().map(|n| n.string_value()).collect();
            a.iter().any(|n| {
                let value = n.string_value();
                right_values.iter().any(|other| {
                    compare_atomic(
                        op,
                        &XPathValue::String(value.clone()),
                        &XPathValue::String(other.clone()),
                    )
                })
            })
        }
        (XPathValue::NodeSet(nodes), XPathValue::Boolean(_)) => {
            compare_atomic(op, &XPathValue::Boolean(!nodes.is_empty()), right)
        }
        (XPathValue::Boolean(_), XPathValue::NodeSet(nodes)) => {
            compare_atomic(op, left, &XPathValue::Boolean(!nodes.is_empty()))
        }
        (XPathValue::NodeSet(nodes), scalar) => nodes
            .iter()
            .any(|n| compare_atomic(op, &atomize_like(n.string_value(), scalar), scalar)),
        (scalar, XPathValue::NodeSet(nodes)) => nodes
            .iter()
            .any(|n| compare_atomic(op, scalar, &atomize_like(n.string_value(), scalar))),
        _ => compare_atomic(op, left, right),
    }
}

/// A node's string value, converted to a number when compared against one.
fn atomize_like(value: String, other: &XPathValue) -> XPathValue {
    match other {
        XPathValue::Number(_) => XPathValue::Number(string_to_number(&value)),
        _ => XPathValue::String(value),
    }
}

fn compare_atomic(op: BinaryOperator, left: &XPathValue, right: &XPathValue) -> bool {
    match op {
        BinaryOperator::Equals | BinaryOperator::NotEquals => {
            let equal = match (left, right) {
                (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
                    left.to_bool() == right.to_bool()
                }
                (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
                    left.to_number() == right.to_number()
                }
                _ => left.to_string() == right.to_string(),
            };
            if op == BinaryOperator::Equals {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let (a, b) = (left.to_number(), right.to_number());
            match op {
                BinaryOperator::LessThan => a < b,
                BinaryOperator::LessThanOrEqual => a <= b,
                BinaryOperator::GreaterThan => a > b,
                _ => a >= b,
            }
        }
    }
}
