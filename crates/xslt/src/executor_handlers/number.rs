//! `xsl:number`: counts nodes in the source tree, or takes a computed value, and writes
//! the result as text.

use crate::ast::NumberInstruction;
use crate::context::Context;
use crate::controller::Controller;
use crate::error::XsltError;
use crate::numbering::{Grouping, LetterValue, NumberFormat, NumberLevel};
use weft_tree::{Node, NodeType};
use weft_xpath::XPathValue;

pub(crate) fn handle_number(
    controller: &mut Controller,
    number: &NumberInstruction,
    context: &Context,
) -> Result<(), XsltError> {
    let node = &context.current_node;
    let numbers = match &number.value {
        Some(expr) => {
            let value = controller.evaluate_expression(expr, context)?.to_number();
            let rounded = (value + 0.5).floor();
            if !rounded.is_finite() || rounded < 0.0 {
                // Not a count: written the way string() would write it.
                let text = XPathValue::Number(value).to_string();
                return controller.output()?.characters(&text, false);
            }
            vec![rounded as u64]
        }
        None => match number.level {
            NumberLevel::Single => single(controller, number, node)?.into_iter().collect(),
            NumberLevel::Any => vec![any(controller, number, node)?],
            NumberLevel::Multiple => multiple(controller, number, node)?,
        },
    };

    let format = NumberFormat::parse(&controller.evaluate_avt(&number.format, context)?);
    let letter_value = match &number.letter_value {
        Some(avt) => Some(
            controller
                .evaluate_avt(avt, context)?
                .parse::<LetterValue>()
                .map_err(|message| XsltError::structure(message, number.line))?,
        ),
        None => None,
    };
    let grouping = match (&number.grouping_separator, &number.grouping_size) {
        (Some(separator), Some(size)) => {
            let separator = controller.evaluate_avt(separator, context)?;
            let size = controller.evaluate_avt(size, context)?;
            let size = size.trim().parse::<usize>().map_err(|_| {
                XsltError::structure(
                    format!("grouping-size must be a whole number, not '{}'", size),
                    number.line,
                )
            })?;
            Some(Grouping { separator, size })
        }
        _ => None,
    };
    if let Some(lang) = &number.lang {
        let lang = controller.evaluate_avt(lang, context)?;
        if !lang.starts_with("en") {
            log::debug!("xsl:number has no numbering for lang '{}'; using English", lang);
        }
    }
    let text = format.format(&numbers, grouping.as_ref(), letter_value);
    controller.output()?.characters(&text, false)
}

/// True if `candidate` is counted. Without a `count` pattern, nodes of the same type
/// and name as `origin` are.
fn counts(
    controller: &mut Controller,
    number: &NumberInstruction,
    origin: &Node,
    candidate: &Node,
) -> Result<bool, XsltError> {
    match &number.count {
        Some(pattern) => pattern.matches(candidate, controller),
        None => Ok(candidate.node_type() == origin.node_type() && candidate.name_id() == origin.name_id()),
    }
}

fn is_from(controller: &mut Controller, number: &NumberInstruction, node: &Node) -> Result<bool, XsltError> {
    match &number.from {
        Some(pattern) => pattern.matches(node, controller),
        None => Ok(false),
    }
}

/// One plus the number of preceding siblings of `node` that are counted.
fn sibling_number(
    controller: &mut Controller,
    number: &NumberInstruction,
    origin: &Node,
    node: &Node,
) -> Result<u64, XsltError> {
    let mut position = 1;
    for sibling in node.preceding_siblings() {
        if counts(controller, number, origin, &sibling)? {
            position += 1;
        }
    }
    Ok(position)
}

/// The nearest counted ancestor-or-self below the nearest `from` ancestor, numbered
/// among its siblings.
fn single(
    controller: &mut Controller,
    number: &NumberInstruction,
    origin: &Node,
) -> Result<Option<u64>, XsltError> {
    let mut boundary = None;
    if number.from.is_some() {
        for ancestor in origin.ancestors() {
            if is_from(controller, number, &ancestor)? {
                boundary = Some(ancestor);
                break;
            }
        }
    }
    let mut current = origin.clone();
    while !counts(controller, number, origin, &current)? {
        current = match current.parent() {
            Some(parent) if Some(&parent) != boundary.as_ref() => parent,
            _ => return Ok(None),
        };
    }
    Ok(Some(sibling_number(controller, number, origin, &current)?))
}

/// Counted nodes among `origin` and everything before it in document order, back to
/// the most recent node matching `from`.
fn any(controller: &mut Controller, number: &NumberInstruction, origin: &Node) -> Result<u64, XsltError> {
    let mut total = 0;
    let mut current = Some(origin.clone());
    while let Some(node) = current {
        if node != *origin && is_from(controller, number, &node)? {
            break;
        }
        if counts(controller, number, origin, &node)? {
            total += 1;
        }
        current = previous_in_document(&node);
    }
    Ok(total)
}

/// The sibling number of each counted ancestor-or-self below the nearest `from`
/// ancestor, outermost first.
fn multiple(
    controller: &mut Controller,
    number: &NumberInstruction,
    origin: &Node,
) -> Result<Vec<u64>, XsltError> {
    let mut numbers = Vec::new();
    let mut current = Some(origin.clone());
    while let Some(node) = current {
        if counts(controller, number, origin, &node)? {
            numbers.push(sibling_number(controller, number, origin, &node)?);
        }
        current = match node.parent() {
            Some(parent) if !is_from(controller, number, &parent)? => Some(parent),
            _ => None,
        };
    }
    numbers.reverse();
    Ok(numbers)
}

/// The node before `node` in document order, ancestors included. Attributes and
/// namespaces are never returned.
fn previous_in_document(node: &Node) -> Option<Node> {
    if matches!(node.node_type(), NodeType::Attribute | NodeType::Namespace) {
        return node.parent();
    }
    let Some(mut previous) = node.previous_sibling() else {
        return node.parent();
    };
    while let Some(last) = previous.last_child() {
        previous = last;
    }
    Some(previous)
}
