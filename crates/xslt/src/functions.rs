//! The functions XSLT adds to the XPath core library. The compiler asks
//! [`is_xslt_function`] while binding expressions; the controller dispatches calls here.

use crate::compiler::{WEFT_NAMESPACE, XSLT_NAMESPACE};
use crate::controller::Controller;
use crate::env::DynamicContext;
use crate::error::{Location, XsltError};
use weft_xpath::functions::is_core_function;
use weft_xpath::{EvaluationContext, XPathError, XPathValue};

const XSLT_FUNCTIONS: &[&str] = &[
    "key",
    "current",
    "document",
    "generate-id",
    "system-property",
    "function-available",
    "element-available",
    "format-number",
    "unparsed-entity-uri",
];

/// Instructions in the XSLT namespace that this processor implements.
const XSLT_INSTRUCTIONS: &[&str] = &[
    "apply-imports",
    "apply-templates",
    "attribute",
    "call-template",
    "choose",
    "comment",
    "copy",
    "copy-of",
    "element",
    "fallback",
    "for-each",
    "if",
    "message",
    "number",
    "processing-instruction",
    "text",
    "value-of",
    "variable",
];

pub fn is_xslt_function(name: &str) -> bool {
    XSLT_FUNCTIONS.contains(&name)
}

pub(crate) fn call(
    controller: &mut Controller,
    name: &str,
    args: Vec<XPathValue>,
    ctx: &EvaluationContext,
) -> Result<XPathValue, XsltError> {
    match name {
        "current" => {
            arity(name, &args, 0, 0)?;
            let node = controller
                .current_node()
                .ok_or(XsltError::XPath(XPathError::NoContextNode))?;
            Ok(XPathValue::NodeSet(vec![node]))
        }
        "key" => {
            arity(name, &args, 2, 2)?;
            let mut args = args.into_iter();
            let key_name = args.next().map(|v| v.to_string()).unwrap_or_default();
            let lookup = args.next().unwrap_or_else(XPathValue::empty);
            key(controller, &key_name, lookup, ctx)
        }
        "document" => {
            arity(name, &args, 1, 2)?;
            let hrefs = match args.into_iter().next() {
                Some(XPathValue::NodeSet(nodes)) => nodes.iter().map(|n| n.string_value()).collect(),
                Some(other) => vec![other.to_string()],
                None => Vec::new(),
            };
            let mut roots = Vec::new();
            for href in hrefs {
                if let Some(document) = controller.load_document(&href)? {
                    roots.push(document.root());
                }
            }
            roots.sort();
            roots.dedup();
            Ok(XPathValue::NodeSet(roots))
        }
        "generate-id" => {
            arity(name, &args, 0, 1)?;
            let node = match args.into_iter().next() {
                Some(XPathValue::NodeSet(nodes)) => nodes.into_iter().min(),
                Some(other) => {
                    return Err(XPathError::function(
                        name,
                        format!("expected a node-set, found a {}", other.type_name()),
                    )
                    .into());
                }
                None => Some(ctx.context_node.clone()),
            };
            Ok(XPathValue::String(
                node.map(|n| n.generate_id()).unwrap_or_default(),
            ))
        }
        "system-property" => {
            arity(name, &args, 1, 1)?;
            let property = args[0].to_string();
            let Some((uri, local)) = controller.expand_runtime_qname(&property) else {
                return Err(XPathError::function(
                    name,
                    format!("'{}' is not a valid property name", property),
                )
                .into());
            };
            if uri != XSLT_NAMESPACE {
                return Ok(XPathValue::String(String::new()));
            }
            Ok(match local.as_str() {
                "version" => XPathValue::Number(1.0),
                "vendor" => XPathValue::String("weft".to_string()),
                _ => XPathValue::String(String::new()),
            })
        }
        "function-available" => {
            arity(name, &args, 1, 1)?;
            let function = args[0].to_string();
            let available = !function.contains(':')
                && (is_core_function(&function) || is_xslt_function(&function));
            Ok(XPathValue::Boolean(available))
        }
        "element-available" => {
            arity(name, &args, 1, 1)?;
            let element = args[0].to_string();
            let Some((uri, local)) = controller.expand_runtime_qname(&element) else {
                return Err(XPathError::function(
                    name,
                    format!("'{}' is not a valid element name", element),
                )
                .into());
            };
            let available = (uri == XSLT_NAMESPACE && XSLT_INSTRUCTIONS.contains(&local.as_str()))
                || (uri == WEFT_NAMESPACE && local == "assign");
            Ok(XPathValue::Boolean(available))
        }
        "format-number" => {
            arity(name, &args, 2, 3)?;
            let number = args[0].to_number();
            let pattern = args[1].to_string();
            let format_name = match args.get(2) {
                Some(value) => {
                    let text = value.to_string();
                    Some(controller.resolve_runtime_qname(&text).ok_or_else(|| {
                        XsltError::unresolved(
                            format!("'{}' is not a valid decimal-format name", text),
                            Location::at_node(&ctx.context_node),
                        )
                    })?)
                }
                None => None,
            };
            let stylesheet = std::sync::Arc::clone(controller.stylesheet());
            let format = stylesheet.decimal_formats.get(format_name).ok_or_else(|| {
                XsltError::unresolved(
                    format!(
                        "decimal-format '{}' is not declared",
                        args.get(2).map(XPathValue::to_string).unwrap_or_default()
                    ),
                    Location::at_node(&ctx.context_node),
                )
            })?;
            let text = format
                .format(number, &pattern)
                .map_err(|message| XPathError::function(name, message))?;
            Ok(XPathValue::String(text))
        }
        "unparsed-entity-uri" => {
            arity(name, &args, 1, 1)?;
            let entity = args[0].to_string();
            let uri = ctx
                .context_node
                .document()
                .unparsed_entity_uri(&entity)
                .unwrap_or_default();
            Ok(XPathValue::String(uri.to_string()))
        }
        _ => Err(XPathError::UnknownFunction(name.to_string()).into()),
    }
}

fn key(
    controller: &mut Controller,
    key_name: &str,
    lookup: XPathValue,
    ctx: &EvaluationContext,
) -> Result<XPathValue, XsltError> {
    let key = controller.resolve_runtime_qname(key_name).ok_or_else(|| {
        XsltError::unresolved(
            format!("'{}' is not a valid key name", key_name),
            Location::at_node(&ctx.context_node),
        )
    })?;
    let document = ctx.context_node.document().clone();
    let values = match lookup {
        XPathValue::NodeSet(nodes) => nodes.iter().map(|n| n.string_value()).collect(),
        other => vec![other.to_string()],
    };
    let mut found = Vec::new();
    for value in values {
        found.extend(controller.select_by_key(key, &document, &value)?);
    }
    found.sort();
    found.dedup();
    Ok(XPathValue::NodeSet(found))
}

fn arity(name: &str, args: &[XPathValue], min: usize, max: usize) -> Result<(), XsltError> {
    if args.len() < min || args.len() > max {
        return Err(XPathError::function(
            name,
            format!("expected {} to {} arguments, got {}", min, max, args.len()),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_function_names() {
        assert!(is_xslt_function("key"));
        assert!(is_xslt_function("current"));
        assert!(!is_xslt_function("count"));
        assert!(is_xslt_function("format-number"));
        assert!(is_xslt_function("element-available"));
        assert!(!is_xslt_function("format-date"));
    }
}
