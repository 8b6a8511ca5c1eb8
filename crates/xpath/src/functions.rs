//! The XPath 1.0 core function library.

use crate::engine::{EvaluationContext, XPathValue, string_to_number};
use crate::error::XPathError;
use weft_tree::{Node, XML_NAMESPACE};

const CORE_FUNCTIONS: &[&str] = &[
    // Node-set
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    // String
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    // Boolean
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    // Number
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
];

pub fn is_core_function(name: &str) -> bool {
    CORE_FUNCTIONS.contains(&name)
}

/// Dispatches a call to a core function. Arguments are already evaluated.
pub fn call_core(
    name: &str,
    args: Vec<XPathValue>,
    ctx: &EvaluationContext,
) -> Result<XPathValue, XPathError> {
    match name {
        "last" => {
            arity(name, &args, 0, 0)?;
            Ok(XPathValue::Number(ctx.last() as f64))
        }
        "position" => {
            arity(name, &args, 0, 0)?;
            Ok(XPathValue::Number(ctx.position as f64))
        }
        "count" => {
            arity(name, &args, 1, 1)?;
            Ok(XPathValue::Number(node_set_arg(name, args)?.len() as f64))
        }
        "id" => func_id(args, ctx),
        "local-name" => {
            let node = optional_node_arg(name, args, ctx)?;
            Ok(XPathValue::String(node.map(|n| n.local_name()).unwrap_or_default()))
        }
        "namespace-uri" => {
            let node = optional_node_arg(name, args, ctx)?;
            Ok(XPathValue::String(node.map(|n| n.namespace_uri()).unwrap_or_default()))
        }
        "name" => {
            let node = optional_node_arg(name, args, ctx)?;
            Ok(XPathValue::String(node.map(|n| n.display_name()).unwrap_or_default()))
        }
        "string" => Ok(XPathValue::String(optional_string_arg(name, args, ctx)?)),
        "concat" => {
            if args.len() < 2 {
                return Err(XPathError::function(name, "expected at least 2 arguments"));
            }
            Ok(XPathValue::String(
                args.iter().map(XPathValue::to_string).collect(),
            ))
        }
        "starts-with" => {
            let (s, prefix) = two_strings(name, args)?;
            Ok(XPathValue::Boolean(s.starts_with(&prefix)))
        }
        "contains" => {
            let (s, needle) = two_strings(name, args)?;
            Ok(XPathValue::Boolean(s.contains(&needle)))
        }
        "substring-before" => {
            let (s, needle) = two_strings(name, args)?;
            let before = s.find(&needle).map(|i| &s[..i]).unwrap_or("");
            Ok(XPathValue::String(before.to_string()))
        }
        "substring-after" => {
            let (s, needle) = two_strings(name, args)?;
            let after = s.find(&needle).map(|i| &s[i + needle.len()..]).unwrap_or("");
            Ok(XPathValue::String(after.to_string()))
        }
        "substring" => func_substring(args),
        "string-length" => {
            let s = optional_string_arg(name, args, ctx)?;
            Ok(XPathValue::Number(s.chars().count() as f64))
        }
        "normalize-space" => {
            let s = optional_string_arg(name, args, ctx)?;
            Ok(XPathValue::String(normalize_space(&s)))
        }
        "translate" => func_translate(args),
        "boolean" => {
            arity(name, &args, 1, 1)?;
            Ok(XPathValue::Boolean(args[0].to_bool()))
        }
        "not" => {
            arity(name, &args, 1, 1)?;
            Ok(XPathValue::Boolean(!args[0].to_bool()))
        }
        "true" => {
            arity(name, &args, 0, 0)?;
            Ok(XPathValue::Boolean(true))
        }
        "false" => {
            arity(name, &args, 0, 0)?;
            Ok(XPathValue::Boolean(false))
        }
        "lang" => func_lang(args, ctx),
        "number" => {
            arity(name, &args, 0, 1)?;
            let n = match args.first() {
                Some(value) => value.to_number(),
                None => string_to_number(&ctx.context_node.string_value()),
            };
            Ok(XPathValue::Number(n))
        }
        "sum" => {
            arity(name, &args, 1, 1)?;
            let total = node_set_arg(name, args)?
                .iter()
                .map(|n| string_to_number(&n.string_value()))
                .sum();
            Ok(XPathValue::Number(total))
        }
        "floor" => number_fn(name, args, f64::floor),
        "ceiling" => number_fn(name, args, f64::ceil),
        "round" => number_fn(name, args, xpath_round),
        _ => Err(XPathError::UnknownFunction(name.to_string())),
    }
}

fn arity(name: &str, args: &[XPathValue], min: usize, max: usize) -> Result<(), XPathError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(XPathError::function(
            name,
            format!("expected {} argument(s), got {}", expected, args.len()),
        ));
    }
    Ok(())
}

fn node_set_arg(name: &str, mut args: Vec<XPathValue>) -> Result<Vec<Node>, XPathError> {
    match args.pop() {
        Some(XPathValue::NodeSet(nodes)) => Ok(nodes),
        Some(other) => Err(XPathError::function(
            name,
            format!("expected a node-set, found a {}", other.type_name()),
        )),
        None => Err(XPathError::function(name, "missing argument")),
    }
}

/// The first node of an optional node-set argument, defaulting to the context node.
fn optional_node_arg(
    name: &str,
    args: Vec<XPathValue>,
    ctx: &EvaluationContext,
) -> Result<Option<Node>, XPathError> {
    arity(name, &args, 0, 1)?;
    if args.is_empty() {
        return Ok(Some(ctx.context_node.clone()));
    }
    Ok(node_set_arg(name, args)?.into_iter().min())
}

fn optional_string_arg(
    name: &str,
    args: Vec<XPathValue>,
    ctx: &EvaluationContext,
) -> Result<String, XPathError> {
    arity(name, &args, 0, 1)?;
    Ok(match args.first() {
        Some(value) => value.to_string(),
        None => ctx.context_node.string_value(),
    })
}

fn two_strings(name: &str, args: Vec<XPathValue>) -> Result<(String, String), XPathError> {
    arity(name, &args, 2, 2)?;
    Ok((args[0].to_string(), args[1].to_string()))
}

fn number_fn(
    name: &str,
    args: Vec<XPathValue>,
    apply: fn(f64) -> f64,
) -> Result<XPathValue, XPathError> {
    arity(name, &args, 1, 1)?;
    Ok(XPathValue::Number(apply(args[0].to_number())))
}

fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

fn is_xml_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

pub fn normalize_space(s: &str) -> String {
    s.split(is_xml_space)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn func_substring(args: Vec<XPathValue>) -> Result<XPathValue, XPathError> {
    arity("substring", &args, 2, 3)?;
    let s = args[0].to_string();
    let start = xpath_round(args[1].to_number());
    let end = match args.get(2) {
        Some(len) => start + xpath_round(len.to_number()),
        None => f64::INFINITY,
    };
    let result: String = s
        .chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= start && position < end
        })
        .map(|(_, c)| c)
        .collect();
    Ok(XPathValue::String(result))
}

fn func_translate(args: Vec<XPathValue>) -> Result<XPathValue, XPathError> {
    arity("translate", &args, 3, 3)?;
    let from: Vec<char> = args[1].to_string().chars().collect();
    let to: Vec<char> = args[2].to_string().chars().collect();
    let result = args[0]
        .to_string()
        .chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(i) => to.get(i).copied(),
            None => Some(c),
        })
        .collect();
    Ok(XPathValue::String(result))
}

/// Elements of the context document whose ID is any of the whitespace-separated tokens.
fn func_id(args: Vec<XPathValue>, ctx: &EvaluationContext) -> Result<XPathValue, XPathError> {
    arity("id", &args, 1, 1)?;
    let tokens: Vec<String> = match &args[0] {
        XPathValue::NodeSet(nodes) => nodes
            .iter()
            .flat_map(|n| {
                n.string_value()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect(),
        other => other
            .to_string()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    };
    let doc = ctx.context_node.document();
    let mut found: Vec<Node> = tokens.iter().filter_map(|t| doc.select_id(t)).collect();
    found.sort();
    found.dedup();
    Ok(XPathValue::NodeSet(found))
}

fn func_lang(args: Vec<XPathValue>, ctx: &EvaluationContext) -> Result<XPathValue, XPathError> {
    arity("lang", &args, 1, 1)?;
    let wanted = args[0].to_string().to_lowercase();
    let pool = ctx.context_node.document().name_pool();
    let Some(xml_lang) = pool.lookup(XML_NAMESPACE, "lang") else {
        return Ok(XPathValue::Boolean(false));
    };
    let declared = std::iter::once(ctx.context_node.clone())
        .chain(ctx.context_node.ancestors())
        .find_map(|n| n.attribute_value(xml_lang));
    let matches = declared.is_some_and(|lang| {
        let lang = lang.to_lowercase();
        lang == wanted || lang.strip_prefix(&wanted).is_some_and(|rest| rest.starts_with('-'))
    });
    Ok(XPathValue::Boolean(matches))
}
