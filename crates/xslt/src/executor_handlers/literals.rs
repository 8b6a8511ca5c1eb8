//! Handlers for instructions that create result nodes from names and values computed at
//! run time: literal result elements, `xsl:element`, `xsl:attribute`, `xsl:comment`,
//! `xsl:processing-instruction` and `xsl:value-of`.

use crate::ast::{AttributeValueTemplate, Instruction};
use crate::compiler_handlers::literals::{computed_name, split_qname};
use crate::context::Context;
use crate::controller::Controller;
use crate::env::DynamicContext;
use crate::error::{Location, XsltError};
use weft_tree::{Atom, Name, NameId};
use weft_xpath::Expression;

pub(crate) fn handle_value_of(
    controller: &mut Controller,
    select: &Expression,
    disable_escaping: bool,
    context: &Context,
) -> Result<(), XsltError> {
    let text = controller.evaluate_expression(select, context)?.to_string();
    controller.output()?.characters(&text, disable_escaping)
}

pub(crate) fn handle_literal_element(
    controller: &mut Controller,
    name: &Name,
    namespaces: &[(Atom, Atom)],
    attribute_sets: &[NameId],
    attributes: &[(Name, AttributeValueTemplate)],
    body: &[Instruction],
    context: &Context,
) -> Result<(), XsltError> {
    controller.output()?.start_element(name.clone(), namespaces)?;
    controller.apply_attribute_sets(attribute_sets, context)?;
    for (attribute, value) in attributes {
        let value = controller.evaluate_avt(value, context)?;
        let result = controller.output()?.attribute(attribute.clone(), value);
        controller.recover(result)?;
    }
    controller.execute_body(body, context)?;
    controller.output()?.end_element()
}

fn computed(
    controller: &mut Controller,
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    namespaces: &[(Atom, Atom)],
    is_element: bool,
    context: &Context,
) -> Result<(String, Option<Name>), XsltError> {
    let text = controller.evaluate_avt(name, context)?;
    let uri = match namespace {
        Some(avt) => Some(controller.evaluate_avt(avt, context)?),
        None => None,
    };
    let name = computed_name(&text, uri.as_deref(), namespaces, is_element);
    Ok((text, name))
}

/// An invalid computed name is recoverable: the content is instantiated without the
/// element around it.
pub(crate) fn handle_element(
    controller: &mut Controller,
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    namespaces: &[(Atom, Atom)],
    attribute_sets: &[NameId],
    body: &[Instruction],
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let (text, name) = computed(controller, name, namespace, namespaces, true, context)?;
    let Some(name) = name else {
        controller.report_recoverable(XsltError::recoverable(
            format!("'{}' is not a valid element name", text),
            Location::line(line),
        ))?;
        return controller.execute_body(body, context);
    };
    controller.output()?.start_element(name, &[])?;
    controller.apply_attribute_sets(attribute_sets, context)?;
    controller.execute_body(body, context)?;
    controller.output()?.end_element()
}

pub(crate) fn handle_attribute(
    controller: &mut Controller,
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    namespaces: &[(Atom, Atom)],
    body: &[Instruction],
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let (text, name) = computed(controller, name, namespace, namespaces, false, context)?;
    let value = controller.capture_text(body, context, "xsl:attribute", line)?;
    let name = name.filter(|n| !(n.prefix.is_empty() && n.local.as_ref() == "xmlns"));
    let result = match name {
        Some(name) => controller.output()?.attribute(name, value),
        None => Err(XsltError::recoverable(
            format!("'{}' is not a valid attribute name", text),
            Location::line(line),
        )),
    };
    controller.recover(result.map_err(|err| at_line(err, line)))
}

pub(crate) fn handle_comment(
    controller: &mut Controller,
    body: &[Instruction],
    context: &Context,
) -> Result<(), XsltError> {
    let mut text = controller
        .capture_text(body, context, "xsl:comment", 0)?
        .replace("--", "- -");
    if text.ends_with('-') {
        text.push(' ');
    }
    controller.output()?.comment(&text)
}

pub(crate) fn handle_processing_instruction(
    controller: &mut Controller,
    name: &AttributeValueTemplate,
    body: &[Instruction],
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let target = controller.evaluate_avt(name, context)?;
    let valid = matches!(split_qname(&target), Some(("", local)) if !local.eq_ignore_ascii_case("xml"));
    if !valid {
        return controller.report_recoverable(XsltError::recoverable(
            format!("'{}' is not a valid processing-instruction target", target),
            Location::line(line),
        ));
    }
    let data = controller
        .capture_text(body, context, "xsl:processing-instruction", line)?
        .replace("?>", "? >");
    controller
        .output()?
        .processing_instruction(target.trim(), &data)
}

/// Gives an output error raised without position the line of the instruction.
fn at_line(err: XsltError, line: u32) -> XsltError {
    match err {
        XsltError::RecoverableSelection { message, location } if location.line.is_none() => {
            XsltError::recoverable(message, Location::line(line))
        }
        other => other,
    }
}
