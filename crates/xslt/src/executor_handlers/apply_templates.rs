use crate::ast::{SortKey, WithParam};
use crate::context::Context;
use crate::controller::Controller;
use crate::error::{Location, XsltError};
use std::sync::Arc;
use weft_tree::NameId;
use weft_xpath::{Expression, NodeSequence};

pub(crate) fn handle_apply_templates(
    controller: &mut Controller,
    select: Option<&Expression>,
    mode: Option<NameId>,
    sorts: &[SortKey],
    params: &[WithParam],
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let nodes = match select {
        Some(expr) => controller.select_nodes(expr, context, line)?,
        None => NodeSequence::from_vec(context.context_node.children().collect()),
    };
    let params = controller.evaluate_params(params, context)?;
    let nodes = if sorts.is_empty() {
        nodes
    } else {
        NodeSequence::from_vec(controller.sort_nodes(nodes.into_vec(), sorts, context)?)
    };
    controller.apply_templates(context, nodes, mode, params)
}

/// Runs the best rule for the current node among those imported into the module of the
/// current template, or the built-in rule when none matches.
pub(crate) fn handle_apply_imports(
    controller: &mut Controller,
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let stylesheet = Arc::clone(controller.stylesheet());
    let Some(template) = context
        .current_template
        .and_then(|index| stylesheet.templates.get(index))
    else {
        return Err(XsltError::recoverable(
            "xsl:apply-imports used with no current template rule",
            Location::line(line),
        ));
    };
    let rule = stylesheet.rules.get_rule_bounded(
        &context.current_node,
        context.mode,
        template.min_import_precedence,
        template.precedence - 1,
        controller,
    )?;
    controller.enter_template(context, Default::default())?;
    let result = match rule {
        Some(rule) => controller.execute_template(rule.handler, context),
        None => controller.apply_builtin(context),
    };
    controller.leave_template();
    result
}
