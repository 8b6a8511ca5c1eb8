use crate::ast::VariableValue;
use crate::context::Context;
use crate::controller::Controller;
use crate::error::XsltError;
use weft_tree::NameId;
use weft_xpath::Binding;

pub(crate) fn handle_variable(
    controller: &mut Controller,
    binding: &Binding,
    value: &VariableValue,
    context: &Context,
) -> Result<(), XsltError> {
    let value = controller.evaluate_value(value, context)?;
    controller.bindery().define(binding, value);
    Ok(())
}

/// A supplied value wins; the default is only evaluated when none was passed.
pub(crate) fn handle_param(
    controller: &mut Controller,
    binding: &Binding,
    name: NameId,
    value: &VariableValue,
    context: &Context,
) -> Result<(), XsltError> {
    if controller.bindery().use_local_parameter(name, binding) {
        return Ok(());
    }
    handle_variable(controller, binding, value, context)
}

pub(crate) fn handle_assign(
    controller: &mut Controller,
    binding: &Binding,
    value: &VariableValue,
    context: &Context,
) -> Result<(), XsltError> {
    let value = controller.evaluate_value(value, context)?;
    if binding.is_global() {
        // A global must hold its value before it can be replaced.
        controller.global_value(binding)?;
    }
    controller.bindery().assign(binding, value)
}
