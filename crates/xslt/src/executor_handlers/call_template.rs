use crate::ast::WithParam;
use crate::context::Context;
use crate::controller::Controller;
use crate::error::XsltError;

/// Parameters are evaluated in the caller's frame; the called template gets a new one.
/// The focus and the current template rule are unchanged.
pub(crate) fn handle_call_template(
    controller: &mut Controller,
    template: usize,
    params: &[WithParam],
    context: &Context,
) -> Result<(), XsltError> {
    let params = controller.evaluate_params(params, context)?;
    let stylesheet = std::sync::Arc::clone(controller.stylesheet());
    let Some(called) = stylesheet.templates.get(template) else {
        return Err(XsltError::Execution(format!(
            "no template with index {}",
            template
        )));
    };
    controller.enter_template(context, params)?;
    let result = controller.execute_body(&called.body, context);
    controller.leave_template();
    result
}
