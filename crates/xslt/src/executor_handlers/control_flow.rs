use crate::ast::{Instruction, When};
use crate::context::Context;
use crate::controller::Controller;
use crate::error::XsltError;
use weft_xpath::Expression;

pub(crate) fn handle_if(
    controller: &mut Controller,
    test: &Expression,
    body: &[Instruction],
    context: &Context,
) -> Result<(), XsltError> {
    if controller.evaluate_expression(test, context)?.to_bool() {
        controller.execute_body(body, context)?;
    }
    Ok(())
}

pub(crate) fn handle_choose(
    controller: &mut Controller,
    whens: &[When],
    otherwise: Option<&[Instruction]>,
    context: &Context,
) -> Result<(), XsltError> {
    for when in whens {
        if controller.evaluate_expression(&when.test, context)?.to_bool() {
            return controller.execute_body(&when.body, context);
        }
    }
    if let Some(body) = otherwise {
        controller.execute_body(body, context)?;
    }
    Ok(())
}

pub(crate) fn handle_message(
    controller: &mut Controller,
    body: &[Instruction],
    terminate: bool,
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let text = controller.capture_text(body, context, "xsl:message", line)?;
    log::info!("xsl:message (line {}): {}", line, text);
    controller.push_message(text.clone());
    if terminate {
        return Err(XsltError::Terminated(text));
    }
    Ok(())
}
