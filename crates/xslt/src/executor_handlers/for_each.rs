use crate::ast::{Instruction, SortKey};
use crate::context::Context;
use crate::controller::{Controller, Cursor};
use crate::error::XsltError;
use weft_xpath::{Expression, NodeSequence};

/// Inside the body there is no current template rule, so `xsl:apply-imports` is an error.
pub(crate) fn handle_for_each(
    controller: &mut Controller,
    select: &Expression,
    sorts: &[SortKey],
    body: &[Instruction],
    line: u32,
    context: &Context,
) -> Result<(), XsltError> {
    let mut nodes = controller.select_nodes(select, context, line)?;
    if !sorts.is_empty() {
        nodes = NodeSequence::from_vec(controller.sort_nodes(nodes.into_vec(), sorts, context)?);
    }
    let mut cursor = Cursor::new(nodes);
    let last = cursor.last();
    let mut position = 0;
    while let Some(node) = cursor.next_node() {
        position += 1;
        let inner = context
            .for_node(node, position, last.clone())
            .with_template(None);
        controller.execute_body(body, &inner)?;
    }
    Ok(())
}
