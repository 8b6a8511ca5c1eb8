use weft_tree::{NameId, Node};
use weft_xpath::{EvaluationContext, LastPosition};

/// The dynamic context of one instruction: cloned and specialised as evaluation descends
/// into `apply-templates` and `for-each`.
#[derive(Debug, Clone)]
pub struct Context {
    /// The node `current()` returns.
    pub current_node: Node,
    /// The focus of XPath evaluation; differs from `current_node` only inside predicates.
    pub context_node: Node,
    pub position: usize,
    pub last: LastPosition,
    pub mode: Option<NameId>,
    /// Index of the template being executed, if any.
    pub current_template: Option<usize>,
}

impl Context {
    pub fn new(node: Node) -> Self {
        Self {
            current_node: node.clone(),
            context_node: node,
            position: 1,
            last: LastPosition::Known(1),
            mode: None,
            current_template: None,
        }
    }

    /// A copy focused on `node` at `position` of `last`, keeping mode and template.
    pub fn for_node(&self, node: Node, position: usize, last: LastPosition) -> Self {
        Self {
            current_node: node.clone(),
            context_node: node,
            position,
            last,
            mode: self.mode,
            current_template: self.current_template,
        }
    }

    pub fn with_mode(mut self, mode: Option<NameId>) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_template(mut self, template: Option<usize>) -> Self {
        self.current_template = template;
        self
    }

    pub fn focus(&self) -> EvaluationContext {
        EvaluationContext::at(self.context_node.clone(), self.position, self.last.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_tree::{NamePool, parse_document};

    #[test]
    fn test_specialising_keeps_mode_and_template() {
        let pool = NamePool::new();
        let doc = parse_document("<a><b/><c/></a>", &pool).unwrap();
        let a = doc.document_element().unwrap();
        let mode = Some(pool.intern("", "m"));
        let base = Context::new(a.clone()).with_mode(mode).with_template(Some(3));
        let c = a.last_child().unwrap();
        let child = base.for_node(c.clone(), 2, LastPosition::Known(2));
        assert_eq!(child.current_node, c);
        assert_eq!(child.mode, mode);
        assert_eq!(child.current_template, Some(3));
        let focus = child.focus();
        assert_eq!(focus.position, 2);
        assert_eq!(focus.last(), 2);
        assert_eq!(base.current_node, a);
    }
}
