use crate::env::DynamicContext;
use crate::error::XsltError;
use crate::mode::{Mode, Rule};
use crate::pattern::Pattern;
use std::collections::HashMap;
use weft_tree::{NameId, Node};

/// Owns the default mode and every named mode of a stylesheet.
#[derive(Debug)]
pub struct RuleManager<H> {
    default_mode: Mode<H>,
    modes: HashMap<NameId, Mode<H>>,
}

impl<H: Clone> RuleManager<H> {
    pub fn new() -> Self {
        Self {
            default_mode: Mode::new(None),
            modes: HashMap::new(),
        }
    }

    /// Registers `pattern` in `mode`. Each member of a union becomes its own rule, with its
    /// own default priority unless `priority` is given.
    pub fn add_rule(
        &mut self,
        pattern: &Pattern,
        handler: H,
        mode: Option<NameId>,
        precedence: i32,
        priority: Option<f64>,
        source: &str,
    ) {
        let target = match mode {
            None => &mut self.default_mode,
            Some(name) => self.modes.entry(name).or_insert_with(|| Mode::new(Some(name))),
        };
        for alternative in pattern.alternatives() {
            let priority = priority.unwrap_or_else(|| alternative.default_priority());
            target.add_rule(alternative.clone(), handler.clone(), precedence, priority, source);
        }
    }

    /// Makes sure `mode` exists even if no rule is registered in it.
    pub fn declare_mode(&mut self, mode: NameId) {
        self.modes.entry(mode).or_insert_with(|| Mode::new(Some(mode)));
    }

    pub fn get_mode(&self, mode: Option<NameId>) -> Option<&Mode<H>> {
        match mode {
            None => Some(&self.default_mode),
            Some(name) => self.modes.get(&name),
        }
    }

    /// Resolves the rule for `node` in `mode`. A mode with no rules yields `None`.
    pub fn get_rule(
        &self,
        node: &Node,
        mode: Option<NameId>,
        env: &mut dyn DynamicContext,
    ) -> Result<Option<&Rule<H>>, XsltError> {
        match self.get_mode(mode) {
            Some(mode) => mode.get_rule(node, env),
            None => Ok(None),
        }
    }

    /// Resolution restricted to precedences `min..=max`, as `xsl:apply-imports` needs.
    pub fn get_rule_bounded(
        &self,
        node: &Node,
        mode: Option<NameId>,
        min: i32,
        max: i32,
        env: &mut dyn DynamicContext,
    ) -> Result<Option<&Rule<H>>, XsltError> {
        match self.get_mode(mode) {
            Some(mode) => mode.get_rule_bounded(node, min, max, env),
            None => Ok(None),
        }
    }

    pub fn mode_names(&self) -> impl Iterator<Item = NameId> + '_ {
        self.modes.keys().copied()
    }
}

impl<H: Clone> Default for RuleManager<H> {
    fn default() -> Self {
        Self::new()
    }
}
