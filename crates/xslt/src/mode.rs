//! A mode: the template rules of one processing mode, bucketed by the type and name of
//! the nodes they can match, plus a generic list consulted for every node.
//!
//! Every list is kept sorted by (precedence, priority), highest first, so the first
//! matching rule in a list is that list's best candidate.

use crate::config::RecoveryPolicy;
use crate::env::DynamicContext;
use crate::error::{Location, XsltError};
use crate::pattern::Pattern;
use std::cmp::Ordering;
use weft_tree::{NameId, Node, NodeType};

const NAME_BUCKETS: usize = 101;

#[derive(Debug, Clone)]
pub struct Rule<H> {
    pub pattern: Pattern,
    pub handler: H,
    pub precedence: i32,
    pub priority: f64,
    /// The pattern as written, for diagnostics.
    pub source: String,
}

impl<H> Rule<H> {
    fn rank_cmp(&self, other: &Rule<H>) -> Ordering {
        self.precedence
            .cmp(&other.precedence)
            .then(self.priority.total_cmp(&other.priority))
    }
}

#[derive(Debug)]
pub struct Mode<H> {
    name: Option<NameId>,
    buckets: Vec<Vec<Rule<H>>>,
    generic: Vec<Rule<H>>,
    len: usize,
}

impl<H> Mode<H> {
    pub fn new(name: Option<NameId>) -> Self {
        Self {
            name,
            buckets: (0..NodeType::COUNT + NAME_BUCKETS).map(|_| Vec::new()).collect(),
            generic: Vec::new(),
            len: 0,
        }
    }

    pub fn name(&self) -> Option<NameId> {
        self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds a rule for a single (non-union) pattern. A rule ranking equal to existing
    /// ones goes after them.
    pub fn add_rule(
        &mut self,
        pattern: Pattern,
        handler: H,
        precedence: i32,
        priority: f64,
        source: impl Into<String>,
    ) {
        let rule = Rule {
            pattern,
            handler,
            precedence,
            priority,
            source: source.into(),
        };
        let list = match pattern_bucket(&rule.pattern) {
            Some(bucket) => &mut self.buckets[bucket],
            None => &mut self.generic,
        };
        let at = list
            .iter()
            .position(|r| r.rank_cmp(&rule) == Ordering::Less)
            .unwrap_or(list.len());
        list.insert(at, rule);
        self.len += 1;
    }

    /// Finds the best rule for `node`. Two matching rules of equal rank are reported
    /// through the context unless the policy is silent; the earlier one wins, and a
    /// type/name-specific rule wins over a generic one.
    pub fn get_rule(
        &self,
        node: &Node,
        env: &mut dyn DynamicContext,
    ) -> Result<Option<&Rule<H>>, XsltError> {
        let detect = env.recovery_policy() != RecoveryPolicy::Silent;

        let mut specific: Option<&Rule<H>> = None;
        for rule in &self.buckets[node_bucket(node)] {
            if let Some(found) = specific {
                if rule.rank_cmp(found) != Ordering::Equal {
                    break;
                }
                if rule.pattern.matches(node, env)? {
                    report_ambiguity(node, found, rule, env)?;
                    break;
                }
            } else if rule.pattern.matches(node, env)? {
                specific = Some(rule);
                if !detect {
                    break;
                }
            }
        }

        let mut general: Option<&Rule<H>> = None;
        for rule in &self.generic {
            if specific.is_some_and(|s| rule.rank_cmp(s) == Ordering::Less) {
                break;
            }
            if let Some(found) = general {
                if rule.rank_cmp(found) != Ordering::Equal {
                    break;
                }
                if rule.pattern.matches(node, env)? {
                    report_ambiguity(node, found, rule, env)?;
                    break;
                }
            } else if rule.pattern.matches(node, env)? {
                general = Some(rule);
                if !detect {
                    break;
                }
            }
        }

        let chosen = match (specific, general) {
            (Some(s), Some(g)) => match g.rank_cmp(s) {
                Ordering::Greater => Some(g),
                Ordering::Less => Some(s),
                Ordering::Equal => {
                    if detect {
                        report_ambiguity(node, s, g, env)?;
                    }
                    Some(s)
                }
            },
            (s, g) => s.or(g),
        };
        if let Some(rule) = chosen {
            log::trace!("{} matched '{}'", node.path(), rule.source);
        }
        Ok(chosen)
    }

    /// The best rule whose precedence lies in `min..=max`, without ambiguity checks.
    pub fn get_rule_bounded(
        &self,
        node: &Node,
        min: i32,
        max: i32,
        env: &mut dyn DynamicContext,
    ) -> Result<Option<&Rule<H>>, XsltError> {
        let specific = first_in_range(&self.buckets[node_bucket(node)], node, min, max, env)?;
        let general = first_in_range(&self.generic, node, min, max, env)?;
        Ok(match (specific, general) {
            (Some(s), Some(g)) if g.rank_cmp(s) == Ordering::Greater => Some(g),
            (s, g) => s.or(g),
        })
    }
}

fn first_in_range<'r, H>(
    list: &'r [Rule<H>],
    node: &Node,
    min: i32,
    max: i32,
    env: &mut dyn DynamicContext,
) -> Result<Option<&'r Rule<H>>, XsltError> {
    for rule in list {
        if rule.precedence < min {
            break;
        }
        if rule.precedence <= max && rule.pattern.matches(node, env)? {
            return Ok(Some(rule));
        }
    }
    Ok(None)
}

fn report_ambiguity<H>(
    node: &Node,
    first: &Rule<H>,
    second: &Rule<H>,
    env: &mut dyn DynamicContext,
) -> Result<(), XsltError> {
    env.report_recoverable(XsltError::AmbiguousRule {
        message: format!(
            "'{}' and '{}' both match with precedence {} and priority {}",
            first.source, second.source, first.precedence, first.priority
        ),
        location: Location::at_node(node),
    })
}

/// Named element patterns hash by name; other typed patterns go by node type. Patterns
/// that can match elements of any name, or nodes of any type, are generic.
fn pattern_bucket(pattern: &Pattern) -> Option<usize> {
    match (pattern.node_type(), pattern.fingerprint()) {
        (NodeType::Element, Some(name)) => Some(NodeType::COUNT + name.index() % NAME_BUCKETS),
        (NodeType::Element, None) | (NodeType::Node, _) => None,
        (node_type, _) => Some(node_type.index()),
    }
}

fn node_bucket(node: &Node) -> usize {
    match (node.node_type(), node.name_id()) {
        (NodeType::Element, Some(name)) => NodeType::COUNT + name.index() % NAME_BUCKETS,
        (node_type, _) => node_type.index(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::StandaloneContext;
    use std::sync::Arc;
    use weft_tree::{Document, NamePool, parse_document};
    use weft_xpath::BasicStaticContext;

    fn setup(xml: &str) -> (BasicStaticContext, Arc<Document>) {
        let pool = NamePool::new();
        let doc = parse_document(xml, &pool).unwrap();
        (BasicStaticContext::new(pool), doc)
    }

    fn first_named(doc: &Arc<Document>, local: &str) -> Node {
        doc.root()
            .descendants()
            .find(|n| n.is_element() && n.local_name() == local)
            .unwrap()
    }

    fn add(mode: &mut Mode<&'static str>, ctx: &BasicStaticContext, text: &str, precedence: i32, priority: Option<f64>, handler: &'static str) {
        let pattern = Pattern::parse(text, ctx).unwrap();
        let priority = priority.unwrap_or_else(|| pattern.default_priority());
        mode.add_rule(pattern, handler, precedence, priority, text);
    }

    fn resolve(mode: &Mode<&'static str>, node: &Node, policy: RecoveryPolicy) -> Result<Option<&'static str>, XsltError> {
        let mut env = StandaloneContext::new(policy);
        Ok(mode.get_rule(node, &mut env)?.map(|r| r.handler))
    }

    #[test]
    fn test_named_rule_beats_node_test_on_priority() {
        let (ctx, doc) = setup("<a><c/></a>");
        let mut mode = Mode::new(None);
        add(&mut mode, &ctx, "node()", 0, None, "generic");
        add(&mut mode, &ctx, "c", 0, None, "named");
        let c = first_named(&doc, "c");
        let mut env = StandaloneContext::new(RecoveryPolicy::Warn);
        let rule = mode.get_rule(&c, &mut env).unwrap().unwrap();
        assert_eq!(rule.handler, "named");
        assert!(env.diagnostics().is_empty());
    }

    #[test]
    fn test_generic_rule_wins_with_higher_precedence() {
        let (ctx, doc) = setup("<a><c/></a>");
        let mut mode = Mode::new(None);
        add(&mut mode, &ctx, "c", 1, None, "named");
        add(&mut mode, &ctx, "*", 2, None, "wildcard");
        let c = first_named(&doc, "c");
        assert_eq!(resolve(&mode, &c, RecoveryPolicy::Strict).unwrap(), Some("wildcard"));
    }

    #[test]
    fn test_resolution_ignores_registration_order() {
        let (ctx, doc) = setup("<a><c/></a>");
        let c = first_named(&doc, "c");
        let rules = [
            ("c", 1, 0.0, "p1-0"),
            ("c", 1, 0.5, "p1-5"),
            ("c", 2, 0.0, "p2-0"),
            ("*", 2, 0.5, "p2-5"),
        ];
        let mut forward = Mode::new(None);
        let mut backward = Mode::new(None);
        for (text, precedence, priority, handler) in rules {
            add(&mut forward, &ctx, text, precedence, Some(priority), handler);
        }
        for (text, precedence, priority, handler) in rules.iter().rev().copied() {
            add(&mut backward, &ctx, text, precedence, Some(priority), handler);
        }
        let expected = Some("p2-5");
        assert_eq!(resolve(&forward, &c, RecoveryPolicy::Strict).unwrap(), expected);
        assert_eq!(resolve(&backward, &c, RecoveryPolicy::Strict).unwrap(), expected);

        let bounded = |mode: &Mode<&'static str>| {
            let mut env = StandaloneContext::new(RecoveryPolicy::Strict);
            mode.get_rule_bounded(&c, 1, 1, &mut env).unwrap().map(|r| r.handler)
        };
        assert_eq!(bounded(&forward), Some("p1-5"));
        assert_eq!(bounded(&backward), Some("p1-5"));
    }

    #[test]
    fn test_ambiguity_under_each_policy() {
        let (ctx, doc) = setup("<a><c x='1'/></a>");
        let mut mode = Mode::new(None);
        add(&mut mode, &ctx, "c[@x]", 0, None, "first");
        add(&mut mode, &ctx, "a/c", 0, None, "second");
        let c = first_named(&doc, "c");

        assert_eq!(resolve(&mode, &c, RecoveryPolicy::Silent).unwrap(), Some("first"));

        let mut env = StandaloneContext::new(RecoveryPolicy::Warn);
        let rule = mode.get_rule(&c, &mut env).unwrap().unwrap();
        assert_eq!(rule.handler, "first");
        assert_eq!(env.diagnostics().len(), 1);

        let strict = resolve(&mode, &c, RecoveryPolicy::Strict);
        assert!(matches!(strict, Err(XsltError::AmbiguousRule { .. })));
    }

    #[test]
    fn test_specific_rule_wins_tie_with_generic() {
        let (ctx, doc) = setup("<a><c/></a>");
        let mut mode = Mode::new(None);
        add(&mut mode, &ctx, "*", 0, Some(1.0), "generic");
        add(&mut mode, &ctx, "c", 0, Some(1.0), "specific");
        let c = first_named(&doc, "c");

        let mut env = StandaloneContext::new(RecoveryPolicy::Warn);
        let rule = mode.get_rule(&c, &mut env).unwrap().unwrap();
        assert_eq!(rule.handler, "specific");
        assert_eq!(env.diagnostics().len(), 1);
        assert_eq!(resolve(&mode, &c, RecoveryPolicy::Silent).unwrap(), Some("specific"));
    }

    #[test]
    fn test_non_element_buckets() {
        let (ctx, doc) = setup("<a>text<!--c--></a>");
        let mut mode = Mode::new(None);
        add(&mut mode, &ctx, "text()", 0, None, "text");
        add(&mut mode, &ctx, "comment()", 0, None, "comment");
        let a = first_named(&doc, "a");
        let children: Vec<Node> = a.children().collect();
        assert_eq!(resolve(&mode, &children[0], RecoveryPolicy::Strict).unwrap(), Some("text"));
        assert_eq!(resolve(&mode, &children[1], RecoveryPolicy::Strict).unwrap(), Some("comment"));
        assert_eq!(resolve(&mode, &a, RecoveryPolicy::Strict).unwrap(), None);
        assert_eq!(mode.len(), 2);
    }

    #[test]
    fn test_bounded_lookup_skips_out_of_range_rules() {
        let (ctx, doc) = setup("<a><c/></a>");
        let mut mode = Mode::new(None);
        add(&mut mode, &ctx, "c", 3, None, "own");
        add(&mut mode, &ctx, "node()", 1, None, "imported-generic");
        add(&mut mode, &ctx, "c", 0, None, "too-low");
        let c = first_named(&doc, "c");
        let mut env = StandaloneContext::new(RecoveryPolicy::Strict);
        let rule = mode.get_rule_bounded(&c, 1, 2, &mut env).unwrap().unwrap();
        assert_eq!(rule.handler, "imported-generic");
        let rule = mode.get_rule_bounded(&c, 0, 0, &mut env).unwrap().unwrap();
        assert_eq!(rule.handler, "too-low");
        assert!(mode.get_rule_bounded(&c, 4, 9, &mut env).unwrap().is_none());
    }
}
