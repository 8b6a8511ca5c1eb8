//! Match patterns: parsed and bound once per stylesheet, then tested against nodes during
//! rule resolution.
//!
//! A pattern is matched right to left: the final step is tested against the node itself,
//! then the preceding part of the path against its parent or one of its ancestors.

use crate::env::DynamicContext;
use crate::error::XsltError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, multispace0},
    combinator::{map, opt},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated},
};
use weft_tree::{Atom, NameId, NamePool, Node, NodeType};
use weft_xpath::ast::{Axis, Expression, LocationPath, NodeTest, NodeTypeTest, Step};
use weft_xpath::axes;
use weft_xpath::bind::{StaticContext, bind, bind_node_test, resolve_qname};
use weft_xpath::engine::predicate_holds;
use weft_xpath::parser::{expression, node_test, predicate, string_literal, ws};
use weft_xpath::{EvaluationContext, XPathError, XPathValue};

#[derive(Debug, Clone, PartialEq)]
pub enum NameTest {
    Name(NameId),
    /// `prefix:*`, holding the namespace URI.
    Namespace(Atom),
}

impl NameTest {
    fn matches(&self, node: &Node) -> bool {
        match self {
            NameTest::Name(id) => node.name_id() == Some(*id),
            NameTest::Namespace(uri) => node
                .name_id()
                .is_some_and(|id| node.document().name_pool().uri(id) == *uri),
        }
    }
}

/// How a step relates to the part of the pattern before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `/`
    Parent,
    /// `//`
    Ancestor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// `node()`: any node that can be a child.
    AnyChildNode,
    /// `*`, `@*`, `text()`, `comment()`, `processing-instruction()`.
    NodeKind(NodeType),
    Named { node_type: NodeType, test: NameTest },
    Path(Box<PathPattern>),
    Id(Expression),
    Key { name: NameId, value: Expression },
    DocumentRoot,
    Union(Box<Pattern>, Box<Pattern>),
}

/// A step pattern with filters and/or a parent pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    parent: Option<(Pattern, Connector)>,
    attribute_axis: bool,
    test: NodeTest,
    /// Filters that can be decided from the node alone.
    filters: Vec<Expression>,
    /// `[1]` on a named child step: no earlier sibling passes the test.
    first_sibling: bool,
    /// For position-dependent filters, `parent::node()/axis::test[filters]`; the node
    /// matches if it is a member of the selection made from itself.
    extent: Option<Expression>,
}

impl Pattern {
    pub fn parse(text: &str, ctx: &dyn StaticContext) -> Result<Pattern, XsltError> {
        let paths = match union_of_paths(text.trim()) {
            Ok(("", paths)) => paths,
            Ok((rest, _)) => {
                return Err(parse_error(text, format!("unexpected '{}'", rest)));
            }
            Err(e) => return Err(parse_error(text, e.to_string())),
        };
        let mut pattern: Option<Pattern> = None;
        for path in paths {
            let alternative = build_path(path, ctx)?;
            pattern = Some(match pattern {
                None => alternative,
                Some(left) => Pattern::Union(Box::new(left), Box::new(alternative)),
            });
        }
        pattern.ok_or_else(|| parse_error(text, "empty pattern".to_string()))
    }

    pub fn matches(&self, node: &Node, env: &mut dyn DynamicContext) -> Result<bool, XsltError> {
        match self {
            Pattern::AnyChildNode => Ok(matches!(
                node.node_type(),
                NodeType::Element | NodeType::Text | NodeType::Comment | NodeType::ProcessingInstruction
            )),
            Pattern::NodeKind(node_type) => Ok(node.node_type() == *node_type),
            Pattern::Named { node_type, test } => {
                Ok(node.node_type() == *node_type && test.matches(node))
            }
            Pattern::Path(path) => path.matches(node, env),
            Pattern::Id(expr) => {
                if !node.is_element() {
                    return Ok(false);
                }
                let value = env.evaluate(expr, &EvaluationContext::new(node.clone()))?;
                let document = node.document();
                Ok(string_values(value)
                    .iter()
                    .flat_map(|s| s.split_whitespace())
                    .any(|token| document.select_id(token).as_ref() == Some(node)))
            }
            Pattern::Key { name, value } => {
                let value = env.evaluate(value, &EvaluationContext::new(node.clone()))?;
                for key_value in string_values(value) {
                    if env
                        .select_by_key(*name, node.document(), &key_value)?
                        .contains(node)
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Pattern::DocumentRoot => Ok(node.node_type() == NodeType::Document),
            Pattern::Union(left, right) => {
                Ok(left.matches(node, env)? || right.matches(node, env)?)
            }
        }
    }

    /// True if any filter or argument of the pattern refers to a variable.
    pub fn references_variables(&self) -> bool {
        match self {
            Pattern::AnyChildNode
            | Pattern::NodeKind(_)
            | Pattern::Named { .. }
            | Pattern::DocumentRoot => false,
            Pattern::Path(path) => {
                path.filters.iter().any(Expression::references_variables)
                    || path.extent.as_ref().is_some_and(Expression::references_variables)
                    || path
                        .parent
                        .as_ref()
                        .is_some_and(|(parent, _)| parent.references_variables())
            }
            Pattern::Id(expr) | Pattern::Key { value: expr, .. } => expr.references_variables(),
            Pattern::Union(left, right) => {
                left.references_variables() || right.references_variables()
            }
        }
    }

    /// The members of a union, left to right; a single pattern otherwise.
    pub fn alternatives(&self) -> Vec<&Pattern> {
        match self {
            Pattern::Union(left, right) => {
                let mut all = left.alternatives();
                all.extend(right.alternatives());
                all
            }
            other => vec![other],
        }
    }

    /// The type of node this pattern can match, or `NodeType::Node` when it may match
    /// several.
    pub fn node_type(&self) -> NodeType {
        match self {
            Pattern::AnyChildNode | Pattern::Key { .. } => NodeType::Node,
            Pattern::NodeKind(node_type) | Pattern::Named { node_type, .. } => *node_type,
            Pattern::Path(path) => path.node_type(),
            Pattern::Id(_) => NodeType::Element,
            Pattern::DocumentRoot => NodeType::Document,
            Pattern::Union(left, right) => {
                let t = left.node_type();
                if t == right.node_type() { t } else { NodeType::Node }
            }
        }
    }

    /// The single name every matching node must have, if there is one.
    pub fn fingerprint(&self) -> Option<NameId> {
        match self {
            Pattern::Named {
                test: NameTest::Name(id),
                ..
            } => Some(*id),
            Pattern::Path(path) => match path.test {
                NodeTest::Name(id) => Some(id),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn default_priority(&self) -> f64 {
        match self {
            Pattern::Named {
                test: NameTest::Name(_),
                ..
            } => 0.0,
            Pattern::Named {
                test: NameTest::Namespace(_),
                ..
            } => -0.25,
            Pattern::AnyChildNode | Pattern::NodeKind(_) => -0.5,
            _ => 0.5,
        }
    }
}

impl PathPattern {
    fn node_type(&self) -> NodeType {
        if self.attribute_axis {
            return NodeType::Attribute;
        }
        match &self.test {
            NodeTest::NodeType(NodeTypeTest::Node) => NodeType::Node,
            NodeTest::NodeType(NodeTypeTest::Text) => NodeType::Text,
            NodeTest::NodeType(NodeTypeTest::Comment) => NodeType::Comment,
            NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(_)) => {
                NodeType::ProcessingInstruction
            }
            _ => NodeType::Element,
        }
    }

    fn step_matches(&self, node: &Node) -> bool {
        let node_type = node.node_type();
        let (on_axis, principal) = if self.attribute_axis {
            (node_type == NodeType::Attribute, NodeType::Attribute)
        } else {
            (
                !matches!(
                    node_type,
                    NodeType::Attribute | NodeType::Namespace | NodeType::Document
                ),
                NodeType::Element,
            )
        };
        on_axis && axes::matches_node_test(node, &self.test, principal)
    }

    fn matches(&self, node: &Node, env: &mut dyn DynamicContext) -> Result<bool, XsltError> {
        if !self.step_matches(node) {
            return Ok(false);
        }
        if self.first_sibling && node.preceding_siblings().any(|s| self.step_matches(&s)) {
            return Ok(false);
        }
        if let Some(extent) = &self.extent {
            if node.parent().is_none() {
                return Ok(false);
            }
            let selected = env
                .evaluate(extent, &EvaluationContext::new(node.clone()))?
                .into_nodes()?;
            if !selected.contains(node) {
                return Ok(false);
            }
        } else {
            for filter in &self.filters {
                let value = env.evaluate(filter, &EvaluationContext::new(node.clone()))?;
                if !predicate_holds(&value, 1) {
                    return Ok(false);
                }
            }
        }
        match &self.parent {
            None => Ok(true),
            Some((parent, Connector::Parent)) => match node.parent() {
                Some(up) => parent.matches(&up, env),
                None => Ok(false),
            },
            Some((parent, Connector::Ancestor)) => {
                for ancestor in node.ancestors() {
                    if parent.matches(&ancestor, env)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

fn string_values(value: XPathValue) -> Vec<String> {
    match value {
        XPathValue::NodeSet(nodes) => nodes.iter().map(Node::string_value).collect(),
        other => vec![other.to_string()],
    }
}

/// A filter whose outcome depends on the node's siblings, or on a value that may be a
/// number and therefore a position.
fn is_relative(filter: &Expression) -> bool {
    if filter.is_numeric() || filter.uses_position() {
        return true;
    }
    filter.references_variables()
}

fn parse_error(text: &str, message: String) -> XsltError {
    XsltError::XPath(XPathError::XPathParse(text.to_string(), message))
}

// --- Building ---

fn build_path(raw: RawPath, ctx: &dyn StaticContext) -> Result<Pattern, XsltError> {
    let mut current = match raw.anchor {
        None => None,
        Some(RawAnchor::Root) => Some(Pattern::DocumentRoot),
        Some(RawAnchor::Id(mut expr)) => {
            bind(&mut expr, ctx)?;
            Some(Pattern::Id(expr))
        }
        Some(RawAnchor::Key(name, mut value)) => {
            let name = resolve_qname(&name, ctx)?;
            bind(&mut value, ctx)?;
            Some(Pattern::Key { name, value })
        }
    };
    for (connector, step) in raw.steps {
        let parent = current.take().map(|p| (p, connector));
        current = Some(build_step(step, parent, ctx)?);
    }
    current.ok_or_else(|| parse_error("", "empty path".to_string()))
}

fn build_step(
    step: RawStep,
    parent: Option<(Pattern, Connector)>,
    ctx: &dyn StaticContext,
) -> Result<Pattern, XsltError> {
    let RawStep {
        attribute,
        mut test,
        mut filters,
    } = step;
    bind_node_test(&mut test, ctx)?;
    for filter in &mut filters {
        bind(filter, ctx)?;
    }
    if parent.is_none() && filters.is_empty() {
        if let Some(simple) = simple_step(attribute, &test, ctx.name_pool()) {
            return Ok(simple);
        }
    }

    let mut first_sibling = false;
    if !attribute
        && matches!(test, NodeTest::Name(_))
        && filters.len() == 1
        && filters[0] == Expression::Number(1.0)
    {
        filters.clear();
        first_sibling = true;
    }

    let extent = if filters.iter().any(is_relative) {
        let axis = if attribute { Axis::Attribute } else { Axis::Child };
        let last = Step {
            axis,
            node_test: test.clone(),
            predicates: std::mem::take(&mut filters),
        };
        Some(Expression::LocationPath(LocationPath {
            start_point: None,
            is_absolute: false,
            steps: vec![
                Step::new(Axis::Parent, NodeTest::NodeType(NodeTypeTest::Node)),
                last,
            ],
        }))
    } else {
        None
    };

    Ok(Pattern::Path(Box::new(PathPattern {
        parent,
        attribute_axis: attribute,
        test,
        filters,
        first_sibling,
        extent,
    })))
}

fn simple_step(attribute: bool, test: &NodeTest, pool: &NamePool) -> Option<Pattern> {
    let principal = if attribute {
        NodeType::Attribute
    } else {
        NodeType::Element
    };
    let pattern = match test {
        NodeTest::Name(id) => Pattern::Named {
            node_type: principal,
            test: NameTest::Name(*id),
        },
        NodeTest::Namespace(uri) => Pattern::Named {
            node_type: principal,
            test: NameTest::Namespace(uri.clone()),
        },
        NodeTest::Wildcard => Pattern::NodeKind(principal),
        NodeTest::NodeType(NodeTypeTest::Node) if attribute => {
            Pattern::NodeKind(NodeType::Attribute)
        }
        NodeTest::NodeType(NodeTypeTest::Node) => Pattern::AnyChildNode,
        _ if attribute => return None,
        NodeTest::NodeType(NodeTypeTest::Text) => Pattern::NodeKind(NodeType::Text),
        NodeTest::NodeType(NodeTypeTest::Comment) => Pattern::NodeKind(NodeType::Comment),
        NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(None)) => {
            Pattern::NodeKind(NodeType::ProcessingInstruction)
        }
        NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(Some(target))) => {
            Pattern::Named {
                node_type: NodeType::ProcessingInstruction,
                test: NameTest::Name(pool.intern("", target)),
            }
        }
        NodeTest::QName(_) | NodeTest::PrefixWildcard(_) => return None,
    };
    Some(pattern)
}

// --- Parsing ---

enum RawAnchor {
    Root,
    Id(Expression),
    Key(String, Expression),
}

struct RawStep {
    attribute: bool,
    test: NodeTest,
    filters: Vec<Expression>,
}

struct RawPath {
    anchor: Option<RawAnchor>,
    /// Each step with its relation to whatever precedes it.
    steps: Vec<(Connector, RawStep)>,
}

fn union_of_paths(input: &str) -> IResult<&str, Vec<RawPath>> {
    separated_list1(ws(char('|')), ws(path)).parse(input)
}

fn separator(input: &str) -> IResult<&str, Connector> {
    alt((
        map(tag("//"), |_| Connector::Ancestor),
        map(char('/'), |_| Connector::Parent),
    ))
    .parse(input)
}

fn step(input: &str) -> IResult<&str, RawStep> {
    let (i, axis) = opt(alt((tag("@"), tag("attribute::"), tag("child::")))).parse(input)?;
    let (i, test) = node_test(i)?;
    let (i, filters) = many0(predicate).parse(i)?;
    Ok((
        i,
        RawStep {
            attribute: axis.is_some_and(|a| a != "child::"),
            test,
            filters,
        },
    ))
}

fn id_anchor(input: &str) -> IResult<&str, RawAnchor> {
    map(
        preceded(
            pair(tag("id"), ws(char('('))),
            terminated(expression, ws(char(')'))),
        ),
        RawAnchor::Id,
    )
    .parse(input)
}

fn key_anchor(input: &str) -> IResult<&str, RawAnchor> {
    map(
        preceded(
            pair(tag("key"), ws(char('('))),
            (
                ws(string_literal),
                preceded(char(','), expression),
                ws(char(')')),
            ),
        ),
        |(name, value, _)| RawAnchor::Key(name, value),
    )
    .parse(input)
}

fn following_steps(input: &str) -> IResult<&str, Vec<(Connector, RawStep)>> {
    many0(pair(separator, step)).parse(input)
}

fn path(input: &str) -> IResult<&str, RawPath> {
    if let Ok((i, anchor)) = alt((id_anchor, key_anchor)).parse(input) {
        let (i, steps) = following_steps(i)?;
        return Ok((
            i,
            RawPath {
                anchor: Some(anchor),
                steps,
            },
        ));
    }

    if let Ok((i, connector)) = separator(input) {
        let (i, first) = opt(step).parse(i)?;
        return match first {
            None if connector == Connector::Parent => Ok((
                i,
                RawPath {
                    anchor: Some(RawAnchor::Root),
                    steps: Vec::new(),
                },
            )),
            None => Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            ))),
            Some(first) => {
                let (i, more) = following_steps(i)?;
                let mut steps = vec![(connector, first)];
                steps.extend(more);
                Ok((
                    i,
                    RawPath {
                        anchor: Some(RawAnchor::Root),
                        steps,
                    },
                ))
            }
        };
    }

    let (i, first) = delimited(multispace0, step, multispace0).parse(input)?;
    let (i, more) = following_steps(i)?;
    let mut steps = vec![(Connector::Parent, first)];
    steps.extend(more);
    Ok((i, RawPath { anchor: None, steps }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryPolicy;
    use crate::env::StandaloneContext;
    use std::sync::Arc;
    use weft_tree::{Document, parse_document};
    use weft_xpath::{BasicStaticContext, MapHost};

    const SOURCE: &str = r#"<a><b x="1"/><b x="2"/><c><b x="3"/></c><!--note--></a>"#;

    fn setup(xml: &str) -> (BasicStaticContext, Arc<Document>) {
        let pool = NamePool::new();
        let doc = parse_document(xml, &pool).unwrap();
        let mut ctx = BasicStaticContext::new(pool);
        ctx.declare_namespace("p", "urn:p");
        (ctx, doc)
    }

    fn named(doc: &Arc<Document>, local: &str) -> Vec<Node> {
        doc.root()
            .descendants()
            .filter(|n| n.is_element() && n.local_name() == local)
            .collect()
    }

    fn matching(pattern: &str, nodes: &[Node], ctx: &BasicStaticContext) -> Vec<bool> {
        let pattern = Pattern::parse(pattern, ctx).unwrap();
        let mut env = StandaloneContext::new(RecoveryPolicy::Silent);
        nodes
            .iter()
            .map(|n| pattern.matches(n, &mut env).unwrap())
            .collect()
    }

    #[test]
    fn test_single_steps_compile_to_simple_variants() {
        let (ctx, _) = setup(SOURCE);
        let b = Pattern::parse("b", &ctx).unwrap();
        assert!(matches!(
            b,
            Pattern::Named {
                node_type: NodeType::Element,
                test: NameTest::Name(_)
            }
        ));
        assert_eq!(Pattern::parse("*", &ctx).unwrap(), Pattern::NodeKind(NodeType::Element));
        assert_eq!(Pattern::parse("@*", &ctx).unwrap(), Pattern::NodeKind(NodeType::Attribute));
        assert_eq!(Pattern::parse("node()", &ctx).unwrap(), Pattern::AnyChildNode);
        assert_eq!(Pattern::parse("text()", &ctx).unwrap(), Pattern::NodeKind(NodeType::Text));
        assert_eq!(Pattern::parse("/", &ctx).unwrap(), Pattern::DocumentRoot);
        assert!(matches!(Pattern::parse("a/b", &ctx).unwrap(), Pattern::Path(_)));
    }

    #[test]
    fn test_default_priorities() {
        let (ctx, _) = setup(SOURCE);
        let priority = |text: &str| Pattern::parse(text, &ctx).unwrap().default_priority();
        assert_eq!(priority("b"), 0.0);
        assert_eq!(priority("@x"), 0.0);
        assert_eq!(priority("processing-instruction('go')"), 0.0);
        assert_eq!(priority("p:*"), -0.25);
        assert_eq!(priority("*"), -0.5);
        assert_eq!(priority("node()"), -0.5);
        assert_eq!(priority("comment()"), -0.5);
        assert_eq!(priority("a/b"), 0.5);
        assert_eq!(priority("b[1]"), 0.5);
        assert_eq!(priority("//b"), 0.5);
        assert_eq!(priority("/"), 0.5);
    }

    #[test]
    fn test_parent_and_ancestor_connectors() {
        let (ctx, doc) = setup(SOURCE);
        let bs = named(&doc, "b");
        assert_eq!(matching("b", &bs, &ctx), vec![true, true, true]);
        assert_eq!(matching("a/b", &bs, &ctx), vec![true, true, false]);
        assert_eq!(matching("a//b", &bs, &ctx), vec![true, true, true]);
        assert_eq!(matching("/a/c/b", &bs, &ctx), vec![false, false, true]);
        assert_eq!(matching("//b", &bs, &ctx), vec![true, true, true]);
        assert_eq!(matching("/b", &bs, &ctx), vec![false, false, false]);

        let roots = vec![doc.root(), named(&doc, "a")[0].clone()];
        assert_eq!(matching("/", &roots, &ctx), vec![true, false]);
        assert_eq!(matching("/a", &roots, &ctx), vec![false, true]);
        assert_eq!(matching("node()", &roots, &ctx), vec![false, true]);
    }

    #[test]
    fn test_filters() {
        let (ctx, doc) = setup(SOURCE);
        let bs = named(&doc, "b");
        assert_eq!(matching("b[@x='2']", &bs, &ctx), vec![false, true, false]);
        assert_eq!(matching("c/b[@x > 2]", &bs, &ctx), vec![false, false, true]);
        assert_eq!(matching("b[1]", &bs, &ctx), vec![true, false, true]);
        assert_eq!(matching("b[2]", &bs, &ctx), vec![false, true, false]);
        assert_eq!(matching("b[last()]", &bs, &ctx), vec![false, true, true]);
        assert_eq!(matching("b[position() > 1]", &bs, &ctx), vec![false, true, false]);
    }

    #[test]
    fn test_first_sibling_shortcut() {
        let (ctx, _) = setup(SOURCE);
        let Pattern::Path(path) = Pattern::parse("b[1]", &ctx).unwrap() else {
            panic!("expected a path pattern");
        };
        assert!(path.first_sibling);
        assert!(path.extent.is_none());
        let Pattern::Path(path) = Pattern::parse("b[2]", &ctx).unwrap() else {
            panic!("expected a path pattern");
        };
        assert!(path.extent.is_some());
    }

    #[test]
    fn test_variable_filters_use_the_extent() {
        let (mut ctx, doc) = setup(SOURCE);
        ctx.declare_variable("wanted");
        let pattern = Pattern::parse("b[@x = $wanted]", &ctx).unwrap();
        let mut env = StandaloneContext::new(RecoveryPolicy::Silent)
            .with_host(MapHost::new().with_variable("wanted", XPathValue::String("3".into())));
        let results: Vec<bool> = named(&doc, "b")
            .iter()
            .map(|n| pattern.matches(n, &mut env).unwrap())
            .collect();
        assert_eq!(results, vec![false, false, true]);
    }

    #[test]
    fn test_attribute_and_other_node_patterns() {
        let (ctx, doc) = setup(SOURCE);
        let b = named(&doc, "b")[0].clone();
        let attr = b.attributes().next().unwrap();
        let comment = doc
            .root()
            .descendants()
            .find(|n| n.node_type() == NodeType::Comment)
            .unwrap();
        let nodes = vec![attr, b, comment];
        assert_eq!(matching("@x", &nodes, &ctx), vec![true, false, false]);
        assert_eq!(matching("b/@x", &nodes, &ctx), vec![true, false, false]);
        assert_eq!(matching("@*", &nodes, &ctx), vec![true, false, false]);
        assert_eq!(matching("comment()", &nodes, &ctx), vec![false, false, true]);
        assert_eq!(matching("node()", &nodes, &ctx), vec![false, true, true]);
        assert_eq!(matching("a/comment()", &nodes, &ctx), vec![false, false, true]);
    }

    #[test]
    fn test_unions_split_into_alternatives() {
        let (ctx, doc) = setup(SOURCE);
        let pattern = Pattern::parse("c | a/b | @x", &ctx).unwrap();
        let alternatives = pattern.alternatives();
        assert_eq!(alternatives.len(), 3);
        assert_eq!(alternatives[0].default_priority(), 0.0);
        assert_eq!(alternatives[1].default_priority(), 0.5);
        assert_eq!(pattern.node_type(), NodeType::Node);
        let c = named(&doc, "c");
        assert_eq!(matching("c | a/b | @x", &c, &ctx), vec![true]);
    }

    #[test]
    fn test_id_pattern() {
        let (ctx, doc) = setup(r#"<r><e id="k"/><e id="m"/></r>"#);
        let es = named(&doc, "e");
        assert_eq!(matching("id('k')", &es, &ctx), vec![true, false]);
        assert_eq!(matching("id('m k')", &es, &ctx), vec![true, true]);
        assert_eq!(matching("id('k') | id('m')", &es, &ctx), vec![true, true]);
    }

    #[test]
    fn test_fingerprints_and_types() {
        let (ctx, doc) = setup(SOURCE);
        let b_name = named(&doc, "b")[0].name_id();
        assert_eq!(Pattern::parse("b", &ctx).unwrap().fingerprint(), b_name);
        assert_eq!(Pattern::parse("a/b", &ctx).unwrap().fingerprint(), b_name);
        assert_eq!(Pattern::parse("*", &ctx).unwrap().fingerprint(), None);
        assert_eq!(Pattern::parse("a/text()", &ctx).unwrap().node_type(), NodeType::Text);
        assert_eq!(Pattern::parse("@x", &ctx).unwrap().node_type(), NodeType::Attribute);
        assert_eq!(Pattern::parse("key('k', 'v')", &ctx).unwrap().node_type(), NodeType::Node);
    }

    #[test]
    fn test_invalid_patterns() {
        let (ctx, _) = setup(SOURCE);
        for text in ["//", "a/", "b[", "a b", "", "q:name"] {
            assert!(Pattern::parse(text, &ctx).is_err(), "{} should not parse", text);
        }
    }

    #[test]
    fn test_matching_is_repeatable() {
        let (ctx, doc) = setup(SOURCE);
        let bs = named(&doc, "b");
        let first = matching("b[last()]", &bs, &ctx);
        let second = matching("b[last()]", &bs, &ctx);
        assert_eq!(first, second);
    }
}
