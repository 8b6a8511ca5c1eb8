//! A `nom`-based parser for the XPath 1.0 expression language.
//!
//! The parser produces unbound names (`NodeTest::QName`, unbound `VariableRef`s); run the
//! result through [`crate::bind`] before evaluating it.

use super::ast::*;
use crate::error::XPathError;
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit0, digit1, multispace0, satisfy},
    combinator::{map, map_res, not, opt, peek, recognize, value},
    multi::{many0, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
};

type ParseResult<'a, T> = IResult<&'a str, T>;

pub fn parse_expression(input: &str) -> Result<Expression, XPathError> {
    match expression(input.trim()) {
        Ok(("", expr)) => Ok(expr),
        Ok((rest, _)) => Err(XPathError::XPathParse(
            input.to_string(),
            format!("unexpected '{}'", rest),
        )),
        Err(err) => Err(XPathError::XPathParse(input.to_string(), err.to_string())),
    }
}

/// Skips whitespace on both sides of `inner`.
pub fn ws<'a, F, O, E>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
    E: nom::error::ParseError<&'a str>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Operator names such as `div` only count when no name character follows.
fn keyword<'a>(word: &'static str) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    terminated(tag(word), not(peek(satisfy(is_name_char))))
}

fn fold_binary(first: Expression, rest: Vec<(BinaryOperator, Expression)>) -> Expression {
    rest.into_iter().fold(first, |left, (op, right)| Expression::BinaryOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

/// One left-associative precedence level: `operand (operator operand)*`.
fn level<'a, P, O>(operand: P, operator: O) -> impl Fn(&'a str) -> ParseResult<'a, Expression>
where
    P: Fn(&'a str) -> ParseResult<'a, Expression> + Copy,
    O: Fn(&'a str) -> ParseResult<'a, BinaryOperator> + Copy,
{
    move |input| {
        let (input, first) = operand(input)?;
        let (input, rest) = many0(pair(ws(operator), operand)).parse(input)?;
        Ok((input, fold_binary(first, rest)))
    }
}

pub fn expression(input: &str) -> ParseResult<'_, Expression> {
    level(and_expr, |i| value(BinaryOperator::Or, keyword("or")).parse(i))(input)
}

fn and_expr(input: &str) -> ParseResult<'_, Expression> {
    level(equality_expr, |i| value(BinaryOperator::And, keyword("and")).parse(i))(input)
}

fn equality_expr(input: &str) -> ParseResult<'_, Expression> {
    level(relational_expr, |i| {
        alt((
            value(BinaryOperator::NotEquals, tag("!=")),
            value(BinaryOperator::Equals, tag("=")),
        ))
        .parse(i)
    })(input)
}

fn relational_expr(input: &str) -> ParseResult<'_, Expression> {
    level(additive_expr, |i| {
        alt((
            value(BinaryOperator::LessThanOrEqual, tag("<=")),
            value(BinaryOperator::GreaterThanOrEqual, tag(">=")),
            value(BinaryOperator::LessThan, tag("<")),
            value(BinaryOperator::GreaterThan, tag(">")),
        ))
        .parse(i)
    })(input)
}

fn additive_expr(input: &str) -> ParseResult<'_, Expression> {
    level(multiplicative_expr, |i| {
        alt((
            value(BinaryOperator::Plus, char('+')),
            value(BinaryOperator::Minus, char('-')),
        ))
        .parse(i)
    })(input)
}

fn multiplicative_expr(input: &str) -> ParseResult<'_, Expression> {
    level(unary_expr, |i| {
        alt((
            value(BinaryOperator::Multiply, char('*')),
            value(BinaryOperator::Divide, keyword("div")),
            value(BinaryOperator::Modulo, keyword("mod")),
        ))
        .parse(i)
    })(input)
}

fn unary_expr(input: &str) -> ParseResult<'_, Expression> {
    let (input, signs) = many0(ws(char::<&str, nom::error::Error<&str>>('-'))).parse(input)?;
    let (input, operand) = union_expr(input)?;
    let expr = signs.iter().fold(operand, |expr, _| Expression::UnaryOp {
        op: UnaryOperator::Minus,
        expr: Box::new(expr),
    });
    Ok((input, expr))
}

fn union_expr(input: &str) -> ParseResult<'_, Expression> {
    level(path_expr, |i| value(BinaryOperator::Union, char('|')).parse(i))(input)
}

/// A location path, or a filter expression optionally continued by `/` or `//` steps.
/// Filter expressions are tried first so `last()` is a call rather than a step.
fn path_expr(input: &str) -> ParseResult<'_, Expression> {
    let (input, _) = multispace0(input)?;
    if let Ok((rest, primary)) = filter_expr(input) {
        let (rest, steps) = trailing_steps(rest, Vec::new())?;
        let (rest, _) = multispace0(rest)?;
        let expr = if steps.is_empty() {
            primary
        } else {
            Expression::LocationPath(LocationPath {
                start_point: Some(Box::new(primary)),
                is_absolute: false,
                steps,
            })
        };
        return Ok((rest, expr));
    }
    let (rest, path) = location_path(input)?;
    let (rest, _) = multispace0(rest)?;
    Ok((rest, Expression::LocationPath(path)))
}

fn filter_expr(input: &str) -> ParseResult<'_, Expression> {
    let (input, primary) = primary_expr(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    if predicates.is_empty() {
        return Ok((input, primary));
    }
    Ok((
        input,
        Expression::Filter {
            primary: Box::new(primary),
            predicates,
        },
    ))
}

fn primary_expr(input: &str) -> ParseResult<'_, Expression> {
    alt((
        map(preceded(char('$'), q_name), |name| {
            Expression::Variable(VariableRef::unbound(name))
        }),
        map(number, Expression::Number),
        map(string_literal, Expression::Literal),
        function_call,
        delimited(ws(char('(')), expression, ws(char(')'))),
    ))
    .parse(input)
}

fn number(input: &str) -> ParseResult<'_, f64> {
    map_res(
        alt((
            recognize(pair(digit1, opt(pair(char('.'), digit0)))),
            recognize(pair(char('.'), digit1)),
        )),
        str::parse::<f64>,
    )
    .parse(input)
}

fn quoted<'a>(quote: char) -> impl Parser<&'a str, Output = &'a str, Error = nom::error::Error<&'a str>> {
    delimited(char(quote), take_while(move |c: char| c != quote), char(quote))
}

pub fn string_literal(input: &str) -> ParseResult<'_, String> {
    map(alt((quoted('"'), quoted('\''))), str::to_string).parse(input)
}

pub fn nc_name(input: &str) -> ParseResult<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(is_name_char),
    ))
    .parse(input)
}

pub fn q_name(input: &str) -> ParseResult<'_, String> {
    map(recognize(pair(nc_name, opt(pair(char(':'), nc_name)))), str::to_string).parse(input)
}

const NODE_TYPES: [&str; 4] = ["comment", "text", "processing-instruction", "node"];

fn function_call(input: &str) -> ParseResult<'_, Expression> {
    let (rest, name) = q_name(input)?;
    if NODE_TYPES.contains(&name.as_str()) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (rest, args) = preceded(
        ws(char('(')),
        terminated(separated_list0(ws(char(',')), expression), ws(char(')'))),
    )
    .parse(rest)?;
    Ok((rest, Expression::FunctionCall { name, args }))
}

fn empty_parens<'a>() -> impl Parser<&'a str, Output = (char, char), Error = nom::error::Error<&'a str>> {
    pair(ws(char('(')), char(')'))
}

fn node_type_test(input: &str) -> ParseResult<'_, NodeTest> {
    alt((
        value(NodeTest::NodeType(NodeTypeTest::Comment), terminated(tag("comment"), empty_parens())),
        value(NodeTest::NodeType(NodeTypeTest::Text), terminated(tag("text"), empty_parens())),
        value(NodeTest::NodeType(NodeTypeTest::Node), terminated(tag("node"), empty_parens())),
        map(
            delimited(
                pair(tag("processing-instruction"), ws(char('('))),
                opt(ws(string_literal)),
                char(')'),
            ),
            |target| NodeTest::NodeType(NodeTypeTest::ProcessingInstruction(target)),
        ),
    ))
    .parse(input)
}

pub fn node_test(input: &str) -> ParseResult<'_, NodeTest> {
    alt((
        value(NodeTest::Wildcard, char('*')),
        node_type_test,
        map(terminated(nc_name, tag(":*")), |prefix| {
            NodeTest::PrefixWildcard(prefix.to_string())
        }),
        map(q_name, NodeTest::QName),
    ))
    .parse(input)
}

/// Longer names first where one is a prefix of another.
const AXES: [(&str, Axis); 13] = [
    ("ancestor-or-self", Axis::AncestorOrSelf),
    ("ancestor", Axis::Ancestor),
    ("attribute", Axis::Attribute),
    ("child", Axis::Child),
    ("descendant-or-self", Axis::DescendantOrSelf),
    ("descendant", Axis::Descendant),
    ("following-sibling", Axis::FollowingSibling),
    ("following", Axis::Following),
    ("namespace", Axis::Namespace),
    ("parent", Axis::Parent),
    ("preceding-sibling", Axis::PrecedingSibling),
    ("preceding", Axis::Preceding),
    ("self", Axis::SelfAxis),
];

fn axis_specifier(input: &str) -> ParseResult<'_, Axis> {
    for (name, axis) in AXES {
        if let Ok((rest, _)) = terminated(tag::<_, _, nom::error::Error<&str>>(name), ws(tag("::"))).parse(input) {
            return Ok((rest, axis));
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)))
}

pub fn predicate(input: &str) -> ParseResult<'_, Expression> {
    delimited(ws(char('[')), expression, ws(char(']'))).parse(input)
}

fn any_node() -> NodeTest {
    NodeTest::NodeType(NodeTypeTest::Node)
}

fn step(input: &str) -> ParseResult<'_, Step> {
    let (input, (axis, test)) = alt((
        value((Axis::Parent, any_node()), tag("..")),
        value((Axis::SelfAxis, any_node()), char('.')),
        map(preceded(ws(char('@')), node_test), |test| (Axis::Attribute, test)),
        map(pair(opt(axis_specifier), node_test), |(axis, test)| {
            (axis.unwrap_or(Axis::Child), test)
        }),
    ))
    .parse(input)?;
    let (input, predicates) = many0(predicate).parse(input)?;
    let mut step = Step::new(axis, test);
    step.predicates = predicates;
    Ok((input, step))
}

/// Appends `/step` and `//step` continuations to `steps`.
fn trailing_steps(mut input: &str, mut steps: Vec<Step>) -> ParseResult<'_, Vec<Step>> {
    loop {
        let Ok((rest, separator)) = alt((tag::<_, _, nom::error::Error<&str>>("//"), tag("/"))).parse(input) else {
            return Ok((input, steps));
        };
        let Ok((rest, next)) = step(rest) else {
            return Ok((input, steps));
        };
        if separator == "//" {
            steps.push(Step::new(Axis::DescendantOrSelf, any_node()));
        }
        steps.push(next);
        input = rest;
    }
}

fn location_path(input: &str) -> ParseResult<'_, LocationPath> {
    let (input, is_absolute, first) = if let Some(rest) = input.strip_prefix("//") {
        let (rest, first) = step(rest)?;
        (rest, true, vec![Step::new(Axis::DescendantOrSelf, any_node()), first])
    } else if let Some(rest) = input.strip_prefix('/') {
        match step(rest) {
            Ok((after, first)) => (after, true, vec![first]),
            Err(_) => (rest, true, Vec::new()),
        }
    } else {
        let (rest, first) = step(input)?;
        (rest, false, vec![first])
    };
    let (input, steps) = if first.is_empty() {
        (input, first)
    } else {
        trailing_steps(input, first)?
    };
    Ok((
        input,
        LocationPath {
            start_point: None,
            is_absolute,
            steps,
        },
    ))
}
