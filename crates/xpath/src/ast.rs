//! Defines the Abstract Syntax Tree (AST) for XPath 1.0 expressions.

use weft_tree::{Atom, NameId};

/// The top-level expression that can be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(String),
    Number(f64),
    LocationPath(LocationPath),
    /// A primary expression filtered by predicates, e.g. `$items[2]` or `(//a)[last()]`.
    Filter {
        primary: Box<Expression>,
        predicates: Vec<Expression>,
    },
    Variable(VariableRef),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
}

impl Expression {
    /// Checks if the expression is a `LocationPath` variant.
    pub fn is_location_path(&self) -> bool {
        matches!(self, Expression::LocationPath(_))
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Expression::Variable(_))
    }

    /// True if the expression statically yields a number. Used to decide whether a
    /// predicate is a position test.
    pub fn is_numeric(&self) -> bool {
        match self {
            Expression::Number(_) => true,
            Expression::UnaryOp { .. } => true,
            Expression::BinaryOp { op, .. } => op.is_arithmetic(),
            Expression::FunctionCall { name, .. } => matches!(
                name.as_str(),
                "position"
                    | "last"
                    | "count"
                    | "sum"
                    | "number"
                    | "string-length"
                    | "floor"
                    | "ceiling"
                    | "round"
            ),
            _ => false,
        }
    }

    /// True if evaluating the expression in a focus consults `position()` or `last()`.
    /// Predicates of nested steps have their own focus and are not inspected.
    pub fn uses_position(&self) -> bool {
        match self {
            Expression::FunctionCall { name, args } => {
                name == "position" || name == "last" || args.iter().any(Expression::uses_position)
            }
            Expression::BinaryOp { left, right, .. } => {
                left.uses_position() || right.uses_position()
            }
            Expression::UnaryOp { expr, .. } => expr.uses_position(),
            Expression::Filter { primary, .. } => primary.uses_position(),
            Expression::LocationPath(path) => path
                .start_point
                .as_ref()
                .is_some_and(|start| start.uses_position()),
            _ => false,
        }
    }

    /// True if a variable reference occurs anywhere in the expression, predicates of
    /// nested steps included.
    pub fn references_variables(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| found |= e.is_variable());
        found
    }

    /// Visits this expression and every sub-expression, depth first.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expression)) {
        visit(self);
        match self {
            Expression::LocationPath(path) => path.walk(visit),
            Expression::Filter {
                primary,
                predicates,
            } => {
                primary.walk(visit);
                predicates.iter().for_each(|p| p.walk(visit));
            }
            Expression::FunctionCall { args, .. } => args.iter().for_each(|a| a.walk(visit)),
            Expression::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expression::UnaryOp { expr, .. } => expr.walk(visit),
            _ => {}
        }
    }

    pub fn calls_function(&self, function: &str) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if let Expression::FunctionCall { name, .. } = e {
                found |= name == function;
            }
        });
        found
    }
}

/// A reference to a variable, resolved to a slot by the binding pass.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableRef {
    pub name: String,
    pub binding: Option<Binding>,
}

impl VariableRef {
    pub fn unbound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingScope {
    Global,
    Local,
}

/// A compile-time handle for one declared variable or parameter slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Binding {
    pub name: NameId,
    pub slot: usize,
    pub scope: BindingScope,
    pub assignable: bool,
}

impl Binding {
    pub fn global(name: NameId, slot: usize) -> Self {
        Self {
            name,
            slot,
            scope: BindingScope::Global,
            assignable: false,
        }
    }

    pub fn local(name: NameId, slot: usize) -> Self {
        Self {
            name,
            slot,
            scope: BindingScope::Local,
            assignable: false,
        }
    }

    pub fn assignable(mut self) -> Self {
        self.assignable = true;
        self
    }

    pub fn is_global(&self) -> bool {
        self.scope == BindingScope::Global
    }
}

/// A unary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
}

/// A binary operator used in an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Logical
    Or,
    And,
    // Equality
    Equals,
    NotEquals,
    // Relational
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Additive
    Plus,
    Minus,
    // Multiplicative
    Multiply,
    Divide,
    Modulo,
    // Set
    Union,
}

impl BinaryOperator {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo
        )
    }
}

/// Represents a full location path, like `/child::foo`, `descendant::bar[1]`, or `$var/item`.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationPath {
    /// An optional starting expression, for paths like `$var/foo` or `func()/foo`.
    /// If `None`, the path starts from the context node or root.
    pub start_point: Option<Box<Expression>>,
    /// True if the path starts from the document root (e.g., `/foo`).
    /// Meaningless if `start_point` is `Some`.
    pub is_absolute: bool,
    pub steps: Vec<Step>,
}

impl LocationPath {
    fn walk(&self, visit: &mut dyn FnMut(&Expression)) {
        if let Some(start) = &self.start_point {
            start.walk(visit);
        }
        for step in &self.steps {
            step.predicates.iter().for_each(|p| p.walk(visit));
        }
    }
}

/// Represents a single step in a location path, like `child::foo[position() > 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expression>,
}

impl Step {
    pub fn new(axis: Axis, node_test: NodeTest) -> Self {
        Self {
            axis,
            node_test,
            predicates: vec![],
        }
    }
}

/// The axis of movement from the context node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Attribute,
    Namespace,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    /// Reverse axes number their proximity positions backwards from the context node.
    pub fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

/// A test to apply to nodes on a given axis to see if they should be included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// A qualified name as written, before binding (e.g. `foo`, `fo:block`).
    QName(String),
    /// `prefix:*` as written, before binding.
    PrefixWildcard(String),
    /// A bound name test.
    Name(NameId),
    /// A bound `prefix:*` test, holding the namespace URI.
    Namespace(Atom),
    /// A wildcard test (`*`).
    Wildcard,
    /// A node type test (e.g., `text()`, `node()`).
    NodeType(NodeTypeTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTypeTest {
    Text,
    Node,
    Comment,
    /// `processing-instruction()` or `processing-instruction('target')`.
    ProcessingInstruction(Option<String>),
}
