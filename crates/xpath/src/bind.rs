//! The binding pass: resolves prefixes, variable names and function names in a parsed
//! expression against a static context.

use crate::ast::{Binding, Expression, NodeTest, VariableRef};
use crate::error::XPathError;
use crate::functions;
use crate::parser::parse_expression;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use weft_tree::{Atom, NameId, NamePool, XML_NAMESPACE};

/// What the compiler knows about the surroundings of an expression.
pub trait StaticContext {
    fn name_pool(&self) -> &NamePool;

    /// The namespace URI bound to `prefix`, or `None` if it is not declared.
    fn resolve_prefix(&self, prefix: &str) -> Option<String>;

    fn bind_variable(&self, name: NameId) -> Option<Binding>;

    /// Functions supplied by the host in addition to the core library.
    fn is_host_function(&self, _name: &str) -> bool {
        false
    }
}

/// Parses and binds `text` in one go.
pub fn compile(text: &str, ctx: &dyn StaticContext) -> Result<Expression, XPathError> {
    let mut expr = parse_expression(text)?;
    bind(&mut expr, ctx)?;
    Ok(expr)
}

/// Resolves a lexical QName. Unprefixed names are in no namespace.
pub fn resolve_qname(qname: &str, ctx: &dyn StaticContext) -> Result<NameId, XPathError> {
    match qname.split_once(':') {
        Some((prefix, local)) => {
            let uri = lookup_prefix(prefix, ctx)?;
            Ok(ctx.name_pool().intern(&uri, local))
        }
        None => Ok(ctx.name_pool().intern("", qname)),
    }
}

fn lookup_prefix(prefix: &str, ctx: &dyn StaticContext) -> Result<String, XPathError> {
    if prefix == "xml" {
        return Ok(XML_NAMESPACE.to_string());
    }
    ctx.resolve_prefix(prefix)
        .filter(|uri| !uri.is_empty())
        .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))
}

pub fn bind_node_test(test: &mut NodeTest, ctx: &dyn StaticContext) -> Result<(), XPathError> {
    match test {
        NodeTest::QName(qname) => {
            *test = NodeTest::Name(resolve_qname(qname, ctx)?);
        }
        NodeTest::PrefixWildcard(prefix) => {
            *test = NodeTest::Namespace(Atom::from(lookup_prefix(prefix, ctx)?));
        }
        _ => {}
    }
    Ok(())
}

pub fn bind(expr: &mut Expression, ctx: &dyn StaticContext) -> Result<(), XPathError> {
    match expr {
        Expression::Literal(_) | Expression::Number(_) => Ok(()),
        Expression::Variable(var) => bind_variable(var, ctx),
        Expression::LocationPath(path) => {
            if let Some(start) = path.start_point.as_deref_mut() {
                bind(start, ctx)?;
            }
            for step in &mut path.steps {
                bind_node_test(&mut step.node_test, ctx)?;
                for predicate in &mut step.predicates {
                    bind(predicate, ctx)?;
                }
            }
            Ok(())
        }
        Expression::Filter {
            primary,
            predicates,
        } => {
            bind(primary, ctx)?;
            predicates.iter_mut().try_for_each(|p| bind(p, ctx))
        }
        Expression::FunctionCall { name, args } => {
            if !functions::is_core_function(name) && !ctx.is_host_function(name) {
                return Err(XPathError::UnknownFunction(name.clone()));
            }
            args.iter_mut().try_for_each(|a| bind(a, ctx))
        }
        Expression::BinaryOp { left, right, .. } => {
            bind(left, ctx)?;
            bind(right, ctx)
        }
        Expression::UnaryOp { expr, .. } => bind(expr, ctx),
    }
}

fn bind_variable(var: &mut VariableRef, ctx: &dyn StaticContext) -> Result<(), XPathError> {
    let name = resolve_qname(&var.name, ctx)?;
    let binding = ctx
        .bind_variable(name)
        .ok_or_else(|| XPathError::UnknownVariable(var.name.clone()))?;
    var.binding = Some(binding);
    Ok(())
}

/// A self-contained static context, for callers that compile expressions outside a
/// stylesheet.
pub struct BasicStaticContext {
    pool: Arc<NamePool>,
    namespaces: HashMap<String, String>,
    variables: HashMap<NameId, Binding>,
    host_functions: HashSet<String>,
}

impl BasicStaticContext {
    pub fn new(pool: Arc<NamePool>) -> Self {
        Self {
            pool,
            namespaces: HashMap::new(),
            variables: HashMap::new(),
            host_functions: HashSet::new(),
        }
    }

    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
    }

    /// Declares a global variable and returns its binding. Slots are allocated in order.
    pub fn declare_variable(&mut self, name: &str) -> Binding {
        let id = self.pool.intern("", name);
        let binding = Binding::global(id, self.variables.len());
        self.variables.insert(id, binding);
        binding
    }

    pub fn declare_function(&mut self, name: &str) {
        self.host_functions.insert(name.to_string());
    }
}

impl StaticContext for BasicStaticContext {
    fn name_pool(&self) -> &NamePool {
        &self.pool
    }

    fn resolve_prefix(&self, prefix: &str) -> Option<String> {
        self.namespaces.get(prefix).cloned()
    }

    fn bind_variable(&self, name: NameId) -> Option<Binding> {
        self.variables.get(&name).copied()
    }

    fn is_host_function(&self, name: &str) -> bool {
        self.host_functions.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Axis, BindingScope};

    #[test]
    fn test_bind_resolves_names_and_variables() {
        let pool = NamePool::new();
        let mut ctx = BasicStaticContext::new(Arc::clone(&pool));
        ctx.declare_namespace("p", "urn:p");
        let binding = ctx.declare_variable("limit");

        let expr = compile("p:item[@n < $limit]/p:*", &ctx).unwrap();
        let Expression::LocationPath(path) = expr else {
            panic!("expected a location path");
        };
        assert_eq!(path.steps[0].node_test, NodeTest::Name(pool.intern("urn:p", "item")));
        assert_eq!(path.steps[1].node_test, NodeTest::Namespace(Atom::from("urn:p")));
        let Expression::BinaryOp { right, .. } = &path.steps[0].predicates[0] else {
            panic!("expected a comparison");
        };
        let Expression::Variable(var) = right.as_ref() else {
            panic!("expected a variable");
        };
        assert_eq!(var.binding, Some(binding));
        assert_eq!(binding.scope, BindingScope::Global);
        assert_eq!(path.steps[1].axis, Axis::Child);
    }

    #[test]
    fn test_bind_rejects_unknown_names() {
        let pool = NamePool::new();
        let ctx = BasicStaticContext::new(pool);
        assert!(matches!(compile("q:a", &ctx), Err(XPathError::UnboundPrefix(_))));
        assert!(matches!(compile("$nope", &ctx), Err(XPathError::UnknownVariable(_))));
        assert!(matches!(compile("frobnicate()", &ctx), Err(XPathError::UnknownFunction(_))));
    }

    #[test]
    fn test_host_functions_are_accepted() {
        let pool = NamePool::new();
        let mut ctx = BasicStaticContext::new(pool);
        ctx.declare_function("key");
        assert!(compile("key('k', 'v')", &ctx).is_ok());
    }
}
