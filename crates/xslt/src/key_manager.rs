//! `xsl:key` definitions and the lazily built indexes behind `key()`.
//!
//! Indexes are stored on the source document, keyed by the owning stylesheet and the key
//! name, so concurrent runs of one stylesheet over one document build each index once.

use crate::env::DynamicContext;
use crate::error::{Location, XsltError};
use crate::pattern::Pattern;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use weft_tree::{Document, IndexClaim, KeyIndex, NameId, Node, NodeType};
use weft_xpath::{EvaluationContext, Expression, XPathValue};

#[derive(Debug, Clone)]
pub struct KeyDefinition {
    pub name: NameId,
    pub pattern: Pattern,
    pub use_expr: Expression,
    pub line: u32,
}

#[derive(Debug)]
pub struct KeyManager {
    keys: HashMap<NameId, Vec<KeyDefinition>>,
    owner: u64,
    builds: AtomicUsize,
}

impl KeyManager {
    /// `owner` must be unique among the stylesheets that may index the same documents.
    pub fn new(owner: u64) -> Self {
        Self {
            keys: HashMap::new(),
            owner,
            builds: AtomicUsize::new(0),
        }
    }

    /// Definitions sharing a name contribute to one index.
    pub fn add_definition(&mut self, definition: KeyDefinition) {
        self.keys.entry(definition.name).or_default().push(definition);
    }

    pub fn is_defined(&self, name: NameId) -> bool {
        self.keys.contains_key(&name)
    }

    /// How many indexes this manager has built so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    /// The nodes of `document` whose value for key `key` is `value`, in document order.
    pub fn select_by_key(
        &self,
        key: NameId,
        document: &Arc<Document>,
        value: &str,
        env: &mut dyn DynamicContext,
    ) -> Result<Vec<Node>, XsltError> {
        let Some(definitions) = self.keys.get(&key) else {
            return Err(XsltError::unresolved(
                format!("key '{}' is not defined", key_name(document, key)),
                Location::default(),
            ));
        };
        let index = match document.key_indexes().claim(self.owner, key) {
            IndexClaim::Ready(index) => index,
            IndexClaim::Circular => {
                return Err(XsltError::CircularDefinition {
                    what: format!("key '{}'", key_name(document, key)),
                });
            }
            IndexClaim::Build(guard) => {
                let index = build_index(definitions, document, env)?;
                self.builds.fetch_add(1, Ordering::Relaxed);
                log::debug!(
                    "built index for key '{}' with {} values",
                    key_name(document, key),
                    index.len()
                );
                guard.publish(index)
            }
        };
        Ok(index
            .get(value)
            .iter()
            .filter_map(|id| document.node(*id))
            .collect())
    }
}

fn key_name(document: &Document, key: NameId) -> String {
    document.name_pool().local_name(key).to_string()
}

fn build_index(
    definitions: &[KeyDefinition],
    document: &Arc<Document>,
    env: &mut dyn DynamicContext,
) -> Result<KeyIndex, XsltError> {
    let mut index = KeyIndex::new();
    let root = document.root();
    for definition in definitions {
        let node_type = definition.pattern.node_type();
        if node_type == NodeType::Attribute {
            for element in root.descendants().filter(Node::is_element) {
                for attribute in element.attributes() {
                    index_node(definition, &attribute, &mut index, env)?;
                }
            }
            continue;
        }
        for node in std::iter::once(root.clone()).chain(root.descendants()) {
            index_node(definition, &node, &mut index, env)?;
            if node_type == NodeType::Node && node.is_element() {
                for attribute in node.attributes() {
                    index_node(definition, &attribute, &mut index, env)?;
                }
            }
        }
    }
    Ok(index)
}

fn index_node(
    definition: &KeyDefinition,
    node: &Node,
    index: &mut KeyIndex,
    env: &mut dyn DynamicContext,
) -> Result<(), XsltError> {
    if !definition.pattern.matches(node, env)? {
        return Ok(());
    }
    let value = env.evaluate(&definition.use_expr, &EvaluationContext::new(node.clone()))?;
    match value {
        XPathValue::NodeSet(selected) => {
            for key_node in selected {
                index.insert(key_node.string_value(), node.id());
            }
        }
        other => index.insert(other.to_string(), node.id()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecoveryPolicy;
    use crate::env::StandaloneContext;
    use weft_tree::{NamePool, parse_document};
    use weft_xpath::{BasicStaticContext, StaticContext, compile};

    fn manager(ctx: &BasicStaticContext, defs: &[(&str, &str, &str)]) -> KeyManager {
        let mut keys = KeyManager::new(ctx.name_pool().allocate_sequence());
        for (name, pattern, use_expr) in defs {
            keys.add_definition(KeyDefinition {
                name: ctx.name_pool().intern("", name),
                pattern: Pattern::parse(pattern, ctx).unwrap(),
                use_expr: compile(use_expr, ctx).unwrap(),
                line: 1,
            });
        }
        keys
    }

    fn lookup(keys: &KeyManager, doc: &Arc<Document>, name: &str, value: &str) -> Vec<Node> {
        let mut env = StandaloneContext::new(RecoveryPolicy::Strict).with_keys(keys);
        let key = doc.name_pool().intern("", name);
        keys.select_by_key(key, doc, value, &mut env).unwrap()
    }

    #[test]
    fn test_lookup_by_attribute_value() {
        let pool = NamePool::new();
        let doc = parse_document(r#"<a id="x1"/>"#, &pool).unwrap();
        let ctx = BasicStaticContext::new(pool);
        let keys = manager(&ctx, &[("k", "a", "@id")]);
        let found = lookup(&keys, &doc, "k", "x1");
        assert_eq!(found, vec![doc.document_element().unwrap()]);
        assert!(lookup(&keys, &doc, "k", "x2").is_empty());
    }

    #[test]
    fn test_index_is_built_once() {
        let pool = NamePool::new();
        let doc = parse_document(r#"<r><i k="1"/><i k="2"/><i k="1"/></r>"#, &pool).unwrap();
        let ctx = BasicStaticContext::new(pool);
        let keys = manager(&ctx, &[("k", "i", "@k")]);
        let first = lookup(&keys, &doc, "k", "1");
        let second = lookup(&keys, &doc, "k", "1");
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(keys.build_count(), 1);
    }

    #[test]
    fn test_node_set_use_values_and_shared_names() {
        let pool = NamePool::new();
        let doc = parse_document(
            "<r><book><author>A</author><author>B</author></book><book><author>A</author></book><film><by>A</by></film></r>",
            &pool,
        )
        .unwrap();
        let ctx = BasicStaticContext::new(pool);
        let keys = manager(&ctx, &[("by", "film", "by"), ("by", "book", "author")]);
        let books: Vec<Node> = doc.document_element().unwrap().children().collect();
        assert_eq!(lookup(&keys, &doc, "by", "A"), books);
        assert_eq!(lookup(&keys, &doc, "by", "B"), vec![books[0].clone()]);
        assert_eq!(keys.build_count(), 1);
    }

    #[test]
    fn test_attribute_keys() {
        let pool = NamePool::new();
        let doc = parse_document(r#"<r><x ref="p" other="p"/><y ref="p"/></r>"#, &pool).unwrap();
        let ctx = BasicStaticContext::new(pool);
        let keys = manager(&ctx, &[("refs", "@ref", ".")]);
        let found = lookup(&keys, &doc, "refs", "p");
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|n| n.node_type() == NodeType::Attribute && n.local_name() == "ref"));
    }

    #[test]
    fn test_undefined_key() {
        let pool = NamePool::new();
        let doc = parse_document("<r/>", &pool).unwrap();
        let ctx = BasicStaticContext::new(pool);
        let keys = manager(&ctx, &[]);
        let mut env = StandaloneContext::new(RecoveryPolicy::Strict);
        let missing = doc.name_pool().intern("", "missing");
        let result = keys.select_by_key(missing, &doc, "v", &mut env);
        assert!(matches!(result, Err(XsltError::UnresolvedReference { .. })));
    }

    #[test]
    fn test_concurrent_lookups_share_one_build() {
        let pool = NamePool::new();
        let xml = format!(
            "<r>{}</r>",
            (0..200).map(|i| format!("<i k='{}'/>", i % 7)).collect::<String>()
        );
        let doc = parse_document(&xml, &pool).unwrap();
        let ctx = BasicStaticContext::new(pool);
        let keys = Arc::new(manager(&ctx, &[("k", "i", "@k")]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let keys = Arc::clone(&keys);
                let doc = Arc::clone(&doc);
                std::thread::spawn(move || lookup(&keys, &doc, "k", "3").len())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 29);
        }
        assert_eq!(keys.build_count(), 1);
    }
}
