//! The name pool: interned, namespace-qualified names.
//!
//! Every element, attribute and processing-instruction name in a tree is stored as a
//! [`NameId`] issued by a shared [`NamePool`]. Stylesheets compile their name tests against
//! the same pool, so matching a node against a name test is a single integer comparison.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

pub use string_cache::DefaultAtom as Atom;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// A compact handle for an expanded name `{uri}local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A namespace-qualified name. The prefix is carried for display only.
#[derive(Debug, Clone)]
pub struct Name {
    pub uri: Atom,
    pub prefix: Atom,
    pub local: Atom,
}

impl Name {
    pub fn new(uri: &str, prefix: &str, local: &str) -> Self {
        Self {
            uri: Atom::from(uri),
            prefix: Atom::from(prefix),
            local: Atom::from(local),
        }
    }

    /// A name in no namespace.
    pub fn local(local: &str) -> Self {
        Self::new("", "", local)
    }

    pub fn display_name(&self) -> String {
        if self.prefix.is_empty() {
            self.local.to_string()
        } else {
            format!("{}:{}", self.prefix, self.local)
        }
    }

    /// Clark notation, `{uri}local`, or just `local` when there is no namespace.
    pub fn clark(&self) -> String {
        if self.uri.is_empty() {
            self.local.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local)
        }
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri && self.local == other.local
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
        self.local.hash(state);
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

#[derive(Default)]
struct PoolEntries {
    names: Vec<(Atom, Atom)>,
    index: HashMap<(Atom, Atom), NameId>,
}

/// Interns expanded names and issues document/stylesheet sequence numbers.
///
/// A pool is shared by reference counting between a compiled stylesheet and every document
/// it processes. Interning takes a write lock only when a name is seen for the first time.
pub struct NamePool {
    entries: RwLock<PoolEntries>,
    sequence: AtomicU64,
}

impl NamePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: RwLock::new(PoolEntries::default()),
            sequence: AtomicU64::new(1),
        })
    }

    pub fn intern(&self, uri: &str, local: &str) -> NameId {
        if let Some(id) = self.lookup(uri, local) {
            return id;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let key = (Atom::from(uri), Atom::from(local));
        if let Some(id) = entries.index.get(&key) {
            return *id;
        }
        let id = NameId(entries.names.len() as u32);
        entries.names.push(key.clone());
        entries.index.insert(key, id);
        id
    }

    pub fn intern_name(&self, name: &Name) -> NameId {
        self.intern(&name.uri, &name.local)
    }

    pub fn lookup(&self, uri: &str, local: &str) -> Option<NameId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .index
            .get(&(Atom::from(uri), Atom::from(local)))
            .copied()
    }

    /// Returns `(uri, local)` for an id issued by this pool.
    pub fn expanded(&self, id: NameId) -> (Atom, Atom) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .names
            .get(id.index())
            .cloned()
            .unwrap_or_else(|| (Atom::from(""), Atom::from("")))
    }

    pub fn uri(&self, id: NameId) -> Atom {
        self.expanded(id).0
    }

    pub fn local_name(&self, id: NameId) -> Atom {
        self.expanded(id).1
    }

    pub fn name(&self, id: NameId, prefix: &Atom) -> Name {
        let (uri, local) = self.expanded(id);
        Name {
            uri,
            prefix: prefix.clone(),
            local,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .names
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Issues a number that orders documents (and identifies stylesheets) sharing this pool.
    pub fn allocate_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }
}

impl fmt::Debug for NamePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamePool").field("names", &self.len()).finish()
    }
}
