//! Node sequences that may or may not know their length up front, and the lookahead
//! wrapper that answers `last()` for the lazy ones.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use weft_tree::Node;

/// The result of evaluating an expression as a sequence of nodes in document order.
pub enum NodeSequence {
    Materialized(std::vec::IntoIter<Node>),
    /// Nodes produced on demand from a single forward axis walk.
    Lazy(Box<dyn Iterator<Item = Node>>),
}

impl NodeSequence {
    pub fn from_vec(nodes: Vec<Node>) -> Self {
        NodeSequence::Materialized(nodes.into_iter())
    }

    /// The number of nodes still to come, when it is known without consuming anything.
    pub fn known_len(&self) -> Option<usize> {
        match self {
            NodeSequence::Materialized(iter) => Some(iter.len()),
            NodeSequence::Lazy(_) => None,
        }
    }

    pub fn is_lazy(&self) -> bool {
        matches!(self, NodeSequence::Lazy(_))
    }

    pub fn into_vec(self) -> Vec<Node> {
        self.collect()
    }
}

impl Iterator for NodeSequence {
    type Item = Node;

    fn next(&mut self) -> Option<Node> {
        match self {
            NodeSequence::Materialized(iter) => iter.next(),
            NodeSequence::Lazy(iter) => iter.next(),
        }
    }
}

/// Computes the context size on request.
pub trait LastPositionFinder {
    fn last_position(&self) -> usize;
}

/// How `last()` is answered for one focus.
#[derive(Clone)]
pub enum LastPosition {
    Known(usize),
    Deferred(Rc<dyn LastPositionFinder>),
}

impl LastPosition {
    pub fn resolve(&self) -> usize {
        match self {
            LastPosition::Known(size) => *size,
            LastPosition::Deferred(finder) => finder.last_position(),
        }
    }
}

impl std::fmt::Debug for LastPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LastPosition::Known(size) => write!(f, "Known({})", size),
            LastPosition::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

struct LookaheadState {
    source: NodeSequence,
    buffered: VecDeque<Node>,
    delivered: usize,
    exhausted: bool,
}

/// Wraps a lazy sequence. Nodes are handed out one at a time; asking for the last
/// position drains the rest of the source into a buffer, which later calls to
/// [`Lookahead::next_node`] read from.
pub struct Lookahead {
    state: RefCell<LookaheadState>,
}

impl Lookahead {
    pub fn new(source: NodeSequence) -> Rc<Self> {
        Rc::new(Self {
            state: RefCell::new(LookaheadState {
                source,
                buffered: VecDeque::new(),
                delivered: 0,
                exhausted: false,
            }),
        })
    }

    pub fn next_node(&self) -> Option<Node> {
        let mut state = self.state.borrow_mut();
        let next = match state.buffered.pop_front() {
            Some(node) => Some(node),
            None if state.exhausted => None,
            None => {
                let next = state.source.next();
                state.exhausted = next.is_none();
                next
            }
        };
        if next.is_some() {
            state.delivered += 1;
        }
        next
    }

    /// True once the source has been drained by a `last()` request.
    pub fn has_looked_ahead(&self) -> bool {
        self.state.borrow().exhausted
    }
}

impl LastPositionFinder for Lookahead {
    fn last_position(&self) -> usize {
        let mut state = self.state.borrow_mut();
        if !state.exhausted {
            let rest: Vec<Node> = state.source.by_ref().collect();
            state.buffered.extend(rest);
            state.exhausted = true;
        }
        state.delivered + state.buffered.len()
    }
}
