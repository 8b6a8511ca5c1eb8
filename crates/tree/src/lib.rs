//! The node model for the weft XSLT engine.
//!
//! Documents are immutable arenas of nodes stored in document order, built once from a
//! stream of parse events and shared between transformations through `Arc`.

pub mod builder;
pub mod document;
pub mod error;
pub mod key_index;
pub mod names;
pub mod node;
pub mod space;
pub mod xml;

pub use builder::{ContentHandler, TreeBuilder};
pub use document::Document;
pub use error::TreeError;
pub use key_index::{IndexClaim, KeyIndex};
pub use names::{Atom, Name, NameId, NamePool, XML_NAMESPACE};
pub use node::{Node, NodeId, NodeKind, NodeType};
pub use space::{SpaceRules, SpaceTest};
pub use xml::{parse_document, parse_document_with};
