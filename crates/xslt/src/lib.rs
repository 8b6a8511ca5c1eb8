//! XSLT 1.0 for weft: a stylesheet compiler and the run-time engine that applies a
//! compiled stylesheet to `weft-tree` documents.
//!
//! Compile once with [`Stylesheet`], then transform any number of documents, each run
//! driven by its own [`Controller`].

pub mod ast;
pub mod bindery;
pub mod compiler;
pub mod config;
pub mod context;
pub mod controller;
pub mod decimal_format;
pub mod env;
pub mod error;
pub mod functions;
pub mod key_manager;
pub mod mode;
pub mod numbering;
pub mod output;
pub mod pattern;
pub mod processor;
pub mod resolver;
pub mod rule_manager;
pub mod serializer;

mod compiler_handlers;
mod executor_handlers;

pub use ast::CompiledStylesheet;
pub use compiler::CompilerBuilder;
pub use config::{OutputMethod, OutputProperties, RecoveryPolicy, TransformOptions};
pub use controller::{Controller, RunState};
pub use error::{Diagnostic, DiagnosticKind, Location, XsltError};
pub use output::{Emitter, EventRecorder, OutputEvent};
pub use pattern::Pattern;
pub use processor::{Stylesheet, TransformOutput};
pub use resolver::{DocumentResolver, FileResolver, MapResolver};
pub use serializer::Serializer;
