//! Instruction handlers for the stylesheet compiler, implemented as methods on
//! [`CompilerBuilder`](crate::compiler::CompilerBuilder) and grouped by concern.

pub(super) mod control_flow;
pub(super) mod literals;
pub(super) mod number;
pub(super) mod stylesheet;
pub(super) mod templates;
pub(super) mod variables;
