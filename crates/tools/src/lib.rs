//! Tool Integration
//!
//! Run the external programs (compilers, build systems, benchmarks) that
//! project steps are made of.

#![warn(missing_docs)]

pub mod r#trait;
pub mod builtin;

pub use r#trait::{Tool, ToolError, ToolInput, ToolOutput};
pub use builtin::CommandTool;
