//! kiln: a graph compiler for deep-learning inference.
//!
//! Programs are directed acyclic graphs of tensor instructions. The compiler
//! lowers a program for a target by running its ordered pass list: rewrites
//! driven by the declarative [`matcher`] DSL, then memory planning that folds
//! every allocation into a single `scratch` (or `memory`) parameter.

pub mod argument;
pub mod context;
pub mod dom;
mod env;
pub mod error;
pub mod instruction;
pub mod literal;
pub mod matcher;
pub mod op;
pub mod ops;
pub mod pass;
pub mod passes;
pub mod program;
pub mod shape;

pub use argument::Argument;
pub use context::Context;
pub use error::{Error, Result};
pub use instruction::{InsRef, Instruction, RECORD_EVENT, WAIT_EVENT};
pub use literal::{generate_literal, Literal};
pub use op::{FieldValue, Operation, Operator};
pub use pass::{Pass, Target};
pub use program::Program;
pub use shape::{DType, Shape};
