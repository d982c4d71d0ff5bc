pub mod ast;
pub mod diagnostic;
pub mod observer;
pub mod parser;
mod report;
pub mod span;
pub mod tokenizer;
pub mod tree_walk_interpreter;

pub use report::{run, Options, Report};
