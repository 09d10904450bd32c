//! Interactive REPL front-end, reusing the tokenizer/parser/evaluator stack.

mod repl;

pub use repl::Repl;
