pub mod ast;
pub mod error;
pub mod intern;
pub mod interface;
pub mod interpreter;
pub mod intrinsics;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod scope;
pub mod style;
pub mod token;
pub mod value;

pub mod cli;

pub use ast::{Ast, NodeId, NodeKind};
pub use error::{ParseError, ParseErrorKind, RuntimeError, RuntimeErrorKind};
pub use intern::{Interner, Symbol};
pub use interpreter::{EvalResult, Interpreter, Unwind};
pub use value::Value;

/// Tokenizes `source` without parsing it; mirrors the tokenizer's own
/// forward-only `peek`/`next` contract for callers that only need the
/// token stream (e.g. syntax highlighting, REPL `$loadmod` previews).
pub fn tokenize(source: &str) -> (Vec<crate::token::Token>, Interner) {
    let mut interner = Interner::new();
    let mut tokens = Vec::new();
    {
        let mut lexer = lexer::Lexer::new(source, &mut interner);
        loop {
            let tok = lexer.next();
            let done = tok.kind == token::TokenKind::End;
            tokens.push(tok);
            if done {
                break;
            }
        }
    }
    (tokens, interner)
}

/// Parses `source` into a fresh AST, returning the interner used to intern
/// its identifiers/strings alongside the tree and its root node id.
pub fn parse(source: &str) -> Result<(Interner, Ast, NodeId), Vec<ParseError>> {
    let mut interner = Interner::new();
    let (ast, root, errors) = {
        let mut lexer = lexer::Lexer::new(source, &mut interner);
        let parser = parser::Parser::new(&mut lexer);
        parser.parse_program()
    };
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok((interner, ast, root))
}

/// Parses and evaluates `source` on a fresh interpreter, returning the
/// value produced by the program's last top-level statement.
pub fn eval_source(source: &str) -> Result<Value, EvalError> {
    let (interner, ast, root) = parse(source).map_err(EvalError::Parse)?;
    let mut interp = Interpreter::new(interner, ast);
    interp.run_program(root).map_err(EvalError::Runtime)
}

/// Parses and evaluates `source` on a fresh interpreter, then, if a
/// top-level `Main` function was declared, calls it with `args`.
pub fn run_source(source: &str, args: &[String]) -> Result<Value, EvalError> {
    let (interner, ast, root) = parse(source).map_err(EvalError::Parse)?;
    let mut interp = Interpreter::new(interner, ast);
    interp.run_program(root).map_err(EvalError::Runtime)?;
    interp.call_main(args).map_err(EvalError::Runtime)
}

#[derive(Debug)]
pub enum EvalError {
    Parse(Vec<ParseError>),
    Runtime(Unwind),
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::Parse(errors) => {
                for e in errors {
                    writeln!(f, "{}", e)?;
                }
                Ok(())
            }
            EvalError::Runtime(Unwind::Error(e)) => write!(f, "{}", e),
            EvalError::Runtime(other) => write!(f, "unhandled control flow escaped to top level: {:?}", other),
        }
    }
}

impl std::error::Error for EvalError {}
