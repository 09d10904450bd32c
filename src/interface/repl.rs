//! Line-at-a-time parse+eval loop with `$`-prefixed meta-commands.
//!
//! Each line is parsed as its own program fragment and grafted onto the
//! live interpreter's AST arena (the same mechanism `Runtime.Eval` uses),
//! so declarations made on one line stay visible on the next.

use std::io::{self, BufRead, Write};

use crate::ast::Ast;
use crate::intern::Interner;
use crate::interpreter::{Interpreter, Unwind};
use crate::value::Value;

pub struct Repl {
    interp: Interpreter,
}

impl Repl {
    pub fn new() -> Self {
        Self { interp: Interpreter::new(Interner::new(), Ast::new()) }
    }

    pub fn run(&mut self) {
        let stdin = io::stdin();
        let mut line = String::new();
        loop {
            print!("> ");
            let _ = io::stdout().flush();
            line.clear();
            if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
                break;
            }
            let input = line.trim_end();
            if input.is_empty() {
                continue;
            }
            if let Some(command) = input.strip_prefix('$') {
                if !self.meta_command(command.trim()) {
                    break;
                }
                continue;
            }
            self.eval_line(input);
        }
    }

    /// Returns `false` when the REPL should exit (`$quit`).
    fn meta_command(&mut self, command: &str) -> bool {
        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("");
        let rest = parts.next().unwrap_or("").trim();
        match name {
            "loadfile" => {
                log::info!("REPL $loadfile {}", rest);
                match std::fs::read_to_string(rest) {
                    Ok(source) => self.eval_line(&source),
                    Err(e) => println!("could not read '{}': {}", rest, e),
                }
                true
            }
            "loadmod" => {
                log::info!("REPL $loadmod {}", rest);
                println!("no intrinsic module named '{}'", rest);
                true
            }
            "erase" => {
                log::info!("REPL $erase");
                self.interp = Interpreter::new(Interner::new(), Ast::new());
                true
            }
            "quit" => {
                log::info!("REPL $quit");
                false
            }
            _ => {
                println!("unknown meta-command '${}'", name);
                true
            }
        }
    }

    fn eval_line(&mut self, source: &str) {
        match self.interp.parse_into_ast(source) {
            Ok(root) => match self.interp.run_program(root) {
                Ok(Value::Null) => {}
                Ok(v) => println!("{}", v.to_display_string()),
                Err(Unwind::Error(e)) => println!("{}", e),
                Err(other) => println!("{:?} escaped to top level", other),
            },
            Err(errors) => {
                for e in errors {
                    println!("{}", e);
                }
            }
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new()
    }
}
