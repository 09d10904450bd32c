//! `dynascript` command-line front-end.
//!
//! Two subcommands plus an implicit default: `run`/`load` evaluate files,
//! bare invocation (or `repl`) starts the interactive REPL.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use crate::interface::Repl;
use crate::{EvalError, Interpreter};

#[derive(Parser)]
#[command(name = "dynascript")]
#[command(about = "Tree-walking interpreter for a small dynamic scripting language", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Raise the default log level (stacks: -v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and evaluate each file, then call top-level `Main(args)` if defined.
    Run {
        files: Vec<PathBuf>,
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Parse and evaluate each file without requiring or calling `Main`.
    Load { files: Vec<PathBuf> },
    /// Start the interactive REPL (the default when no subcommand is given).
    Repl,
}

/// Entry point for the CLI. Returns the process exit code.
pub fn run_cli() -> i32 {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Some(Commands::Run { files, args }) => cmd_run(&files, &args),
        Some(Commands::Load { files }) => cmd_load(&files),
        Some(Commands::Repl) | None => {
            Repl::new().run();
            0
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();
}

fn read_source(path: &PathBuf) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(s) => Some(s),
        Err(e) => {
            println!("error reading '{}': {}", path.display(), e);
            None
        }
    }
}

/// Parses and evaluates `files` in sequence on a single interpreter, so a
/// `Main` declared in an earlier file is visible when later files run.
fn run_files(files: &[PathBuf]) -> Option<Interpreter> {
    let mut interp: Option<Interpreter> = None;
    for path in files {
        let Some(source) = read_source(path) else { continue };
        let root = match &mut interp {
            None => match crate::parse(&source) {
                Ok((interner, ast, root)) => {
                    interp = Some(Interpreter::new(interner, ast));
                    Some(root)
                }
                Err(errors) => {
                    for e in errors {
                        println!("{}", e);
                    }
                    None
                }
            },
            Some(i) => match i.parse_into_ast(&source) {
                Ok(root) => Some(root),
                Err(errors) => {
                    for e in errors {
                        println!("{}", e);
                    }
                    None
                }
            },
        };
        if let (Some(root), Some(i)) = (root, interp.as_mut()) {
            if let Err(e) = i.run_program(root) {
                println!("{}", EvalError::Runtime(e));
            }
        }
    }
    interp
}

fn cmd_run(files: &[PathBuf], args: &[String]) -> i32 {
    log::info!("run subcommand: {} file(s)", files.len());
    if let Some(mut i) = run_files(files) {
        if let Err(e) = i.call_main(args) {
            println!("{}", EvalError::Runtime(e));
        }
    }
    0
}

fn cmd_load(files: &[PathBuf]) -> i32 {
    log::info!("load subcommand: {} file(s)", files.len());
    run_files(files);
    0
}
