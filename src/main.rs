//! `dynascript` entry point.

fn main() {
    let code = dynascript::cli::run_cli();
    std::process::exit(code);
}
