//! `blockpad`: manage block documents from the command line.

/// CLI module - command-line interface for blockpad
mod cli;

fn main() {
    cli::run_cli();
}
