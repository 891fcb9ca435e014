use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use blox::Vm;

/// Run a Lox script, or start a REPL when no script is given.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Script to run
    path: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(_) => {
            eprintln!("Usage: blox [path]");
            process::exit(64);
        }
    };

    let result = match cli.path {
        Some(path) => run_file(&path),
        None => repl(),
    };
    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{:#}", e);
            process::exit(74);
        }
    }
}

/// Run a whole file as one program, returning the exit code.
fn run_file(path: &Path) -> Result<i32> {
    let source = read_source(path)?;

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        Ok(()) => Ok(0),
        Err(e) => {
            eprintln!("{}", e);
            Ok(e.exit_code())
        }
    }
}

// Scripts are read as bytes. Anything that isn't UTF-8 becomes U+FFFD, which the scanner
// rejects as an unexpected character unless it sits inside a string literal.
fn read_source(path: &Path) -> Result<String> {
    let bytes =
        fs::read(path).with_context(|| format!("Could not open file \"{}\".", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read-eval-print, one line at a time, against one VM so globals carry over between lines.
// Every line is compiled on its own, so a statement can't span lines.
fn repl() -> Result<i32> {
    let mut editor = DefaultEditor::new().context("could not start the line editor")?;
    let mut vm = Vm::new();

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                // History is a nicety; failing to record it isn't worth stopping for.
                let _ = editor.add_history_entry(line.as_str());
                if let Err(e) = vm.interpret(&line) {
                    eprintln!("{}", e);
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                return Ok(0);
            }
            Err(e) => return Err(e).context("could not read input"),
        }
    }
}
