use std::io::BufRead;

use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod error;
mod session;

use cli::{Cli, Line};
use session::Session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = cli.verbose.log_level_filter().to_string().to_lowercase();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .init();

    let session = Session::fresh().await?;

    match cli.script {
        Some(path) => run_script(&session, &path).await,
        None => run_repl(&session).await,
    }
}

async fn run_script(session: &Session, path: &std::path::Path) -> anyhow::Result<()> {
    let file = std::fs::File::open(path)?;
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        if !run_line(session, &line).await {
            break;
        }
    }
    Ok(())
}

async fn run_repl(session: &Session) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline("drivecord> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                if !run_line(session, &line).await {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }
    Ok(())
}

/// Parses and dispatches one console line, printing a human-readable
/// error on failure rather than aborting the session. Returns `false`
/// once the caller should stop reading further lines.
async fn run_line(session: &Session, line: &str) -> bool {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    match Line::try_parse_from(tokens) {
        Ok(parsed) => match cli::dispatch(session, parsed.command).await {
            Ok(keep_going) => keep_going,
            Err(err) => {
                eprintln!("error: {err}");
                true
            }
        },
        Err(err) => {
            eprintln!("{err}");
            true
        }
    }
}
