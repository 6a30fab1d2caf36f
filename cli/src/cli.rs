use clap::{Parser, Subcommand};

use crate::commands;
use crate::error::CliResult;
use crate::session::Session;

/// Top-level flags, parsed once at process start.
#[derive(Parser)]
#[command(name = "drivecord-cli")]
#[command(about = "Interactive console for a drivecord storage engine instance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Run commands from a script file (one per line) instead of an
    /// interactive prompt.
    #[arg(long)]
    pub script: Option<std::path::PathBuf>,

    #[command(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity,
}

/// One console command, parsed fresh for every REPL line or script line.
/// Each variant maps onto exactly one `Drive` operation.
#[derive(Parser)]
#[command(name = "drivecord", no_binary_name = true)]
pub struct Line {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a directory.
    Mkdir(commands::mkdir::MkdirArgs),
    /// Create a blank file.
    Touch(commands::touch::TouchArgs),
    /// Overwrite a file's content.
    Write(commands::write::WriteArgs),
    /// Print a file's content.
    Cat(commands::cat::CatArgs),
    /// Delete a file or directory.
    Rm(commands::rm::RmArgs),
    /// Rename an object in place.
    Mv(commands::mv::MvArgs),
    /// Print the drive's directory tree.
    Ls(commands::ls::LsArgs),
    /// Pull a file or zipped directory to a local path.
    Pull(commands::pull::PullArgs),
    /// Print bucket usage and the cascading permission set.
    Stat(commands::stat::StatArgs),
    /// Rebuild every bucket's cache from its data channels.
    Recache(commands::recache::RecacheArgs),
    /// Leave the console.
    Exit,
}

/// Dispatches one already-parsed [`Command`] against a [`Session`].
/// Returns `Ok(true)` to keep the console running, `Ok(false)` to exit.
pub async fn dispatch(session: &Session, command: Command) -> CliResult<bool> {
    match command {
        Command::Mkdir(args) => commands::mkdir::run(session, args).await?,
        Command::Touch(args) => commands::touch::run(session, args).await?,
        Command::Write(args) => commands::write::run(session, args).await?,
        Command::Cat(args) => commands::cat::run(session, args).await?,
        Command::Rm(args) => commands::rm::run(session, args).await?,
        Command::Mv(args) => commands::mv::run(session, args).await?,
        Command::Ls(args) => commands::ls::run(session, args).await?,
        Command::Pull(args) => commands::pull::run(session, args).await?,
        Command::Stat(args) => commands::stat::run(session, args).await?,
        Command::Recache(args) => commands::recache::run(session, args).await?,
        Command::Exit => return Ok(false),
    }
    Ok(true)
}
