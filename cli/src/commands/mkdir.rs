use clap::Args;
use colored::Colorize;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Path of the directory to create, relative to the current drive root.
    pub path: String,
}

pub async fn run(session: &Session, args: MkdirArgs) -> CliResult<()> {
    session
        .drive
        .create_directory(CONSOLE_USER, &args.path)
        .await?;
    println!("{} {}", "created".green(), args.path);
    Ok(())
}
