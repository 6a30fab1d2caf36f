use clap::Args;
use colored::Colorize;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct TouchArgs {
    /// Path of the blank file to create, relative to the current drive root.
    pub path: String,
}

pub async fn run(session: &Session, args: TouchArgs) -> CliResult<()> {
    session.drive.create_file(CONSOLE_USER, &args.path).await?;
    println!("{} {}", "created".green(), args.path);
    Ok(())
}
