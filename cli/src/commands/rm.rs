use clap::Args;
use colored::Colorize;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct RmArgs {
    /// Path of the file or directory to delete.
    pub path: String,
}

pub async fn run(session: &Session, args: RmArgs) -> CliResult<()> {
    session.drive.delete(CONSOLE_USER, &args.path).await?;
    println!("{} {}", "removed".red(), args.path);
    Ok(())
}
