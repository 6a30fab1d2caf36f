use clap::Args;
use colored::Colorize;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct MvArgs {
    /// Path of the object to rename.
    pub path: String,
    /// The new base name (the object never moves to a different parent).
    pub new_name: String,
}

pub async fn run(session: &Session, args: MvArgs) -> CliResult<()> {
    session
        .drive
        .rename(CONSOLE_USER, &args.path, &args.new_name)
        .await?;
    println!("{} {} -> {}", "renamed".yellow(), args.path, args.new_name);
    Ok(())
}
