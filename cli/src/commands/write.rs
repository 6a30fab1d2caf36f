use clap::Args;
use colored::Colorize;
use drivecord::WriteOptions;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct WriteArgs {
    /// Path of the file to overwrite.
    pub path: String,
    /// Content to write. Joined with spaces if given as several words.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub content: Vec<String>,
}

pub async fn run(session: &Session, args: WriteArgs) -> CliResult<()> {
    let content = args.content.join(" ");
    session
        .drive
        .write(CONSOLE_USER, &args.path, content.as_bytes(), WriteOptions::default())
        .await?;
    println!("{} {} ({} bytes)", "wrote".green(), args.path, content.len());
    Ok(())
}
