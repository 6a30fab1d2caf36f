use std::path::PathBuf;

use clap::Args;
use colored::Colorize;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Path of the file or directory to pull (a directory is zipped).
    pub path: String,
    /// Local destination file.
    pub out: PathBuf,
}

pub async fn run(session: &Session, args: PullArgs) -> CliResult<()> {
    let pulled = session.drive.pull(CONSOLE_USER, &args.path).await?;
    std::fs::write(&args.out, &pulled.bytes)?;
    println!(
        "{} {} -> {} ({}{})",
        "pulled".green(),
        args.path,
        args.out.display(),
        pulled.bytes.len(),
        if pulled.is_zip { " bytes, zip" } else { " bytes" }
    );
    Ok(())
}
