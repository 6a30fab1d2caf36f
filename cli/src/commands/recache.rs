use clap::Args;
use colored::Colorize;

use crate::error::CliResult;
use crate::session::Session;

/// Rebuilds every bucket's cache message from its data channels.
#[derive(Args, Debug)]
pub struct RecacheArgs;

pub async fn run(session: &Session, _args: RecacheArgs) -> CliResult<()> {
    session.drive.recache().await?;
    println!("{}", "cache rebuilt from data channels".green());
    Ok(())
}
