use clap::Args;

use crate::error::CliResult;
use crate::session::{Session, CONSOLE_USER};

#[derive(Args, Debug)]
pub struct CatArgs {
    /// Path of the file to read.
    pub path: String,
}

pub async fn run(session: &Session, args: CatArgs) -> CliResult<()> {
    let bytes = session.drive.read(CONSOLE_USER, &args.path).await?;
    match std::str::from_utf8(&bytes) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("<{} bytes, not valid UTF-8>", bytes.len()),
    }
    Ok(())
}
