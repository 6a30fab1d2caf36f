use clap::Args;

use crate::error::CliResult;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct LsArgs;

pub async fn run(session: &Session, _args: LsArgs) -> CliResult<()> {
    let rendered = session.drive.render_tree().await?;
    println!("{rendered}");
    Ok(())
}
