use clap::Args;
use comfy_table::{Cell, Table};

use crate::error::CliResult;
use crate::session::Session;

#[derive(Args, Debug)]
pub struct StatArgs;

pub async fn run(session: &Session, _args: StatArgs) -> CliResult<()> {
    let usage = session.drive.memory_usage().await;
    let buckets = session.drive.bucket_count().await;
    let owner_perms = session.drive.permissions(false, false, false, true);

    let mut table = Table::new();
    table.set_header(vec!["metric", "value"]);
    table.add_row(vec![Cell::new("bytes used"), Cell::new(usage.to_string())]);
    table.add_row(vec![Cell::new("buckets"), Cell::new(buckets.to_string())]);
    table.add_row(vec![
        Cell::new("owner permissions"),
        Cell::new(format!(
            "read={} write={} admin={} owner={}",
            owner_perms.read, owner_perms.write, owner_perms.admin, owner_perms.owner
        )),
    ]);

    println!("{table}");
    Ok(())
}
