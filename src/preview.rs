use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    cli::{PreviewArgs, TablesArgs},
    sqlite::SqliteStorage,
    storage::{QueryRows, Storage},
    table,
};

pub const DEFAULT_PREVIEW_ROWS: usize = 30;

/// Reads up to `limit` rows of an existing table without modifying it.
pub fn preview_table<S>(storage: &S, table: &str, limit: usize) -> Result<QueryRows>
where
    S: Storage + ?Sized,
{
    let tables = storage.list_tables().context("Listing tables")?;
    let Some(stored) = tables.iter().find(|name| name.eq_ignore_ascii_case(table)) else {
        bail!("Table '{table}' does not exist");
    };
    let sql = format!("SELECT * FROM \"{}\"", stored.replace('"', "\"\""));
    storage
        .query_rows(&sql, limit)
        .with_context(|| format!("Reading preview of '{table}'"))
}

pub fn execute(args: &PreviewArgs) -> Result<()> {
    let storage = SqliteStorage::open(&args.db)
        .with_context(|| format!("Opening database {:?}", args.db))?;
    let rows = preview_table(&storage, &args.table, args.rows)?;
    table::print_query_rows(&rows);
    info!("Displayed {} row(s) from '{}'", rows.rows.len(), args.table);
    Ok(())
}

pub fn list(args: &TablesArgs) -> Result<()> {
    let storage = SqliteStorage::open(&args.db)
        .with_context(|| format!("Opening database {:?}", args.db))?;
    let tables = storage.list_tables().context("Listing tables")?;
    if tables.is_empty() {
        info!("No tables in {:?}", args.db);
    }
    for name in tables {
        println!("{name}");
    }
    Ok(())
}
