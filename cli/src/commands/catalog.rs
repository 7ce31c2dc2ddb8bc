use std::path::Path;

use anyhow::{Context, Result};

use dieta_core::catalog::parse_catalog_csv;
use dieta_core::db::Database;

use super::helpers::json_error;

pub(crate) fn cmd_catalog_load(db: &mut Database, path: &Path, json: bool) -> Result<()> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let rows = parse_catalog_csv(file)?;

    if rows.is_empty() {
        if json {
            println!("{}", json_error("No rows found in CSV file"));
        } else {
            eprintln!("No rows found in CSV file.");
        }
        return Ok(());
    }

    let summary = db.load_reference_catalog(&rows)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Catalog loaded.\n");
        println!("  Rows parsed:   {}", summary.rows_parsed);
        println!("  Foods added:   {}", summary.foods_inserted);
        println!("  Foods updated: {}", summary.foods_updated);
    }

    Ok(())
}
