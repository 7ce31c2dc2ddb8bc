use anyhow::Result;

use dieta_core::db::Database;
use dieta_core::store::Store;

use super::helpers::print_diet_table;

pub(crate) fn cmd_diet_list(db: &Database, json: bool) -> Result<()> {
    let diets = db.store().list_diets()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&diets)?);
        return Ok(());
    }

    if diets.is_empty() {
        println!("No diets yet. Import one with: dieta import <file.diet>");
        return Ok(());
    }

    print_diet_table(&diets);
    Ok(())
}
