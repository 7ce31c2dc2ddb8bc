use std::io;
use std::path::{Path, PathBuf};

use anyhow::Result;

use dieta_core::db::Database;
use dieta_core::export::{export_to_path, export_to_writer, suggested_file_name};
use dieta_core::{Document, ExchangeService, ExportScope, JsonProfileStore};

use super::helpers::user_facing;
use crate::config::Config;

/// Writes to stdout instead of a file.
const STDOUT_PATH: &str = "-";

pub(crate) fn cmd_export_diet(
    db: &mut Database,
    config: &Config,
    diet_id: i64,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    run_export(db, config, ExportScope::Diet(diet_id), out, json)
}

pub(crate) fn cmd_export_backup(
    db: &mut Database,
    config: &Config,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    run_export(db, config, ExportScope::Everything, out, json)
}

fn run_export(
    db: &mut Database,
    config: &Config,
    scope: ExportScope,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let profiles = JsonProfileStore::new(&config.profile_path);
    let service = ExchangeService::new(db, &profiles);
    let document = service.export(scope).map_err(user_facing)?;

    if out.as_deref() == Some(Path::new(STDOUT_PATH)) {
        let stdout = io::stdout();
        export_to_writer(&document, stdout.lock())?;
        println!();
        return Ok(());
    }

    let path = out.unwrap_or_else(|| config.share_dir.join(suggested_file_name(&document)));
    export_to_path(&document, &path).map_err(user_facing)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "kind": document.kind(),
                "path": path.display().to_string(),
                "format_version": document.format_version(),
                "custom_foods": document.custom_foods().len(),
                "records": record_count(&document),
            })
        );
    } else {
        println!("Exported {} to {}", document.kind(), path.display());
        println!("  Records:      {}", record_count(&document));
        println!("  Custom foods: {}", document.custom_foods().len());
    }

    Ok(())
}

fn record_count(document: &Document) -> usize {
    match document {
        Document::DietShare(doc) => doc.entries.len(),
        Document::FullBackup(doc) => {
            doc.diets.len() + doc.diet_items.len() + doc.daily_logs.len() + doc.water_logs.len()
        }
    }
}
