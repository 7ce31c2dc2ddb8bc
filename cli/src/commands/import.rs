use std::path::Path;

use anyhow::Result;

use dieta_core::db::Database;
use dieta_core::policy::CollisionPrompt;
use dieta_core::{
    ConflictPolicy, ExchangeService, ImportMode, ImportOptions, ImportSummary, JsonProfileStore,
};

use super::helpers::{StdinPrompt, print_collision_table, user_facing};
use crate::config::Config;

pub(crate) fn cmd_import(
    db: &mut Database,
    config: &Config,
    file: &Path,
    policy: &str,
    mode: &str,
    name: Option<String>,
    json: bool,
) -> Result<()> {
    let policy: ConflictPolicy = policy.parse()?;
    let mode: ImportMode = mode.parse()?;

    let prompt = StdinPrompt;
    let options = ImportOptions {
        policy,
        mode,
        name_override: name,
        prompt: if policy == ConflictPolicy::AskUser {
            Some(&prompt as &dyn CollisionPrompt)
        } else {
            None
        },
    };

    let profiles = JsonProfileStore::new(&config.profile_path);
    let mut service = ExchangeService::new(db, &profiles);
    let summary = service.import_file(file, &options).map_err(user_facing)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &ImportSummary) {
    println!("Import complete.\n");
    if let Some(id) = summary.diet_id {
        println!("  Diet created:   #{id}");
    }
    if summary.diets_created + summary.diets_reused > 0 {
        println!("  Diets created:  {}", summary.diets_created);
        println!("  Diets updated:  {}", summary.diets_reused);
    }
    println!("  Diet items:     {}", summary.diet_items_imported);
    println!("  Daily logs:     {}", summary.daily_logs_imported);
    println!("  Water logs:     {}", summary.water_logs_imported);
    println!("  Custom foods:   {}", summary.custom_foods_imported);
    if summary.custom_foods_skipped > 0 {
        println!("  Foods skipped:  {}", summary.custom_foods_skipped);
    }
    if summary.entries_dropped > 0 {
        println!(
            "  Dropped:        {} (food not found locally)",
            summary.entries_dropped
        );
    }
    if summary.profile_restored {
        println!("  Profile:        restored");
    }
    if !summary.collisions.is_empty() {
        println!("\n{} custom food collision(s):", summary.collisions.len());
        print_collision_table(&summary.collisions);
    }
}
