mod commands;
mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_catalog_load, cmd_detect, cmd_diet_list, cmd_export_backup, cmd_export_diet, cmd_import,
    json_error,
};
use crate::config::Config;
use dieta_core::db::Database;

#[derive(Parser)]
#[command(
    name = "dieta",
    version,
    about = "Share diet plans and back up your nutrition log",
    long_about = "Share diet plans as portable .diet files and move a full \
                  backup of plans, food logs and custom foods between devices."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export a diet plan or a full backup
    Export {
        #[command(subcommand)]
        command: ExportCommands,
    },
    /// Import a .diet file or a full backup
    Import {
        /// Path to the document
        file: PathBuf,
        /// Custom food collisions: keep-local, replace, keep-both, ask
        #[arg(short, long, default_value = "keep-local")]
        policy: String,
        /// Backup restore mode: merge or overwrite
        #[arg(short, long, default_value = "merge")]
        mode: String,
        /// Name for the imported diet (diet files only)
        #[arg(long)]
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Identify a document and check it without importing
    Detect {
        /// Path to the document
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage diet plans
    Diet {
        #[command(subcommand)]
        command: DietCommands,
    },
    /// Manage the reference food catalog
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },
}

#[derive(Subcommand)]
enum ExportCommands {
    /// Export one diet plan as a shareable .diet file
    Diet {
        /// Diet ID (see `dieta diet list`)
        id: i64,
        /// Output path, or "-" for stdout (default: data dir exports/)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export everything as a full backup
    Backup {
        /// Output path, or "-" for stdout (default: data dir exports/)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DietCommands {
    /// List all diet plans
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Load or refresh the official catalog from a CSV file
    Load {
        /// Path to the CSV file (needs `taco_id` and `name` columns)
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn json(&self) -> bool {
        match self {
            Commands::Export { command } => match command {
                ExportCommands::Diet { json, .. } | ExportCommands::Backup { json, .. } => *json,
            },
            Commands::Import { json, .. } | Commands::Detect { json, .. } => *json,
            Commands::Diet {
                command: DietCommands::List { json },
            }
            | Commands::Catalog {
                command: CatalogCommands::Load { json, .. },
            } => *json,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dieta=info,dieta_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.command.json();

    // Database work is blocking; keep it off the async runtime threads.
    let outcome = tokio::task::spawn_blocking(move || run(cli))
        .await
        .context("Command worker panicked")
        .and_then(|result| result);

    if let Err(e) = outcome {
        if json {
            println!("{}", json_error(&format!("{e:#}")));
        } else {
            eprintln!("Error: {e:#}");
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Export { command } => {
            let (config, mut db) = open()?;
            match command {
                ExportCommands::Diet { id, out, json } => {
                    cmd_export_diet(&mut db, &config, id, out, json)
                }
                ExportCommands::Backup { out, json } => {
                    cmd_export_backup(&mut db, &config, out, json)
                }
            }
        }
        Commands::Import {
            file,
            policy,
            mode,
            name,
            json,
        } => {
            let (config, mut db) = open()?;
            cmd_import(&mut db, &config, &file, &policy, &mode, name, json)
        }
        Commands::Detect { file, json } => cmd_detect(&file, json),
        Commands::Diet { command } => {
            let (_, db) = open()?;
            match command {
                DietCommands::List { json } => cmd_diet_list(&db, json),
            }
        }
        Commands::Catalog { command } => {
            let (_, mut db) = open()?;
            match command {
                CatalogCommands::Load { file, json } => cmd_catalog_load(&mut db, &file, json),
            }
        }
    }
}

fn open() -> Result<(Config, Database)> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    Ok((config, db))
}
