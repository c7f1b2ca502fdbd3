//! Entity engine administration
//!
//! Usage:
//!   cargo run --features cli --bin entity_admin -- install
//!   cargo run --features cli --bin entity_admin -- set-template character ./character.json
//!   cargo run --features cli --bin entity_admin -- get character 1

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cuento_entity::{DatabaseConfig, DatabaseManager, EntityEngine};

#[derive(Parser)]
#[command(name = "entity_admin")]
#[command(about = "Manage custom field templates and entities")]
struct Cli {
    /// Database URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the config table and the tables of every registered type
    Install,
    /// Print the stored template of a type
    GetTemplate { entity_type: String },
    /// Store a template from a JSON file and migrate the schema
    SetTemplate { entity_type: String, file: PathBuf },
    /// Print one entity
    Get { entity_type: String, id: i64 },
    /// Create an entity from a JSON file
    Create { entity_type: String, file: PathBuf },
    /// Apply a JSON patch file to an entity
    Patch {
        entity_type: String,
        id: i64,
        file: PathBuf,
    },
}

fn read_json(path: &Path) -> Result<JsonValue> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(engine: &EntityEngine, command: Command) -> Result<()> {
    match command {
        Command::Install => {
            let reports = engine.install().await?;
            print_json(&reports)?;
        }
        Command::GetTemplate { entity_type } => {
            print_json(&engine.get_template(&entity_type).await?)?;
        }
        Command::SetTemplate { entity_type, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let report = engine.update_template(&entity_type, &raw).await?;
            print_json(&report)?;
        }
        Command::Get { entity_type, id } => {
            let entity = engine.entities.get_entity_by_name(&entity_type, id).await?;
            print_json(&entity)?;
        }
        Command::Create { entity_type, file } => {
            let document = read_json(&file)?;
            let (entity, id) = engine
                .entities
                .create_entity_json(&entity_type, document)
                .await?;
            info!(entity_type = %entity_type, id, "created");
            print_json(&json!({ "id": id, "entity": entity }))?;
        }
        Command::Patch {
            entity_type,
            id,
            file,
        } => {
            let JsonValue::Object(updates) = read_json(&file)? else {
                bail!("patch file must contain a JSON object");
            };
            let entity = engine
                .entities
                .patch_entity_by_name(&entity_type, id, &updates)
                .await?;
            print_json(&entity)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = DatabaseConfig::default();
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    let db = DatabaseManager::new(config)
        .await
        .context("connecting to database")?;
    db.test_connection()
        .await
        .context("database connectivity check")?;
    let engine = db.engine();

    let result = run(&engine, cli.command).await;
    db.close().await;

    if let Err(err) = &result {
        if let Some(entity_err) = err.downcast_ref::<cuento_entity::EntityError>() {
            eprintln!("error ({}): {}", entity_err.http_status(), entity_err);
            std::process::exit(1);
        }
    }
    result
}
