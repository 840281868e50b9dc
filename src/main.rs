use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use lodestone_scraper::config::Settings;
use lodestone_scraper::db::Store;
use lodestone_scraper::ids::{parse_character_id, parse_item_id};
use lodestone_scraper::model::EntityKind;
use lodestone_scraper::Reconciler;

#[derive(Parser)]
#[command(name = "lodestone", about = "Lodestone character and item scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape characters (and any items they have equipped) into the store
    Character {
        /// Numeric Lodestone character ids
        #[arg(required = true, value_parser = parse_character_id)]
        ids: Vec<String>,
    },
    /// Scrape items into the store
    Item {
        /// Alphanumeric Lodestone item ids
        #[arg(required = true, value_parser = parse_item_id)]
        ids: Vec<String>,
    },
    /// Print a stored record as JSON
    Show {
        #[command(subcommand)]
        what: Show,
    },
    /// Show row counts
    Stats,
}

#[derive(Subcommand)]
enum Show {
    Character {
        #[arg(value_parser = parse_character_id)]
        id: String,
    },
    Item {
        #[arg(value_parser = parse_item_id)]
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;
    info!(db = ?settings.db_path, "Loaded settings");
    let store = Store::open(&settings.db_path)?;

    let result = match cli.command {
        Commands::Character { ids } => {
            let reconciler = Reconciler::from_settings(&settings, store)?;
            run_batch(&reconciler, EntityKind::Character, &ids).await
        }
        Commands::Item { ids } => {
            let reconciler = Reconciler::from_settings(&settings, store)?;
            run_batch(&reconciler, EntityKind::Item, &ids).await
        }
        Commands::Show { what } => {
            let json = match what {
                Show::Character { id } => {
                    let Some(character) = store.load_character(&id)? else {
                        bail!("character {id} is not in the store");
                    };
                    let jobs = store.load_jobs(character.id)?;
                    serde_json::json!({ "character": character, "jobs": jobs })
                }
                Show::Item { id } => {
                    let Some(item) = store.find_item(&id)? else {
                        bail!("item {id} is not in the store");
                    };
                    serde_json::to_value(item)?
                }
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
            Ok(())
        }
        Commands::Stats => {
            let s = store.get_stats()?;
            println!("Characters: {}", s.characters);
            println!("Jobs:       {}", s.jobs);
            println!("Items:      {}", s.items);
            println!("Job items:  {}", s.job_items);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }

    result
}

/// Reconcile ids one after another; a failure is reported and the batch moves on.
async fn run_batch(reconciler: &Reconciler, kind: EntityKind, ids: &[String]) -> Result<()> {
    let pb = if ids.len() > 1 {
        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
                .progress_chars("=> "),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut errors = 0usize;
    for id in ids {
        let outcome = match kind {
            EntityKind::Character => reconciler
                .reconcile_character(id)
                .await
                .map(|c| format!("{} ({})", c.profile.name, c.profile.server)),
            EntityKind::Item => reconciler
                .reconcile_item(id)
                .await
                .map(|i| format!("{} (ilvl {})", i.fields.name, i.fields.item_level)),
        };
        match outcome {
            Ok(summary) => pb.suspend(|| println!("{kind} {id}: {summary}")),
            Err(e) => {
                warn!("{}", e);
                errors += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!(
        "Done: {} {}s ({} ok, {} errors).",
        ids.len(),
        kind,
        ids.len() - errors,
        errors
    );
    if errors > 0 {
        bail!("{errors} of {} {kind}s failed", ids.len());
    }
    Ok(())
}
