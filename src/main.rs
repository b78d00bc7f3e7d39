//! floatchat CLI entry point

use clap::{Parser, Subcommand};
use floatchat::{
    api::{self, AppState},
    config::Config,
    embed::create_embedder,
    error::Result,
    ingest::{IngestPipeline, TickStats},
    narrate::create_narrator,
    query::QueryEngine,
    store::{ArgoDb, StoreKind},
    vector::ProfileIndex,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "floatchat")]
#[command(version, about = "Argo float ingestion and natural-language query service", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize floatchat configuration and databases
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Run one ingestion tick against a store
    Ingest {
        /// Target store (dev or live)
        #[arg(long, default_value = "live")]
        store: String,
    },

    /// Start the read-only JSON API
    Serve,

    /// Answer one natural-language query
    Query {
        /// The question to answer
        query: String,
    },

    /// Show system status
    Status,

    /// Manage the Qdrant vector collection
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

/// Vector collection management actions
#[derive(Subcommand)]
enum DbAction {
    /// Initialize/create the collection
    Init,

    /// Show collection status
    Status,

    /// Reset the collection (delete all vectors and recreate)
    Reset {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config, force).await;
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Ingest { store } => {
            let target = StoreKind::from_str(&store)?;
            let (dev, live) = open_stores(&config).await?;
            let vector = ProfileIndex::connect(&config).await?;
            let embedder: Arc<dyn floatchat::embed::Embedder> =
                Arc::from(create_embedder(&config.embedding)?);

            let pipeline = IngestPipeline::new(config, target, dev, live, vector, embedder);
            let stats = pipeline.run_tick().await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_tick_stats(&stats);
            }
        }

        Commands::Serve => {
            let engine = build_engine(config.clone()).await?;
            let state = Arc::new(AppState { engine, config });
            api::serve(state).await?;
        }

        Commands::Query { query } => {
            let engine = build_engine(config).await?;
            let response = engine.answer(&query).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("\n{}\n", response.message);
                if let Some(table) = &response.table_data {
                    println!("Columns: {}", table.columns.join(", "));
                    println!("Rows: {}", table.total_rows);
                }
            }
        }

        Commands::Status => {
            let (dev, live) = open_stores(&config).await?;
            let vector = ProfileIndex::connect(&config).await?;

            let dev_profiles = dev.profile_count().await?;
            let dev_measurements = dev.measurement_count().await?;
            let live_profiles = live.profile_count().await?;
            let live_measurements = live.measurement_count().await?;
            let collection = vector.get_collection_info().await.ok().flatten();
            let runs = live.recent_runs(5).await?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "dev": { "profiles": dev_profiles, "measurements": dev_measurements },
                        "live": { "profiles": live_profiles, "measurements": live_measurements },
                        "vector_points": collection.as_ref().map(|c| c.points_count),
                        "recent_runs": runs,
                    }))?
                );
            } else {
                println!("\nfloatchat Status\n");
                println!(
                    "Dev store: {} profiles, {} measurements",
                    dev_profiles, dev_measurements
                );
                println!(
                    "Live store: {} profiles, {} measurements",
                    live_profiles, live_measurements
                );
                match collection {
                    Some(info) => println!(
                        "Vector collection: {} points ({})",
                        info.points_count, info.status
                    ),
                    None => println!("Vector collection: not created"),
                }
                if !runs.is_empty() {
                    println!("\nRecent ingestion runs:");
                    for run in runs {
                        println!(
                            "  {} [{}] files={} profiles={}",
                            run.run_timestamp, run.status, run.files_downloaded, run.profiles_added
                        );
                    }
                }
            }
        }

        Commands::Db { action } => {
            handle_db_action(&config, action, cli.json).await?;
        }
    }

    Ok(())
}

async fn handle_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let base_dir = config_path
        .as_deref()
        .and_then(|p| {
            if p.extension().is_some() {
                p.parent().map(PathBuf::from)
            } else {
                Some(p.to_path_buf())
            }
        })
        .unwrap_or_else(Config::default_base_dir);

    let config = Config::load_from(Some(base_dir))?;
    if config.paths.config_file.exists() && !force {
        eprintln!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            config.paths.config_file.display()
        );
        std::process::exit(1);
    }

    config.save()?;

    // Materialize both store schemas up front
    open_stores(&config).await?;

    println!("✓ floatchat initialized successfully");
    println!("  Config: {}", config.paths.config_file.display());
    println!("\nNext steps:");
    println!("  1. Edit the config file to customize the mirror and stores");
    println!("  2. Start Qdrant: docker run -p 6334:6334 qdrant/qdrant");
    println!("  3. Run an ingestion tick: floatchat ingest --store live");

    Ok(())
}

async fn handle_db_action(config: &Config, action: DbAction, json: bool) -> Result<()> {
    let vector = ProfileIndex::connect(config).await?;

    match action {
        DbAction::Init => {
            vector.ensure_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection initialized"}}"#);
            } else {
                println!("✓ Qdrant collection initialized");
            }
        }
        DbAction::Status => match vector.get_collection_info().await? {
            Some(info) => {
                if json {
                    println!(
                        r#"{{"exists": true, "points_count": {}, "indexed_vectors_count": {}, "status": "{}"}}"#,
                        info.points_count, info.indexed_vectors_count, info.status
                    );
                } else {
                    println!("Qdrant Collection Status:");
                    println!("  Status: {}", info.status);
                    println!("  Points: {}", info.points_count);
                    println!("  Indexed Vectors: {}", info.indexed_vectors_count);
                }
            }
            None => {
                if json {
                    println!(r#"{{"exists": false}}"#);
                } else {
                    println!("Collection does not exist. Run 'floatchat db init' to create it.");
                }
            }
        },
        DbAction::Reset { yes } => {
            if !yes {
                eprintln!("⚠️  This will delete ALL indexed vectors!");
                eprintln!("Run with --yes to confirm.");
                std::process::exit(1);
            }
            vector.reset_collection().await?;
            if json {
                println!(r#"{{"status": "ok", "message": "Collection reset"}}"#);
            } else {
                println!(
                    "✓ Qdrant collection reset (all vectors deleted and collection recreated)"
                );
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        eprintln!(
            "Config file not found: {}\nRun 'floatchat init' first.",
            config_path.display()
        );
        std::process::exit(1);
    }

    Config::load(&config_path)
}

async fn open_stores(config: &Config) -> Result<(ArgoDb, ArgoDb)> {
    let dev = ArgoDb::connect(
        &config.paths.dev_db_file,
        StoreKind::Dev,
        config.stores.dev_id_range.into(),
    )
    .await?;
    let live = ArgoDb::connect(
        &config.paths.live_db_file,
        StoreKind::Live,
        config.stores.live_id_range.into(),
    )
    .await?;
    Ok((dev, live))
}

async fn build_engine(config: Config) -> Result<QueryEngine> {
    let (dev, live) = open_stores(&config).await?;
    let vector = ProfileIndex::connect(&config).await?;
    let embedder: Arc<dyn floatchat::embed::Embedder> =
        Arc::from(create_embedder(&config.embedding)?);
    let narrator = create_narrator(&config.narrator)?.map(Arc::from);

    Ok(QueryEngine::new(
        config, dev, live, vector, embedder, narrator,
    ))
}

fn print_tick_stats(stats: &TickStats) {
    println!("\n✓ Ingestion tick {}", stats.status);
    println!("  Files discovered: {}", stats.files_discovered);
    println!("  Files downloaded: {}", stats.files_downloaded);
    println!("  Files failed: {}", stats.files_failed);
    println!("  Profiles added: {}", stats.profiles_added);
    println!("  Profiles skipped: {}", stats.profiles_skipped);
    println!("  Measurements added: {}", stats.measurements_added);
    println!("  Vectors indexed: {}", stats.vectors_indexed);
    println!("  Duration: {:.2}s", stats.duration_seconds);

    if !stats.errors.is_empty() {
        println!("  Errors:");
        for error in &stats.errors {
            println!("    - {}", error);
        }
    }
}
