//! Quotewise - command line front end for the pricing learning engine
//!
//! Replays quote lifecycle events into a contractor knowledge store, prints
//! the generation context and confidence dashboard, and runs the one-time
//! DNA backfill.

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use quotewise_core::{
    error::{QuotewiseError, Result},
    ContractorId, ExtractionRequest, ExtractionService, JobCategory, JsonFileBackend,
    LearningConfig, LearningEngine, LlmConfig, LlmExtractionService, QuoteLifecycleEvent,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{self, EnvFilter};

/// Get the default knowledge directory using XDG_DATA_HOME standard
fn get_default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quotewise")
        .join("knowledge")
}

/// Get the knowledge directory from CLI arg, env var, or default
fn get_data_dir(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var("QUOTEWISE_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(get_default_data_dir)
}

/// Load config from an explicit path, `config.toml` next to the data dir, or defaults
fn load_config(cli_path: Option<&Path>, data_dir: &Path) -> Result<LearningConfig> {
    let candidate = match cli_path {
        Some(path) => Some(path.to_path_buf()),
        None => data_dir
            .parent()
            .map(|dir| dir.join("config.toml"))
            .filter(|path| path.exists()),
    };

    let config = match candidate {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            LearningConfig::from_file(&path)?
        }
        None => LearningConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Stand-in extractor when no API key is configured.
/// Corrections still count as signals; no statements are learned.
struct UnavailableExtractor;

#[async_trait]
impl ExtractionService for UnavailableExtractor {
    async fn extract(&self, _request: &ExtractionRequest) -> Result<Vec<String>> {
        Err(QuotewiseError::Config(
            "ANTHROPIC_API_KEY not set; statement extraction disabled".to_string(),
        ))
    }
}

async fn build_engine(data_dir: PathBuf, config: LearningConfig) -> Result<Arc<LearningEngine>> {
    debug!("Using knowledge directory: {}", data_dir.display());
    let backend = Arc::new(JsonFileBackend::new(data_dir).await?);

    let extractor: Arc<dyn ExtractionService> = match LlmExtractionService::new(LlmConfig::default())
    {
        Ok(service) => Arc::new(service),
        Err(e) => {
            warn!("{}; corrections will be recorded without extraction", e);
            Arc::new(UnavailableExtractor)
        }
    };

    Ok(Arc::new(LearningEngine::new(backend, extractor, config)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Accepts a single event object or an array of events
fn parse_events(raw: &str) -> Result<Vec<QuoteLifecycleEvent>> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let events = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    Ok(events)
}

#[derive(Parser)]
#[command(name = "quotewise")]
#[command(about = "Per-contractor pricing knowledge engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Knowledge directory (overrides QUOTEWISE_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Learning config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process quote lifecycle events from a JSON file
    Ingest {
        /// File holding one event object or an array of events
        path: PathBuf,
    },

    /// Show the knowledge context for generating a quote
    Context {
        #[arg(long)]
        contractor: String,

        #[arg(long)]
        category: String,

        /// Job description used for relevance scoring
        #[arg(long, default_value = "")]
        description: String,
    },

    /// Show per-category confidence for a contractor
    Dashboard {
        #[arg(long)]
        contractor: String,
    },

    /// Backfill contractor DNA from existing category knowledge
    Migrate {
        /// Only this contractor (default: all)
        #[arg(long)]
        contractor: Option<String>,
    },

    /// Set or clear tailored guidance for a category
    Guidance {
        #[arg(long)]
        contractor: String,

        #[arg(long)]
        category: String,

        /// Guidance text; omit to clear
        text: Option<String>,
    },

    /// Set or clear a contractor's pricing philosophy
    Philosophy {
        #[arg(long)]
        contractor: String,

        /// Philosophy text; omit to clear
        text: Option<String>,
    },

    /// Inspect learning configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Validate a configuration file
    Validate {
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Use specified level for our crates, WARN for the HTTP stack
    let level = level.as_str().to_lowercase();
    let filter = EnvFilter::new(format!(
        "quotewise={level},quotewise_core={level},reqwest=warn,hyper=warn"
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Quotewise v{} starting...", env!("CARGO_PKG_VERSION"));

    let data_dir = get_data_dir(cli.data_dir);

    match cli.command {
        Commands::Ingest { path } => {
            let config = load_config(cli.config.as_deref(), &data_dir)?;
            let engine = build_engine(data_dir, config).await?;

            let raw = tokio::fs::read_to_string(&path).await?;
            let events = parse_events(&raw)?;
            info!("Processing {} event(s) from {}", events.len(), path.display());

            // In order: later transitions of a quote depend on earlier ones
            let mut outcomes = Vec::with_capacity(events.len());
            for event in events {
                outcomes.push(engine.process(event).await);
            }
            print_json(&outcomes)
        }
        Commands::Context {
            contractor,
            category,
            description,
        } => {
            let config = load_config(cli.config.as_deref(), &data_dir)?;
            let engine = build_engine(data_dir, config).await?;
            let category = JobCategory::new(&category);
            if category.is_empty() {
                return Err(QuotewiseError::InvalidInput(
                    "category must not be blank".to_string(),
                ));
            }
            let context = engine
                .build_context(&ContractorId::new(contractor), &category, &description)
                .await?;
            print_json(&context)
        }
        Commands::Dashboard { contractor } => {
            let config = load_config(cli.config.as_deref(), &data_dir)?;
            let engine = build_engine(data_dir, config).await?;
            let report = engine.dashboard(&ContractorId::new(contractor)).await?;
            print_json(&report)
        }
        Commands::Migrate { contractor } => {
            let config = load_config(cli.config.as_deref(), &data_dir)?;
            let engine = build_engine(data_dir, config).await?;
            match contractor {
                Some(id) => {
                    let report = engine
                        .migration()
                        .backfill_dna(&ContractorId::new(id))
                        .await?;
                    print_json(&report)
                }
                None => {
                    let results = engine.migration().backfill_all().await?;
                    let failed = results.iter().filter(|r| r.error.is_some()).count();
                    if failed > 0 {
                        warn!("{} contractor(s) failed to migrate", failed);
                    }
                    print_json(&results)
                }
            }
        }
        Commands::Guidance {
            contractor,
            category,
            text,
        } => {
            let config = load_config(cli.config.as_deref(), &data_dir)?;
            let engine = build_engine(data_dir, config).await?;
            let cleared = text.is_none();
            engine
                .store()
                .set_guidance(&ContractorId::new(contractor), &JobCategory::new(&category), text)
                .await?;
            if cleared {
                println!("✓ Guidance cleared for {}", category);
            } else {
                println!("✓ Guidance saved for {}", category);
            }
            Ok(())
        }
        Commands::Philosophy { contractor, text } => {
            let config = load_config(cli.config.as_deref(), &data_dir)?;
            let engine = build_engine(data_dir, config).await?;
            let cleared = text.is_none();
            engine
                .store()
                .set_philosophy(&ContractorId::new(contractor.clone()), text)
                .await?;
            if cleared {
                println!("✓ Philosophy cleared for {}", contractor);
            } else {
                println!("✓ Philosophy saved for {}", contractor);
            }
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref(), &data_dir)?;
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigAction::Validate { path } => {
                let config = LearningConfig::from_file(&path)?;
                config.validate()?;
                println!("✓ {} is valid", path.display());
                Ok(())
            }
        },
    }
}
