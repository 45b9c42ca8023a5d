// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record, info};
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use doctran::app_config::{Config, LogLevel};
use doctran::ocr::EnginePool;
use doctran::pipeline::PipelineOrchestrator;
use doctran::router::ProviderRouter;
use doctran::store::{self, JobSeed, JobStatus, QualityTier, Repository};

/// CLI wrapper for QualityTier to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliQualityTier {
    Standard,
    Premium,
    Enterprise,
}

impl From<CliQualityTier> for QualityTier {
    fn from(tier: CliQualityTier) -> Self {
        match tier {
            CliQualityTier::Standard => QualityTier::Standard,
            CliQualityTier::Premium => QualityTier::Premium,
            CliQualityTier::Enterprise => QualityTier::Enterprise,
        }
    }
}

/// CLI wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Seed a verification job and run the pipeline end-to-end (default)
    Run(RunArgs),

    /// Generate shell completions for doctran
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Document reference to stamp on the test job
    #[arg(long, default_value = "sample-document")]
    document: String,

    /// Number of pages to seed as OCR work units
    #[arg(long, default_value_t = 3)]
    pages: u32,

    /// Source language code, or 'auto' for detection
    #[arg(short, long, default_value = "auto")]
    source_language: String,

    /// Target language code
    #[arg(short, long, default_value = "fr")]
    target_language: String,

    /// Quality tier for provider selection
    #[arg(long, value_enum, default_value_t = CliQualityTier::Standard)]
    tier: CliQualityTier,

    /// Preserve formatting markers through translation
    #[arg(long)]
    preserve_formatting: bool,

    /// JSON file with a term->term glossary to apply
    #[arg(long)]
    glossary: Option<String>,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Database path; the default scratch run uses an in-memory store
    #[arg(long, default_value = ":memory:")]
    database: String,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,
}

/// doctran - document translation pipeline worker
///
/// Runs the OCR -> translation pipeline over a seeded verification job so the
/// full worker path (batching, retry, provider fallback, progress tracking)
/// can be exercised locally.
#[derive(Parser, Debug)]
#[command(name = "doctran")]
#[command(version)]
#[command(about = "Document translation pipeline worker")]
#[command(long_about = "doctran runs uploaded documents through an asynchronous pipeline:
OCR text extraction, language detection and multi-provider AI translation.

EXAMPLES:
    doctran run                                 # 3-page mock job, in-memory store
    doctran run --pages 10 -t de                # 10 pages, translate to German
    doctran run --tier premium                  # premium provider routing
    doctran run --database jobs.db              # persistent job store
    doctran completions bash > doctran.bash     # generate bash completions

PROVIDERS:
    Credentials come from the environment (DOCTRAN_OPENAI_API_KEY,
    DOCTRAN_ANTHROPIC_API_KEY). Without credentials the pipeline still
    completes via the built-in mock provider.")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Plain console logger for the CLI
struct ConsoleLogger {
    level: LevelFilter,
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = match record.level() {
            Level::Error => writeln!(stderr, "error: {}", record.args()),
            Level::Warn => writeln!(stderr, "warn: {}", record.args()),
            _ => writeln!(stderr, "{}", record.args()),
        };
    }

    fn flush(&self) {}
}

fn init_logger(level: LogLevel) -> Result<()> {
    let filter: LevelFilter = level.into();
    log::set_boxed_logger(Box::new(ConsoleLogger { level: filter }))
        .map(|()| log::set_max_level(filter))
        .map_err(|e| anyhow!("Failed to install logger: {}", e))
}

fn load_glossary(path: &str) -> Result<BTreeMap<String, String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read glossary file: {}", path))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse glossary file: {}", path))
}

async fn run_pipeline(args: RunArgs) -> Result<()> {
    let mut config = Config::load(&args.config_path)?;
    if let Some(level) = args.log_level {
        config.log_level = level.into();
    }
    init_logger(config.log_level)?;

    let repo = if args.database == ":memory:" {
        Repository::new_in_memory()?
    } else {
        Repository::new(doctran::store::DatabaseConnection::new(&args.database)?)
    };

    let glossary = args.glossary.as_deref().map(load_glossary).transpose()?;
    let job = store::seed_job(
        &repo,
        JobSeed {
            document_ref: args.document.clone(),
            pages: args.pages,
            source_language: args.source_language.clone(),
            target_language: args.target_language.clone(),
            tier: args.tier.into(),
            preserve_formatting: args.preserve_formatting,
            glossary,
        },
    )
    .await?;

    info!(
        "seeded job {} ({} page(s), {} -> {})",
        job.id, args.pages, args.source_language, args.target_language
    );

    let router = Arc::new(ProviderRouter::from_config(&config.providers));
    let pool = Arc::new(EnginePool::from_config(&config.ocr)?);
    let orchestrator = PipelineOrchestrator::standard(&config, repo.clone(), router, pool)
        .map_err(|e| anyhow!(e.to_string()))?;

    // Mirror job progress onto a console bar while the pipeline runs.
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let watcher = {
        let repo = repo.clone();
        let job_id = job.id.clone();
        let bar = bar.clone();
        tokio::spawn(async move {
            loop {
                match repo.get_job(&job_id).await {
                    Ok(Some(current)) => {
                        bar.set_position(current.progress as u64);
                        bar.set_message(current.message.clone());
                        if current.status.is_terminal() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => break,
                }
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
        })
    };

    let run = orchestrator.run_job(&job.id).await;
    let _ = watcher.await;
    bar.finish_and_clear();

    let run = run.map_err(|e| anyhow!("pipeline run failed: {}", e))?;
    println!("{}", run.summary());

    let final_job = repo
        .get_job(&job.id)
        .await?
        .ok_or_else(|| anyhow!("job vanished from store"))?;
    println!(
        "job {}: status={} progress={}% message=\"{}\"",
        final_job.id, final_job.status, final_job.progress, final_job.message
    );

    if final_job.status != JobStatus::Done {
        anyhow::bail!(
            "job finished with status {} ({})",
            final_job.status,
            final_job.error_detail.unwrap_or_default()
        );
    }

    let units = repo.completed_translation_units(&job.id).await?;
    println!("{} translation unit(s) ready for rebuild", units.len());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Run(args)) => run_pipeline(args).await,
        None => run_pipeline(RunArgs::parse_from(["doctran"])).await,
    }
}
