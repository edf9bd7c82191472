use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use sermon_scraper::app::transcript_use_case::{ArchiveSource, PipelineRun, TableKind, TranscriptUseCase};
use sermon_scraper::config::Config;
use sermon_scraper::constants;
use sermon_scraper::infra::http_client::ReqwestHttp;
use sermon_scraper::infra::rate_limiter_adapter::RateLimiterAdapter;
use sermon_scraper::logging;
use sermon_scraper::pipeline::ingestion::known_ids::KnownIdStore;
use sermon_scraper::pipeline::ingestion::rate_limiter::RateLimiter;
use sermon_scraper::pipeline::processing::quality_gate::StageReport;

#[derive(Parser)]
#[command(name = "sermon_scraper")]
#[command(about = "Sermon archive scraper and transcript cleaning pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Pipeline configuration file. Falls back to SERMON_CONFIG, then config/pipeline.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and normalize the archive into the pre-scraping table
    Normalize {
        /// Archive page path or URL. Defaults to the configured archive URL
        #[arg(long)]
        archive: Option<String>,
    },
    /// Run the full pipeline through to the transcript table
    Run {
        /// Archive page path or URL. Defaults to the configured archive URL
        #[arg(long)]
        archive: Option<String>,
        /// Abort on the first stage with error-level violations
        #[arg(long)]
        fail_fast: bool,
        /// Only fetch media for the first N records
        #[arg(long)]
        limit: Option<usize>,
        /// Expose Prometheus metrics while running
        #[arg(long)]
        metrics: bool,
    },
    /// Validate a JSON table written by an earlier run
    Validate {
        #[arg(long, value_enum)]
        schema: SchemaArg,
        /// Table file to check
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        fail_fast: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaArg {
    PreScraping,
    Transcript,
    Chunk,
}

impl From<SchemaArg> for TableKind {
    fn from(arg: SchemaArg) -> Self {
        match arg {
            SchemaArg::PreScraping => TableKind::PreScraping,
            SchemaArg::Transcript => TableKind::Transcript,
            SchemaArg::Chunk => TableKind::Chunk,
        }
    }
}

fn build_use_case(config: &Config) -> anyhow::Result<TranscriptUseCase> {
    let http = ReqwestHttp::new(Duration::from_secs(config.fetch.timeout_secs))?;
    let limiter = RateLimiterAdapter(RateLimiter::per_minute(config.fetch.requests_per_min));
    Ok(TranscriptUseCase::new(config, Arc::new(http), Arc::new(limiter))?)
}

fn archive_source(config: &Config, archive: Option<String>) -> ArchiveSource {
    ArchiveSource::parse(archive.as_deref().unwrap_or(&config.archive_url))
}

/// Ids from earlier runs plus any listed in the config
fn load_known_ids(config: &Config, store: &KnownIdStore) -> anyhow::Result<HashSet<u64>> {
    let mut known = store.load_ids()?;
    known.extend(config.known_ids.iter().copied());
    Ok(known)
}

fn print_stage(stage: &StageReport) {
    println!(
        "   {}: {} rows, {} violation(s), {:?}",
        stage.stage,
        stage.rows_checked,
        stage.violations.len(),
        stage.decision
    );
    for (kind, count) in stage.counts_by_kind() {
        println!("      {:?}: {}", kind, count);
    }
}

fn print_summary(run: &PipelineRun) {
    let report = &run.report;
    println!("\n📊 Run {} ({})", report.run_id, report.archive);
    println!("   Raw records: {}", report.raw_records);
    println!("   Pre-scraping records: {}", run.pre_scraping.len());
    println!(
        "   Preachers inferred: {} of {}",
        report.inference.resolved, report.inference.evaluated
    );
    if let Some(fetch) = &report.fetch {
        println!(
            "   Media fetched: {} ({} failed, {} skipped)",
            fetch.fetched,
            fetch.failures.len(),
            fetch.skipped
        );
        println!("   Transcript records: {}", run.transcripts.len());
        println!("   Rejected by assembler: {}", report.rejections.len());
    }
    for stage in &report.stages {
        print_stage(stage);
    }
    for path in &report.outputs {
        println!("💾 {}", path.display());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .or_else(|| std::env::var("SERMON_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_CONFIG_PATH));
    let mut config = Config::load(&config_path)?;
    info!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Normalize { archive } => {
            let source = archive_source(&config, archive);
            println!("🔄 Normalizing archive {}", source.describe());

            let store = KnownIdStore::open_at(config.state_db_path())?;
            let mut known = load_known_ids(&config, &store)?;
            let use_case = build_use_case(&config)?;

            let mut run = use_case.run_normalize(&source, &mut known).await?;
            use_case.persist(&mut run, config.output_dir())?;
            print_summary(&run);
        }
        Commands::Run {
            archive,
            fail_fast,
            limit,
            metrics,
        } => {
            if fail_fast {
                config.validation.fail_fast = true;
            }
            if limit.is_some() {
                config.fetch.limit = limit;
            }
            if metrics || std::env::var("SERMON_METRICS_PORT").is_ok() {
                sermon_scraper::metrics::init_metrics();
            }

            let source = archive_source(&config, archive);
            println!("🚀 Running transcript pipeline on {}", source.describe());

            let mut store = KnownIdStore::open_at(config.state_db_path())?;
            let mut known = load_known_ids(&config, &store)?;
            let use_case = build_use_case(&config)?;

            let mut run = match use_case.run(&source, &mut known).await {
                Ok(run) => run,
                Err(e) => {
                    error!("Pipeline failed: {}", e);
                    return Err(e.into());
                }
            };
            use_case.persist(&mut run, config.output_dir())?;

            let recorded = store.record_ids(run.processed_ids(), &run.report.run_id.to_string())?;
            info!("Recorded {} new known id(s)", recorded);
            print_summary(&run);

            if let Some(fetch) = &run.report.fetch {
                if !fetch.failures.is_empty() {
                    warn!("{} record(s) could not be fetched and will be retried next run", fetch.failures.len());
                }
            }
        }
        Commands::Validate {
            schema,
            input,
            fail_fast,
        } => {
            if fail_fast {
                config.validation.fail_fast = true;
            }
            let use_case = build_use_case(&config)?;
            let report = use_case.validate_table(schema.into(), &input)?;
            println!("🔍 Validated {}", input.display());
            print_stage(&report);
            for v in &report.violations {
                println!("   - [{:?}] {}", v.severity, v.message);
            }
        }
    }

    Ok(())
}
