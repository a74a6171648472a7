//! SeisRisk - regional short-term seismic risk estimation
//!
//! A CLI tool that pulls recent earthquakes from a live catalog, scores
//! the nationwide and per-region risk with a pretrained classifier, and
//! generates Markdown/JSON reports.
//!
//! Exit codes:
//!   0 - Success (overall risk below the alert threshold, or watch mode)
//!   1 - Runtime error (configuration, model, boundaries, catalog, etc.)
//!   2 - Overall risk at or above the alert threshold (one-shot mode)

mod analysis;
mod catalog;
mod cli;
mod config;
mod coordinator;
mod error;
mod models;
mod regions;
mod report;

use analysis::{FeatureAggregator, LogisticModel, RiskScorer};
use anyhow::{anyhow, Context, Result};
use catalog::CatalogClient;
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, DEFAULT_CONFIG_FILE};
use coordinator::{
    AnalysisCoordinator, AnalysisRequest, AnalysisStore, CoordinatorSettings, RunNotification,
    RunOutcome, StartError,
};
use indicatif::{ProgressBar, ProgressStyle};
use models::{AnalysisResult, TimeWindow};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config comes first so `[general] verbose` can raise the log level
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose))?;

    info!("SeisRisk v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Analysis failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .seisrisk.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the catalog, model, boundaries and alert threshold.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` overrides the verbosity flags.
fn init_logging(level: tracing::Level) -> Result<()> {
    let level = level.as_str().to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Load everything, then run once or keep watching. Returns the exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    config.validate()?;

    // Startup collaborators; any failure here is fatal.
    let model = LogisticModel::load(&config.model.path)?;
    let aggregator = FeatureAggregator::new(config.analysis.features.clone())?;
    let scorer = Arc::new(RiskScorer::new(Arc::new(model), aggregator)?);
    let regions = regions::load_regions(&config.regions.path, &config.regions.name_property)?;
    let client = CatalogClient::new(&config.catalog)?;

    eprintln!("🌍 Catalog: {}", config.catalog.url);
    eprintln!("   Area: {}", config.national_bbox());
    eprintln!("   Regions: {}", regions.len());
    eprintln!(
        "   Alert threshold: {:.0}%",
        config.analysis.alert_threshold
    );

    let store = Arc::new(AnalysisStore::new(regions));
    let settings = CoordinatorSettings {
        national_bbox: config.national_bbox(),
        concurrency: config.analysis.concurrency,
        retry: config.retry_policy(),
        run_timeout: config.run_timeout(),
    };
    let (coordinator, rx) = AnalysisCoordinator::new(Arc::new(client), settings, store);

    if args.watch {
        run_watch(&config, &coordinator, rx, scorer).await
    } else {
        run_once(&args, &config, &coordinator, rx, scorer).await
    }
}

/// One analysis; exit code 2 when the alert fires.
async fn run_once(
    args: &Args,
    config: &Config,
    coordinator: &AnalysisCoordinator,
    mut rx: mpsc::Receiver<RunNotification>,
    scorer: Arc<RiskScorer>,
) -> Result<i32> {
    let end = args.end.unwrap_or_else(Utc::now);
    let window = match args.start {
        Some(start) => TimeWindow::new(start, end)?,
        None => TimeWindow::trailing_days(end, config.analysis.history_days)?,
    };

    eprintln!("\n🔬 Analysing {}...", window);

    let spinner = if args.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Fetching and scoring events");
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    };

    coordinator.start(request(coordinator, scorer, window, config))?;
    let notification = rx
        .recv()
        .await
        .context("Analysis stopped without reporting a result")?;
    spinner.finish_and_clear();

    let result = match notification.outcome {
        RunOutcome::Succeeded(result) => result,
        RunOutcome::Failed(reason) => return Err(anyhow!(reason)),
    };

    emit_report(config, &result)?;
    print_summary(&result);

    if result.alert {
        eprintln!(
            "\n⛔ Overall risk {:.1}% is at or above the {:.0}% threshold (exit code 2).",
            result.overall_risk, result.alert_threshold
        );
        return Ok(2);
    }

    Ok(0)
}

/// Re-run on a fixed interval until Ctrl+C.
async fn run_watch(
    config: &Config,
    coordinator: &AnalysisCoordinator,
    mut rx: mpsc::Receiver<RunNotification>,
    scorer: Arc<RiskScorer>,
) -> Result<i32> {
    let period = Duration::from_secs(config.analysis.refresh_interval_seconds);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    eprintln!(
        "\n👀 Watch mode: refreshing every {}s (Ctrl+C to stop)",
        period.as_secs()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let window = TimeWindow::trailing_days(Utc::now(), config.analysis.history_days)?;
                match coordinator.start(request(coordinator, scorer.clone(), window, config)) {
                    Ok(run_id) => debug!("Scheduled run {}", run_id),
                    Err(StartError::AlreadyRunning) => {
                        warn!("Previous analysis still running, skipping this refresh");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Some(notification) = rx.recv() => {
                match notification.outcome {
                    RunOutcome::Succeeded(result) => {
                        deliver_watch_result(config, notification.run_id, &result);
                    }
                    RunOutcome::Failed(reason) => {
                        eprintln!("\n❌ Run {} failed: {}", notification.run_id, reason);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\n🛑 Stopping...");
                break;
            }
        }
    }

    coordinator.shutdown();
    Ok(0)
}

fn request(
    coordinator: &AnalysisCoordinator,
    scorer: Arc<RiskScorer>,
    window: TimeWindow,
    config: &Config,
) -> AnalysisRequest {
    AnalysisRequest {
        scorer,
        regions: coordinator.store().regions(),
        window,
        alert_threshold: config.analysis.alert_threshold,
    }
}

/// Report one watch-mode run. A failed report write is logged and the
/// watch loop keeps going. Returns whether the report was written.
fn deliver_watch_result(config: &Config, run_id: u64, result: &AnalysisResult) -> bool {
    let written = match emit_report(config, result) {
        Ok(()) => true,
        Err(e) => {
            error!("Run {}: {:#}", run_id, e);
            eprintln!("\n❌ Run {}: {:#}", run_id, e);
            false
        }
    };
    print_summary(result);
    written
}

/// Render the report and write it to the output file, or stdout.
fn emit_report(config: &Config, result: &AnalysisResult) -> Result<()> {
    let output = match config.general.format {
        OutputFormat::Json => report::generate_json_report(result)?,
        OutputFormat::Markdown => report::generate_markdown_report(result),
    };

    match config.general.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            eprintln!("\n✅ Report saved to: {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(())
}

fn print_summary(result: &AnalysisResult) {
    eprintln!("\n📊 Risk Summary:");
    eprintln!("   Overall risk: {:.1}%", result.overall_risk);
    eprintln!("   Events: {}", result.events.len());
    for (name, risk) in result.regions_by_risk().into_iter().take(5) {
        eprintln!("   - {}: {}", name, risk);
    }
    if result.unavailable_count() > 0 {
        eprintln!(
            "   ⚠️  {} regions unavailable (reported as 0%)",
            result.unavailable_count()
        );
    }
    eprintln!("   Duration: {:.1}s", result.duration_seconds);
}

/// Load configuration from file or use defaults.
///
/// Runs before logging is set up, so problems go straight to stderr.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("⚠️  Failed to load config, using defaults: {:#}", e);
            Ok(Config::default())
        }
    }
}
