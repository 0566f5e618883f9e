//! host-sentry: host security scan engine.
//!
//! This is the main entry point for the CLI application.

use clap::{Parser, Subcommand};
use host_sentry::core::config::{CollectorConfig, Config};
use host_sentry::core::error::{Error, Result};
use host_sentry::core::types::{JobState, ScanVariant};
use host_sentry::detection::SignatureRegistry;
use host_sentry::scanner::{progress_channel, ConsoleProgressReporter, ScanOrchestrator};
use host_sentry::submit::{CollectorClient, SubmitOutcome};
use host_sentry::utils::logging::{init_logging, LogConfig};
use host_sentry::utils::retry::{retry_async, RetryConfig};
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// host-sentry: host security scanner with collector upload
#[derive(Parser, Debug)]
#[command(name = "host-sentry")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a security scan
    Scan {
        /// Quick health check (posture probes + port sweep)
        #[arg(short, long, conflicts_with_all = ["full", "path"])]
        quick: bool,

        /// Full system scan (every mounted root + quick probes)
        #[arg(short, long, conflicts_with_all = ["quick", "path"])]
        full: bool,

        /// Scan a specific directory
        #[arg(short, long, conflicts_with_all = ["quick", "full"])]
        path: Option<PathBuf>,

        /// Save the report to a local JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Upload the report to the collector after the scan
        #[arg(long, requires = "token")]
        upload: bool,

        /// Access token for the collector
        #[arg(long)]
        token: Option<String>,

        /// Load signatures from a JSON file instead of the builtin table
        #[arg(long)]
        signatures: Option<PathBuf>,
    },

    /// Check collector connectivity
    Check,

    /// Log in to the collector and print an access token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// List previously uploaded scan results
    Results {
        /// Access token for the collector
        #[arg(long)]
        token: String,
    },

    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show application information
    Info,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Print the configuration file location
    Path,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };
    init_logging(log_config);

    log::info!("host-sentry v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load_or_default());
    config.validate()?;

    match cli.command {
        Some(Commands::Scan {
            quick,
            full,
            path,
            output,
            upload,
            token,
            signatures,
        }) => {
            run_scan(
                config, quick, full, path, output, upload, token, signatures, cli.format,
            )
            .await
        }
        Some(Commands::Check) => run_check(&config).await,
        Some(Commands::Login { email, password }) => run_login(&config, &email, &password).await,
        Some(Commands::Results { token }) => run_results(&config, &token, cli.format).await,
        Some(Commands::Config { action }) => run_config(action, &config),
        Some(Commands::Info) => run_info(&config),
        None => {
            println!("host-sentry - Host Security Scanner");
            println!();
            println!("Use --help for usage information");
            println!();
            println!("Quick start:");
            println!("  host-sentry scan --quick       Quick system health check");
            println!("  host-sentry scan --path DIR    Scan a specific directory");
            println!("  host-sentry scan --full        Full system scan");
            println!("  host-sentry check              Verify collector connectivity");
            Ok(())
        }
    }
}

/// Run a scan and handle output/upload of the report.
#[allow(clippy::too_many_arguments)]
async fn run_scan(
    config: Arc<Config>,
    quick: bool,
    full: bool,
    path: Option<PathBuf>,
    output: Option<PathBuf>,
    upload: bool,
    token: Option<String>,
    signatures: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let registry = match &signatures {
        Some(path) => SignatureRegistry::from_file(path)?,
        None => SignatureRegistry::builtin(),
    };
    let registry = Arc::new(registry);

    let (variant, target) = if full {
        (ScanVariant::Full, None)
    } else if let Some(dir) = path {
        (ScanVariant::Directory, Some(dir))
    } else {
        if !quick {
            log::info!("No scan mode specified; defaulting to quick scan");
        }
        (ScanVariant::Quick, None)
    };

    let collector_config = config.collector.clone();
    let orchestrator = ScanOrchestrator::new(config, registry);
    let (tx, mut rx) = progress_channel();
    let handle = orchestrator.start(variant, target, tx)?;

    let reporter = ConsoleProgressReporter::new();
    while let Some(event) = rx.recv().await {
        reporter.report(&event);
    }
    reporter.finish();

    handle
        .await
        .map_err(|e| Error::Internal(format!("scan task failed: {}", e)))?;

    let job = orchestrator.job();
    let report = match job.state {
        JobState::Completed(report) => report,
        JobState::Failed(reason) => return Err(Error::Internal(format!("scan failed: {}", reason))),
        other => {
            return Err(Error::Internal(format!(
                "scan ended in unexpected state: {}",
                other.name()
            )))
        }
    };

    let report_json = serde_json::to_value(&report)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report_json)?);
        }
        OutputFormat::Text => {
            println!();
            println!("=== Scan Complete ===");
            println!("Job ID:          {}", job.id);
            println!("Scan Type:       {}", variant);
            println!("Infected Files:  {}", report.infected_count());
            print_text_summary(&report_json);
        }
    }

    if let Some(path) = output {
        save_report(&report_json, &path)?;
        println!("Report saved to {}", path.display());
    }

    // The report is retained locally no matter how the upload goes.
    if upload {
        let token = token
            .ok_or_else(|| Error::Internal("--upload requires --token".to_string()))?;
        upload_report(&collector_config, &report_json, variant, &token).await?;
    }

    Ok(())
}

/// Print headline numbers from the report JSON.
fn print_text_summary(report: &Value) {
    if let Some(ports) = report.get("open_ports").and_then(Value::as_array) {
        println!("Open Ports:      {}", ports.len());
        for port in ports.iter().take(5) {
            if let (Some(number), Some(service)) = (port.get("port"), port.get("service")) {
                println!("  - {} ({})", number, service.as_str().unwrap_or("Unknown"));
            }
        }
        if ports.len() > 5 {
            println!("  ...and {} more", ports.len() - 5);
        }
    }

    if let Some(stats) = report
        .get("directory_scan")
        .and_then(|scan| scan.get("stats"))
    {
        println!(
            "Files Scanned:   {}",
            stats.get("scanned_files").unwrap_or(&Value::Null)
        );
        println!(
            "Files Skipped:   {}",
            stats.get("skipped_files").unwrap_or(&Value::Null)
        );
        println!(
            "Duration:        {}s",
            stats.get("scan_duration_seconds").unwrap_or(&Value::Null)
        );
    }

    if let Some(drives) = report.get("drive_scans").and_then(Value::as_object) {
        println!("Roots Scanned:   {}", drives.len());
        for (root, outcome) in drives {
            match outcome.get("error") {
                Some(error) => println!("  - {}: error ({})", root, error),
                None => println!("  - {}: ok", root),
            }
        }
    }
}

/// Save a report to a local JSON file.
fn save_report(report: &Value, path: &PathBuf) -> Result<()> {
    let contents = serde_json::to_string_pretty(report)?;
    std::fs::write(path, contents).map_err(|e| Error::file_write(path.clone(), e))?;
    log::info!("Scan report saved to {:?}", path);
    Ok(())
}

/// Upload a report, retrying transient transport failures.
async fn upload_report(
    collector: &CollectorConfig,
    report: &Value,
    variant: ScanVariant,
    token: &str,
) -> Result<()> {
    let client = CollectorClient::new(
        collector.base_url.clone(),
        Duration::from_secs(collector.timeout_secs),
    )?;

    match client.test_connection().await {
        Ok(true) => log::debug!("Collector reachable at {}", client.base_url()),
        _ => log::warn!("Collector connectivity check failed; attempting upload anyway"),
    }

    let outcome = retry_async(
        "upload scan result",
        RetryConfig::network().with_max_attempts(3),
        |outcome: &SubmitOutcome| outcome.is_retryable(),
        || submit_once(&client, report, variant, token),
    )
    .await?;

    match outcome {
        SubmitOutcome::Success(_) => {
            println!("Report uploaded to {}", client.base_url());
            Ok(())
        }
        other => Err(Error::Network(format!("upload failed: {}", other))),
    }
}

/// One submission attempt shaped for the retry helper: retryable outcomes
/// become the error side.
async fn submit_once(
    client: &CollectorClient,
    report: &Value,
    variant: ScanVariant,
    token: &str,
) -> std::result::Result<SubmitOutcome, SubmitOutcome> {
    match client.submit(report, variant, token).await {
        Ok(outcome) if outcome.is_retryable() => Err(outcome),
        Ok(outcome) => Ok(outcome),
        Err(e) => Ok(SubmitOutcome::Rejected(e.to_string())),
    }
}

/// Check collector connectivity.
async fn run_check(config: &Config) -> Result<()> {
    let client = CollectorClient::new(
        config.collector.base_url.clone(),
        Duration::from_secs(config.collector.timeout_secs),
    )?;

    if client.test_connection().await.unwrap_or(false) {
        println!("Collector reachable at {}", client.base_url());
        Ok(())
    } else {
        Err(Error::Network(format!(
            "collector not reachable at {}",
            config.collector.base_url
        )))
    }
}

/// Authenticate and print an access token.
async fn run_login(config: &Config, email: &str, password: &str) -> Result<()> {
    let client = CollectorClient::new(
        config.collector.base_url.clone(),
        Duration::from_secs(config.collector.timeout_secs),
    )?;

    let token = client.login(email, password).await?;
    println!("{}", token);
    Ok(())
}

/// List previously uploaded scan results.
async fn run_results(config: &Config, token: &str, format: OutputFormat) -> Result<()> {
    let client = CollectorClient::new(
        config.collector.base_url.clone(),
        Duration::from_secs(config.collector.timeout_secs),
    )?;

    let results = client.fetch_results(token).await?;

    match format {
        OutputFormat::Json => {
            let json: Vec<Value> = results
                .iter()
                .map(|r| {
                    serde_json::json!({
                        "id": r.id,
                        "scan_type": r.scan_type,
                        "scan_result": r.scan_result,
                        "upload_at": r.upload_at,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if results.is_empty() {
                println!("No uploaded scan results.");
            } else {
                for result in &results {
                    println!("#{}  {}  {}", result.id, result.scan_type, result.upload_at);
                }
            }
        }
    }
    Ok(())
}

/// Handle configuration commands.
fn run_config(action: ConfigAction, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
        }
        ConfigAction::Reset { yes } => {
            if !yes {
                println!("Pass --yes to confirm resetting the configuration.");
                return Ok(());
            }
            let default_config = Config::default();
            default_config.save(&Config::default_config_path())?;
            println!("Configuration reset to defaults.");
        }
        ConfigAction::Path => {
            println!("{}", Config::default_config_path().display());
        }
    }
    Ok(())
}

/// Show application information.
fn run_info(config: &Config) -> Result<()> {
    println!("host-sentry - Host Security Scanner");
    println!();
    println!("Version:          {}", env!("CARGO_PKG_VERSION"));
    println!("Config Path:      {}", Config::default_config_path().display());
    println!("Data Directory:   {}", Config::data_dir().display());
    println!("Collector:        {}", config.collector.base_url);
    println!();
    println!("Scan Settings:");
    println!("  Max File Size:  {} MiB", config.scan.skip_large_files_mb);
    println!("  Threads:        {}", config.scan.scan_threads);
    println!("  Progress Every: {} files", config.scan.progress_interval);
    println!();
    println!("Port Probe Settings:");
    println!("  Range:          1-{}", config.ports.range_end);
    println!("  Extra Ports:    {:?}", config.ports.extra_ports);
    println!("  Timeout:        {} ms", config.ports.connect_timeout_ms);
    println!("  Concurrency:    {}", config.ports.concurrency);
    Ok(())
}
