//! Content Aggregator CLI Application
//!
//! A command-line interface that fetches a list of pages concurrently under a
//! shared rate limit and prints the title, description and keywords of each.
//! This CLI application provides a user-friendly interface to the
//! content-aggregator-lib pipeline.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use console::Term;
use content_aggregator_lib::{
    load_env_config, normalize_items, parse_duration, read_items_from_file, ConfigManager,
    EnvConfig, FileConfig,
};
use content_aggregator_lib::{BatchOutcome, OutcomeError, PipelineConfig, ProcessedResult, Stage};
use content_aggregator_lib::{HtmlProcessor, HttpFetcher, Pipeline};
use serde::Serialize;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for content-aggregator
#[derive(Parser, Debug)]
#[command(name = "content-aggregator")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fetch pages concurrently under a rate limit and extract their metadata")]
#[command(
    long_about = "Fetch pages concurrently with a fixed pool of workers sharing one rate limit, then extract the title, description and keywords of every page.\n\nFailed items are reported next to the successful ones; one bad page never stops the batch."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// URLs to fetch (bare hosts get https:// prepended)
    #[arg(value_name = "URLS", help_heading = "Input")]
    pub urls: Vec<String>,

    /// Read URLs from a file (one per line, # comments allowed)
    #[arg(
        short = 'f',
        long = "file",
        value_name = "FILE",
        help_heading = "Input"
    )]
    pub file: Option<String>,

    /// Number of concurrent workers [default: 3]
    #[arg(
        short = 'w',
        long = "workers",
        value_name = "N",
        help_heading = "Throughput"
    )]
    pub workers: Option<usize>,

    /// Fetches admitted per second [default: 2]
    #[arg(
        short = 'r',
        long = "rate",
        value_name = "N",
        help_heading = "Throughput"
    )]
    pub rate: Option<u32>,

    /// Fetches admitted back-to-back before the rate applies [default: same as --rate]
    #[arg(long = "burst", value_name = "N", help_heading = "Throughput")]
    pub burst: Option<u32>,

    /// Deadline for the whole batch, e.g. 30s or 2m [default: 30s]
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Throughput")]
    pub timeout: Option<String>,

    /// Deadline for a single request, e.g. 500ms or 10s [default: 10s]
    #[arg(
        long = "fetch-timeout",
        value_name = "DURATION",
        help_heading = "Throughput"
    )]
    pub fetch_timeout: Option<String>,

    /// Output results in JSON format
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Output results in CSV format
    #[arg(long = "csv", help_heading = "Output Format")]
    pub csv: bool,

    /// Styled output with a spinner, grouped sections and a summary
    #[arg(short = 'p', long = "pretty", help_heading = "Output Format")]
    pub pretty: bool,

    /// Exit with status 1 when any item failed
    #[arg(long = "strict", help_heading = "Behavior")]
    pub strict: bool,

    /// Use a specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Show per-item details and debug logs
    #[arg(short = 'd', long = "debug", help_heading = "Debugging")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Debugging")]
    pub verbose: bool,
}

/// How results are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Pretty,
    Json,
    Csv,
}

impl OutputFormat {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "text" => Some(Self::Text),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Everything resolved from config files, environment and flags.
#[derive(Debug, Clone)]
struct RunSettings {
    pipeline: PipelineConfig,
    format: OutputFormat,
    json_pretty: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            format: OutputFormat::Text,
            json_pretty: true,
        }
    }
}

/// Failed items grouped by the stage they failed in
#[derive(Debug, Default)]
pub(crate) struct FailureStats {
    pub(crate) rate_limited: Vec<String>,
    pub(crate) fetch_failures: Vec<String>,
    pub(crate) process_failures: Vec<String>,
}

impl FailureStats {
    fn from_errors(errors: &[OutcomeError]) -> Self {
        let mut stats = Self::default();
        for error in errors {
            stats.add_failure(error);
        }
        stats
    }

    fn add_failure(&mut self, error: &OutcomeError) {
        match error.stage {
            Stage::RateLimit => self.rate_limited.push(error.source.clone()),
            Stage::Fetch => self.fetch_failures.push(error.source.clone()),
            Stage::Process => self.process_failures.push(error.source.clone()),
        }
    }

    pub(crate) fn has_failures(&self) -> bool {
        self.total() > 0
    }

    pub(crate) fn total(&self) -> usize {
        self.rate_limited.len() + self.fetch_failures.len() + self.process_failures.len()
    }

    /// Non-empty groups as `(label, items)`, in pipeline stage order.
    pub(crate) fn groups(&self) -> Vec<(&'static str, &[String])> {
        [
            ("rate limited", self.rate_limited.as_slice()),
            ("fetch failure", self.fetch_failures.as_slice()),
            ("process failure", self.process_failures.as_slice()),
        ]
        .into_iter()
        .filter(|(_, items)| !items.is_empty())
        .collect()
    }

    fn format_summary(&self) -> String {
        let mut summary = String::from("Some items could not be processed:");
        for (label, items) in self.groups() {
            summary.push_str(&format!(
                "\n• {} {}: {}",
                items.len(),
                pluralize(label, items.len()),
                format_item_list(items, 5)
            ));
        }
        summary
    }
}

/// Join items with commas, eliding everything past `max_show`.
pub(crate) fn format_item_list(items: &[String], max_show: usize) -> String {
    if items.len() <= max_show {
        items.join(", ")
    } else {
        let shown = &items[..max_show];
        let remaining = items.len() - max_show;
        format!("{}, ... and {} more", shown.join(", "), remaining)
    }
}

/// `"fetch failure"` -> `"fetch failures"` when `count != 1`.
pub(crate) fn pluralize(label: &str, count: usize) -> String {
    match (count, label) {
        (1, _) | (_, "rate limited") => label.to_string(),
        _ => format!("{}s", label),
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(&args);

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    match run_aggregation(args).await {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Install the stderr log subscriber.
///
/// `CA_LOG` takes an `EnvFilter` directive; without it the level is `warn`,
/// raised to `info` by `--verbose` and `debug` by `--debug`.
fn init_logging(args: &Args) {
    let fallback = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_env("CA_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if args.urls.is_empty() && args.file.is_none() && std::env::var_os("CA_FILE").is_none() {
        return Err("You must specify URLs to fetch or provide a file with --file".to_string());
    }

    if args.json && args.csv {
        return Err("Cannot specify both --json and --csv output formats".to_string());
    }

    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err("--workers must be at least 1".to_string());
        }
        if workers > 100 {
            return Err("--workers cannot exceed 100".to_string());
        }
    }

    if args.rate == Some(0) {
        return Err("--rate must be at least 1".to_string());
    }

    if args.burst == Some(0) {
        return Err("--burst must be at least 1".to_string());
    }

    for (flag, value) in [
        ("--timeout", &args.timeout),
        ("--fetch-timeout", &args.fetch_timeout),
    ] {
        if let Some(value) = value {
            if parse_duration(value).is_none() {
                return Err(format!(
                    "Invalid {} '{}'. Use a duration like '500ms', '30s' or '2m'",
                    flag, value
                ));
            }
        }
    }

    Ok(())
}

/// Main aggregation logic. Returns the process exit status.
async fn run_aggregation(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let env_config = load_env_config();
    let settings = build_config(&args, &env_config)?;
    let items = get_items_to_fetch(&args, &env_config)?;
    let config = settings.pipeline.clone();

    info!(
        items = items.len(),
        workers = config.worker_count,
        rate = config.permits_per_second,
        burst = config.effective_burst(),
        "starting aggregation"
    );

    let fetcher = HttpFetcher::with_config(&config)?;
    let pipeline = Pipeline::with_config(
        Arc::new(fetcher),
        Arc::new(HtmlProcessor::new()),
        config.clone(),
    )?;

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(cancel_on_interrupt(cancel.clone()));

    let pretty = settings.format == OutputFormat::Pretty;
    if pretty {
        ui::print_header(items.len(), &config);
    }
    let spinner = if pretty && Term::stderr().is_term() {
        Some(ui::Spinner::start(format!(
            "Fetching {} item{}...",
            items.len(),
            if items.len() == 1 { "" } else { "s" }
        )))
    } else {
        None
    };

    let started = Instant::now();
    let outcome = pipeline
        .run_with_timeout(&cancel, &items, config.batch_timeout)
        .await;
    let elapsed = started.elapsed();

    if let Some(spinner) = spinner {
        spinner.stop().await;
    }
    interrupt.abort();
    pipeline.shutdown().await?;

    display_results(&outcome, &settings, &args, elapsed)?;

    if let Some(abort) = &outcome.aborted {
        eprintln!("Error: {}", abort);
        return Ok(1);
    }
    if args.strict && !outcome.errors.is_empty() {
        eprintln!(
            "Error: {} item{} failed (--strict)",
            outcome.errors.len(),
            if outcome.errors.len() == 1 { "" } else { "s" }
        );
        return Ok(1);
    }
    Ok(0)
}

/// Cancel the batch on the first Ctrl-C.
async fn cancel_on_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, cancelling batch");
        cancel.cancel();
    }
}

/// Build the run settings with proper precedence.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (CA_*)
/// 3. Explicit config file (--config or CA_CONFIG), or discovered files
/// 4. Built-in defaults
fn build_config(
    args: &Args,
    env_config: &EnvConfig,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let mut settings = RunSettings::default();
    let config_manager = ConfigManager::new();

    // Step 1: Determine config file path and load config files
    if let Some(explicit_config_path) = &args.config {
        debug!(path = %explicit_config_path, "using config file from --config");
        let file_config = config_manager
            .load_file(explicit_config_path)
            .map_err(|e| {
                format!(
                    "Failed to load config file '{}': {}",
                    explicit_config_path, e
                )
            })?;
        settings = merge_file_config(settings, file_config);
    } else if let Some(env_config_path) = &env_config.config {
        debug!(path = %env_config_path, "using config file from CA_CONFIG");
        let file_config = config_manager
            .load_file(env_config_path)
            .map_err(|e| format!("Failed to load config file '{}': {}", env_config_path, e))?;
        settings = merge_file_config(settings, file_config);
    } else {
        match config_manager.discover_and_load() {
            Ok(file_config) => settings = merge_file_config(settings, file_config),
            Err(e) => warn!(error = %e, "config discovery failed, using defaults"),
        }
    }

    // Step 2: Apply environment variables (CA_*)
    settings = apply_environment_config(settings, env_config);

    // Step 3: Apply CLI arguments (highest precedence)
    settings = apply_cli_args_to_config(settings, args)?;

    settings.pipeline.validate()?;
    Ok(settings)
}

/// Merge a validated FileConfig into the run settings
fn merge_file_config(mut settings: RunSettings, file_config: FileConfig) -> RunSettings {
    if let Some(defaults) = file_config.defaults {
        if let Some(workers) = defaults.workers {
            settings.pipeline.worker_count = workers;
        }
        if let Some(rate) = defaults.rate {
            settings.pipeline.permits_per_second = rate;
        }
        if let Some(burst) = defaults.burst {
            settings.pipeline.burst = Some(burst);
        }
        if let Some(timeout) = defaults.timeout.as_deref().and_then(parse_duration) {
            settings.pipeline.batch_timeout = timeout;
        }
        if let Some(timeout) = defaults.fetch_timeout.as_deref().and_then(parse_duration) {
            settings.pipeline.fetch_timeout = timeout;
        }
        if let Some(max_body_bytes) = defaults.max_body_bytes {
            settings.pipeline.max_body_bytes = max_body_bytes;
        }
        if let Some(user_agent) = defaults.user_agent {
            settings.pipeline.user_agent = user_agent;
        }
    }

    if let Some(output) = file_config.output {
        if let Some(format) = output.default_format.as_deref().and_then(OutputFormat::from_name) {
            settings.format = format;
        }
        if let Some(json_pretty) = output.json_pretty {
            settings.json_pretty = json_pretty;
        }
    }

    settings
}

/// Apply environment variable overrides
fn apply_environment_config(mut settings: RunSettings, env_config: &EnvConfig) -> RunSettings {
    if let Some(workers) = env_config.workers {
        settings.pipeline.worker_count = workers;
    }
    if let Some(rate) = env_config.rate {
        settings.pipeline.permits_per_second = rate;
    }
    if let Some(burst) = env_config.burst {
        settings.pipeline.burst = Some(burst);
    }
    if let Some(timeout) = env_config.timeout.as_deref().and_then(parse_duration) {
        settings.pipeline.batch_timeout = timeout;
    }
    if let Some(timeout) = env_config.fetch_timeout.as_deref().and_then(parse_duration) {
        settings.pipeline.fetch_timeout = timeout;
    }
    if let Some(user_agent) = &env_config.user_agent {
        settings.pipeline.user_agent = user_agent.clone();
    }

    if env_config.has_output_format_conflict() {
        warn!("both CA_JSON and CA_CSV are set, ignoring both");
    } else if env_config.json == Some(true) {
        settings.format = OutputFormat::Json;
    } else if env_config.csv == Some(true) {
        settings.format = OutputFormat::Csv;
    } else if env_config.pretty == Some(true) {
        settings.format = OutputFormat::Pretty;
    }

    settings
}

/// Apply CLI argument overrides (highest precedence)
fn apply_cli_args_to_config(
    mut settings: RunSettings,
    args: &Args,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    if let Some(workers) = args.workers {
        settings.pipeline.worker_count = workers;
    }
    if let Some(rate) = args.rate {
        settings.pipeline.permits_per_second = rate;
    }
    if let Some(burst) = args.burst {
        settings.pipeline.burst = Some(burst);
    }
    if let Some(timeout) = &args.timeout {
        settings.pipeline.batch_timeout = parse_duration_arg("--timeout", timeout)?;
    }
    if let Some(timeout) = &args.fetch_timeout {
        settings.pipeline.fetch_timeout = parse_duration_arg("--fetch-timeout", timeout)?;
    }

    if args.json {
        settings.format = OutputFormat::Json;
    } else if args.csv {
        settings.format = OutputFormat::Csv;
    } else if args.pretty {
        settings.format = OutputFormat::Pretty;
    }

    Ok(settings)
}

fn parse_duration_arg(flag: &str, value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    parse_duration(value).ok_or_else(|| {
        format!(
            "Invalid {} '{}'. Use a duration like '500ms', '30s' or '2m'",
            flag, value
        )
        .into()
    })
}

/// Collect the work items from the file and the positional URLs.
///
/// `CA_FILE` is only consulted when neither `--file` nor URLs were given.
fn get_items_to_fetch(
    args: &Args,
    env_config: &EnvConfig,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut inputs = args.urls.clone();

    let file = match (&args.file, inputs.is_empty()) {
        (Some(path), _) => Some(path),
        (None, true) => env_config.file.as_ref(),
        (None, false) => None,
    };
    if let Some(path) = file {
        let from_file = read_items_from_file(path)?;
        debug!(path = %path, count = from_file.len(), "loaded items from file");
        inputs.extend(from_file);
    }

    let items = normalize_items(&inputs);
    if items.is_empty() {
        return Err("No URLs to fetch".into());
    }
    Ok(items)
}

/// JSON document written by `--json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    results: &'a [ProcessedResult],
    errors: &'a [OutcomeError],
}

/// Display results in the selected output format
fn display_results(
    outcome: &BatchOutcome,
    settings: &RunSettings,
    args: &Args,
    elapsed: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    match settings.format {
        OutputFormat::Json => display_json_results(outcome, settings.json_pretty)?,
        OutputFormat::Csv => display_csv_results(outcome),
        OutputFormat::Text => display_text_results(outcome),
        OutputFormat::Pretty => {
            ui::print_grouped_results(outcome, args.debug);
            ui::print_summary(
                outcome.completed(),
                outcome.results.len(),
                outcome.errors.len(),
                elapsed,
            );
            ui::print_failure_summary(&FailureStats::from_errors(&outcome.errors));
        }
    }
    Ok(())
}

/// Display results in JSON format
fn display_json_results(
    outcome: &BatchOutcome,
    pretty: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let report = JsonReport {
        results: &outcome.results,
        errors: &outcome.errors,
    };
    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{}", json);
    Ok(())
}

const CSV_HEADER: &str = "source,status,stage,title,description,keywords,timestamp,error";

/// Display results in CSV format, successes first
fn display_csv_results(outcome: &BatchOutcome) {
    println!("{}", CSV_HEADER);
    for result in &outcome.results {
        println!("{}", csv_success_row(result));
    }
    for error in &outcome.errors {
        println!("{}", csv_failure_row(error));
    }
}

fn csv_success_row(result: &ProcessedResult) -> String {
    [
        csv_field(&result.source),
        "ok".to_string(),
        String::new(),
        csv_field(&result.title),
        csv_field(&result.description),
        csv_field(&result.keywords.join(";")),
        result.timestamp.to_rfc3339(),
        String::new(),
    ]
    .join(",")
}

fn csv_failure_row(error: &OutcomeError) -> String {
    [
        csv_field(&error.source),
        "failed".to_string(),
        csv_field(&error.stage.to_string()),
        String::new(),
        String::new(),
        String::new(),
        String::new(),
        csv_field(&error.cause.to_string()),
    ]
    .join(",")
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Display results in plain text format
fn display_text_results(outcome: &BatchOutcome) {
    for result in &outcome.results {
        let title = if result.title.is_empty() {
            "(untitled)"
        } else {
            result.title.as_str()
        };
        println!("{} - {}", result.source, title);
        if !result.description.is_empty() {
            println!("    {}", result.description);
        }
        if !result.keywords.is_empty() {
            println!("    keywords: {}", result.keywords.join(", "));
        }
    }

    for error in &outcome.errors {
        println!(
            "{} - FAILED ({}) {}",
            error.source,
            error.stage,
            ui::brief_cause(&error.cause)
        );
    }

    if outcome.completed() > 1 {
        println!();
        println!(
            "Summary: {} fetched, {} failed",
            outcome.results.len(),
            outcome.errors.len()
        );
    }

    let stats = FailureStats::from_errors(&outcome.errors);
    if stats.has_failures() {
        println!();
        println!("{}", stats.format_summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use content_aggregator_lib::{AggregatorError, DefaultsConfig, OutputConfig};

    // Helper function with all required fields
    fn create_test_args() -> Args {
        Args {
            urls: vec!["https://example.org".to_string()],
            file: None,
            workers: None,
            rate: None,
            burst: None,
            timeout: None,
            fetch_timeout: None,
            json: false,
            csv: false,
            pretty: false,
            strict: false,
            config: None,
            debug: false,
            verbose: false,
        }
    }

    fn failure(source: &str, stage: Stage) -> OutcomeError {
        OutcomeError::new(source, stage, AggregatorError::fetch(source, "boom"))
    }

    #[test]
    fn test_validate_args_accepts_defaults() {
        assert!(validate_args(&create_test_args()).is_ok());
    }

    #[test]
    fn test_validate_args_output_conflict() {
        let mut args = create_test_args();
        args.json = true;
        args.csv = true;
        let err = validate_args(&args).unwrap_err();
        assert!(err.contains("--json and --csv"));
    }

    #[test]
    fn test_validate_args_rejects_zero_values() {
        let mut args = create_test_args();
        args.workers = Some(0);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.workers = Some(101);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.rate = Some(0);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.burst = Some(0);
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_rejects_bad_durations() {
        let mut args = create_test_args();
        args.timeout = Some("soon".to_string());
        assert!(validate_args(&args).unwrap_err().contains("--timeout"));

        let mut args = create_test_args();
        args.fetch_timeout = Some("0s".to_string());
        assert!(validate_args(&args).unwrap_err().contains("--fetch-timeout"));
    }

    #[test]
    fn test_precedence_cli_over_env_over_file() {
        let file_config = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(4),
                rate: Some(5),
                burst: Some(7),
                timeout: Some("1m".to_string()),
                fetch_timeout: None,
                max_body_bytes: Some(1024),
                user_agent: Some("FileAgent/1.0".to_string()),
            }),
            output: Some(OutputConfig {
                default_format: Some("csv".to_string()),
                json_pretty: Some(false),
            }),
        };
        let env_config = EnvConfig {
            rate: Some(9),
            json: Some(true),
            ..Default::default()
        };
        let mut args = create_test_args();
        args.workers = Some(12);
        args.fetch_timeout = Some("250ms".to_string());

        let settings = merge_file_config(RunSettings::default(), file_config);
        assert_eq!(settings.format, OutputFormat::Csv);
        let settings = apply_environment_config(settings, &env_config);
        let settings = apply_cli_args_to_config(settings, &args).unwrap();

        assert_eq!(settings.pipeline.worker_count, 12);
        assert_eq!(settings.pipeline.permits_per_second, 9);
        assert_eq!(settings.pipeline.burst, Some(7));
        assert_eq!(settings.pipeline.batch_timeout, Duration::from_secs(60));
        assert_eq!(settings.pipeline.fetch_timeout, Duration::from_millis(250));
        assert_eq!(settings.pipeline.max_body_bytes, 1024);
        assert_eq!(settings.pipeline.user_agent, "FileAgent/1.0");
        assert_eq!(settings.format, OutputFormat::Json);
        assert!(!settings.json_pretty);
    }

    #[test]
    fn test_env_format_conflict_is_ignored() {
        let env_config = EnvConfig {
            json: Some(true),
            csv: Some(true),
            ..Default::default()
        };
        let settings = apply_environment_config(RunSettings::default(), &env_config);
        assert_eq!(settings.format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_format_flags() {
        let mut args = create_test_args();
        args.pretty = true;
        let settings = apply_cli_args_to_config(RunSettings::default(), &args).unwrap();
        assert_eq!(settings.format, OutputFormat::Pretty);

        args.json = true;
        let settings = apply_cli_args_to_config(RunSettings::default(), &args).unwrap();
        assert_eq!(settings.format, OutputFormat::Json);
    }

    #[test]
    fn test_items_from_urls_are_normalized() {
        let mut args = create_test_args();
        args.urls = vec!["example.org".to_string(), "http://a.example".to_string()];
        let items = get_items_to_fetch(&args, &EnvConfig::default()).unwrap();
        assert_eq!(items, vec!["https://example.org", "http://a.example"]);
    }

    #[test]
    fn test_failure_stats_group_by_stage() {
        let errors = vec![
            failure("https://a.example", Stage::Fetch),
            failure("https://b.example", Stage::Process),
            failure("https://c.example", Stage::Fetch),
            failure("https://d.example", Stage::RateLimit),
        ];
        let stats = FailureStats::from_errors(&errors);

        assert_eq!(stats.total(), 4);
        assert_eq!(
            stats.fetch_failures,
            vec!["https://a.example", "https://c.example"]
        );
        assert_eq!(stats.process_failures, vec!["https://b.example"]);
        assert_eq!(stats.rate_limited, vec!["https://d.example"]);

        let summary = stats.format_summary();
        assert!(summary.contains("• 1 rate limited: https://d.example"));
        assert!(summary.contains("• 2 fetch failures: https://a.example, https://c.example"));
        assert!(summary.contains("• 1 process failure: https://b.example"));
    }

    #[test]
    fn test_format_item_list_truncates() {
        let items: Vec<String> = (1..=7).map(|i| format!("item{}", i)).collect();
        assert_eq!(
            format_item_list(&items, 5),
            "item1, item2, item3, item4, item5, ... and 2 more"
        );
        assert_eq!(format_item_list(&items[..2], 5), "item1, item2");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a, b"), "\"a, b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_failure_row() {
        let row = csv_failure_row(&failure("https://a.example", Stage::Fetch));
        assert!(row.starts_with("https://a.example,failed,fetch,,,,,"));
        assert_eq!(row.split(',').count(), CSV_HEADER.split(',').count());
    }

    #[test]
    fn test_json_report_shape() {
        let report = JsonReport {
            results: &[],
            errors: &[failure("https://a.example", Stage::Fetch)],
        };
        let value = tokio_test::assert_ok!(serde_json::to_value(&report));
        assert!(value["results"].as_array().unwrap().is_empty());
        assert_eq!(value["errors"][0]["source"], "https://a.example");
        assert_eq!(value["errors"][0]["stage"], "fetch");
    }
}
