//! Pretty-mode display logic for the content-aggregator CLI.
//!
//! This module handles all `--pretty` output: the spinner, the run header,
//! results grouped into succeeded and failed sections, and the summaries.
//! Uses only the `console` crate.

use console::{pad_str, style, truncate_str, Alignment, Term};
use content_aggregator_lib::{AggregatorError, BatchOutcome, OutcomeError, PipelineConfig, ProcessedResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::{format_item_list, pluralize, FailureStats};

const SOURCE_WIDTH: usize = 40;

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a new spinner with the given message (e.g. "Fetching 8 items...").
    pub fn start(message: String) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let _ = term.clear_line();
                let _ = term.write_str(&format!("{} {}", style(frame).cyan(), message));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Self {
            running,
            handle: Some(handle),
        }
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a pretty run.
pub fn print_header(item_count: usize, config: &PipelineConfig) {
    println!(
        "{} {} {}",
        style("content-aggregator").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "· Fetching {} item{}",
            item_count,
            if item_count == 1 { "" } else { "s" }
        ))
        .dim(),
    );

    let meta_parts = [
        format!("Workers: {}", config.worker_count),
        format!("Rate: {}/s", config.permits_per_second),
        format!("Burst: {}", config.effective_burst()),
        format!("Timeout: {:?}", config.batch_timeout),
    ];
    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Grouped batch output ─────────────────────────────────────────────────────

/// Print results grouped by status: Fetched, then Failed.
/// Empty sections are omitted entirely.
pub fn print_grouped_results(outcome: &BatchOutcome, debug: bool) {
    if !outcome.results.is_empty() {
        println!(
            "  {} {}",
            style(format!("── Fetched ({}) ", outcome.results.len()))
                .green()
                .bold(),
            style("─".repeat(42)).green().dim(),
        );
        for result in &outcome.results {
            print_success_line(result, debug);
        }
        println!();
    }

    if !outcome.errors.is_empty() {
        println!(
            "  {} {}",
            style(format!("── Failed ({}) ", outcome.errors.len()))
                .red()
                .bold(),
            style("─".repeat(43)).red().dim(),
        );
        for error in &outcome.errors {
            print_failure_line(error, debug);
        }
        println!();
    }
}

/// Print a single line inside the Fetched section.
fn print_success_line(result: &ProcessedResult, debug: bool) {
    let padded = pad_str(&result.source, SOURCE_WIDTH, Alignment::Left, Some(".."));
    let title = if result.title.is_empty() {
        style("(untitled)".to_string()).dim()
    } else {
        style(truncate_str(&result.title, 50, "…").to_string()).white()
    };
    println!("    {}  {}", style(&padded).white(), title);

    if debug {
        if !result.description.is_empty() {
            println!(
                "      {} {}",
                style("├─").dim(),
                style(truncate_str(&result.description, 70, "…")).dim(),
            );
        }
        if !result.keywords.is_empty() {
            println!(
                "      {} keywords: {}",
                style("├─").dim(),
                format_keywords(&result.keywords, 6),
            );
        }
        println!(
            "      {} processed at {}",
            style("└─").dim(),
            result.timestamp.format("%H:%M:%S%.3f"),
        );
    }
}

/// Print a single line inside the Failed section.
fn print_failure_line(error: &OutcomeError, debug: bool) {
    let padded = pad_str(&error.source, SOURCE_WIDTH, Alignment::Left, Some(".."));
    println!(
        "    {}  {}  {}",
        style(&padded).white(),
        style(error.stage.to_string()).yellow(),
        style(brief_cause(&error.cause)).dim(),
    );

    if debug {
        println!("      {} {}", style("└─").dim(), error.cause);
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(total: usize, fetched: usize, failed: usize, duration: Duration) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} item{} in {:.1}s  {}  {}  {}  {}",
        style(total).bold(),
        if total == 1 { "" } else { "s" },
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} fetched", fetched)).green(),
        style("|").dim(),
        style(format!("{} failed", failed)).red(),
    );
}

// ── Failure summary ──────────────────────────────────────────────────────────

/// Print failed items grouped by stage using colors.
pub fn print_failure_summary(stats: &FailureStats) {
    if !stats.has_failures() {
        return;
    }

    println!();
    println!(
        "  {}",
        style(format!(
            "{} item{} could not be processed:",
            stats.total(),
            if stats.total() == 1 { "" } else { "s" }
        ))
        .yellow()
    );

    for (label, items) in stats.groups() {
        println!(
            "  {} {} {}: {}",
            style("•").dim(),
            items.len(),
            pluralize(label, items.len()),
            format_item_list(items, 5),
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// A short parenthesized reason for a failure, for single-line display.
pub fn brief_cause(cause: &AggregatorError) -> String {
    match cause {
        AggregatorError::FetchFailed {
            status_code: Some(code),
            ..
        } => format!("(HTTP {})", code),
        AggregatorError::FetchFailed { message, .. } => format!("({})", message),
        AggregatorError::ProcessFailed { message } => format!("({})", message),
        AggregatorError::NetworkError { .. } => "(network error)".to_string(),
        AggregatorError::Timeout { .. } => "(timeout)".to_string(),
        AggregatorError::Cancelled { .. } => "(cancelled)".to_string(),
        AggregatorError::RateLimitExceeded { .. } => "(rate limited)".to_string(),
        AggregatorError::PipelineShutdown => "(shut down)".to_string(),
        _ => "(error)".to_string(),
    }
}

/// Keywords joined with commas, eliding everything past `max_show`.
pub fn format_keywords(keywords: &[String], max_show: usize) -> String {
    if keywords.len() <= max_show {
        keywords.join(", ")
    } else {
        format!(
            "{}, +{}",
            keywords[..max_show].join(", "),
            keywords.len() - max_show
        )
    }
}
