//! Terminal progress view and end-of-run summary.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::progress::ProgressSink;
use crate::stats::{CategoryOutcome, RunSummary};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Draws the progress view as a fixed block of plain text lines.
///
/// The first redraw of a batch sizes the block; every later redraw replaces
/// the text of the same lines in place.
pub struct TerminalSink {
    multi: MultiProgress,
    lines: Mutex<Vec<ProgressBar>>,
}

impl TerminalSink {
    /// Creates a sink that draws into `multi`.
    pub fn new(multi: &MultiProgress) -> Self {
        Self {
            multi: multi.clone(),
            lines: Mutex::new(Vec::new()),
        }
    }

    fn make_line(&self) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(ProgressStyle::with_template("{msg}").expect("progress template is valid"));
        bar
    }
}

impl ProgressSink for TerminalSink {
    fn redraw(&self, lines: &[String]) {
        let mut bars = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while bars.len() < lines.len() {
            let bar = self.make_line();
            bars.push(bar);
        }
        for (bar, line) in bars.iter().zip(lines) {
            bar.set_message(line.clone());
        }
    }
}

impl Drop for TerminalSink {
    fn drop(&mut self) {
        let bars = self.lines.get_mut().unwrap_or_else(PoisonError::into_inner);
        for bar in bars.drain(..) {
            bar.finish();
        }
    }
}

/// Formats a byte count with binary units.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats a duration as `12.3s`, `4m 05s` or `1h 02m 03s`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..60 => format!("{secs}.{}s", d.subsec_millis() / 100),
        60..3600 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60),
    }
}

/// Renders one summary row per category.
#[must_use]
pub fn summary_rows(summary: &RunSummary) -> Vec<String> {
    summary
        .categories
        .iter()
        .map(|outcome| match outcome {
            CategoryOutcome::Completed(stats) => format!(
                "  {:<8} {:>6}/{:<6} {:>6} failed {:>6} undated {:>6} cancelled  {} in {} ({}/s)",
                stats.category,
                stats.downloaded,
                stats.total,
                stats.failed,
                stats.unplanned,
                stats.cancelled,
                format_bytes(stats.total_bytes),
                format_duration(stats.elapsed),
                format_bytes(stats.average_speed()),
            ),
            CategoryOutcome::Aborted { category, reason } => {
                format!("  {category:<8} skipped: {reason}")
            }
        })
        .collect()
}

/// Prints the end-of-run summary table.
pub fn print_summary(summary: &RunSummary) {
    if summary.categories.is_empty() {
        println!("Nothing was processed.");
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Download Summary");
    println!("{SEPARATOR}");
    for row in summary_rows(summary) {
        println!("{row}");
    }
    println!("{SEPARATOR}");
    println!("  Files downloaded:  {}", summary.downloaded());
    println!(
        "  Total size:        {}",
        format_bytes(summary.batches().map(|b| b.total_bytes).sum())
    );
    println!("{SEPARATOR}");
}
