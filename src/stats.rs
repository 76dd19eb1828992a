//! Per-batch and per-run statistics.

use std::time::{Duration, Instant};

/// Result of downloading one file.
#[derive(Debug, Clone)]
pub struct FileStats {
    /// Bytes written.
    pub size: u64,
    /// Time from request to rename.
    pub elapsed: Duration,
}

/// Why a batch entry did not produce a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// No destination directory was planned.
    Unplanned,
    /// The run was cancelled before the task started.
    Cancelled,
    /// The request or write failed.
    Failed,
}

/// Statistics for one category batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Category name.
    pub category: String,
    /// Batch size (every catalog entry).
    pub total: usize,
    /// Files written successfully.
    pub downloaded: usize,
    /// Files whose download failed.
    pub failed: usize,
    /// Entries without a destination.
    pub unplanned: usize,
    /// Entries never started because the run was cancelled.
    pub cancelled: usize,
    /// Bytes written across all downloaded files.
    pub total_bytes: u64,
    /// Wall time of the batch.
    pub elapsed: Duration,
}

impl BatchStats {
    /// Returns the average throughput in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Accumulates [`BatchStats`] while a batch runs.
pub struct BatchStatsBuilder {
    stats: BatchStats,
    start_time: Instant,
}

impl BatchStatsBuilder {
    /// Starts timing a batch of `total` entries.
    #[must_use]
    pub fn new(category: impl Into<String>, total: usize) -> Self {
        Self {
            stats: BatchStats {
                category: category.into(),
                total,
                ..BatchStats::default()
            },
            start_time: Instant::now(),
        }
    }

    /// Records a completed file.
    pub const fn add_download(&mut self, file_stats: &FileStats) {
        self.stats.downloaded += 1;
        self.stats.total_bytes += file_stats.size;
    }

    /// Records an entry that produced no file.
    pub const fn add_skip(&mut self, skip: Skip) {
        match skip {
            Skip::Unplanned => self.stats.unplanned += 1,
            Skip::Cancelled => self.stats.cancelled += 1,
            Skip::Failed => self.stats.failed += 1,
        }
    }

    /// Builds the final statistics.
    #[must_use]
    pub fn build(mut self) -> BatchStats {
        self.stats.elapsed = self.start_time.elapsed();
        self.stats
    }
}

/// Outcome of one category within a run.
#[derive(Debug)]
pub enum CategoryOutcome {
    /// The batch ran (possibly with per-file failures).
    Completed(BatchStats),
    /// The category was skipped after a fatal error.
    Aborted {
        /// Category name.
        category: String,
        /// Error description.
        reason: String,
    },
}

/// Outcome of a whole run, one entry per category in processing order.
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Per-category outcomes.
    pub categories: Vec<CategoryOutcome>,
}

impl RunSummary {
    /// Total files downloaded across categories.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.batches().map(|b| b.downloaded).sum()
    }

    /// Iterates the batches that ran.
    pub fn batches(&self) -> impl Iterator<Item = &BatchStats> {
        self.categories.iter().filter_map(|c| match c {
            CategoryOutcome::Completed(stats) => Some(stats),
            CategoryOutcome::Aborted { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_stats_average_speed_zero_elapsed() {
        let stats = BatchStats {
            total_bytes: 1000,
            ..BatchStats::default()
        };
        assert_eq!(stats.average_speed(), 0);
    }

    #[test]
    fn batch_stats_average_speed() {
        let stats = BatchStats {
            total_bytes: 1000,
            elapsed: Duration::from_secs(2),
            ..BatchStats::default()
        };
        assert_eq!(stats.average_speed(), 500);
    }

    #[test]
    fn builder_counts_each_outcome() {
        let mut builder = BatchStatsBuilder::new("photos", 5);
        builder.add_download(&FileStats {
            size: 300,
            elapsed: Duration::from_millis(5),
        });
        builder.add_download(&FileStats {
            size: 200,
            elapsed: Duration::from_millis(5),
        });
        builder.add_skip(Skip::Failed);
        builder.add_skip(Skip::Unplanned);
        builder.add_skip(Skip::Cancelled);

        let stats = builder.build();
        assert_eq!(stats.category, "photos");
        assert_eq!(stats.total, 5);
        assert_eq!(stats.downloaded, 2);
        assert_eq!(stats.total_bytes, 500);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.unplanned, 1);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn run_summary_skips_aborted_categories() {
        let mut done = BatchStatsBuilder::new("photos", 1);
        done.add_download(&FileStats {
            size: 1,
            elapsed: Duration::ZERO,
        });
        let summary = RunSummary {
            categories: vec![
                CategoryOutcome::Aborted {
                    category: "videos".to_string(),
                    reason: "login failed".to_string(),
                },
                CategoryOutcome::Completed(done.build()),
            ],
        };
        assert_eq!(summary.downloaded(), 1);
        assert_eq!(summary.batches().count(), 1);
    }
}
