//! Destination planning: one `YYYY-MM` bucket directory per upload month.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::catalog::Catalog;
use crate::fs::FileSystem;

/// Outcome of planning one catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanReport {
    /// Entries that now have a destination directory.
    pub planned: usize,
    /// Entries without an upload timestamp.
    pub undated: usize,
    /// Entries whose bucket directory could not be created.
    pub failed: usize,
}

/// Returns the UTC `YYYY-MM` bucket for an upload timestamp.
#[must_use]
pub fn bucket_for(uploaded_at: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(uploaded_at, 0).map(|dt| dt.format("%Y-%m").to_string())
}

/// Assigns each dated entry a `base/YYYY-MM` destination and creates the
/// directories.
///
/// Entries without a timestamp keep `download_path == None`. When a bucket
/// cannot be created its entries are left unplanned and the downloader will
/// skip them. Running this twice over the same catalog is harmless.
pub async fn plan_directories<F>(catalog: &mut Catalog, base: &Path, fs: &F) -> PlanReport
where
    F: FileSystem + ?Sized,
{
    let mut report = PlanReport::default();
    let mut buckets: HashMap<String, Option<PathBuf>> = HashMap::new();

    for entry in catalog.entries_mut() {
        let Some(bucket) = entry.uploaded_at.and_then(bucket_for) else {
            report.undated += 1;
            continue;
        };

        if !buckets.contains_key(&bucket) {
            let dir = base.join(&bucket);
            let created = match fs.create_dir_all(&dir).await {
                Ok(()) => Some(dir),
                Err(e) => {
                    log::error!("Failed to create {}: {e}", dir.display());
                    None
                }
            };
            buckets.insert(bucket.clone(), created);
        }

        match buckets.get(&bucket).cloned().flatten() {
            Some(dir) => {
                entry.download_path = Some(dir);
                report.planned += 1;
            }
            None => {
                entry.download_path = None;
                report.failed += 1;
            }
        }
    }

    log::info!(
        "Planned {} entries under {} ({} undated, {} failed)",
        report.planned,
        base.display(),
        report.undated,
        report.failed
    );
    report
}
