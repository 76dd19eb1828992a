//! Whole-run orchestration across categories.

use tokio_util::sync::CancellationToken;

use crate::catalog::{HttpCatalog, aggregate};
use crate::config::{Category, Config};
use crate::download::Downloader;
use crate::error::Result;
use crate::fs::{FileSystem, TokioFileSystem};
use crate::planner::plan_directories;
use crate::progress::ProgressSink;
use crate::session::{Credentials, bootstrap};
use crate::snapshot;
use crate::stats::{BatchStats, CategoryOutcome, RunSummary};

/// Creates the progress sink used for one category batch.
pub type SinkFactory<'a> = dyn Fn(&Category) -> Box<dyn ProgressSink> + 'a;

/// Processes every configured category in order.
///
/// Each category gets a fresh login, a full catalog aggregation, a snapshot,
/// directory planning and a bounded concurrent download. A category whose
/// login or endpoint setup fails is recorded as aborted and the run moves on.
/// Once `cancel` fires the current batch drains and the remaining categories
/// are skipped.
pub async fn run(
    config: &Config,
    credentials: &Credentials,
    sinks: &SinkFactory<'_>,
    cancel: &CancellationToken,
) -> RunSummary {
    let fs = TokioFileSystem;
    let mut summary = RunSummary::default();

    for category in &config.categories {
        if let Err(e) = fs.create_dir_all(&category.path).await {
            log::error!("Failed to create {}: {e}", category.path.display());
        }
    }

    for category in &config.categories {
        if cancel.is_cancelled() {
            log::warn!("Cancelled before {}", category.name);
            break;
        }

        log::info!("Processing {}", category.name);
        let sink = sinks(category);
        let outcome = match run_category(config, credentials, category, sink.as_ref(), cancel)
            .await
        {
            Ok(stats) => {
                log::info!(
                    "{}: {}/{} downloaded, {} failed, {} unplanned, {} cancelled",
                    stats.category,
                    stats.downloaded,
                    stats.total,
                    stats.failed,
                    stats.unplanned,
                    stats.cancelled
                );
                CategoryOutcome::Completed(stats)
            }
            Err(e) => {
                log::error!("Skipping {}: {e}", category.name);
                CategoryOutcome::Aborted {
                    category: category.name.clone(),
                    reason: e.to_string(),
                }
            }
        };
        summary.categories.push(outcome);
    }

    summary
}

async fn run_category(
    config: &Config,
    credentials: &Credentials,
    category: &Category,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<BatchStats> {
    let boot = bootstrap(config, credentials).await?;
    let source = HttpCatalog::new(&boot.session, &boot.catalog_endpoint)?;

    let mut catalog = aggregate(&source, &credentials.username, &category.name, config).await;
    if let Err(e) = snapshot::write(&catalog, &config.snapshot_dir, &category.name) {
        log::error!("Failed to write {} snapshot: {e}", category.name);
    }

    plan_directories(&mut catalog, &category.path, &TokioFileSystem).await;

    let downloader = Downloader::new(boot.session, config.clone());
    let entries = catalog.entries();
    Ok(downloader
        .download_all(&category.name, &boot.access_token, &entries, sink, cancel)
        .await)
}
