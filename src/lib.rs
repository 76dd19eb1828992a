//! pilvi-dl - bulk downloader for a personal cloud-storage media library.
//!
//! The library logs in to the service, pages through each media category's
//! catalog, sorts dated entries into `YYYY-MM` directories and downloads them
//! with a bounded pool of concurrent transfers while a shared progress view
//! tracks what each worker slot last finished.
//!
//! # Example
//!
//! ```no_run
//! use pilvi_dl::{Config, Credentials, NoProgress, ProgressSink, run};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let config = Config::load(None).unwrap_or_default();
//! let credentials = Credentials::new("me@example.com", "secret");
//! let sinks = |_: &pilvi_dl::Category| -> Box<dyn ProgressSink> { Box::new(NoProgress) };
//!
//! let summary = run(&config, &credentials, &sinks, &CancellationToken::new()).await;
//! println!("Downloaded {} files", summary.downloaded());
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod download;
pub mod error;
pub mod fs;
pub mod planner;
pub mod progress;
pub mod run;
pub mod session;
pub mod snapshot;
pub mod stats;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use catalog::{Catalog, CatalogPage, CatalogSource, FileEntry, HttpCatalog, aggregate};
pub use config::{Category, Config};
pub use download::Downloader;
pub use error::{Error, Result};
pub use fs::{FileSystem, TokioFileSystem};
pub use planner::{PlanReport, plan_directories};
pub use progress::{NoProgress, ProgressSink, ProgressState};
pub use run::{SinkFactory, run};
pub use session::{Bootstrapped, Credentials, Session, bootstrap};
pub use stats::{BatchStats, CategoryOutcome, RunSummary};
