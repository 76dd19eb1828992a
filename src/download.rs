//! Concurrent bulk download of a planned catalog.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::{StreamExt, stream};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::catalog::FileEntry;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::progress::{ProgressReporter, ProgressSink, ProgressState};
use crate::session::Session;
use crate::stats::{BatchStats, BatchStatsBuilder, FileStats, Skip};

/// Returns the worker slot a task is attributed to in the progress view.
///
/// This is a display position only; it does not reflect which pool future
/// actually runs the task.
#[must_use]
pub const fn worker_slot(index: usize, pool_size: usize) -> usize {
    if pool_size == 0 { 0 } else { index % pool_size }
}

/// Reduces a server-supplied filename to its final path component.
///
/// # Errors
///
/// Returns [`Error::InvalidFilename`] if nothing usable remains.
pub fn safe_filename(name: &str) -> Result<&str> {
    name.rsplit(['/', '\\'])
        .next()
        .filter(|n| !n.is_empty() && *n != "." && *n != "..")
        .ok_or_else(|| Error::InvalidFilename(name.to_string()))
}

/// Returns the `.part` file path for a given final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

/// Downloads catalog entries over a shared session.
pub struct Downloader<F: FileSystem = TokioFileSystem> {
    session: Session,
    config: Config,
    fs: F,
}

impl Downloader<TokioFileSystem> {
    /// Creates a new downloader with the default file system.
    #[must_use]
    pub const fn new(session: Session, config: Config) -> Self {
        Self {
            session,
            config,
            fs: TokioFileSystem,
        }
    }
}

impl<F: FileSystem> Downloader<F> {
    /// Creates a new downloader with a custom file system implementation.
    #[must_use]
    pub const fn with_fs(session: Session, config: Config, fs: F) -> Self {
        Self {
            session,
            config,
            fs,
        }
    }

    /// Streams one file into `dir`.
    ///
    /// The body is written to `<dir>/<filename>.part` and renamed over
    /// `<dir>/<filename>` once complete. Any status other than 200 fails the
    /// file without touching the disk.
    ///
    /// # Errors
    ///
    /// Returns an error on a non-200 status, a transport error, or an I/O error.
    pub async fn download_file(
        &self,
        access_token: &str,
        entry: &FileEntry,
        dir: &Path,
    ) -> Result<FileStats> {
        let target = dir.join(safe_filename(&entry.filename)?);
        let url = self.session.file_url(access_token, &entry.file_id)?;
        let start = Instant::now();

        let response = self.session.http().get(url.clone()).send().await?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(Error::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let part = part_path(&target);
        let mut file = self.fs.create_file(&part).await?;

        let mut body = response.bytes_stream();
        let written = async {
            let mut written = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<u64, Error>(written)
        }
        .await;
        drop(file);

        let finished = match written {
            Ok(size) => self
                .fs
                .rename_file(&part, &target)
                .await
                .map(|()| size)
                .map_err(Error::from),
            Err(e) => Err(e),
        };

        match finished {
            Ok(size) => Ok(FileStats {
                size,
                elapsed: start.elapsed(),
            }),
            Err(e) => {
                if self.config.cleanup_on_error {
                    let _ = self.fs.remove_file(&part).await;
                }
                Err(e)
            }
        }
    }

    /// Downloads a batch with at most `pool_size` transfers in flight.
    ///
    /// Entry `i` is shown in worker slot `i % pool_size`. Only successful
    /// downloads update the progress view. Entries without a planned
    /// destination are skipped. Once `cancel` fires no further transfers
    /// start, in-flight ones finish, and the progress total is unchanged.
    pub async fn download_all(
        &self,
        label: &str,
        access_token: &str,
        entries: &[&FileEntry],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchStats {
        let pool_size = self.config.pool_size.max(1);
        let reporter = ProgressReporter::new(
            ProgressState::new(label, entries.len(), pool_size),
            sink,
        );
        reporter.draw();

        let mut builder = BatchStatsBuilder::new(label, entries.len());
        if entries.is_empty() {
            return builder.build();
        }

        let reporter = &reporter;
        let results: Vec<_> = stream::iter(entries.iter().enumerate())
            .map(|(index, entry)| async move {
                let Some(dir) = entry.download_path.as_deref() else {
                    log::warn!("Skipping {}: no destination directory", entry.filename);
                    return Err(Skip::Unplanned);
                };
                if cancel.is_cancelled() {
                    return Err(Skip::Cancelled);
                }

                match self.download_file(access_token, entry, dir).await {
                    Ok(stats) => {
                        reporter.record_completion(worker_slot(index, pool_size), &entry.filename);
                        log::info!(
                            "Downloaded {} to {} ({} bytes in {:?})",
                            entry.filename,
                            dir.display(),
                            stats.size,
                            stats.elapsed
                        );
                        Ok(stats)
                    }
                    Err(e) => {
                        log::error!("Failed to download {}: {e}", entry.filename);
                        Err(Skip::Failed)
                    }
                }
            })
            .buffer_unordered(pool_size)
            .collect()
            .await;

        for result in results {
            match result {
                Ok(file_stats) => builder.add_download(&file_stats),
                Err(skip) => builder.add_skip(skip),
            }
        }

        builder.build()
    }
}
