//! Command-line front end for pilvi-dl.

mod progress;

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::Parser;
use indicatif::MultiProgress;
use tokio_util::sync::CancellationToken;

use crate::{Category, Config, Credentials, Error, NoProgress, ProgressSink, Result};

pub use progress::{TerminalSink, format_bytes, format_duration, print_summary};

/// Environment variable holding the account password.
pub const PASSWORD_ENV: &str = "PILVI_PASSWORD";

/// Downloads every photo, video and audio file from a cloud-storage account.
#[derive(Parser, Debug)]
#[command(name = "pilvi-dl", version, about)]
pub struct Args {
    /// Account user name (the password is read from `PILVI_PASSWORD`)
    #[arg(long, env = "PILVI_USERNAME")]
    pub username: String,

    /// Configuration file (defaults to the user config directory)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Number of concurrent downloads
    #[arg(long, short = 'j')]
    pub pool_size: Option<usize>,

    /// Only process this category (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Directory for the per-category catalog snapshots
    #[arg(long)]
    pub snapshot_dir: Option<PathBuf>,

    /// Log file (the terminal is used by the progress view)
    #[arg(long, default_value = "pilvi-dl.log")]
    pub log_file: PathBuf,

    /// Disable the progress view
    #[arg(long)]
    pub no_progress: bool,
}

impl Args {
    /// Applies command-line overrides on top of a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a category filter matches nothing.
    pub fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(pool_size) = self.pool_size {
            config = config.with_pool_size(pool_size);
        }
        if let Some(dir) = &self.snapshot_dir {
            config = config.with_snapshot_dir(dir);
        }
        if !self.categories.is_empty() {
            config = config.retain_categories(&self.categories);
            if config.categories.is_empty() {
                return Err(Error::Config(format!(
                    "no configured category matches {:?}",
                    self.categories
                )));
            }
        }
        Ok(config)
    }
}

/// Sends log records to `path`, honouring `RUST_LOG` with `info` as default.
fn init_logging(path: &Path) -> Result<()> {
    let file = File::create(path)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .try_init()
        .map_err(|e| Error::Config(format!("logger: {e}")))
}

fn credentials(args: &Args) -> Result<Credentials> {
    let password = std::env::var(PASSWORD_ENV)
        .map_err(|_| Error::Config(format!("{PASSWORD_ENV} is not set")))?;
    Ok(Credentials::new(args.username.clone(), password))
}

/// Cancels `cancel` on the first Ctrl-C.
fn cancel_on_ctrl_c(cancel: &CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing in-flight downloads");
            cancel.cancel();
        }
    });
}

fn category_header(category: &Category) -> String {
    format!("{} -> {}", category.name, category.path.display())
}

/// Prints a category header above the progress block.
fn announce(multi: &MultiProgress, category: &Category) {
    if let Err(e) = multi.println(category_header(category)) {
        log::debug!("Failed to print header for {}: {e}", category.name);
    }
}

/// Parses the command line and runs every configured category.
///
/// # Errors
///
/// Returns an error if logging, configuration or credentials cannot be set
/// up. Per-category failures are reported in the summary instead.
pub async fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let config = args.apply(Config::load(args.config.as_deref())?)?;
    let credentials = credentials(&args)?;
    log::info!(
        "Starting run for {} with {} categories, pool size {}",
        credentials.username,
        config.categories.len(),
        config.pool_size
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(&cancel);

    let multi = MultiProgress::new();
    let sinks = |category: &Category| -> Box<dyn ProgressSink> {
        if args.no_progress {
            Box::new(NoProgress)
        } else {
            announce(&multi, category);
            Box::new(TerminalSink::new(&multi))
        }
    };

    let summary = crate::run(&config, &credentials, &sinks, &cancel).await;
    print_summary(&summary);

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(argv: &[&str]) -> Args {
        Args::try_parse_from(
            std::iter::once("pilvi-dl")
                .chain(["--username", "me@example.com"])
                .chain(argv.iter().copied()),
        )
        .unwrap()
    }

    #[test]
    fn defaults() {
        let args = args(&[]);
        assert_eq!(args.username, "me@example.com");
        assert_eq!(args.log_file, PathBuf::from("pilvi-dl.log"));
        assert!(args.categories.is_empty());
        assert!(!args.no_progress);
    }

    #[test]
    fn overrides_apply_to_config() {
        let args = args(&[
            "-j",
            "4",
            "--category",
            "photos",
            "--category",
            "audio",
            "--snapshot-dir",
            "/tmp/snaps",
        ]);
        let config = args.apply(Config::new()).unwrap();

        assert_eq!(config.pool_size, 4);
        assert_eq!(config.snapshot_dir, PathBuf::from("/tmp/snaps"));
        let names: Vec<_> = config.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["photos", "audio"]);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let args = args(&["--category", "documents"]);
        assert!(matches!(args.apply(Config::new()), Err(Error::Config(_))));
    }

    #[test]
    fn category_header_names_destination() {
        let category = Category::new("photos", "./downloads/kuvat/");
        assert_eq!(category_header(&category), "photos -> ./downloads/kuvat/");

        let multi = MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden());
        announce(&multi, &category);
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        let config = args(&["--pool-size", "0"]).apply(Config::new()).unwrap();
        assert_eq!(config.pool_size, 1);
    }
}
