//! On-disk snapshot of an aggregated catalog.

use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::error::Result;

/// Returns the snapshot path for a category.
#[must_use]
pub fn snapshot_path(dir: &Path, category: &str) -> PathBuf {
    dir.join(format!("{category}.json"))
}

/// Writes `catalog` as pretty-printed JSON to `<dir>/<category>.json`.
///
/// The file is written next to its destination and renamed into place, so
/// a reader never sees a half-written snapshot.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written.
pub fn write(catalog: &Catalog, dir: &Path, category: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = snapshot_path(dir, category);
    let tmp_path = path.with_extension("json.tmp");

    let json = serde_json::to_string_pretty(catalog)?;
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, &path)?;

    log::info!(
        "Wrote {} entries for {category} to {}",
        catalog.files.len(),
        path.display()
    );
    Ok(path)
}
