pub mod init;
pub mod jobs;
pub mod plant;
pub mod schedule;
pub mod serve;
pub mod species;
pub mod tokens;

use anyhow::Context;
use plants_core::{paths, store::SqliteStore};
use std::path::Path;

/// Open the plants database, failing with a pointer to `plants init` when the
/// data root has not been set up.
pub(crate) fn open_store(root: &Path) -> anyhow::Result<SqliteStore> {
    if !paths::config_path(root).exists() {
        anyhow::bail!("no .plants/ found under {}; run `plants init` first", root.display());
    }
    SqliteStore::open(&paths::db_path(root)).context("failed to open plants database")
}
