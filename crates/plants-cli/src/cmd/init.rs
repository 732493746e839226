use anyhow::Context;
use plants_core::{config::Config, io, jobs::JobDb, paths, store::SqliteStore};
use std::path::Path;

const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub fn run(root: &Path, base_url: Option<&str>) -> anyhow::Result<()> {
    println!("Initializing plants in: {}", root.display());

    let dir = paths::plants_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let config_path = paths::config_path(root);
    if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        if base_url.is_some() {
            println!("  note:    --base-url ignored; edit {} to change it", paths::CONFIG_FILE);
        }
    } else {
        let cfg = Config::new(base_url.unwrap_or(DEFAULT_BASE_URL));
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    // Opening runs migrations and seeds the species catalogue.
    let existed = paths::db_path(root).exists();
    let store = SqliteStore::open(&paths::db_path(root)).context("failed to open plants database")?;
    let species = store.list_species()?.len();
    println!(
        "  {}{}  ({species} species)",
        if existed { "exists:  " } else { "created: " },
        paths::DB_FILE
    );

    let existed = paths::jobs_path(root).exists();
    JobDb::open(&paths::jobs_path(root)).context("failed to open job queue")?;
    println!(
        "  {}{}",
        if existed { "exists:  " } else { "created: " },
        paths::JOBS_FILE
    );

    let cfg = Config::load(root)?;
    for w in cfg.validate() {
        println!("  warning: {}", w.message);
    }

    println!("\nNext: set PLANTS_SESSION_SECRET and PLANTS_ADMIN_TOKEN, then run `plants serve`.");
    Ok(())
}
