use crate::output::{or_dash, print_json, print_table};
use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use plants_core::claim::{claim_url, qr_svg, qr_unicode};
use plants_core::config::Config;
use plants_core::io;
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::open_store;

#[derive(Subcommand)]
pub enum TokensSubcommand {
    /// Mint a batch of single-use claim tokens
    Mint {
        /// Number of tokens to mint
        #[arg(long)]
        count: u32,
        /// Species printed on the sticker (see `plants species`)
        #[arg(long)]
        species: Option<String>,
        /// Free-form batch label, e.g. a market or print run
        #[arg(long)]
        batch: Option<String>,
        /// Write one `<token>.svg` QR sticker per token into this directory
        #[arg(long, value_name = "DIR")]
        svg_dir: Option<PathBuf>,
        /// Print each QR code to the terminal
        #[arg(long)]
        qr: bool,
    },
}

#[derive(Serialize)]
struct Minted {
    token: String,
    species_id: Option<String>,
    batch: Option<String>,
    claim_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    svg: Option<PathBuf>,
}

pub fn run(root: &Path, subcmd: TokensSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        TokensSubcommand::Mint {
            count,
            species,
            batch,
            svg_dir,
            qr,
        } => mint(
            root,
            count,
            species.as_deref(),
            batch.as_deref(),
            svg_dir.as_deref(),
            qr,
            json,
        ),
    }
}

fn mint(
    root: &Path,
    count: u32,
    species: Option<&str>,
    batch: Option<&str>,
    svg_dir: Option<&Path>,
    qr: bool,
    json: bool,
) -> anyhow::Result<()> {
    let mut store = open_store(root)?;
    let config = Config::load(root)?;
    let tokens = store.mint_claim_tokens(count, species, batch, Utc::now())?;

    if let Some(dir) = svg_dir {
        io::ensure_dir(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut minted = Vec::with_capacity(tokens.len());
    for t in tokens {
        let url = claim_url(&config.app.base_url, &t.token);
        let svg = match svg_dir {
            Some(dir) => {
                let path = dir.join(format!("{}.svg", t.token));
                io::atomic_write(&path, qr_svg(&url)?.as_bytes())
                    .with_context(|| format!("failed to write {}", path.display()))?;
                Some(path)
            }
            None => None,
        };
        minted.push(Minted {
            token: t.token,
            species_id: t.species_id,
            batch: t.batch,
            claim_url: url,
            svg,
        });
    }

    if json {
        return print_json(&minted);
    }

    if qr {
        for m in &minted {
            println!("{}\n{}\n", m.claim_url, qr_unicode(&m.claim_url)?);
        }
    }
    let rows = minted
        .iter()
        .map(|m| {
            vec![
                m.token.clone(),
                or_dash(m.species_id.as_deref()),
                or_dash(m.batch.as_deref()),
                m.claim_url.clone(),
            ]
        })
        .collect();
    print_table(&["TOKEN", "SPECIES", "BATCH", "CLAIM URL"], rows);
    if let Some(dir) = svg_dir {
        println!("\nWrote {} stickers to {}", minted.len(), dir.display());
    }
    Ok(())
}
