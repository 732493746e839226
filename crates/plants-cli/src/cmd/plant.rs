use crate::output::{or_dash, print_json, print_table};
use chrono::Utc;
use clap::Subcommand;
use plants_core::care::Schedule;
use plants_core::store::Plant;
use serde::Serialize;
use std::path::Path;

use super::open_store;

#[derive(Subcommand)]
pub enum PlantSubcommand {
    /// List a user's active plants with their next watering
    List {
        /// Identity-provider subject id of the owner
        #[arg(long)]
        user: String,
    },
}

#[derive(Serialize)]
struct PlantRow {
    #[serde(flatten)]
    plant: Plant,
    species_name: String,
    watering_count: u32,
    schedule: Schedule,
}

pub fn run(root: &Path, subcmd: PlantSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PlantSubcommand::List { user } => list(root, &user, json),
    }
}

fn list(root: &Path, user_id: &str, json: bool) -> anyhow::Result<()> {
    let store = open_store(root)?;
    let owner = store.get_user(user_id)?;
    let now = Utc::now();
    let rows: Vec<PlantRow> = store
        .list_plant_details(user_id)?
        .into_iter()
        .map(|d| {
            let schedule = d.schedule(&owner, now);
            PlantRow {
                species_name: d.species.common_name,
                watering_count: d.watering_count,
                plant: d.plant,
                schedule,
            }
        })
        .collect();

    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("{user_id} has no plants.");
        return Ok(());
    }
    let table = rows
        .into_iter()
        .map(|r| {
            let due = format!("{} ({})", r.schedule.next_due, r.schedule.label);
            vec![
                r.plant.id,
                r.plant.nickname,
                r.species_name,
                r.plant.personality.to_string(),
                format!("{}d", r.schedule.interval_days),
                due,
                or_dash(r.plant.last_reminded_on),
            ]
        })
        .collect();
    print_table(
        &["ID", "NICKNAME", "SPECIES", "VOICE", "EVERY", "NEXT WATER", "REMINDED FOR"],
        table,
    );
    Ok(())
}
