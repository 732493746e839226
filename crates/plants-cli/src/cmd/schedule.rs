use crate::output::print_json;
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use clap::Args;
use plants_core::care::{Schedule, ScheduleInput};
use plants_core::species::catalogue;
use plants_core::types::{Hemisphere, LightLevel, PotSize};

#[derive(Args)]
pub struct ScheduleArgs {
    /// Species id (see `plants species`)
    #[arg(long)]
    species: String,
    /// Pot size: small | medium | large
    #[arg(long, default_value = "medium")]
    pot: PotSize,
    /// Light level: low | medium | bright (default: the species' preference)
    #[arg(long)]
    light: Option<LightLevel>,
    /// Moisture bias from feedback, in days
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    bias: i32,
    /// Date of the last watering, YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,
    /// north | south
    #[arg(long, default_value = "north")]
    hemisphere: Hemisphere,
}

pub fn run(args: ScheduleArgs, json: bool) -> anyhow::Result<()> {
    let species = catalogue()
        .into_iter()
        .find(|s| s.id == args.species)
        .ok_or_else(|| anyhow!("unknown species '{}'; see `plants species`", args.species))?;
    let today = Utc::now().date_naive();
    let watered = args.date.unwrap_or(today);
    let schedule = Schedule::compute(
        &ScheduleInput {
            base_interval_days: species.base_interval_days,
            pot: args.pot,
            light: args.light.unwrap_or(species.light),
            moisture_bias: args.bias,
            hemisphere: args.hemisphere,
            last_watered: Some(watered),
            claimed_on: watered,
        },
        today,
    );

    if json {
        return print_json(&schedule);
    }
    println!("{} watered {watered}", species.common_name);
    println!("  season:    {}", schedule.season);
    println!("  interval:  every {} days", schedule.interval_days);
    println!("  bias:      {:+}", schedule.moisture_bias);
    println!("  next due:  {} ({})", schedule.next_due, schedule.label);
    Ok(())
}
