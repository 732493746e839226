use crate::output::{print_json, print_table};
use plants_core::species::catalogue;

/// The built-in catalogue. Needs no data root.
pub fn run(json: bool) -> anyhow::Result<()> {
    let species = catalogue();
    if json {
        return print_json(&species);
    }
    let rows = species
        .into_iter()
        .map(|s| {
            vec![
                s.id,
                s.common_name,
                s.scientific_name,
                format!("{}d", s.base_interval_days),
                s.light.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "SCIENTIFIC NAME", "BASE", "LIGHT"], rows);
    Ok(())
}
