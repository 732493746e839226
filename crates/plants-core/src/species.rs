//! Built-in species catalogue.
//!
//! The catalogue is seeded into the `species` table on every migration so
//! new entries ship with a release; existing rows are left untouched.

use crate::types::LightLevel;
use serde::{Deserialize, Serialize};

/// Species used when a claim token carries no species and the owner picks none.
pub const UNKNOWN_SPECIES: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
    pub common_name: String,
    pub scientific_name: String,
    /// Days between waterings for a medium pot in medium light in spring.
    pub base_interval_days: u32,
    /// Light the species prefers; used as the default for new plants.
    pub light: LightLevel,
}

const SEEDS: &[(&str, &str, &str, u32, LightLevel)] = &[
    ("pothos", "Pothos", "Epipremnum aureum", 7, LightLevel::Medium),
    ("snake-plant", "Snake Plant", "Dracaena trifasciata", 14, LightLevel::Low),
    ("monstera", "Monstera", "Monstera deliciosa", 7, LightLevel::Medium),
    ("fiddle-leaf-fig", "Fiddle Leaf Fig", "Ficus lyrata", 7, LightLevel::Bright),
    ("peace-lily", "Peace Lily", "Spathiphyllum wallisii", 5, LightLevel::Low),
    ("zz-plant", "ZZ Plant", "Zamioculcas zamiifolia", 14, LightLevel::Low),
    ("spider-plant", "Spider Plant", "Chlorophytum comosum", 6, LightLevel::Medium),
    ("aloe-vera", "Aloe Vera", "Aloe barbadensis miller", 14, LightLevel::Bright),
    ("calathea", "Calathea", "Goeppertia orbifolia", 4, LightLevel::Medium),
    ("succulent", "Succulent", "Echeveria elegans", 12, LightLevel::Bright),
    ("boston-fern", "Boston Fern", "Nephrolepis exaltata", 3, LightLevel::Medium),
    ("rubber-plant", "Rubber Plant", "Ficus elastica", 8, LightLevel::Medium),
    (UNKNOWN_SPECIES, "Mystery Plant", "Plantae incertae", 7, LightLevel::Medium),
];

/// The full seed catalogue, in display order.
pub fn catalogue() -> Vec<Species> {
    SEEDS
        .iter()
        .map(|(id, common, scientific, days, light)| Species {
            id: id.to_string(),
            common_name: common.to_string(),
            scientific_name: scientific.to_string(),
            base_interval_days: *days,
            light: *light,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_valid() {
        let all = catalogue();
        let ids: HashSet<_> = all.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), all.len());
        for s in &all {
            crate::paths::validate_species_id(&s.id).unwrap();
            assert!(s.base_interval_days > 0, "{} has zero interval", s.id);
        }
    }

    #[test]
    fn unknown_species_is_seeded() {
        assert!(catalogue().iter().any(|s| s.id == UNKNOWN_SPECIES));
    }
}
