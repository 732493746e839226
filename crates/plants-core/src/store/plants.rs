use super::{parse_col, SqliteStore, User};
use crate::care::{Schedule, ScheduleInput};
use crate::dates::local_date;
use crate::error::{PlantsError, Result};
use crate::paths::validate_nickname;
use crate::species::Species;
use crate::types::{LightLevel, Personality, PotSize};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub(crate) const PLANT_COLUMNS: &str = "id, user_id, species_id, nickname, personality, pot_size, \
     light_level, moisture_bias, claimed_on, last_reminded_on, last_reminded_at, archived_at, \
     created_at, updated_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: String,
    pub user_id: String,
    pub species_id: String,
    pub nickname: String,
    pub personality: Personality,
    pub pot_size: PotSize,
    pub light_level: LightLevel,
    /// Days added to the computed interval; see `care::apply_feedback`.
    pub moisture_bias: i32,
    pub claimed_on: NaiveDate,
    /// Due date the last reminder was sent for.
    pub last_reminded_on: Option<NaiveDate>,
    pub last_reminded_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plant {
    pub fn is_active(&self) -> bool {
        self.archived_at.is_none()
    }
}

pub(crate) fn plant_from_row(row: &Row<'_>) -> rusqlite::Result<Plant> {
    Ok(Plant {
        id: row.get(0)?,
        user_id: row.get(1)?,
        species_id: row.get(2)?,
        nickname: row.get(3)?,
        personality: parse_col(row, 4)?,
        pot_size: parse_col(row, 5)?,
        light_level: parse_col(row, 6)?,
        moisture_bias: row.get(7)?,
        claimed_on: row.get(8)?,
        last_reminded_on: row.get(9)?,
        last_reminded_at: row.get(10)?,
        archived_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// A plant with the data needed to compute its schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlantDetail {
    pub plant: Plant,
    pub species: Species,
    pub last_watered: Option<DateTime<Utc>>,
    pub watering_count: u32,
}

impl PlantDetail {
    pub fn schedule(&self, owner: &User, now: DateTime<Utc>) -> Schedule {
        let offset = owner.utc_offset_minutes;
        let input = ScheduleInput {
            base_interval_days: self.species.base_interval_days,
            pot: self.plant.pot_size,
            light: self.plant.light_level,
            moisture_bias: self.plant.moisture_bias,
            hemisphere: owner.hemisphere,
            last_watered: self.last_watered.map(|t| local_date(t, offset)),
            claimed_on: self.plant.claimed_on,
        };
        Schedule::compute(&input, local_date(now, offset))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlantUpdate {
    pub nickname: Option<String>,
    pub personality: Option<Personality>,
    pub pot_size: Option<PotSize>,
    pub light_level: Option<LightLevel>,
    pub species_id: Option<String>,
}

impl SqliteStore {
    pub fn get_plant(&self, id: &str) -> Result<Plant> {
        self.conn
            .query_row(
                &format!("SELECT {PLANT_COLUMNS} FROM plants WHERE id = ?1"),
                params![id],
                plant_from_row,
            )
            .optional()?
            .ok_or_else(|| PlantsError::PlantNotFound(id.to_string()))
    }

    /// Fetch a plant only if `user_id` owns it; other users' plants are
    /// reported as not found.
    pub fn get_user_plant(&self, user_id: &str, id: &str) -> Result<Plant> {
        let plant = self.get_plant(id)?;
        if plant.user_id != user_id || !plant.is_active() {
            return Err(PlantsError::PlantNotFound(id.to_string()));
        }
        Ok(plant)
    }

    pub fn get_plant_detail(&self, id: &str) -> Result<PlantDetail> {
        let plant = self.get_plant(id)?;
        self.detail_for(plant)
    }

    fn detail_for(&self, plant: Plant) -> Result<PlantDetail> {
        let species = self.get_species(&plant.species_id)?;
        let (last_watered, watering_count): (Option<DateTime<Utc>>, u32) = self.conn.query_row(
            "SELECT MAX(watered_at), COUNT(*) FROM waterings WHERE plant_id = ?1",
            params![plant.id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(PlantDetail {
            plant,
            species,
            last_watered,
            watering_count,
        })
    }

    /// Active plants owned by `user_id`, oldest first.
    pub fn list_plants(&self, user_id: &str) -> Result<Vec<Plant>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLANT_COLUMNS} FROM plants
             WHERE user_id = ?1 AND archived_at IS NULL
             ORDER BY created_at, id"
        ))?;
        let rows = stmt.query_map(params![user_id], plant_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn list_plant_details(&self, user_id: &str) -> Result<Vec<PlantDetail>> {
        self.list_plants(user_id)?
            .into_iter()
            .map(|p| self.detail_for(p))
            .collect()
    }

    /// Every active plant, for the daily sweep.
    pub fn list_all_active_plants(&self) -> Result<Vec<Plant>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLANT_COLUMNS} FROM plants WHERE archived_at IS NULL ORDER BY user_id, created_at"
        ))?;
        let rows = stmt.query_map([], plant_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count_active_plants(&self, user_id: &str) -> Result<u32> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM plants WHERE user_id = ?1 AND archived_at IS NULL",
            params![user_id],
            |row| row.get(0),
        )?)
    }

    pub fn update_plant(
        &mut self,
        user_id: &str,
        id: &str,
        update: &PlantUpdate,
        now: DateTime<Utc>,
    ) -> Result<Plant> {
        let mut plant = self.get_user_plant(user_id, id)?;
        if let Some(name) = &update.nickname {
            plant.nickname = validate_nickname(name)?;
        }
        if let Some(p) = update.personality {
            plant.personality = p;
        }
        if let Some(pot) = update.pot_size {
            plant.pot_size = pot;
        }
        if let Some(light) = update.light_level {
            plant.light_level = light;
        }
        if let Some(species_id) = &update.species_id {
            plant.species_id = self.get_species(species_id)?.id;
        }
        self.conn.execute(
            "UPDATE plants SET nickname = ?2, personality = ?3, pot_size = ?4, light_level = ?5,
                               species_id = ?6, updated_at = ?7
             WHERE id = ?1",
            params![
                id,
                plant.nickname,
                plant.personality.as_str(),
                plant.pot_size.as_str(),
                plant.light_level.as_str(),
                plant.species_id,
                now
            ],
        )?;
        self.get_plant(id)
    }

    /// Soft-delete. History is kept; the plant stops counting toward the
    /// plan limit and stops receiving reminders.
    pub fn archive_plant(&mut self, user_id: &str, id: &str, now: DateTime<Utc>) -> Result<()> {
        self.get_user_plant(user_id, id)?;
        self.conn.execute(
            "UPDATE plants SET archived_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    }

    pub fn mark_reminded(&mut self, id: &str, due_on: NaiveDate, at: DateTime<Utc>) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE plants SET last_reminded_on = ?2, last_reminded_at = ?3 WHERE id = ?1",
            params![id, due_on, at],
        )?;
        if changed == 0 {
            return Err(PlantsError::PlantNotFound(id.to_string()));
        }
        Ok(())
    }
}
