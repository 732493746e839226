use super::plants::{plant_from_row, PLANT_COLUMNS};
use super::{new_id, parse_col, Plant, SqliteStore};
use crate::claim::generate_token;
use crate::dates::local_date;
use crate::error::{PlantsError, Result};
use crate::paths::validate_nickname;
use crate::species::UNKNOWN_SPECIES;
use crate::types::{LightLevel, Personality, PotSize};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

pub const MAX_MINT_BATCH: u32 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimToken {
    pub token: String,
    pub species_id: Option<String>,
    pub batch: Option<String>,
    pub created_at: DateTime<Utc>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub redeemed_by: Option<String>,
    pub plant_id: Option<String>,
}

impl ClaimToken {
    pub fn is_redeemed(&self) -> bool {
        self.redeemed_at.is_some()
    }
}

/// Choices the owner makes while claiming. Anything left out falls back to
/// the sticker's species and the owner's defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RedeemOptions {
    pub nickname: Option<String>,
    pub species_id: Option<String>,
    pub personality: Option<Personality>,
    pub pot_size: Option<PotSize>,
    pub light_level: Option<LightLevel>,
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<ClaimToken> {
    Ok(ClaimToken {
        token: row.get(0)?,
        species_id: row.get(1)?,
        batch: row.get(2)?,
        created_at: row.get(3)?,
        redeemed_at: row.get(4)?,
        redeemed_by: row.get(5)?,
        plant_id: row.get(6)?,
    })
}

const TOKEN_COLUMNS: &str =
    "token, species_id, batch, created_at, redeemed_at, redeemed_by, plant_id";

impl SqliteStore {
    pub fn mint_claim_tokens(
        &mut self,
        count: u32,
        species_id: Option<&str>,
        batch: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimToken>> {
        if count == 0 || count > MAX_MINT_BATCH {
            return Err(PlantsError::invalid("token count", count.to_string()));
        }
        if let Some(id) = species_id {
            self.get_species(id)?;
        }
        let tx = self.conn.transaction()?;
        let mut minted = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let token = generate_token();
            tx.execute(
                "INSERT INTO claim_tokens(token, species_id, batch, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![token, species_id, batch, now],
            )?;
            minted.push(ClaimToken {
                token,
                species_id: species_id.map(str::to_string),
                batch: batch.map(str::to_string),
                created_at: now,
                redeemed_at: None,
                redeemed_by: None,
                plant_id: None,
            });
        }
        tx.commit()?;
        tracing::info!(count, batch = batch.unwrap_or("-"), "minted claim tokens");
        Ok(minted)
    }

    pub fn get_claim_token(&self, token: &str) -> Result<ClaimToken> {
        self.conn
            .query_row(
                &format!("SELECT {TOKEN_COLUMNS} FROM claim_tokens WHERE token = ?1"),
                params![token],
                token_from_row,
            )
            .optional()?
            .ok_or_else(|| PlantsError::ClaimTokenNotFound(token.to_string()))
    }

    /// Redeem a sticker: create the plant and burn the token in one
    /// transaction. `plan_limit` is `None` for unlimited plans.
    pub fn redeem_claim_token(
        &mut self,
        token: &str,
        user_id: &str,
        options: &RedeemOptions,
        plan_limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Plant> {
        let tx = self.conn.transaction()?;

        let claim = tx
            .query_row(
                &format!("SELECT {TOKEN_COLUMNS} FROM claim_tokens WHERE token = ?1"),
                params![token],
                token_from_row,
            )
            .optional()?
            .ok_or_else(|| PlantsError::ClaimTokenNotFound(token.to_string()))?;
        if claim.is_redeemed() {
            return Err(PlantsError::ClaimTokenRedeemed(token.to_string()));
        }

        let (default_personality, offset): (Personality, i32) = tx
            .query_row(
                "SELECT personality, utc_offset_minutes FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((parse_col(row, 0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| PlantsError::UserNotFound(user_id.to_string()))?;

        if let Some(limit) = plan_limit {
            let active: u32 = tx.query_row(
                "SELECT COUNT(*) FROM plants WHERE user_id = ?1 AND archived_at IS NULL",
                params![user_id],
                |row| row.get(0),
            )?;
            if active >= limit {
                return Err(PlantsError::PlanLimitReached { limit });
            }
        }

        let species_id = options
            .species_id
            .clone()
            .or_else(|| claim.species_id.clone())
            .unwrap_or_else(|| UNKNOWN_SPECIES.to_string());
        let (common_name, preferred_light): (String, LightLevel) = tx
            .query_row(
                "SELECT common_name, light FROM species WHERE id = ?1",
                params![species_id],
                |row| Ok((row.get(0)?, parse_col(row, 1)?)),
            )
            .optional()?
            .ok_or_else(|| PlantsError::SpeciesNotFound(species_id.clone()))?;

        let nickname = match &options.nickname {
            Some(n) => validate_nickname(n)?,
            None => common_name,
        };
        let plant_id = new_id();
        tx.execute(
            "INSERT INTO plants(id, user_id, species_id, nickname, personality, pot_size, light_level,
                                moisture_bias, claimed_on, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9, ?9)",
            params![
                plant_id,
                user_id,
                species_id,
                nickname,
                options.personality.unwrap_or(default_personality).as_str(),
                options.pot_size.unwrap_or_default().as_str(),
                options.light_level.unwrap_or(preferred_light).as_str(),
                local_date(now, offset),
                now
            ],
        )?;
        tx.execute(
            "UPDATE claim_tokens SET redeemed_at = ?2, redeemed_by = ?3, plant_id = ?4 WHERE token = ?1",
            params![token, now, user_id, plant_id],
        )?;
        let plant = tx.query_row(
            &format!("SELECT {PLANT_COLUMNS} FROM plants WHERE id = ?1"),
            params![plant_id],
            plant_from_row,
        )?;
        tx.commit()?;
        tracing::info!(plant_id = %plant.id, user_id, "claim token redeemed");
        Ok(plant)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn mint_validates_count_and_species() {
        let mut store = store_with_user("owner");
        assert!(store.mint_claim_tokens(0, None, None, now()).is_err());
        assert!(store
            .mint_claim_tokens(MAX_MINT_BATCH + 1, None, None, now())
            .is_err());
        assert!(matches!(
            store.mint_claim_tokens(1, Some("triffid"), None, now()),
            Err(PlantsError::SpeciesNotFound(_))
        ));
        let tokens = store
            .mint_claim_tokens(3, Some("monstera"), Some("spring-market"), now())
            .unwrap();
        assert_eq!(tokens.len(), 3);
        let fetched = store.get_claim_token(&tokens[1].token).unwrap();
        assert_eq!(fetched.species_id.as_deref(), Some("monstera"));
        assert_eq!(fetched.batch.as_deref(), Some("spring-market"));
        assert!(!fetched.is_redeemed());
    }

    #[test]
    fn redeem_uses_sticker_species_and_owner_defaults() {
        let mut store = store_with_user("owner");
        let tokens = store
            .mint_claim_tokens(1, Some("fiddle-leaf-fig"), None, now())
            .unwrap();
        let plant = store
            .redeem_claim_token(&tokens[0].token, "owner", &RedeemOptions::default(), None, now())
            .unwrap();
        assert_eq!(plant.species_id, "fiddle-leaf-fig");
        assert_eq!(plant.nickname, "Fiddle Leaf Fig");
        assert_eq!(plant.personality, Personality::Classic);
        assert_eq!(plant.light_level, LightLevel::Bright);
        assert_eq!(plant.pot_size, PotSize::Medium);
        assert_eq!(plant.claimed_on, now().date_naive());

        let token = store.get_claim_token(&tokens[0].token).unwrap();
        assert_eq!(token.redeemed_by.as_deref(), Some("owner"));
        assert_eq!(token.plant_id.as_deref(), Some(plant.id.as_str()));
    }

    #[test]
    fn redeem_options_override_defaults() {
        let mut store = store_with_user("owner");
        let tokens = store.mint_claim_tokens(1, None, None, now()).unwrap();
        let opts = RedeemOptions {
            nickname: Some("Spike".into()),
            species_id: Some("aloe-vera".into()),
            personality: Some(Personality::Zen),
            pot_size: Some(PotSize::Small),
            light_level: Some(LightLevel::Low),
        };
        let plant = store
            .redeem_claim_token(&tokens[0].token, "owner", &opts, None, now())
            .unwrap();
        assert_eq!(plant.nickname, "Spike");
        assert_eq!(plant.species_id, "aloe-vera");
        assert_eq!(plant.personality, Personality::Zen);
        assert_eq!(plant.pot_size, PotSize::Small);
        assert_eq!(plant.light_level, LightLevel::Low);
    }

    #[test]
    fn token_is_single_use() {
        let mut store = store_with_user("owner");
        add_user(&mut store, "other");
        let tokens = store.mint_claim_tokens(1, None, None, now()).unwrap();
        store
            .redeem_claim_token(&tokens[0].token, "owner", &RedeemOptions::default(), None, now())
            .unwrap();
        assert!(matches!(
            store.redeem_claim_token(&tokens[0].token, "other", &RedeemOptions::default(), None, now()),
            Err(PlantsError::ClaimTokenRedeemed(_))
        ));
        assert_eq!(store.count_active_plants("other").unwrap(), 0);
    }

    #[test]
    fn unknown_token_is_not_found() {
        let mut store = store_with_user("owner");
        assert!(matches!(
            store.redeem_claim_token("nope", "owner", &RedeemOptions::default(), None, now()),
            Err(PlantsError::ClaimTokenNotFound(_))
        ));
    }

    #[test]
    fn plan_limit_blocks_without_burning_token() {
        let mut store = store_with_user("owner");
        let tokens = store.mint_claim_tokens(2, None, None, now()).unwrap();
        store
            .redeem_claim_token(&tokens[0].token, "owner", &RedeemOptions::default(), Some(1), now())
            .unwrap();
        assert!(matches!(
            store.redeem_claim_token(&tokens[1].token, "owner", &RedeemOptions::default(), Some(1), now()),
            Err(PlantsError::PlanLimitReached { limit: 1 })
        ));
        assert!(!store.get_claim_token(&tokens[1].token).unwrap().is_redeemed());
    }

    #[test]
    fn invalid_nickname_rolls_back() {
        let mut store = store_with_user("owner");
        let tokens = store.mint_claim_tokens(1, None, None, now()).unwrap();
        let opts = RedeemOptions {
            nickname: Some("   ".into()),
            ..RedeemOptions::default()
        };
        assert!(store
            .redeem_claim_token(&tokens[0].token, "owner", &opts, None, now())
            .is_err());
        assert!(!store.get_claim_token(&tokens[0].token).unwrap().is_redeemed());
    }
}
