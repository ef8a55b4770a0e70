use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DEFAULT_NAME_PREFIX, DEFAULT_NAME_WALLET_CHARS, MAX_NAME_LENGTH};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlayerInvariantError {
    #[error("player name too long (len={len}, max={max})")]
    NameTooLong { len: usize, max: usize },
    #[error("player name is empty")]
    NameEmpty,
    #[error("spins_left out of range (got={got}, max={max})")]
    SpinsOutOfRange { got: u32, max: u32 },
}

/// Durable per-wallet record.
///
/// `credits` is unsigned so it can never go negative; every credit mutation clamps at zero before
/// converting back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub wallet_address: String,
    pub username: String,
    pub credits: u64,
    pub spins_left: u32,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_claim_time: Option<DateTime<Utc>>,
    pub last_spin_reset_date: NaiveDate,
}

impl PlayerRecord {
    pub fn new(wallet: &str, credits: u64, spins_left: u32, today: NaiveDate) -> Self {
        Self {
            wallet_address: wallet.to_string(),
            username: default_username(wallet),
            credits,
            spins_left,
            last_claim_time: None,
            last_spin_reset_date: today,
        }
    }

    pub fn validate_invariants(&self, daily_spin_limit: u32) -> Result<(), PlayerInvariantError> {
        validate_username(&self.username)?;
        if self.spins_left > daily_spin_limit {
            return Err(PlayerInvariantError::SpinsOutOfRange {
                got: self.spins_left,
                max: daily_spin_limit,
            });
        }
        Ok(())
    }
}

/// Placeholder display name derived from the wallet address.
pub fn default_username(wallet: &str) -> String {
    let short: String = wallet.chars().take(DEFAULT_NAME_WALLET_CHARS).collect();
    format!("{DEFAULT_NAME_PREFIX}{short}")
}

/// Trim and validate a user-supplied display name.
pub fn normalize_username(name: &str) -> Result<String, PlayerInvariantError> {
    let name = name.trim();
    validate_username(name)?;
    Ok(name.to_string())
}

fn validate_username(name: &str) -> Result<(), PlayerInvariantError> {
    if name.is_empty() {
        return Err(PlayerInvariantError::NameEmpty);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(PlayerInvariantError::NameTooLong {
            len,
            max: MAX_NAME_LENGTH,
        });
    }
    Ok(())
}

/// Partial update merged over a stored [PlayerRecord].
///
/// `None` leaves the stored field untouched. `last_spin_reset_date` is deliberately absent: the
/// store owns it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credits: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spins_left: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub last_claim_time: Option<DateTime<Utc>>,
}

impl PlayerUpdate {
    /// Snapshot every client-owned field of `record`.
    pub fn from_record(record: &PlayerRecord) -> Self {
        Self {
            username: Some(record.username.clone()),
            credits: Some(record.credits),
            spins_left: Some(record.spins_left),
            last_claim_time: record.last_claim_time,
        }
    }

    pub fn credits(credits: u64) -> Self {
        Self {
            credits: Some(credits),
            ..Self::default()
        }
    }

    pub fn username(username: String) -> Self {
        Self {
            username: Some(username),
            ..Self::default()
        }
    }

    pub fn merge_into(&self, record: &mut PlayerRecord) {
        if let Some(username) = &self.username {
            record.username = username.clone();
        }
        if let Some(credits) = self.credits {
            record.credits = credits;
        }
        if let Some(spins_left) = self.spins_left {
            record.spins_left = spins_left;
        }
        if let Some(last_claim_time) = self.last_claim_time {
            record.last_claim_time = Some(last_claim_time);
        }
    }
}
