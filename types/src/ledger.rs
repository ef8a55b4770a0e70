use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use super::{
    next_daily_reset, utc_day, PlayerRecord, SegmentEffect, CLAIM_AMOUNT, CLAIM_COOLDOWN_SECS,
    DAILY_SPIN_LIMIT, INITIAL_CREDITS,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("daily spin limit of {limit} reached; spins reset at {resets_at}")]
    LimitExceeded {
        limit: u32,
        resets_at: DateTime<Utc>,
    },
    #[error("claim cooldown active: {remaining_secs}s remaining (available at {available_at})")]
    CooldownActive {
        remaining_secs: i64,
        available_at: DateTime<Utc>,
    },
}

/// Tunable limits applied by the [Ledger].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameRules {
    pub daily_spin_limit: u32,
    pub initial_credits: u64,
    pub claim_amount: u64,
    pub claim_cooldown: TimeDelta,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            daily_spin_limit: DAILY_SPIN_LIMIT,
            initial_credits: INITIAL_CREDITS,
            claim_amount: CLAIM_AMOUNT,
            claim_cooldown: TimeDelta::seconds(CLAIM_COOLDOWN_SECS),
        }
    }
}

impl GameRules {
    /// Fresh record for a wallet seen for the first time.
    pub fn new_record(&self, wallet: &str, now: DateTime<Utc>) -> PlayerRecord {
        PlayerRecord::new(
            wallet,
            self.initial_credits,
            self.daily_spin_limit,
            utc_day(now),
        )
    }
}

/// Rate-limited credit ledger over an in-memory [PlayerRecord] snapshot.
///
/// The ledger never performs I/O; its owner synchronizes the snapshot with the remote store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ledger {
    record: PlayerRecord,
    rules: GameRules,
}

impl Ledger {
    pub fn new(record: PlayerRecord, rules: GameRules) -> Self {
        Self { record, rules }
    }

    pub fn record(&self) -> &PlayerRecord {
        &self.record
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Adopt the record returned by the store after a save or reload.
    pub fn replace_record(&mut self, record: PlayerRecord) {
        self.record = record;
    }

    pub fn set_username(&mut self, username: String) {
        self.record.username = username;
    }

    pub fn credits(&self) -> u64 {
        self.record.credits
    }

    pub fn spins_left(&self) -> u32 {
        self.record.spins_left
    }

    pub fn spins_used_today(&self) -> u32 {
        self.rules
            .daily_spin_limit
            .saturating_sub(self.record.spins_left)
    }

    /// Reset the daily allowance if `now` falls on a later UTC day than the stored reset date.
    ///
    /// Idempotent within a UTC day: only the first call after a boundary resets, so it is safe to
    /// invoke on load, before every spin and from a periodic timer. Returns whether a reset
    /// happened. The stored date never moves backwards.
    pub fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let today = utc_day(now);
        if today <= self.record.last_spin_reset_date {
            return false;
        }
        self.record.spins_left = self.rules.daily_spin_limit;
        self.record.last_spin_reset_date = today;
        true
    }

    /// Check that a daily spin is available without consuming it.
    pub fn ensure_spin_available(&mut self, now: DateTime<Utc>) -> Result<(), LedgerError> {
        self.roll_over(now);
        if self.record.spins_left == 0 {
            return Err(LedgerError::LimitExceeded {
                limit: self.rules.daily_spin_limit,
                resets_at: next_daily_reset(now),
            });
        }
        Ok(())
    }

    /// Consume one daily spin, returning the spins left afterwards.
    pub fn consume_daily_spin(&mut self, now: DateTime<Utc>) -> Result<u32, LedgerError> {
        self.ensure_spin_available(now)?;
        self.record.spins_left -= 1;
        Ok(self.record.spins_left)
    }

    /// Apply a segment effect to the balance and return the new balance.
    ///
    /// When `affects_ledger` is false (practice spins) nothing is mutated.
    pub fn apply_segment_effect(&mut self, effect: SegmentEffect, affects_ledger: bool) -> u64 {
        if !affects_ledger {
            return self.record.credits;
        }
        self.record.credits = effect.apply(self.record.credits);
        self.record.credits
    }

    /// Instant at which the next claim becomes available, if a claim was ever made.
    pub fn claim_available_at(&self) -> Option<DateTime<Utc>> {
        self.record
            .last_claim_time
            .map(|last| last + self.rules.claim_cooldown)
    }

    /// Award the flat claim amount if the cooldown has elapsed.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<u64, LedgerError> {
        if let Some(available_at) = self.claim_available_at() {
            if now < available_at {
                return Err(LedgerError::CooldownActive {
                    remaining_secs: (available_at - now).num_seconds().max(1),
                    available_at,
                });
            }
        }
        self.record.credits = self.record.credits.saturating_add(self.rules.claim_amount);
        self.record.last_claim_time = Some(now);
        Ok(self.rules.claim_amount)
    }
}
