use crate::{
    clock::Clock,
    rankings::RankingStore,
    store::{Backend, StoreError, WEEKLY_RESET_KEY},
};
use spinwheel_types::{
    default_username, iso_week_key, utc_day, GameRules, Ledger, PlayerRecord, PlayerUpdate,
};
use tracing::{debug, info, warn};

/// Outcome of a weekly credit reset sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WeeklyReset {
    /// The sweep already ran during this ISO week.
    AlreadyReset { week: String },
    Completed {
        week: String,
        reset: usize,
        failed: usize,
    },
}

/// Durable per-player records.
///
/// This is the authority for day boundaries: on save, a stored reset date older than today
/// forces `spins_left` back to the daily limit whatever the client sent.
#[derive(Clone)]
pub struct PlayerStore<B, C> {
    backend: B,
    rankings: RankingStore<B>,
    rules: GameRules,
    clock: C,
}

impl<B: Backend, C: Clock> PlayerStore<B, C> {
    pub fn new(backend: B, rules: GameRules, clock: C) -> Self {
        Self {
            rankings: RankingStore::new(backend.clone()),
            backend,
            rules,
            clock,
        }
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    /// Load the record for `wallet`, creating it on first touch.
    ///
    /// The wallet is (re)registered on every load, so a registration that failed earlier is
    /// repaired. Stored records breaking an invariant are repaired and persisted, as is an
    /// existing record crossing a UTC day boundary.
    pub async fn fetch_or_init(&self, wallet: &str) -> Result<PlayerRecord, StoreError> {
        let now = self.clock.now();
        self.backend.register_player(wallet).await?;
        let Some(mut record) = self.backend.get_player(wallet).await? else {
            let record = self.rules.new_record(wallet, now);
            self.backend.put_player(&record).await?;
            info!(wallet, credits = record.credits, "initialized player");
            return Ok(record);
        };

        let repaired = self.repair(&mut record);
        let mut ledger = Ledger::new(record, self.rules.clone());
        let rolled = ledger.roll_over(now);
        let record = ledger.record().clone();
        if rolled || repaired {
            self.backend.put_player(&record).await?;
            debug!(wallet, rolled, repaired, date = %record.last_spin_reset_date, "refreshed stored record");
        }
        Ok(record)
    }

    /// Merge `update` over the stored (or default) record and persist it.
    ///
    /// Returns the record as stored, which may differ from the merge of the client's view when a
    /// day boundary was crossed since it last read. A merge breaking a record invariant is
    /// rejected with [StoreError::Invariant] and nothing is written.
    pub async fn save(&self, wallet: &str, update: &PlayerUpdate) -> Result<PlayerRecord, StoreError> {
        let now = self.clock.now();
        let today = utc_day(now);
        let existing = self.backend.get_player(wallet).await?;
        let previous_credits = existing.as_ref().map(|record| record.credits);
        let mut record = existing.unwrap_or_else(|| self.rules.new_record(wallet, now));
        self.repair(&mut record);
        let stored_date = record.last_spin_reset_date;

        update.merge_into(&mut record);
        if today > stored_date {
            if update.spins_left.is_some_and(|spins| spins != self.rules.daily_spin_limit) {
                debug!(wallet, %stored_date, %today, "discarding stale spins_left across day boundary");
            }
            record.spins_left = self.rules.daily_spin_limit;
            record.last_spin_reset_date = today;
        }
        self.clamp_spins(&mut record);
        record.validate_invariants(self.rules.daily_spin_limit)?;

        self.backend.register_player(wallet).await?;
        self.backend.put_player(&record).await?;
        if previous_credits != Some(record.credits) {
            // The ranking is a derived index; a failed upsert is repaired by the next save.
            if let Err(err) = self.rankings.upsert(wallet, record.credits).await {
                warn!(wallet, ?err, "failed to update ranking after save");
            }
        }
        Ok(record)
    }

    /// Zero every registered player's credits once per ISO week.
    ///
    /// Per-player failures are logged and counted without aborting the sweep.
    pub async fn reset_all_credits_weekly(&self) -> Result<WeeklyReset, StoreError> {
        let week = iso_week_key(self.clock.now());
        if self.backend.get_system(WEEKLY_RESET_KEY).await?.as_deref() == Some(week.as_str()) {
            info!(%week, "weekly reset already applied");
            return Ok(WeeklyReset::AlreadyReset { week });
        }

        let wallets = self.backend.registered_players().await?;
        let mut reset = 0;
        let mut failed = Vec::new();
        for wallet in &wallets {
            match self.zero_credits(wallet).await {
                Ok(()) => reset += 1,
                Err(err) => {
                    warn!(wallet = %wallet, ?err, "failed to reset credits");
                    failed.push(wallet);
                }
            }
        }
        self.rankings.clear().await?;

        // Players that kept their credits stay ranked.
        for wallet in &failed {
            if let Err(err) = self.rerank(wallet).await {
                warn!(wallet = %wallet, ?err, "failed to restore ranking after reset");
            }
        }
        let failed = failed.len();
        self.backend.put_system(WEEKLY_RESET_KEY, &week).await?;
        info!(%week, reset, failed, "weekly credit reset complete");
        Ok(WeeklyReset::Completed { week, reset, failed })
    }

    async fn zero_credits(&self, wallet: &str) -> Result<(), StoreError> {
        let Some(mut record) = self.backend.get_player(wallet).await? else {
            return Ok(());
        };
        if record.credits == 0 {
            return Ok(());
        }
        record.credits = 0;
        self.backend.put_player(&record).await
    }

    async fn rerank(&self, wallet: &str) -> Result<(), StoreError> {
        match self.backend.get_player(wallet).await? {
            Some(record) if record.credits > 0 => self.rankings.upsert(wallet, record.credits).await,
            _ => Ok(()),
        }
    }

    /// Bring a stored record back within its invariants. Returns whether anything changed.
    fn repair(&self, record: &mut PlayerRecord) -> bool {
        let clamped = self.clamp_spins(record);
        if record.validate_invariants(self.rules.daily_spin_limit).is_ok() {
            return clamped;
        }
        warn!(wallet = %record.wallet_address, len = record.username.chars().count(), "replacing invalid stored username");
        record.username = default_username(&record.wallet_address);
        true
    }

    fn clamp_spins(&self, record: &mut PlayerRecord) -> bool {
        if record.spins_left > self.rules.daily_spin_limit {
            record.spins_left = self.rules.daily_spin_limit;
            return true;
        }
        false
    }
}
