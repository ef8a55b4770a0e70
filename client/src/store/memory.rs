use super::{Backend, StoreError};
use spinwheel_types::{standing_order, PlayerRecord};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    players: HashMap<String, PlayerRecord>,
    registered: BTreeSet<String>,
    system: HashMap<String, String>,
    scores: HashMap<String, u64>,
    player_writes: u64,
    #[cfg(any(test, feature = "mocks"))]
    fail_writes: bool,
    #[cfg(any(test, feature = "mocks"))]
    failing_wallets: BTreeSet<String>,
    #[cfg(any(test, feature = "mocks"))]
    failing_registrations: u32,
}

impl MemoryState {
    fn standings(&self) -> Vec<(String, u64)> {
        let mut standings: Vec<(String, u64)> = self
            .scores
            .iter()
            .map(|(wallet, score)| (wallet.clone(), *score))
            .collect();
        standings.sort_by(|a, b| standing_order((a.0.as_str(), a.1), (b.0.as_str(), b.1)));
        standings
    }

    #[cfg(any(test, feature = "mocks"))]
    fn check_write(&self, wallet: &str) -> Result<(), StoreError> {
        if self.fail_writes || self.failing_wallets.contains(wallet) {
            return Err(StoreError::Unavailable(format!("write rejected for {wallet}")));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "mocks")))]
    fn check_write(&self, _wallet: &str) -> Result<(), StoreError> {
        Ok(())
    }

    #[cfg(any(test, feature = "mocks"))]
    fn check_registration(&mut self, wallet: &str) -> Result<(), StoreError> {
        if self.failing_registrations > 0 {
            self.failing_registrations -= 1;
            return Err(StoreError::Unavailable(format!("registration rejected for {wallet}")));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "mocks")))]
    fn check_registration(&mut self, _wallet: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Process-local backend. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock cannot leave the maps half-updated, so recover the guard.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of successful player record writes.
    pub fn player_writes(&self) -> u64 {
        self.state().player_writes
    }
}

#[cfg(any(test, feature = "mocks"))]
impl MemoryBackend {
    /// Reject every subsequent player write.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    /// Reject player writes for a single wallet.
    pub fn fail_wallet(&self, wallet: &str) {
        self.state().failing_wallets.insert(wallet.to_string());
    }

    /// Reject the next `count` player registrations.
    pub fn fail_registrations(&self, count: u32) {
        self.state().failing_registrations = count;
    }
}

impl Backend for MemoryBackend {
    async fn get_player(&self, wallet: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.state().players.get(wallet).cloned())
    }

    async fn get_players(
        &self,
        wallets: &[String],
    ) -> Result<Vec<Option<PlayerRecord>>, StoreError> {
        let state = self.state();
        Ok(wallets
            .iter()
            .map(|wallet| state.players.get(wallet).cloned())
            .collect())
    }

    async fn put_player(&self, record: &PlayerRecord) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_write(&record.wallet_address)?;
        state
            .players
            .insert(record.wallet_address.clone(), record.clone());
        state.player_writes += 1;
        Ok(())
    }

    async fn register_player(&self, wallet: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.check_registration(wallet)?;
        state.registered.insert(wallet.to_string());
        Ok(())
    }

    async fn registered_players(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.state().registered.iter().cloned().collect())
    }

    async fn get_system(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.state().system.get(key).cloned())
    }

    async fn put_system(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.state()
            .system
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_score(&self, wallet: &str, score: u64) -> Result<(), StoreError> {
        self.state().scores.insert(wallet.to_string(), score);
        Ok(())
    }

    async fn position(&self, wallet: &str) -> Result<Option<(usize, u64)>, StoreError> {
        Ok(self
            .state()
            .standings()
            .into_iter()
            .enumerate()
            .find(|(_, (member, _))| member == wallet)
            .map(|(position, (_, score))| (position, score)))
    }

    async fn score_range(
        &self,
        start: usize,
        count: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        Ok(self
            .state()
            .standings()
            .into_iter()
            .skip(start)
            .take(count)
            .collect())
    }

    async fn clear_scores(&self) -> Result<(), StoreError> {
        self.state().scores.clear();
        Ok(())
    }
}
