//! Key-value and sorted-set storage behind the player and ranking stores.
//!
//! The [Backend] trait is the only place that knows how records are laid out. Two
//! implementations share the same semantics: [MemoryBackend] (default, process-local) and
//! [RedisBackend].

mod memory;
mod redis;

pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

use spinwheel_types::{PlayerInvariantError, PlayerRecord};
use std::future::Future;
use thiserror::Error;

/// Key of the system record holding the last weekly reset (ISO week).
pub const WEEKLY_RESET_KEY: &str = "weekly_reset";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
    #[error("invalid record at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("player record rejected: {0}")]
    Invariant(#[from] PlayerInvariantError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Storage primitives required by the player and ranking stores.
///
/// Scores are credit balances. Range queries return `(wallet, score)` pairs ordered by score
/// descending, ties by wallet descending.
pub trait Backend: Clone + Send + Sync + 'static {
    fn get_player(
        &self,
        wallet: &str,
    ) -> impl Future<Output = Result<Option<PlayerRecord>, StoreError>> + Send;

    /// Batched lookup; the result is aligned with `wallets`.
    fn get_players(
        &self,
        wallets: &[String],
    ) -> impl Future<Output = Result<Vec<Option<PlayerRecord>>, StoreError>> + Send;

    fn put_player(
        &self,
        record: &PlayerRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Add a wallet to the global player set.
    fn register_player(&self, wallet: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every registered wallet, sorted.
    fn registered_players(&self) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    fn get_system(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    fn put_system(
        &self,
        key: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Set (not increment) the ranking score of `wallet`.
    fn set_score(&self, wallet: &str, score: u64)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 0-based descending position of `wallet` in the ranking, with its score.
    fn position(
        &self,
        wallet: &str,
    ) -> impl Future<Output = Result<Option<(usize, u64)>, StoreError>> + Send;

    /// Scores at descending positions `start..start + count`.
    fn score_range(
        &self,
        start: usize,
        count: usize,
    ) -> impl Future<Output = Result<Vec<(String, u64)>, StoreError>> + Send;

    fn clear_scores(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Backend selected at runtime from configuration.
#[derive(Clone)]
pub enum ConfiguredBackend {
    Memory(MemoryBackend),
    Redis(RedisBackend),
}

impl ConfiguredBackend {
    pub fn from_url(url: Option<&str>, prefix: &str) -> Result<Self, StoreError> {
        match url {
            Some(url) => Ok(Self::Redis(RedisBackend::new(url, prefix.to_string())?)),
            None => Ok(Self::Memory(MemoryBackend::default())),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }
}

impl Backend for ConfiguredBackend {
    async fn get_player(&self, wallet: &str) -> Result<Option<PlayerRecord>, StoreError> {
        match self {
            Self::Memory(backend) => backend.get_player(wallet).await,
            Self::Redis(backend) => backend.get_player(wallet).await,
        }
    }

    async fn get_players(
        &self,
        wallets: &[String],
    ) -> Result<Vec<Option<PlayerRecord>>, StoreError> {
        match self {
            Self::Memory(backend) => backend.get_players(wallets).await,
            Self::Redis(backend) => backend.get_players(wallets).await,
        }
    }

    async fn put_player(&self, record: &PlayerRecord) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.put_player(record).await,
            Self::Redis(backend) => backend.put_player(record).await,
        }
    }

    async fn register_player(&self, wallet: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.register_player(wallet).await,
            Self::Redis(backend) => backend.register_player(wallet).await,
        }
    }

    async fn registered_players(&self) -> Result<Vec<String>, StoreError> {
        match self {
            Self::Memory(backend) => backend.registered_players().await,
            Self::Redis(backend) => backend.registered_players().await,
        }
    }

    async fn get_system(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self {
            Self::Memory(backend) => backend.get_system(key).await,
            Self::Redis(backend) => backend.get_system(key).await,
        }
    }

    async fn put_system(&self, key: &str, value: &str) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.put_system(key, value).await,
            Self::Redis(backend) => backend.put_system(key, value).await,
        }
    }

    async fn set_score(&self, wallet: &str, score: u64) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.set_score(wallet, score).await,
            Self::Redis(backend) => backend.set_score(wallet, score).await,
        }
    }

    async fn position(&self, wallet: &str) -> Result<Option<(usize, u64)>, StoreError> {
        match self {
            Self::Memory(backend) => backend.position(wallet).await,
            Self::Redis(backend) => backend.position(wallet).await,
        }
    }

    async fn score_range(
        &self,
        start: usize,
        count: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        match self {
            Self::Memory(backend) => backend.score_range(start, count).await,
            Self::Redis(backend) => backend.score_range(start, count).await,
        }
    }

    async fn clear_scores(&self) -> Result<(), StoreError> {
        match self {
            Self::Memory(backend) => backend.clear_scores().await,
            Self::Redis(backend) => backend.clear_scores().await,
        }
    }
}
