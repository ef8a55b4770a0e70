use super::{Backend, StoreError};
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use spinwheel_types::PlayerRecord;
use std::sync::Arc;
use tokio::sync::Mutex;

struct Inner {
    client: redis::Client,
    connection: Mutex<Option<ConnectionManager>>,
    prefix: String,
}

/// Redis-backed store.
///
/// Layout: `{prefix}player:{wallet}` (JSON record), `{prefix}players` (set),
/// `{prefix}leaderboard` (sorted set, score = credits), `{prefix}system:{key}` (string).
#[derive(Clone)]
pub struct RedisBackend {
    inner: Arc<Inner>,
}

impl RedisBackend {
    pub fn new(url: &str, prefix: String) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                connection: Mutex::new(None),
                prefix,
            }),
        })
    }

    fn player_key(&self, wallet: &str) -> String {
        format!("{}player:{}", self.inner.prefix, wallet)
    }

    fn players_key(&self) -> String {
        format!("{}players", self.inner.prefix)
    }

    fn leaderboard_key(&self) -> String {
        format!("{}leaderboard", self.inner.prefix)
    }

    fn system_key(&self, key: &str) -> String {
        format!("{}system:{}", self.inner.prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let mut guard = self.inner.connection.lock().await;
        if let Some(connection) = guard.as_ref() {
            return Ok(connection.clone());
        }
        let connection = self.inner.client.get_connection_manager().await?;
        *guard = Some(connection.clone());
        Ok(connection)
    }

    /// Drop the cached connection on failure so the next call reconnects.
    async fn settle<T>(&self, result: RedisResult<T>) -> Result<T, StoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!("Redis store command failed: {err}");
                *self.inner.connection.lock().await = None;
                Err(err.into())
            }
        }
    }

    fn decode(key: &str, raw: &str) -> Result<PlayerRecord, StoreError> {
        serde_json::from_str(raw).map_err(|source| StoreError::Decode {
            key: key.to_string(),
            source,
        })
    }
}

fn score_to_credits(score: f64) -> u64 {
    if score.is_nan() || score <= 0.0 {
        0
    } else {
        score.round() as u64
    }
}

impl Backend for RedisBackend {
    async fn get_player(&self, wallet: &str) -> Result<Option<PlayerRecord>, StoreError> {
        let key = self.player_key(wallet);
        let mut conn = self.connection().await?;
        let result: RedisResult<Option<String>> = conn.get(&key).await;
        match self.settle(result).await? {
            Some(raw) => Ok(Some(Self::decode(&key, &raw)?)),
            None => Ok(None),
        }
    }

    async fn get_players(
        &self,
        wallets: &[String],
    ) -> Result<Vec<Option<PlayerRecord>>, StoreError> {
        if wallets.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = wallets.iter().map(|wallet| self.player_key(wallet)).collect();
        let mut conn = self.connection().await?;
        let result: RedisResult<Vec<Option<String>>> =
            redis::cmd("MGET").arg(&keys).query_async(&mut conn).await;
        let values = self.settle(result).await?;
        keys.iter()
            .zip(values)
            .map(|(key, raw)| raw.map(|raw| Self::decode(key, &raw)).transpose())
            .collect()
    }

    async fn put_player(&self, record: &PlayerRecord) -> Result<(), StoreError> {
        let key = self.player_key(&record.wallet_address);
        let raw = serde_json::to_string(record).map_err(StoreError::Encode)?;
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.set(key, raw).await;
        self.settle(result).await
    }

    async fn register_player(&self, wallet: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.sadd(self.players_key(), wallet).await;
        self.settle(result).await
    }

    async fn registered_players(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<Vec<String>> = conn.smembers(self.players_key()).await;
        let mut wallets = self.settle(result).await?;
        wallets.sort();
        Ok(wallets)
    }

    async fn get_system(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<Option<String>> = conn.get(self.system_key(key)).await;
        self.settle(result).await
    }

    async fn put_system(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.set(self.system_key(key), value).await;
        self.settle(result).await
    }

    async fn set_score(&self, wallet: &str, score: u64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.zadd(self.leaderboard_key(), wallet, score).await;
        self.settle(result).await
    }

    async fn position(&self, wallet: &str) -> Result<Option<(usize, u64)>, StoreError> {
        let key = self.leaderboard_key();
        let mut conn = self.connection().await?;
        let rank: RedisResult<Option<usize>> = conn.zrevrank(&key, wallet).await;
        let Some(position) = self.settle(rank).await? else {
            return Ok(None);
        };
        let score: RedisResult<Option<f64>> = conn.zscore(&key, wallet).await;
        Ok(self
            .settle(score)
            .await?
            .map(|score| (position, score_to_credits(score))))
    }

    async fn score_range(
        &self,
        start: usize,
        count: usize,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let stop = start.saturating_add(count - 1);
        let (Ok(start), Ok(stop)) = (isize::try_from(start), isize::try_from(stop)) else {
            return Ok(Vec::new());
        };
        let mut conn = self.connection().await?;
        let result: RedisResult<Vec<(String, f64)>> = conn
            .zrevrange_withscores(self.leaderboard_key(), start, stop)
            .await;
        Ok(self
            .settle(result)
            .await?
            .into_iter()
            .map(|(wallet, score)| (wallet, score_to_credits(score)))
            .collect())
    }

    async fn clear_scores(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: RedisResult<()> = conn.del(self.leaderboard_key()).await;
        self.settle(result).await
    }
}
