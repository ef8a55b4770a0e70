use crate::store::{Backend, StoreError};
use spinwheel_types::{default_username, matches_search, rank_at, PlayerRecord, RankingEntry};

/// Standings fetched per round trip while scanning for search matches.
const SEARCH_PAGE_SIZE: usize = 256;

/// Ranked index of players by credit balance.
///
/// Derived from the player store and updated after every credit-affecting save; it is not
/// transactionally coupled to the player records.
#[derive(Clone)]
pub struct RankingStore<B> {
    backend: B,
}

impl<B: Backend> RankingStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Set the member's score to `credits`.
    pub async fn upsert(&self, wallet: &str, credits: u64) -> Result<(), StoreError> {
        self.backend.set_score(wallet, credits).await
    }

    /// Up to `n` highest-credit entries, rank 1 first.
    pub async fn top_n(&self, n: usize) -> Result<Vec<RankingEntry>, StoreError> {
        let standings = self.backend.score_range(0, n).await?;
        let wallets: Vec<String> = standings.iter().map(|(wallet, _)| wallet.clone()).collect();
        let records = self.backend.get_players(&wallets).await?;
        Ok(standings
            .into_iter()
            .zip(records)
            .enumerate()
            .map(|(position, ((wallet, credits), record))| {
                entry(position, wallet, credits, record.as_ref())
            })
            .collect())
    }

    /// Case-insensitive substring search over usernames and wallet addresses.
    ///
    /// Matches keep their global rank and leaderboard order; at most `limit` are returned.
    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<RankingEntry>, StoreError> {
        let needle = term.trim().to_lowercase();
        let mut matches = Vec::new();
        let mut start = 0;
        while matches.len() < limit {
            let page = self.backend.score_range(start, SEARCH_PAGE_SIZE).await?;
            let page_len = page.len();
            let wallets: Vec<String> = page.iter().map(|(wallet, _)| wallet.clone()).collect();
            let records = self.backend.get_players(&wallets).await?;
            for (offset, ((wallet, credits), record)) in page.into_iter().zip(records).enumerate() {
                let candidate = entry(start + offset, wallet, credits, record.as_ref());
                if matches_search(&needle, &candidate.wallet_address, &candidate.username) {
                    matches.push(candidate);
                    if matches.len() == limit {
                        break;
                    }
                }
            }
            if page_len < SEARCH_PAGE_SIZE {
                break;
            }
            start += page_len;
        }
        Ok(matches)
    }

    /// Current ranking entry of a single wallet.
    pub async fn entry_for(&self, wallet: &str) -> Result<Option<RankingEntry>, StoreError> {
        let Some((position, credits)) = self.backend.position(wallet).await? else {
            return Ok(None);
        };
        let record = self.backend.get_player(wallet).await?;
        Ok(Some(entry(position, wallet.to_string(), credits, record.as_ref())))
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.backend.clear_scores().await
    }
}

fn entry(position: usize, wallet: String, credits: u64, record: Option<&PlayerRecord>) -> RankingEntry {
    let username = record
        .map(|record| record.username.clone())
        .unwrap_or_else(|| default_username(&wallet));
    RankingEntry {
        wallet_address: wallet,
        username,
        credits,
        rank: rank_at(position),
    }
}
