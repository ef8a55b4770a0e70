use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Derived leaderboard row. `rank` is the 1-based descending position by credits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    pub wallet_address: String,
    pub username: String,
    pub credits: u64,
    pub rank: u32,
}

/// Leaderboard order: credits descending, ties by wallet address descending.
///
/// The tie-break matches the member order of a sorted-set reverse range, so every backend
/// reports the same sequence. It is stable but carries no meaning.
pub fn standing_order(a: (&str, u64), b: (&str, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| b.0.cmp(a.0))
}

/// Case-insensitive substring match over username and wallet address.
///
/// `needle` must already be lowercase.
pub fn matches_search(needle: &str, wallet: &str, username: &str) -> bool {
    needle.is_empty()
        || username.to_lowercase().contains(needle)
        || wallet.to_lowercase().contains(needle)
}

/// Position (0-based) to 1-based rank.
pub fn rank_at(position: usize) -> u32 {
    u32::try_from(position).map_or(u32::MAX, |position| position.saturating_add(1))
}
