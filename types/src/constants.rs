/// Maximum username length accepted on rename.
pub const MAX_NAME_LENGTH: usize = 32;

/// Prefix of the placeholder username assigned to new players.
pub const DEFAULT_NAME_PREFIX: &str = "Player_";

/// Number of wallet characters used in the placeholder username.
pub const DEFAULT_NAME_WALLET_CHARS: usize = 6;

/// Daily spins granted at every UTC day boundary.
pub const DAILY_SPIN_LIMIT: u32 = 5;

/// Credits granted on registration.
pub const INITIAL_CREDITS: u64 = 100;

/// Flat credit amount awarded by a claim.
pub const CLAIM_AMOUNT: u64 = 100;

/// Minimum time between two claims (24 hours).
pub const CLAIM_COOLDOWN_SECS: i64 = 24 * 60 * 60;
