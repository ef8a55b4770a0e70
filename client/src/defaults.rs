//! Default values for [crate::ClientConfig] fields.

pub const DEFAULT_KEY_PREFIX: &str = "spinwheel:";
pub const DEFAULT_PROGRAM_ID: &str =
    "0x5370696e576865656c4d504347616d6500000000000000000000000000000001";
pub const DEFAULT_CLUSTER_OFFSET: u32 = 0;
pub const DEFAULT_COMPUTATION_DEFINITION: &str = "spin_wheel";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DEMO_DELAY_MS: u64 = 1_500;

pub const DEFAULT_LEADERBOARD_SIZE: usize = 10;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

pub const DEFAULT_LOG_LEVEL: &str = "info";
