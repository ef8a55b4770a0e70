//! Spin settlement client.
//!
//! Wires the pure [spinwheel_types::Ledger] to the outside world: player and ranking stores, the
//! encrypted computation protocol that draws the outcome, reconciliation of outcomes into the
//! ledger and a [Session] per connected wallet.

pub mod clock;
pub mod computation;
pub mod config;
pub mod defaults;
pub mod players;
pub mod rankings;
pub mod reconcile;
pub mod retry;
pub mod session;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use computation::{ComputationError, ComputationProtocol, SpinPhase};
pub use config::{ClientConfig, ConfigError, ValidatedConfig};
pub use players::{PlayerStore, WeeklyReset};
pub use rankings::RankingStore;
pub use reconcile::{Persistence, Reconciler, SpinReport};
pub use retry::RetryPolicy;
pub use session::{
    ClaimReport, ConfiguredSession, Session, SessionSettings, SpinError, SpinGuard, SpinPermit,
};
pub use store::{Backend, ConfiguredBackend, StoreError};

use thiserror::Error;

/// Error type for client setup and operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("network error: {0}")]
    Network(#[from] computation::NetworkError),
    #[error("spin error: {0}")]
    Spin(#[from] SpinError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;
