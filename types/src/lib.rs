//! Spinwheel domain types.
//!
//! Defines the player record, the rate-limited credit ledger, the wheel configuration and ranking
//! entries. Nothing in this crate performs I/O: callers load a record, mutate it through the
//! [Ledger] and persist the result themselves.

mod calendar;
mod constants;
mod ledger;
mod player;
mod ranking;
mod wheel;

pub use calendar::*;
pub use constants::*;
pub use ledger::*;
pub use player::*;
pub use ranking::*;
pub use wheel::*;

#[cfg(test)]
mod tests;
