use crate::{clock::Clock, players::PlayerStore, rankings::RankingStore, store::Backend};
use chrono::{DateTime, Utc};
use spinwheel_types::{
    Ledger, LedgerError, PlayerUpdate, RankingEntry, SegmentEffect, SpinMode, SpinOutcome, Wheel,
};
use tracing::{info, warn};
use url::Url;

/// What happened to the record after a spin was applied in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Persistence {
    Saved,
    /// Practice spins never reach the store.
    Skipped,
    /// The in-memory change is kept; the message explains why the save failed.
    Failed(String),
}

/// Displayable result of a settled spin.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinReport {
    pub mode: SpinMode,
    pub segment_index: usize,
    pub label: String,
    pub effect: SegmentEffect,
    pub credit_delta: i128,
    pub new_balance: u64,
    pub spins_left: u32,
    pub proof_reference: Option<String>,
    pub proof_link: Option<String>,
    pub persistence: Persistence,
    /// Refreshed ranking entry of the player, for daily spins that saved.
    pub standing: Option<RankingEntry>,
}

impl SpinReport {
    pub fn is_demo(&self) -> bool {
        self.proof_reference.is_none()
    }
}

/// Applies a computation result to the ledger and synchronizes the stores.
///
/// Real and demo outcomes take the same path; they differ only in the proof reference.
pub struct Reconciler<B, C> {
    wheel: Wheel,
    players: PlayerStore<B, C>,
    rankings: RankingStore<B>,
    explorer_url: Option<Url>,
}

impl<B: Backend, C: Clock> Reconciler<B, C> {
    pub fn new(
        wheel: Wheel,
        players: PlayerStore<B, C>,
        rankings: RankingStore<B>,
        explorer_url: Option<Url>,
    ) -> Self {
        Self {
            wheel,
            players,
            rankings,
            explorer_url,
        }
    }

    pub fn wheel(&self) -> &Wheel {
        &self.wheel
    }

    /// Map a 1-based raw result onto the wheel.
    pub fn resolve(&self, raw_result: u64, proof_reference: Option<String>, mode: SpinMode) -> SpinOutcome {
        let (segment_index, segment) = self.wheel.resolve(raw_result);
        SpinOutcome {
            segment_index,
            segment_effect: segment.effect,
            counts_toward_leaderboard: mode.affects_ledger(),
            proof_reference,
        }
    }

    /// Display link for a proof reference.
    pub fn proof_link(&self, reference: &str) -> Option<String> {
        let base = self.explorer_url.as_ref()?;
        Some(format!("{}/tx/{reference}", base.as_str().trim_end_matches('/')))
    }

    /// Apply `outcome` to `ledger`.
    ///
    /// Daily spins consume the allowance before the effect is applied, then save and refresh
    /// the player's ranking. A failed save keeps the in-memory change and is reported in
    /// [SpinReport::persistence]. Practice spins touch neither the ledger nor the stores.
    pub async fn reconcile(
        &self,
        ledger: &mut Ledger,
        now: DateTime<Utc>,
        outcome: SpinOutcome,
    ) -> Result<SpinReport, LedgerError> {
        let affects_ledger = outcome.counts_toward_leaderboard;
        let mode = if affects_ledger {
            SpinMode::Daily
        } else {
            SpinMode::Practice
        };
        if affects_ledger {
            ledger.consume_daily_spin(now)?;
        }

        let credit_delta = if affects_ledger {
            outcome.segment_effect.delta(ledger.credits())
        } else {
            0
        };
        let new_balance = ledger.apply_segment_effect(outcome.segment_effect, affects_ledger);
        let wallet = ledger.record().wallet_address.clone();

        let (persistence, standing) = if affects_ledger {
            self.persist(ledger, &wallet).await
        } else {
            (Persistence::Skipped, None)
        };

        let label = self
            .wheel
            .segment(outcome.segment_index)
            .map(|segment| segment.label.clone())
            .unwrap_or_else(|| outcome.segment_effect.to_string());
        let proof_link = outcome
            .proof_reference
            .as_deref()
            .and_then(|reference| self.proof_link(reference));
        info!(
            wallet = %wallet,
            ?mode,
            segment = outcome.segment_index,
            credit_delta,
            new_balance,
            demo = outcome.proof_reference.is_none(),
            "spin settled"
        );
        Ok(SpinReport {
            mode,
            segment_index: outcome.segment_index,
            label,
            effect: outcome.segment_effect,
            credit_delta,
            new_balance,
            spins_left: ledger.spins_left(),
            proof_reference: outcome.proof_reference,
            proof_link,
            persistence,
            standing,
        })
    }

    async fn persist(&self, ledger: &mut Ledger, wallet: &str) -> (Persistence, Option<RankingEntry>) {
        let update = PlayerUpdate::from_record(ledger.record());
        let persistence = match self.players.save(wallet, &update).await {
            Ok(stored) => {
                ledger.replace_record(stored);
                Persistence::Saved
            }
            Err(err) => {
                warn!(wallet, ?err, "progress may not have been saved");
                return (Persistence::Failed(err.to_string()), None);
            }
        };
        let standing = match self.rankings.entry_for(wallet).await {
            Ok(entry) => entry,
            Err(err) => {
                warn!(wallet, ?err, "failed to refresh ranking");
                None
            }
        };
        (persistence, standing)
    }
}
