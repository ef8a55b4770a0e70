use crate::{
    clock::{Clock, SystemClock},
    computation::{
        Addressing, ComputationError, ComputationNetwork, ComputationProtocol, ConfiguredNetwork,
        ProgramAddressing, SpinPhase,
    },
    config::ValidatedConfig,
    players::PlayerStore,
    rankings::RankingStore,
    reconcile::{Persistence, Reconciler, SpinReport},
    retry::RetryPolicy,
    store::{Backend, ConfiguredBackend, StoreError},
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use spinwheel_types::{
    normalize_username, GameRules, Ledger, LedgerError, PlayerInvariantError, PlayerUpdate,
    RankingEntry, SpinMode, Wheel,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum SpinError {
    #[error("a spin is already in flight")]
    AlreadySpinning,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Computation(#[from] ComputationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid name: {0}")]
    InvalidName(#[from] PlayerInvariantError),
}

/// In-flight spin flag. Clones share the flag, so sibling sessions and display adapters can
/// observe or hold it.
#[derive(Clone, Debug, Default)]
pub struct SpinGuard(Arc<AtomicBool>);

impl SpinGuard {
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Take the guard, or `None` while a spin is in flight. The permit releases it on drop.
    pub fn try_acquire(&self) -> Option<SpinPermit> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(SpinPermit(self.0.clone()))
    }
}

/// Held [SpinGuard]; dropping it (including on cancellation) ends the spin.
#[derive(Debug)]
pub struct SpinPermit(Arc<AtomicBool>);

impl Drop for SpinPermit {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Tunables of a [Session] that are not owned by a store or the protocol.
#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub rules: GameRules,
    pub wheel: Wheel,
    pub retry: RetryPolicy,
    pub demo_delay: Duration,
    pub leaderboard_size: usize,
    pub search_limit: usize,
    pub explorer_url: Option<Url>,
    pub spin_guard: SpinGuard,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            rules: GameRules::default(),
            wheel: Wheel::default(),
            retry: RetryPolicy::default(),
            demo_delay: Duration::from_millis(crate::defaults::DEFAULT_DEMO_DELAY_MS),
            leaderboard_size: crate::defaults::DEFAULT_LEADERBOARD_SIZE,
            search_limit: crate::defaults::DEFAULT_SEARCH_LIMIT,
            explorer_url: None,
            spin_guard: SpinGuard::default(),
        }
    }
}

impl From<&ValidatedConfig> for SessionSettings {
    fn from(config: &ValidatedConfig) -> Self {
        Self {
            rules: config.rules.clone(),
            wheel: config.wheel.clone(),
            retry: config.retry,
            demo_delay: config.demo_delay,
            leaderboard_size: config.leaderboard_size,
            search_limit: config.search_limit,
            explorer_url: config.explorer_url.clone(),
            spin_guard: SpinGuard::default(),
        }
    }
}

/// Result of a successful claim.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReport {
    pub awarded: u64,
    pub new_balance: u64,
    pub persistence: Persistence,
}

/// Session wired from configuration.
pub type ConfiguredSession =
    Session<ConfiguredBackend, ConfiguredNetwork, ProgramAddressing, SystemClock>;

/// One connected wallet.
///
/// Owns the authoritative in-memory [Ledger] and the in-flight guard. Operations take
/// `&mut self` and must complete before the next one starts; the guard is shared through
/// [SessionSettings::spin_guard] so sessions of the same wallet exclude each other too.
pub struct Session<B, N, A, C> {
    wallet: String,
    ledger: Ledger,
    spin_guard: SpinGuard,
    players: PlayerStore<B, C>,
    rankings: RankingStore<B>,
    protocol: ComputationProtocol<N, A, C>,
    reconciler: Reconciler<B, C>,
    clock: C,
    rng: StdRng,
    demo_delay: Duration,
    leaderboard_size: usize,
    search_limit: usize,
}

impl ConfiguredSession {
    /// Connect `wallet` using the store and network named in `config`.
    pub async fn from_config(config: &ValidatedConfig, wallet: &str) -> crate::Result<Self> {
        let backend = ConfiguredBackend::from_url(config.store_url.as_deref(), &config.key_prefix)?;
        let network =
            ConfiguredNetwork::from_url(config.gateway_url.as_ref(), config.request_timeout)?;
        info!(
            store = backend.describe(),
            network = %network.describe(),
            "connecting session"
        );
        let addressing = ProgramAddressing::new(
            config.program_id,
            config.cluster_offset,
            config.computation_definition.clone(),
        );
        Ok(Session::connect(
            wallet,
            backend,
            network,
            addressing,
            SystemClock,
            SessionSettings::from(config),
        )
        .await?)
    }
}

impl<B: Backend, N: ComputationNetwork, A: Addressing, C: Clock> Session<B, N, A, C> {
    /// Load (or create) the player record and build the session around it.
    pub async fn connect(
        wallet: &str,
        backend: B,
        network: N,
        addressing: A,
        clock: C,
        settings: SessionSettings,
    ) -> Result<Self, SpinError> {
        let players = PlayerStore::new(backend.clone(), settings.rules.clone(), clock.clone());
        let rankings = RankingStore::new(backend);
        let record = players.fetch_or_init(wallet).await?;
        info!(wallet, credits = record.credits, spins_left = record.spins_left, "session connected");

        let protocol = ComputationProtocol::new(network, addressing, clock.clone(), settings.retry);
        let reconciler = Reconciler::new(
            settings.wheel,
            players.clone(),
            rankings.clone(),
            settings.explorer_url,
        );
        Ok(Self {
            wallet: wallet.to_string(),
            ledger: Ledger::new(record, settings.rules),
            spin_guard: settings.spin_guard,
            players,
            rankings,
            protocol,
            reconciler,
            clock,
            rng: StdRng::from_entropy(),
            demo_delay: settings.demo_delay,
            leaderboard_size: settings.leaderboard_size,
            search_limit: settings.search_limit,
        })
    }

    pub fn wallet(&self) -> &str {
        &self.wallet
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn wheel(&self) -> &Wheel {
        self.reconciler.wheel()
    }

    pub fn is_spinning(&self) -> bool {
        self.spin_guard.is_held()
    }

    pub fn spin_guard(&self) -> SpinGuard {
        self.spin_guard.clone()
    }

    /// Follow the computation phase of this session's spins.
    pub fn phases(&self) -> watch::Receiver<SpinPhase> {
        self.protocol.subscribe()
    }

    /// Apply the day rollover and persist it if one happened.
    ///
    /// Safe to call from a timer; within a UTC day only the first call does anything. A failed
    /// save is logged and the rollover is kept in memory.
    pub async fn refresh_day(&mut self) -> bool {
        if !self.ledger.roll_over(self.clock.now()) {
            return false;
        }
        let update = PlayerUpdate::from_record(self.ledger.record());
        match self.players.save(&self.wallet, &update).await {
            Ok(stored) => self.ledger.replace_record(stored),
            Err(err) => warn!(wallet = %self.wallet, ?err, "failed to persist day rollover"),
        }
        debug!(wallet = %self.wallet, date = %self.ledger.record().last_spin_reset_date, "daily spins reset");
        true
    }

    /// Spin the wheel once.
    ///
    /// Daily spins are refused with [LedgerError::LimitExceeded] before anything is submitted.
    /// Network faults and timeouts fall back to a local demo outcome with no proof reference;
    /// every other computation error is returned.
    pub async fn spin(&mut self, mode: SpinMode) -> Result<SpinReport, SpinError> {
        let Some(_permit) = self.spin_guard.try_acquire() else {
            return Err(SpinError::AlreadySpinning);
        };
        if mode.affects_ledger() {
            self.refresh_day().await;
            self.ledger.ensure_spin_available(self.clock.now())?;
        }

        let result = self.settle(mode).await;
        self.protocol.reset();
        result
    }

    async fn settle(&mut self, mode: SpinMode) -> Result<SpinReport, SpinError> {
        let segment_count = self.reconciler.wheel().segment_count();
        let (raw_result, proof_reference) = match self.protocol.run(segment_count).await {
            Ok(outcome) => (outcome.raw_result, Some(outcome.reference)),
            Err(err) if err.allows_demo_fallback() => {
                warn!(wallet = %self.wallet, ?err, "computation unavailable, using demo spin");
                (self.demo_result(segment_count).await, None)
            }
            Err(err) => return Err(err.into()),
        };

        let outcome = self.reconciler.resolve(raw_result, proof_reference, mode);
        let now = self.clock.now();
        Ok(self.reconciler.reconcile(&mut self.ledger, now, outcome).await?)
    }

    async fn demo_result(&mut self, segment_count: u8) -> u64 {
        self.clock.sleep(self.demo_delay).await;
        self.rng.gen_range(1..=u64::from(segment_count))
    }

    /// Claim the flat credit bonus if the cooldown has elapsed.
    pub async fn claim(&mut self) -> Result<ClaimReport, SpinError> {
        let awarded = self.ledger.claim(self.clock.now())?;
        let update = PlayerUpdate::from_record(self.ledger.record());
        let persistence = match self.players.save(&self.wallet, &update).await {
            Ok(stored) => {
                self.ledger.replace_record(stored);
                Persistence::Saved
            }
            Err(err) => {
                warn!(wallet = %self.wallet, ?err, "claim may not have been saved");
                Persistence::Failed(err.to_string())
            }
        };
        info!(wallet = %self.wallet, awarded, balance = self.ledger.credits(), "claimed credits");
        Ok(ClaimReport {
            awarded,
            new_balance: self.ledger.credits(),
            persistence,
        })
    }

    /// Change the display name; the ranking shows it on the next query.
    pub async fn rename(&mut self, name: &str) -> Result<String, SpinError> {
        let username = normalize_username(name)?;
        let stored = self
            .players
            .save(&self.wallet, &PlayerUpdate::username(username.clone()))
            .await?;
        self.ledger.set_username(stored.username);
        info!(wallet = %self.wallet, %username, "renamed player");
        Ok(username)
    }

    pub async fn leaderboard(&self) -> Result<Vec<RankingEntry>, SpinError> {
        Ok(self.rankings.top_n(self.leaderboard_size).await?)
    }

    pub async fn search(&self, term: &str) -> Result<Vec<RankingEntry>, SpinError> {
        Ok(self.rankings.search(term, self.search_limit).await?)
    }

    /// This wallet's ranking entry, if it has one.
    pub async fn standing(&self) -> Result<Option<RankingEntry>, SpinError> {
        Ok(self.rankings.entry_for(&self.wallet).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        computation::{MockNetwork, MockScript},
        store::MemoryBackend,
    };
    use chrono::{TimeDelta, TimeZone, Utc};

    type TestSession = Session<MemoryBackend, MockNetwork, ProgramAddressing, ManualClock>;

    async fn connect(script: MockScript) -> (MemoryBackend, MockNetwork, ManualClock, TestSession) {
        let backend = MemoryBackend::default();
        let network = MockNetwork::new(script);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 6, 10, 0, 0).unwrap());
        let session = Session::connect(
            "W1",
            backend.clone(),
            network.clone(),
            ProgramAddressing::new([3u8; 32], 0, "spin_wheel".to_string()),
            clock.clone(),
            SessionSettings {
                explorer_url: Some(Url::parse("https://explorer.test").unwrap()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        (backend, network, clock, session)
    }

    #[tokio::test]
    async fn winning_spin_updates_balance_usage_and_ranking() {
        let (backend, _, _, mut session) = connect(MockScript {
            raw_result: 1,
            ..Default::default()
        })
        .await;
        assert_eq!(session.ledger().credits(), 100);
        assert_eq!(session.ledger().spins_used_today(), 0);

        let report = session.spin(SpinMode::Daily).await.unwrap();
        assert_eq!(report.new_balance, 300);
        assert_eq!(session.ledger().spins_used_today(), 1);
        assert!(!report.is_demo());
        assert!(report.proof_link.unwrap().starts_with("https://explorer.test/tx/sig-"));
        assert_eq!(backend.position("W1").await.unwrap(), Some((0, 300)));
        assert!(!session.is_spinning());
        assert_eq!(*session.phases().borrow(), SpinPhase::Idle);
    }

    #[tokio::test]
    async fn losing_spin_drops_to_twenty() {
        let (_, _, _, mut session) = connect(MockScript {
            raw_result: 4,
            ..Default::default()
        })
        .await;
        let report = session.spin(SpinMode::Daily).await.unwrap();
        assert_eq!(report.new_balance, 20);
        assert_eq!(report.credit_delta, -80);
    }

    #[tokio::test]
    async fn practice_spins_are_ledger_invisible() {
        let (backend, network, _, mut session) = connect(MockScript::default()).await;
        let writes = backend.player_writes();
        for raw_result in 1..=8 {
            network.script(MockScript {
                raw_result,
                ..Default::default()
            });
            let report = session.spin(SpinMode::Practice).await.unwrap();
            assert_eq!(report.new_balance, 100);
            assert_eq!(report.persistence, Persistence::Skipped);
        }
        assert_eq!(session.ledger().spins_left(), 5);
        assert_eq!(backend.player_writes(), writes);
        assert!(session.leaderboard().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sixth_daily_spin_is_refused_without_submission() {
        let (_, network, clock, mut session) = connect(MockScript::default()).await;
        for _ in 0..5 {
            session.spin(SpinMode::Daily).await.unwrap();
        }
        assert_eq!(session.ledger().spins_left(), 0);
        let submitted = network.submissions().len();

        let err = session.spin(SpinMode::Daily).await.unwrap_err();
        assert!(matches!(err, SpinError::Ledger(LedgerError::LimitExceeded { .. })));
        assert_eq!(network.submissions().len(), submitted);

        // Practice spins stay available.
        session.spin(SpinMode::Practice).await.unwrap();

        // The next UTC day restores the allowance.
        clock.advance(TimeDelta::days(1));
        session.spin(SpinMode::Daily).await.unwrap();
        assert_eq!(session.ledger().spins_left(), 4);
    }

    #[tokio::test]
    async fn timeout_falls_back_to_demo() {
        let (backend, _, clock, mut session) = connect(MockScript {
            never_finalize: true,
            ..Default::default()
        })
        .await;
        let report = session.spin(SpinMode::Daily).await.unwrap();
        assert!(report.is_demo());
        assert!(report.proof_link.is_none());
        assert!(report.segment_index < 8);
        assert_eq!(report.persistence, Persistence::Saved);
        assert_eq!(session.ledger().spins_used_today(), 1);
        assert_eq!(
            backend.get_player("W1").await.unwrap().unwrap().credits,
            report.new_balance
        );
        assert_eq!(clock.slept(), Duration::from_millis(121_500));
    }

    #[tokio::test]
    async fn setup_errors_do_not_fall_back() {
        let (_, _, _, mut session) = connect(MockScript {
            definition_missing: true,
            ..Default::default()
        })
        .await;
        let err = session.spin(SpinMode::Daily).await.unwrap_err();
        assert!(matches!(
            err,
            SpinError::Computation(ComputationError::SetupIncomplete { .. })
        ));
        assert_eq!(session.ledger().spins_left(), 5);
        assert_eq!(session.ledger().credits(), 100);
        assert!(!session.is_spinning());
    }

    #[tokio::test]
    async fn held_guard_refuses_overlapping_spins() {
        let (_, network, _, mut session) = connect(MockScript::default()).await;
        let guard = session.spin_guard();
        let permit = guard.try_acquire().unwrap();
        assert!(session.is_spinning());

        let err = session.spin(SpinMode::Daily).await.unwrap_err();
        assert!(matches!(err, SpinError::AlreadySpinning));
        assert!(network.submissions().is_empty());
        assert_eq!(session.ledger().spins_left(), 5);

        drop(permit);
        assert!(!session.is_spinning());
        session.spin(SpinMode::Daily).await.unwrap();
        assert!(guard.try_acquire().is_some());
    }

    #[tokio::test]
    async fn declined_spin_returns_to_idle() {
        let (_, _, _, mut session) = connect(MockScript {
            decline: true,
            ..Default::default()
        })
        .await;
        let err = session.spin(SpinMode::Daily).await.unwrap_err();
        assert!(matches!(err, SpinError::Computation(ComputationError::UserRejected)));
        assert_eq!(*session.phases().borrow(), SpinPhase::Idle);
        assert_eq!(session.ledger().spins_left(), 5);
    }

    #[tokio::test]
    async fn failed_save_keeps_playing() {
        let (backend, _, _, mut session) = connect(MockScript::default()).await;
        backend.set_fail_writes(true);
        let report = session.spin(SpinMode::Daily).await.unwrap();
        assert!(matches!(report.persistence, Persistence::Failed(_)));
        assert_eq!(session.ledger().credits(), 300);

        backend.set_fail_writes(false);
        let report = session.spin(SpinMode::Daily).await.unwrap();
        assert_eq!(report.persistence, Persistence::Saved);
        assert_eq!(backend.get_player("W1").await.unwrap().unwrap().credits, 900);
    }

    #[tokio::test]
    async fn claim_respects_cooldown() {
        let (backend, _, clock, mut session) = connect(MockScript::default()).await;
        let report = session.claim().await.unwrap();
        assert_eq!(report.awarded, 100);
        assert_eq!(report.new_balance, 200);
        assert_eq!(backend.get_player("W1").await.unwrap().unwrap().credits, 200);

        assert!(matches!(
            session.claim().await,
            Err(SpinError::Ledger(LedgerError::CooldownActive { .. }))
        ));
        clock.advance(TimeDelta::hours(24) + TimeDelta::seconds(1));
        assert_eq!(session.claim().await.unwrap().new_balance, 300);
    }

    #[tokio::test]
    async fn rename_shows_in_rankings() {
        let (_, _, _, mut session) = connect(MockScript::default()).await;
        session.spin(SpinMode::Daily).await.unwrap();
        assert_eq!(session.rename("  Lucky  ").await.unwrap(), "Lucky");
        assert_eq!(session.ledger().record().username, "Lucky");

        let found = session.search("luck").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rank, 1);
        assert!(matches!(
            session.rename("   ").await,
            Err(SpinError::InvalidName(PlayerInvariantError::NameEmpty))
        ));
        assert!(session.standing().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_day_is_idempotent() {
        let (backend, _, clock, mut session) = connect(MockScript::default()).await;
        session.spin(SpinMode::Daily).await.unwrap();
        assert!(!session.refresh_day().await);

        clock.advance(TimeDelta::days(1));
        assert!(session.refresh_day().await);
        let writes = backend.player_writes();
        assert!(!session.refresh_day().await);
        assert_eq!(backend.player_writes(), writes);
        assert_eq!(session.ledger().spins_left(), 5);
    }
}
