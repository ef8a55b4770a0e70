use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use spinwheel_client::{
    computation::ComputationError, ClientConfig, ConfiguredBackend, ConfiguredSession,
    Persistence, PlayerStore, SpinError, SpinReport, SystemClock, ValidatedConfig, WeeklyReset,
};
use spinwheel_types::{next_daily_reset, LedgerError, RankingEntry, SpinMode};
use std::{path::PathBuf, process::ExitCode};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "spinwheel", about = "Spin the wheel, claim credits and check the rankings.")]
struct Args {
    /// YAML configuration file (defaults apply when omitted).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wallet address of the player.
    #[arg(short, long)]
    wallet: Option<String>,

    /// Redis URL, overriding `store_url` from the config file.
    #[arg(long)]
    store_url: Option<String>,

    /// Computation gateway URL, overriding `gateway_url` from the config file.
    #[arg(long)]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show balance, spins left and ranking.
    Status,
    /// Daily spin that counts toward the leaderboard.
    Spin {
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
    /// Practice spin; never changes credits.
    Practice,
    /// Claim the daily credit bonus.
    Claim,
    /// Change the display name.
    Rename { name: String },
    /// Show the top of the leaderboard.
    Leaderboard,
    /// Search the leaderboard by name or wallet.
    Search { term: String },
    /// Zero every player's credits once per ISO week.
    WeeklyReset,
}

fn build_config(args: &Args) -> Result<ValidatedConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ClientConfig::from_yaml(&contents).context("failed to parse config")?
        }
        None => ClientConfig::default(),
    };
    if let Some(store_url) = &args.store_url {
        config.store_url = Some(store_url.clone());
    }
    if let Some(gateway_url) = &args.gateway_url {
        config.gateway_url = Some(gateway_url.clone());
    }
    config.validate().context("invalid config")
}

fn init_tracing(config: &ValidatedConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Message shown to the player for an expected failure, or `None` for unexpected ones.
fn user_message(err: &SpinError) -> Option<String> {
    match err {
        SpinError::AlreadySpinning => Some("A spin is already in progress.".to_string()),
        SpinError::Ledger(LedgerError::LimitExceeded { limit, resets_at }) => Some(format!(
            "All {limit} daily spins used. Spins reset at {}.",
            resets_at.format("%Y-%m-%d %H:%M UTC")
        )),
        SpinError::Ledger(LedgerError::CooldownActive { remaining_secs, .. }) => Some(format!(
            "Claim not ready yet: {}h {}m remaining.",
            remaining_secs / 3600,
            (remaining_secs % 3600) / 60
        )),
        SpinError::Computation(ComputationError::UserRejected) => {
            Some("Spin cancelled in the wallet.".to_string())
        }
        SpinError::Computation(ComputationError::SetupIncomplete { resource, .. }) => Some(format!(
            "The game is not set up on this network ({resource} missing). Contact the operator."
        )),
        SpinError::InvalidName(err) => Some(format!("Invalid name: {err}.")),
        _ => None,
    }
}

fn print_report(report: &SpinReport) {
    let kind = match report.mode {
        SpinMode::Daily => "spin",
        SpinMode::Practice => "practice spin",
    };
    println!(
        "{kind}: landed on {} ({:+} credits), balance {}, {} spins left",
        report.label, report.credit_delta, report.new_balance, report.spins_left
    );
    match (&report.proof_link, &report.proof_reference) {
        (Some(link), _) => println!("proof: {link}"),
        (None, Some(reference)) => println!("proof: {reference}"),
        (None, None) => println!("demo outcome (no proof available)"),
    }
    if let Persistence::Failed(reason) = &report.persistence {
        println!("warning: progress may not have been saved ({reason})");
    }
    if let Some(standing) = &report.standing {
        println!("rank #{} with {} credits", standing.rank, standing.credits);
    }
}

fn print_entries(entries: &[RankingEntry]) {
    if entries.is_empty() {
        println!("no players ranked yet");
        return;
    }
    for entry in entries {
        println!(
            "{:>4}  {:<32}  {:>12}  {}",
            entry.rank, entry.username, entry.credits, entry.wallet_address
        );
    }
}

async fn weekly_reset(config: &ValidatedConfig) -> Result<()> {
    let backend = ConfiguredBackend::from_url(config.store_url.as_deref(), &config.key_prefix)
        .context("failed to open store")?;
    let players = PlayerStore::new(backend, config.rules.clone(), SystemClock);
    match players
        .reset_all_credits_weekly()
        .await
        .context("weekly reset failed")?
    {
        WeeklyReset::AlreadyReset { week } => println!("already reset for {week}"),
        WeeklyReset::Completed {
            week,
            reset,
            failed,
        } => println!("reset {reset} players for {week} ({failed} failed)"),
    }
    Ok(())
}

async fn spin(session: &mut ConfiguredSession, mode: SpinMode, count: u32) -> Result<(), SpinError> {
    let mut phases = session.phases();
    let follower = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            let phase = *phases.borrow_and_update();
            if phase.is_terminal() {
                info!(?phase, "computation finished");
            } else {
                debug!(?phase, "spin phase");
            }
        }
    });
    let mut result = Ok(());
    for _ in 0..count {
        match session.spin(mode).await {
            Ok(report) => print_report(&report),
            Err(err) => {
                result = Err(err);
                break;
            }
        }
    }
    follower.abort();
    result
}

async fn run_session(config: &ValidatedConfig, wallet: &str, command: Command) -> Result<ExitCode> {
    let mut session = ConfiguredSession::from_config(config, wallet)
        .await
        .context("failed to connect session")?;
    let result = match command {
        Command::Status => {
            session.refresh_day().await;
            let ledger = session.ledger();
            println!("wallet:  {}", session.wallet());
            println!("name:    {}", ledger.record().username);
            println!("credits: {}", ledger.credits());
            println!(
                "spins:   {} of {} left (reset at {})",
                ledger.spins_left(),
                ledger.rules().daily_spin_limit,
                next_daily_reset(Utc::now()).format("%Y-%m-%d %H:%M UTC")
            );
            if let Some(available_at) = ledger.claim_available_at().filter(|at| *at > Utc::now()) {
                println!("claim:   available at {}", available_at.format("%Y-%m-%d %H:%M UTC"));
            } else {
                println!("claim:   available now");
            }
            match session.standing().await {
                Ok(Some(entry)) => println!("rank:    #{}", entry.rank),
                Ok(None) => println!("rank:    unranked"),
                Err(err) => return Err(err).context("failed to load ranking"),
            }
            Ok(())
        }
        Command::Spin { count } => spin(&mut session, SpinMode::Daily, count).await,
        Command::Practice => spin(&mut session, SpinMode::Practice, 1).await,
        Command::Claim => session.claim().await.map(|report| {
            println!("claimed {} credits, balance {}", report.awarded, report.new_balance);
            if let Persistence::Failed(reason) = report.persistence {
                println!("warning: claim may not have been saved ({reason})");
            }
        }),
        Command::Rename { name } => session
            .rename(&name)
            .await
            .map(|name| println!("renamed to {name}")),
        Command::Leaderboard => session.leaderboard().await.map(|entries| print_entries(&entries)),
        Command::Search { term } => session.search(&term).await.map(|entries| print_entries(&entries)),
        Command::WeeklyReset => return weekly_reset(config).await.map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => match user_message(&err) {
            Some(message) => {
                println!("{message}");
                Ok(ExitCode::FAILURE)
            }
            None => Err(err).context("operation failed"),
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse args
    let args = Args::parse();
    let config = build_config(&args)?;

    // Create logger
    init_tracing(&config);
    info!(store = ?config.store_url, gateway = ?config.gateway_url.as_ref().map(|url| url.as_str()), "starting");

    if let Command::WeeklyReset = args.command {
        weekly_reset(&config).await?;
        return Ok(ExitCode::SUCCESS);
    }
    let wallet = args
        .wallet
        .clone()
        .context("--wallet is required for this command")?;
    run_session(&config, &wallet, args.command).await
}
