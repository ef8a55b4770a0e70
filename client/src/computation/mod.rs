//! Computation Submission Protocol.
//!
//! One spin attempt moves through `Idle -> Building -> Submitted -> Polling -> {Finalized |
//! TimedOut | Rejected}` and back to `Idle`. Every transition is published on a watch channel.

mod address;
mod cipher;
mod gateway;
#[cfg(any(test, feature = "mocks"))]
mod mocks;

pub use address::{Address, Addressing, ProgramAddressing, RequestAddresses};
pub use cipher::{CipherError, EncryptedResult, RequestKeys, RESULT_NONCE_LEN};
pub use gateway::{ConfiguredNetwork, GatewayNetwork, OfflineNetwork};
#[cfg(any(test, feature = "mocks"))]
pub use mocks::{MockNetwork, MockScript};

use crate::{clock::Clock, retry::RetryPolicy};
use rand::{rngs::OsRng, Rng};
use std::{future::Future, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Observable state of the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpinPhase {
    Idle,
    Building,
    Submitted { offset: u64 },
    Polling { offset: u64, attempt: u32 },
    Finalized { offset: u64 },
    TimedOut { offset: u64 },
    Rejected,
}

impl SpinPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finalized { .. } | Self::TimedOut { .. } | Self::Rejected
        )
    }
}

/// Failure of one computation attempt, classified for fallback decisions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComputationError {
    #[error("setup incomplete: {resource} account {address} does not exist")]
    SetupIncomplete {
        resource: &'static str,
        address: Address,
    },
    #[error("request rejected by the wallet signer")]
    UserRejected,
    #[error("network fault: {0}")]
    NetworkFault(String),
    #[error("computation not finalized after {attempts} attempts ({waited:?})")]
    Timeout { attempts: u32, waited: Duration },
    #[error("malformed computation result: {0}")]
    MalformedResult(String),
}

impl ComputationError {
    /// Whether the caller may substitute a local demo outcome.
    ///
    /// Only transient transport problems qualify. Misconfiguration, user cancellation and
    /// results that fail to decrypt are surfaced as-is.
    pub fn allows_demo_fallback(&self) -> bool {
        matches!(self, Self::NetworkFault(_) | Self::Timeout { .. })
    }
}

/// Error reported by a [ComputationNetwork] implementation.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("signer declined the request")]
    SignerDeclined,
    #[error("reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("network unavailable")]
    Offline,
}

/// Outbound request for one computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitRequest {
    pub offset: u64,
    pub segment_count: u8,
    pub public_key: [u8; 32],
    pub nonce: u128,
    pub addresses: RequestAddresses,
}

/// Result resource as fetched from the network, still encrypted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizedComputation {
    /// Result nonce followed by ciphertext.
    pub payload: Vec<u8>,
    /// Transaction reference usable as a proof link.
    pub reference: String,
}

/// Decrypted outcome of a finalized computation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComputationOutcome {
    pub offset: u64,
    /// 1-based segment number as produced by the MXE.
    pub raw_result: u64,
    pub reference: String,
}

/// Remote side of the protocol.
pub trait ComputationNetwork: Clone + Send + Sync + 'static {
    fn account_exists(
        &self,
        address: &Address,
    ) -> impl Future<Output = Result<bool, NetworkError>> + Send;

    /// X25519 public key published by the MXE account, if it exists.
    fn mxe_public_key(
        &self,
        mxe: &Address,
    ) -> impl Future<Output = Result<Option<[u8; 32]>, NetworkError>> + Send;

    /// Submit the request; returns the transaction signature.
    fn submit(
        &self,
        request: &SubmitRequest,
    ) -> impl Future<Output = Result<String, NetworkError>> + Send;

    /// Fetch the result resource for `computation`, or `None` while it has not materialized.
    fn poll(
        &self,
        computation: &Address,
    ) -> impl Future<Output = Result<Option<FinalizedComputation>, NetworkError>> + Send;
}

fn classify(err: NetworkError) -> ComputationError {
    match err {
        NetworkError::SignerDeclined => ComputationError::UserRejected,
        other => ComputationError::NetworkFault(other.to_string()),
    }
}

/// Drives one computation at a time through the state machine.
pub struct ComputationProtocol<N, A, C> {
    network: N,
    addressing: A,
    clock: C,
    retry: RetryPolicy,
    phase: watch::Sender<SpinPhase>,
}

impl<N: ComputationNetwork, A: Addressing, C: Clock> ComputationProtocol<N, A, C> {
    pub fn new(network: N, addressing: A, clock: C, retry: RetryPolicy) -> Self {
        let (phase, _) = watch::channel(SpinPhase::Idle);
        Self {
            network,
            addressing,
            clock,
            retry,
            phase,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SpinPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SpinPhase {
        *self.phase.borrow()
    }

    /// Return to `Idle` once the caller has consumed the terminal phase.
    pub fn reset(&self) {
        self.set(SpinPhase::Idle);
    }

    fn set(&self, phase: SpinPhase) {
        self.phase.send_replace(phase);
    }

    /// Run one attempt for a wheel of `segment_count` segments.
    ///
    /// Leaves the phase at its terminal value; call [ComputationProtocol::reset] afterwards.
    pub async fn run(&self, segment_count: u8) -> Result<ComputationOutcome, ComputationError> {
        self.set(SpinPhase::Building);
        let offset: u64 = OsRng.gen();
        let addresses = self.addressing.derive(offset);
        let keys = RequestKeys::generate();

        let mxe_public_key = match self.check_setup(&addresses).await {
            Ok(key) => key,
            Err(err) => return Err(self.reject(offset, err)),
        };

        let request = SubmitRequest {
            offset,
            segment_count,
            public_key: keys.public_key(),
            nonce: keys.nonce(),
            addresses,
        };
        let signature = match self.network.submit(&request).await {
            Ok(signature) => signature,
            Err(err) => return Err(self.reject(offset, classify(err))),
        };
        self.set(SpinPhase::Submitted { offset });
        info!(offset, %signature, segment_count, "submitted computation");

        let finalized = self.await_result(offset, &request.addresses.computation).await?;
        let raw_result = EncryptedResult::from_bytes(&finalized.payload)
            .and_then(|payload| keys.open(mxe_public_key, &payload))
            .map_err(|err| self.reject(offset, ComputationError::MalformedResult(err.to_string())))?;

        self.set(SpinPhase::Finalized { offset });
        info!(offset, raw_result, reference = %finalized.reference, "computation finalized");
        Ok(ComputationOutcome {
            offset,
            raw_result,
            reference: finalized.reference,
        })
    }

    async fn check_setup(&self, addresses: &RequestAddresses) -> Result<[u8; 32], ComputationError> {
        if !self
            .network
            .account_exists(&addresses.definition)
            .await
            .map_err(classify)?
        {
            return Err(ComputationError::SetupIncomplete {
                resource: "computation definition",
                address: addresses.definition,
            });
        }
        self.network
            .mxe_public_key(&addresses.mxe)
            .await
            .map_err(classify)?
            .ok_or(ComputationError::SetupIncomplete {
                resource: "mxe",
                address: addresses.mxe,
            })
    }

    fn reject(&self, offset: u64, err: ComputationError) -> ComputationError {
        self.set(SpinPhase::Rejected);
        match &err {
            ComputationError::SetupIncomplete { .. } | ComputationError::MalformedResult(_) => {
                error!(offset, ?err, "computation failed")
            }
            _ => warn!(offset, ?err, "computation rejected"),
        }
        err
    }

    async fn await_result(
        &self,
        offset: u64,
        computation: &Address,
    ) -> Result<FinalizedComputation, ComputationError> {
        let RetryPolicy {
            max_attempts,
            interval,
        } = self.retry;
        for attempt in 1..=max_attempts {
            self.clock.sleep(interval).await;
            self.set(SpinPhase::Polling { offset, attempt });
            match self.network.poll(computation).await {
                Ok(Some(finalized)) => return Ok(finalized),
                Ok(None) => debug!(offset, attempt, "computation pending"),
                Err(err) => warn!(offset, attempt, ?err, "poll failed"),
            }
        }

        self.set(SpinPhase::TimedOut { offset });
        warn!(offset, attempts = max_attempts, "computation timed out");
        Err(ComputationError::Timeout {
            attempts: max_attempts,
            waited: self.retry.ceiling(),
        })
    }
}
