//! Scripted in-process computation network.

use super::{
    cipher::seal_result, Address, ComputationNetwork, FinalizedComputation, NetworkError,
    SubmitRequest, RESULT_NONCE_LEN,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::{Arc, Mutex, MutexGuard};
use x25519_dalek::{PublicKey, StaticSecret};

/// Behaviour of a [MockNetwork].
#[derive(Clone, Debug)]
pub struct MockScript {
    /// 1-based result the MXE encrypts.
    pub raw_result: u64,
    /// Polls answered with "pending" before the result appears.
    pub pending_polls: u32,
    /// Polls answered with a transport error before the result appears.
    pub failing_polls: u32,
    pub definition_missing: bool,
    pub mxe_missing: bool,
    pub decline: bool,
    pub submit_fault: bool,
    pub never_finalize: bool,
    pub corrupt_result: bool,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            raw_result: 1,
            pending_polls: 0,
            failing_polls: 0,
            definition_missing: false,
            mxe_missing: false,
            decline: false,
            submit_fault: false,
            never_finalize: false,
            corrupt_result: false,
        }
    }
}

struct State {
    script: MockScript,
    submissions: Vec<SubmitRequest>,
    polls: u32,
}

/// Network whose MXE is a local X25519 key and whose answers follow a [MockScript].
#[derive(Clone)]
pub struct MockNetwork {
    mxe: StaticSecret,
    state: Arc<Mutex<State>>,
}

impl MockNetwork {
    pub fn new(script: MockScript) -> Self {
        Self {
            mxe: StaticSecret::random_from_rng(OsRng),
            state: Arc::new(Mutex::new(State {
                script,
                submissions: Vec::new(),
                polls: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Replace the script for subsequent calls and reset the poll counter.
    pub fn script(&self, script: MockScript) {
        let mut state = self.state();
        state.script = script;
        state.polls = 0;
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state().submissions.clone()
    }

    pub fn polls(&self) -> u32 {
        self.state().polls
    }
}

impl ComputationNetwork for MockNetwork {
    async fn account_exists(&self, _address: &Address) -> Result<bool, NetworkError> {
        Ok(!self.state().script.definition_missing)
    }

    async fn mxe_public_key(&self, _mxe: &Address) -> Result<Option<[u8; 32]>, NetworkError> {
        if self.state().script.mxe_missing {
            return Ok(None);
        }
        Ok(Some(PublicKey::from(&self.mxe).to_bytes()))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<String, NetworkError> {
        let mut state = self.state();
        if state.script.decline {
            return Err(NetworkError::SignerDeclined);
        }
        if state.script.submit_fault {
            return Err(NetworkError::Offline);
        }
        state.submissions.push(request.clone());
        Ok(format!("sig-{:016x}", request.offset))
    }

    async fn poll(&self, computation: &Address) -> Result<Option<FinalizedComputation>, NetworkError> {
        let mut state = self.state();
        state.polls += 1;
        let script = state.script.clone();
        if script.never_finalize || state.polls <= script.pending_polls {
            return Ok(None);
        }
        if state.polls <= script.pending_polls + script.failing_polls {
            return Err(NetworkError::UnexpectedResponse("gateway overloaded".to_string()));
        }
        let Some(request) = state
            .submissions
            .iter()
            .rev()
            .find(|request| request.addresses.computation == *computation)
        else {
            return Ok(None);
        };

        let shared = self.mxe.diffie_hellman(&PublicKey::from(request.public_key));
        let mut nonce = [0u8; RESULT_NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let mut payload = seal_result(&shared, nonce, script.raw_result).to_bytes();
        if script.corrupt_result {
            if let Some(last) = payload.last_mut() {
                *last ^= 0x01;
            }
        }
        Ok(Some(FinalizedComputation {
            payload,
            reference: format!("sig-{:016x}", request.offset),
        }))
    }
}
