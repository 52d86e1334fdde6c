use std::sync::{Arc, Mutex};

use alloy::primitives::{keccak256, Bytes, U256};
use async_trait::async_trait;
use tokio::sync::watch;
use tracing::debug;

use wc_bridge_core::domain::{Signable, SigningTarget};
use wc_bridge_core::{PortError, TransactionSigner};

pub const DEFAULT_GAS: u64 = 21_000;
pub const DEFAULT_GAS_PRICE: u64 = 1_000_000_000;

/// Signer producing reproducible outputs from the payload and target.
///
/// EVM signatures are 65 bytes ending in `27`, Solana signatures 64 bytes.
/// A signed Solana transaction is its signature followed by the input.
#[derive(Debug, Clone)]
pub struct DeterministicSigner {
    state: Arc<Mutex<SignerState>>,
    gate: Arc<watch::Sender<Gate>>,
}

impl Default for DeterministicSigner {
    fn default() -> Self {
        let (gate, _) = watch::channel(Gate::default());
        Self {
            state: Arc::default(),
            gate: Arc::new(gate),
        }
    }
}

/// Holds `sign` calls until released, the way a device waits for the user.
#[derive(Debug, Clone, Copy, Default)]
struct Gate {
    held: bool,
    parked: usize,
}

#[derive(Debug, Default)]
struct SignerState {
    fail_with: Option<PortError>,
    refuse_prepare: bool,
    signed: Vec<(SigningTarget, Signable)>,
}

impl DeterministicSigner {
    /// Every later `sign` fails with `error` until cleared.
    pub fn fail_with(&self, error: Option<PortError>) -> Result<(), PortError> {
        self.lock()?.fail_with = error;
        Ok(())
    }

    /// Makes `prepare` report that nothing can be signed.
    pub fn refuse_prepare(&self, refuse: bool) -> Result<(), PortError> {
        self.lock()?.refuse_prepare = refuse;
        Ok(())
    }

    /// Later `sign` calls wait until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_modify(|g| g.held = true);
    }

    pub fn release(&self) {
        self.gate.send_modify(|g| g.held = false);
    }

    /// Waits until `count` `sign` calls have parked on the held gate.
    pub async fn wait_parked(&self, count: usize) {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|g| g.parked >= count).await;
    }

    pub fn signed(&self) -> Result<Vec<(SigningTarget, Signable)>, PortError> {
        Ok(self.lock()?.signed.clone())
    }

    pub fn evm_signature(target: &SigningTarget, payload: &[u8]) -> Bytes {
        let hash = seed_hash(target, payload);
        let mut sig = Vec::with_capacity(65);
        sig.extend_from_slice(hash.as_slice());
        sig.extend_from_slice(hash.as_slice());
        sig.push(27);
        Bytes::from(sig)
    }

    pub fn solana_signature(target: &SigningTarget, payload: &[u8]) -> Bytes {
        let hash = seed_hash(target, payload);
        let mut sig = Vec::with_capacity(64);
        sig.extend_from_slice(hash.as_slice());
        sig.extend_from_slice(hash.as_slice());
        Bytes::from(sig)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SignerState>, PortError> {
        self.state
            .lock()
            .map_err(|e| PortError::Transport(format!("signer lock poisoned: {e}")))
    }
}

fn seed_hash(target: &SigningTarget, payload: &[u8]) -> alloy::primitives::B256 {
    let mut seed = Vec::new();
    seed.extend_from_slice(target.chain_id.as_bytes());
    seed.extend_from_slice(target.address.to_lowercase().as_bytes());
    seed.extend_from_slice(payload);
    keccak256(seed)
}

fn evm_payload(payload: &Signable) -> Result<Vec<u8>, PortError> {
    match payload {
        Signable::Message(bytes) => Ok(bytes.to_vec()),
        Signable::TypedData(value) => serde_json::to_vec(value)
            .map_err(|e| PortError::Validation(format!("typed data not serializable: {e}"))),
        Signable::EvmTransaction { transaction, .. } => serde_json::to_vec(transaction)
            .map_err(|e| PortError::Validation(format!("transaction not serializable: {e}"))),
        other => Err(PortError::Validation(format!(
            "not an evm payload: {other:?}"
        ))),
    }
}

#[async_trait]
impl TransactionSigner for DeterministicSigner {
    async fn prepare(
        &self,
        target: &SigningTarget,
        payload: Signable,
    ) -> Result<Option<Signable>, PortError> {
        if self.lock()?.refuse_prepare {
            debug!(chain_id = %target.chain_id, "prepare refused");
            return Ok(None);
        }
        Ok(Some(match payload {
            Signable::EvmTransaction {
                mut transaction,
                broadcast,
            } => {
                transaction.gas.get_or_insert(U256::from(DEFAULT_GAS));
                transaction
                    .gas_price
                    .get_or_insert(U256::from(DEFAULT_GAS_PRICE));
                transaction.nonce.get_or_insert(U256::ZERO);
                Signable::EvmTransaction {
                    transaction,
                    broadcast,
                }
            }
            other => other,
        }))
    }

    async fn sign(
        &self,
        target: &SigningTarget,
        payload: &Signable,
    ) -> Result<Vec<Bytes>, PortError> {
        let mut gate = self.gate.subscribe();
        let held = gate.borrow().held;
        if held {
            self.gate.send_modify(|g| g.parked += 1);
            debug!(chain_id = %target.chain_id, "signer held");
            let _ = gate.wait_for(|g| !g.held).await;
        }
        {
            let mut g = self.lock()?;
            if let Some(e) = g.fail_with.clone() {
                return Err(e);
            }
            g.signed.push((target.clone(), payload.clone()));
        }

        let outputs = match payload {
            Signable::SolanaMessage(message) => vec![Self::solana_signature(target, message)],
            Signable::SolanaTransactions(transactions) => transactions
                .iter()
                .map(|tx| {
                    let mut signed = Self::solana_signature(target, tx).to_vec();
                    signed.extend_from_slice(tx);
                    Bytes::from(signed)
                })
                .collect(),
            Signable::EvmTransaction {
                broadcast: true, ..
            } => {
                let signature = Self::evm_signature(target, &evm_payload(payload)?);
                vec![Bytes::from(keccak256(signature).to_vec())]
            }
            evm => vec![Self::evm_signature(target, &evm_payload(evm)?)],
        };
        debug!(chain_id = %target.chain_id, outputs = outputs.len(), "payload signed");
        Ok(outputs)
    }
}
