use alloy::primitives::Bytes;
use async_trait::async_trait;
use thiserror::Error;

use crate::callback::Completion;
use crate::domain::{
    ApproveParams, RejectParams, RpcResponse, SessionRequest, SessionsByWallet, Signable,
    SigningTarget, VerifyContext, Wallet, WalletId,
};
use crate::security::SecurityVerdict;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("policy error: {0}")]
    Policy(String),
    #[error("signing error: {0}")]
    Signing(String),
    #[error("cancelled")]
    Cancelled,
}

/// Command surface of the pairing/session transport SDK.
///
/// Every command completes through the supplied [`Completion`]; the SDK may
/// invoke it from any thread, and only the first invocation counts.
pub trait SignClient: Send + Sync {
    fn pair(&self, uri: &str, done: Completion<()>);
    fn approve_session(&self, params: ApproveParams, done: Completion<()>);
    fn reject_session(&self, params: RejectParams, done: Completion<()>);
    fn respond(&self, response: RpcResponse, done: Completion<()>);
    fn disconnect(&self, topic: &str, done: Completion<()>);
}

pub trait SessionRepository: Send + Sync {
    fn load_all(&self) -> Result<SessionsByWallet, PortError>;
    fn store_all(&self, sessions: &SessionsByWallet) -> Result<(), PortError>;
}

pub trait WalletProvider: Send + Sync {
    fn selected_wallet(&self) -> Result<Wallet, PortError>;
    fn wallets(&self) -> Result<Vec<Wallet>, PortError>;

    fn wallet(&self, id: &WalletId) -> Result<Wallet, PortError> {
        self.wallets()?
            .into_iter()
            .find(|w| &w.id == id)
            .ok_or_else(|| PortError::NotFound(format!("wallet not found: {id}")))
    }
}

/// Chain-specific preparation and signing, backed by the hardware wallet.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Fills in whatever the chain needs before signing (fees, nonce).
    /// `None` means the payload cannot be prepared for this target.
    async fn prepare(
        &self,
        target: &SigningTarget,
        payload: Signable,
    ) -> Result<Option<Signable>, PortError> {
        let _ = target;
        Ok(Some(payload))
    }

    /// Returns one output per signable item: a signature for messages, the
    /// signed transaction for transactions, the broadcast hash when the
    /// transaction was also sent.
    async fn sign(
        &self,
        target: &SigningTarget,
        payload: &Signable,
    ) -> Result<Vec<Bytes>, PortError>;
}

#[async_trait]
pub trait SecurityScanner: Send + Sync {
    async fn scan(
        &self,
        request: &SessionRequest,
        verify: &VerifyContext,
    ) -> Result<SecurityVerdict, PortError>;
}
