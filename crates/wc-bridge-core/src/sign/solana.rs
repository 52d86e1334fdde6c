use std::sync::Arc;

use alloy::primitives::Bytes;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use super::{sign_with, single_output, SignContext, SignOutcome, SignStrategy};
use crate::domain::Signable;
use crate::error::WcError;
use crate::ports::{PortError, TransactionSigner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolanaPayload {
    Message { pubkey: String, message: Bytes },
    Transaction(Bytes),
    AllTransactions(Vec<Bytes>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolanaModel {
    pub payload: SolanaPayload,
}

pub struct SolanaStrategy {
    signer: Arc<dyn TransactionSigner>,
}

impl SolanaStrategy {
    pub fn new(signer: Arc<dyn TransactionSigner>) -> Self {
        Self { signer }
    }

    async fn sign_payload(&self, payload: &SolanaPayload, ctx: &SignContext) -> SignOutcome {
        match payload {
            SolanaPayload::Message { pubkey, message } => {
                let target = ctx.target(pubkey.clone())?;
                let signature = sign_with(
                    self.signer.as_ref(),
                    &target,
                    &Signable::SolanaMessage(message.clone()),
                )
                .await
                .and_then(single_output)?;
                Ok(json!({ "signature": bs58::encode(signature).into_string() }))
            }
            SolanaPayload::Transaction(transaction) => {
                let target = ctx.target(ctx.session_account()?)?;
                let signed = sign_with(
                    self.signer.as_ref(),
                    &target,
                    &Signable::SolanaTransactions(vec![transaction.clone()]),
                )
                .await
                .and_then(single_output)?;
                Ok(json!({ "transaction": STANDARD.encode(signed) }))
            }
            SolanaPayload::AllTransactions(transactions) => {
                let target = ctx.target(ctx.session_account()?)?;
                let signed = sign_with(
                    self.signer.as_ref(),
                    &target,
                    &Signable::SolanaTransactions(transactions.clone()),
                )
                .await?;
                if signed.len() != transactions.len() {
                    return Err(WcError::Signing(PortError::Signing(format!(
                        "signer returned {} of {} transactions",
                        signed.len(),
                        transactions.len()
                    ))));
                }
                let encoded: Vec<Value> = signed
                    .iter()
                    .map(|tx| Value::String(STANDARD.encode(tx)))
                    .collect();
                Ok(json!({ "transactions": encoded }))
            }
        }
    }
}

#[async_trait]
impl SignStrategy<SolanaModel> for SolanaStrategy {
    async fn on_sign(
        &self,
        model: SolanaModel,
        ctx: &SignContext,
    ) -> Option<(SolanaModel, SignOutcome)> {
        let signed = self.sign_payload(&model.payload, ctx).await;
        Some(ctx.finish(model, signed).await)
    }
}
