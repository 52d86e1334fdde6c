use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use serde_json::Value;

use super::{sign_with, single_output, SignContext, SignOutcome, SignStrategy};
use crate::domain::{EthTransaction, Signable};
use crate::error::WcError;
use crate::ports::TransactionSigner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthMessageModel {
    pub address: Address,
    pub signable: Signable,
}

/// `eth_sign`, `personal_sign` and typed data; answers with the `0x` signature.
pub struct EthMessageStrategy {
    signer: Arc<dyn TransactionSigner>,
}

impl EthMessageStrategy {
    pub fn new(signer: Arc<dyn TransactionSigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl SignStrategy<EthMessageModel> for EthMessageStrategy {
    async fn on_sign(
        &self,
        model: EthMessageModel,
        ctx: &SignContext,
    ) -> Option<(EthMessageModel, SignOutcome)> {
        let target = match ctx.target(model.address.to_string()) {
            Ok(target) => target,
            Err(e) => return Some(ctx.finish(model, Err(e)).await),
        };
        let signed = sign_with(self.signer.as_ref(), &target, &model.signable)
            .await
            .and_then(single_output)
            .map(|signature| Value::String(signature.to_string()));
        Some(ctx.finish(model, signed).await)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthTransactionModel {
    pub transaction: EthTransaction,
    /// `eth_sendTransaction` also broadcasts and answers with the hash.
    pub broadcast: bool,
}

impl EthTransactionModel {
    fn signable(&self) -> Signable {
        Signable::EvmTransaction {
            transaction: self.transaction.clone(),
            broadcast: self.broadcast,
        }
    }
}

/// Fee-aware transaction signing. The signer's preparation may rewrite the
/// transaction; the prepared model is what the result carries.
pub struct EthTransactionStrategy {
    signer: Arc<dyn TransactionSigner>,
}

impl EthTransactionStrategy {
    pub fn new(signer: Arc<dyn TransactionSigner>) -> Self {
        Self { signer }
    }
}

#[async_trait]
impl SignStrategy<EthTransactionModel> for EthTransactionStrategy {
    async fn on_sign(
        &self,
        model: EthTransactionModel,
        ctx: &SignContext,
    ) -> Option<(EthTransactionModel, SignOutcome)> {
        let target = match ctx.target(model.transaction.from.to_string()) {
            Ok(target) => target,
            Err(e) => return Some(ctx.finish(model, Err(e)).await),
        };
        let prepared = match self.signer.prepare(&target, model.signable()).await {
            Ok(prepared) => prepared?,
            Err(e) => return Some(ctx.finish(model, Err(WcError::Signing(e))).await),
        };
        let model = match &prepared {
            Signable::EvmTransaction { transaction, .. } => EthTransactionModel {
                transaction: transaction.clone(),
                broadcast: model.broadcast,
            },
            _ => model,
        };
        let signed = sign_with(self.signer.as_ref(), &target, &prepared)
            .await
            .and_then(single_output)
            .map(|output| Value::String(output.to_string()));
        Some(ctx.finish(model, signed).await)
    }
}
