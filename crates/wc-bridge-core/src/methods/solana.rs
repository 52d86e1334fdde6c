use alloy::primitives::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;

use super::{MethodHandler, WcMethod};

pub const SOLANA_SIGN_MESSAGE: &str = "solana_signMessage";
pub const SOLANA_SIGN_TRANSACTION: &str = "solana_signTransaction";
pub const SOLANA_SIGN_ALL_TRANSACTIONS: &str = "solana_signAllTransactions";

/// `solana` methods. Messages arrive base58 encoded, transactions base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolanaMethods;

impl MethodHandler for SolanaMethods {
    fn name(&self) -> &'static str {
        "solana"
    }

    fn can_handle(&self, method: &str) -> bool {
        matches!(
            method,
            SOLANA_SIGN_MESSAGE | SOLANA_SIGN_TRANSACTION | SOLANA_SIGN_ALL_TRANSACTIONS
        )
    }

    fn deserialize(&self, method: &str, params: &Value) -> Option<WcMethod> {
        match method {
            SOLANA_SIGN_MESSAGE => {
                let message = params.get("message")?.as_str()?;
                Some(WcMethod::SolanaSignMessage {
                    pubkey: params.get("pubkey")?.as_str()?.to_owned(),
                    message: Bytes::from(bs58::decode(message).into_vec().ok()?),
                })
            }
            SOLANA_SIGN_TRANSACTION => Some(WcMethod::SolanaSignTransaction {
                transaction: decode_transaction(params.get("transaction")?)?,
            }),
            SOLANA_SIGN_ALL_TRANSACTIONS => {
                let transactions = params
                    .get("transactions")?
                    .as_array()?
                    .iter()
                    .map(decode_transaction)
                    .collect::<Option<Vec<_>>>()?;
                if transactions.is_empty() {
                    return None;
                }
                Some(WcMethod::SolanaSignAllTransactions { transactions })
            }
            _ => None,
        }
    }
}

fn decode_transaction(value: &Value) -> Option<Bytes> {
    STANDARD.decode(value.as_str()?).ok().map(Bytes::from)
}
