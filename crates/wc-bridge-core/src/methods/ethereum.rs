use std::sync::Arc;

use alloy::primitives::{hex, Address, Bytes};
use serde_json::Value;

use super::{MethodHandler, WcMethod};
use crate::domain::EthTransaction;
use crate::router::SignRequest;
use crate::security::SecurityChecks;

pub const ETH_SIGN: &str = "eth_sign";
pub const PERSONAL_SIGN: &str = "personal_sign";
pub const ETH_SIGN_TYPED_DATA: &str = "eth_signTypedData";
pub const ETH_SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";
pub const ETH_SIGN_TRANSACTION: &str = "eth_signTransaction";
pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";

pub const METHODS: [&str; 6] = [
    ETH_SIGN,
    PERSONAL_SIGN,
    ETH_SIGN_TYPED_DATA,
    ETH_SIGN_TYPED_DATA_V4,
    ETH_SIGN_TRANSACTION,
    ETH_SEND_TRANSACTION,
];

/// `eip155` methods. Routed requests get a security check seeded when a
/// checker is attached.
#[derive(Clone, Default)]
pub struct EthereumMethods {
    security: Option<Arc<SecurityChecks>>,
}

impl EthereumMethods {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_security(security: Arc<SecurityChecks>) -> Self {
        Self {
            security: Some(security),
        }
    }
}

impl MethodHandler for EthereumMethods {
    fn name(&self) -> &'static str {
        "eip155"
    }

    fn can_handle(&self, method: &str) -> bool {
        METHODS.contains(&method)
    }

    fn deserialize(&self, method: &str, params: &Value) -> Option<WcMethod> {
        let params = params.as_array()?;
        match method {
            ETH_SIGN => Some(WcMethod::EthSign {
                address: parse_address(params.first()?)?,
                message: parse_message(params.get(1)?)?,
            }),
            PERSONAL_SIGN => Some(WcMethod::PersonalSign {
                message: parse_message(params.first()?)?,
                address: parse_address(params.get(1)?)?,
            }),
            ETH_SIGN_TYPED_DATA | ETH_SIGN_TYPED_DATA_V4 => Some(WcMethod::EthSignTypedData {
                address: parse_address(params.first()?)?,
                typed_data: parse_typed_data(params.get(1)?)?,
            }),
            ETH_SIGN_TRANSACTION => Some(WcMethod::EthSignTransaction(parse_transaction(
                params.first()?,
            )?)),
            ETH_SEND_TRANSACTION => Some(WcMethod::EthSendTransaction(parse_transaction(
                params.first()?,
            )?)),
            _ => None,
        }
    }

    fn handle(&self, request: &SignRequest) {
        if let Some(security) = &self.security {
            security.start(&request.raw, &request.verify);
        }
    }
}

fn parse_address(value: &Value) -> Option<Address> {
    value.as_str()?.parse().ok()
}

/// Hex payloads are decoded; anything else is taken as UTF-8 text.
fn parse_message(value: &Value) -> Option<Bytes> {
    let raw = value.as_str()?;
    if let Some(stripped) = raw.strip_prefix("0x") {
        if let Ok(bytes) = hex::decode(stripped) {
            return Some(Bytes::from(bytes));
        }
    }
    Some(Bytes::copy_from_slice(raw.as_bytes()))
}

fn parse_typed_data(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(Value::is_object),
        Value::Object(_) => Some(value.clone()),
        _ => None,
    }
}

fn parse_transaction(value: &Value) -> Option<EthTransaction> {
    serde_json::from_value(value.clone()).ok()
}
