//! Per-chain request method handlers and their registry.

pub mod ethereum;
pub mod solana;

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use serde_json::Value;

use crate::domain::EthTransaction;
use crate::router::SignRequest;

pub use ethereum::EthereumMethods;
pub use solana::SolanaMethods;

/// Typed request method, one variant per supported chain operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WcMethod {
    EthSign {
        address: Address,
        message: Bytes,
    },
    PersonalSign {
        address: Address,
        message: Bytes,
    },
    EthSignTypedData {
        address: Address,
        typed_data: Value,
    },
    EthSignTransaction(EthTransaction),
    EthSendTransaction(EthTransaction),
    SolanaSignMessage {
        pubkey: String,
        message: Bytes,
    },
    SolanaSignTransaction {
        transaction: Bytes,
    },
    SolanaSignAllTransactions {
        transactions: Vec<Bytes>,
    },
    Unsupported {
        method: String,
    },
}

impl WcMethod {
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

pub trait MethodHandler: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_handle(&self, method: &str) -> bool;

    /// `None` when the parameters do not match the method's shape.
    fn deserialize(&self, method: &str, params: &Value) -> Option<WcMethod>;

    /// Chain-specific bootstrap run once the request is routed.
    fn handle(&self, request: &SignRequest) {
        let _ = request;
    }
}

/// Ordered handler set; the first handler that accepts a method wins.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    handlers: Vec<Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn MethodHandler>) -> Self {
        self.register(handler);
        self
    }

    pub fn register(&mut self, handler: Arc<dyn MethodHandler>) {
        self.handlers.push(handler);
    }

    pub fn resolve(&self, method: &str) -> Option<Arc<dyn MethodHandler>> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(method))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
