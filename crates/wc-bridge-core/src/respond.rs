use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::callback::bridge;
use crate::domain::{RpcResponse, SessionRequest};
use crate::ports::{PortError, SignClient};

/// WalletConnect sign error codes.
pub const USER_REJECTED: i64 = 5000;
pub const UNSUPPORTED_METHODS: i64 = 5101;

/// Sends JSON-RPC results and errors back to the dApp.
#[derive(Clone)]
pub struct RespondService {
    client: Arc<dyn SignClient>,
}

impl RespondService {
    pub fn new(client: Arc<dyn SignClient>) -> Self {
        Self { client }
    }

    pub async fn respond(&self, request: &SessionRequest, result: Value) -> Result<(), PortError> {
        let response = RpcResponse::Result {
            topic: request.topic.clone(),
            id: request.id,
            result,
        };
        bridge(|done| self.client.respond(response, done)).await?;
        debug!(request_id = request.id, topic = %request.topic, "request answered");
        Ok(())
    }

    pub async fn reject(&self, request: &SessionRequest, message: &str) -> Result<(), PortError> {
        self.reject_with(request, USER_REJECTED, message).await
    }

    pub async fn reject_with(
        &self,
        request: &SessionRequest,
        code: i64,
        message: &str,
    ) -> Result<(), PortError> {
        let response = RpcResponse::Error {
            topic: request.topic.clone(),
            id: request.id,
            code,
            message: message.to_owned(),
        };
        bridge(|done| self.client.respond(response, done)).await?;
        debug!(request_id = request.id, code, "request rejected");
        Ok(())
    }
}
