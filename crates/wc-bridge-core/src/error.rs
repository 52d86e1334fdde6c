use thiserror::Error;

use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WcError {
    #[error("unsupported dApp: {0}")]
    UnsupportedDApp(String),
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),
    #[error("session not found for topic {0}")]
    SessionNotFound(String),
    #[error("session approval failed: {0}")]
    ExternalApproval(String),
    #[error("signing failed: {0}")]
    Signing(PortError),
    #[error("{0}")]
    Transport(PortError),
    #[error("sign flow ended without a result")]
    UnexpectedTermination,
}

impl From<PortError> for WcError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::Signing(_) => Self::Signing(e),
            other => Self::Transport(other),
        }
    }
}
