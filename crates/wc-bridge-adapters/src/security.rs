use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use wc_bridge_core::domain::{Validation, VerifyContext};
use wc_bridge_core::{PortError, SecurityScanner, SecurityVerdict, SessionRequest};

/// Verdicts derived from the transport's verify context alone.
#[derive(Debug, Clone, Default)]
pub struct StaticSecurityScanner {
    offline: Arc<AtomicBool>,
}

impl StaticSecurityScanner {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl SecurityScanner for StaticSecurityScanner {
    async fn scan(
        &self,
        _request: &SessionRequest,
        verify: &VerifyContext,
    ) -> Result<SecurityVerdict, PortError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Transport("security service unreachable".to_owned()));
        }
        Ok(if verify.is_scam {
            SecurityVerdict::Malicious(format!("{} is a known scam origin", verify.origin))
        } else if verify.validation == Validation::Invalid {
            SecurityVerdict::Warning("domain verification failed".to_owned())
        } else {
            SecurityVerdict::Safe
        })
    }
}
