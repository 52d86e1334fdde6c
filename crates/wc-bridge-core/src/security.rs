use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::{SessionRequest, VerifyContext};
use crate::ports::SecurityScanner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityVerdict {
    Safe,
    Warning(String),
    Malicious(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityCheckState {
    Loading,
    Content(SecurityVerdict),
    Error(String),
}

/// Checks kept for requests that never reach a sign flow.
pub const MAX_TRACKED_CHECKS: usize = 256;

/// Advisory per-request security verdicts. Never gates signing.
///
/// At most [`MAX_TRACKED_CHECKS`] slots are kept; the oldest is evicted
/// first.
pub struct SecurityChecks {
    scanner: Arc<dyn SecurityScanner>,
    slots: Mutex<Slots>,
}

#[derive(Default)]
struct Slots {
    by_id: HashMap<u64, watch::Sender<SecurityCheckState>>,
    order: VecDeque<u64>,
}

impl Slots {
    fn insert(&mut self, id: u64, tx: watch::Sender<SecurityCheckState>) {
        while self.order.len() >= MAX_TRACKED_CHECKS {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.by_id.remove(&oldest);
            debug!(request_id = oldest, "security check evicted");
        }
        self.by_id.insert(id, tx);
        self.order.push_back(id);
    }

    fn remove(&mut self, id: u64) {
        if self.by_id.remove(&id).is_some() {
            self.order.retain(|tracked| *tracked != id);
        }
    }
}

impl SecurityChecks {
    pub fn new(scanner: Arc<dyn SecurityScanner>) -> Self {
        Self {
            scanner,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Starts a scan for the request; repeated calls reuse the running one.
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        request: &SessionRequest,
        verify: &VerifyContext,
    ) -> watch::Receiver<SecurityCheckState> {
        let mut slots = match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = slots.by_id.get(&request.id) {
            return existing.subscribe();
        }
        let (tx, rx) = watch::channel(SecurityCheckState::Loading);
        slots.insert(request.id, tx.clone());
        drop(slots);

        let scanner = Arc::clone(&self.scanner);
        let request = request.clone();
        let verify = verify.clone();
        tokio::spawn(async move {
            let state = match scanner.scan(&request, &verify).await {
                Ok(verdict) => {
                    debug!(request_id = request.id, ?verdict, "security check finished");
                    SecurityCheckState::Content(verdict)
                }
                Err(e) => {
                    warn!(request_id = request.id, error = %e, "security check failed");
                    SecurityCheckState::Error(e.to_string())
                }
            };
            tx.send_replace(state);
        });
        rx
    }

    pub fn verdicts(&self, request_id: u64) -> Option<watch::Receiver<SecurityCheckState>> {
        let slots = match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.by_id.get(&request_id).map(watch::Sender::subscribe)
    }

    pub fn forget(&self, request_id: u64) {
        let mut slots = match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.remove(request_id);
    }
}
