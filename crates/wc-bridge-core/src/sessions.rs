use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callback::bridge;
use crate::domain::{Session, SessionsByWallet, WalletId};
use crate::error::WcError;
use crate::events::EventHub;
use crate::ports::{SessionRepository, SignClient};

/// Authoritative registry of settled sessions, grouped by wallet.
///
/// Topics are unique across the whole store. Subscribers get the latest
/// snapshot on subscribe and are only woken when a write changed it.
pub struct SessionStore {
    snapshot: watch::Sender<SessionsByWallet>,
    repository: Arc<dyn SessionRepository>,
    /// Held across mutate and persist so writes reach the repository in
    /// the order they were applied.
    writes: Mutex<()>,
}

impl SessionStore {
    pub fn new(repository: Arc<dyn SessionRepository>) -> Self {
        let restored = match repository.load_all() {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "failed to restore sessions, starting empty");
                SessionsByWallet::new()
            }
        };
        let (snapshot, _) = watch::channel(restored);
        Self {
            snapshot,
            repository,
            writes: Mutex::new(()),
        }
    }

    pub fn sessions_by_wallet(&self) -> watch::Receiver<SessionsByWallet> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SessionsByWallet {
        self.snapshot.borrow().clone()
    }

    pub fn sessions_for(&self, wallet_id: &WalletId) -> Vec<Session> {
        self.snapshot
            .borrow()
            .get(wallet_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all_sessions(&self) -> Vec<Session> {
        self.snapshot.borrow().values().flatten().cloned().collect()
    }

    pub fn find_by_topic(&self, topic: &str) -> Option<Session> {
        self.snapshot
            .borrow()
            .values()
            .flatten()
            .find(|s| s.topic == topic)
            .cloned()
    }

    /// Upserts by topic. A topic previously held by another wallet moves.
    pub fn save(&self, wallet_id: &WalletId, mut session: Session) {
        session.wallet_id = wallet_id.clone();
        let topic = session.topic.clone();
        let changed = self.write(|map| {
            let unchanged = map
                .get(wallet_id)
                .is_some_and(|list| list.iter().any(|s| *s == session));
            if unchanged {
                return false;
            }
            detach_topic(map, &topic);
            map.entry(wallet_id.clone()).or_default().push(session);
            true
        });
        if changed {
            debug!(%topic, %wallet_id, "session saved");
        }
    }

    pub fn remove(&self, wallet_id: &WalletId, session: &Session) {
        let changed = self.write(|map| {
            let Some(list) = map.get_mut(wallet_id) else {
                return false;
            };
            let before = list.len();
            list.retain(|s| s.topic != session.topic);
            let removed = list.len() != before;
            if list.is_empty() {
                map.remove(wallet_id);
            }
            removed
        });
        if changed {
            debug!(topic = %session.topic, %wallet_id, "session removed");
        }
    }

    /// Removes the session from whichever wallet owns it.
    pub fn remove_by_topic(&self, topic: &str) -> Option<Session> {
        let mut removed = None;
        self.write(|map| {
            removed = detach_topic(map, topic);
            removed.is_some()
        });
        if removed.is_some() {
            debug!(%topic, "session removed by topic");
        }
        removed
    }

    /// Applies `mutate` and writes the resulting snapshot through when it
    /// changed anything.
    fn write(&self, mutate: impl FnOnce(&mut SessionsByWallet) -> bool) -> bool {
        let _serial = match self.writes.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut written = None;
        let changed = self.snapshot.send_if_modified(|map| {
            let changed = mutate(map);
            if changed {
                written = Some(map.clone());
            }
            changed
        });
        if let Some(snapshot) = written {
            if let Err(e) = self.repository.store_all(&snapshot) {
                warn!(error = %e, "failed to persist sessions");
            }
        }
        changed
    }
}

fn detach_topic(map: &mut SessionsByWallet, topic: &str) -> Option<Session> {
    let mut removed = None;
    map.retain(|_, list| {
        if let Some(pos) = list.iter().position(|s| s.topic == topic) {
            removed = Some(list.remove(pos));
        }
        !list.is_empty()
    });
    removed
}

/// Disconnects sessions on user request and mirrors transport-side deletes.
#[derive(Clone)]
pub struct SessionLifecycle {
    client: Arc<dyn SignClient>,
    store: Arc<SessionStore>,
}

impl SessionLifecycle {
    pub fn new(client: Arc<dyn SignClient>, store: Arc<SessionStore>) -> Self {
        Self { client, store }
    }

    /// The session is dropped locally even when the transport call fails.
    pub async fn disconnect(&self, session: &Session) -> Result<(), WcError> {
        let outcome = bridge(|done| self.client.disconnect(&session.topic, done)).await;
        self.store.remove(&session.wallet_id, session);
        match outcome {
            Ok(()) => {
                info!(topic = %session.topic, "session disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(topic = %session.topic, error = %e, "transport disconnect failed");
                Err(e.into())
            }
        }
    }

    pub fn spawn_delete_listener(&self, hub: &EventHub) -> JoinHandle<()> {
        let mut deletions = hub.subscribe_deletions();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            loop {
                match deletions.recv().await {
                    Ok(deleted) => {
                        if store.remove_by_topic(&deleted.topic).is_some() {
                            info!(topic = %deleted.topic, "session deleted by peer");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session delete listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
