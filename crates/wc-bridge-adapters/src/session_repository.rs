use std::sync::{Arc, Mutex};

use wc_bridge_core::{PortError, SessionRepository, SessionsByWallet};

/// Process-local session persistence.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionRepository {
    inner: Arc<Mutex<RepositoryState>>,
}

#[derive(Debug, Default)]
struct RepositoryState {
    sessions: SessionsByWallet,
    writes: usize,
    fail_writes: bool,
}

impl InMemorySessionRepository {
    pub fn with_sessions(sessions: SessionsByWallet) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RepositoryState {
                sessions,
                ..RepositoryState::default()
            })),
        }
    }

    pub fn stored(&self) -> Result<SessionsByWallet, PortError> {
        Ok(self.lock()?.sessions.clone())
    }

    pub fn writes(&self) -> Result<usize, PortError> {
        Ok(self.lock()?.writes)
    }

    pub fn set_fail_writes(&self, fail: bool) -> Result<(), PortError> {
        self.lock()?.fail_writes = fail;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, RepositoryState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("session repository lock poisoned: {e}")))
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn load_all(&self) -> Result<SessionsByWallet, PortError> {
        self.stored()
    }

    fn store_all(&self, sessions: &SessionsByWallet) -> Result<(), PortError> {
        let mut g = self.lock()?;
        if g.fail_writes {
            return Err(PortError::Transport("session storage unavailable".to_owned()));
        }
        g.sessions = sessions.clone();
        g.writes += 1;
        Ok(())
    }
}
