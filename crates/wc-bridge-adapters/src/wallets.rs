use std::sync::{Arc, Mutex};

use wc_bridge_core::{PortError, Wallet, WalletId, WalletProvider};

/// Fixed wallet list with a switchable selection. The first wallet starts
/// selected.
#[derive(Debug, Clone)]
pub struct StaticWalletProvider {
    inner: Arc<Mutex<WalletState>>,
}

#[derive(Debug)]
struct WalletState {
    wallets: Vec<Wallet>,
    selected: Option<WalletId>,
}

impl StaticWalletProvider {
    pub fn new(wallets: Vec<Wallet>) -> Self {
        let selected = wallets.first().map(|w| w.id.clone());
        Self {
            inner: Arc::new(Mutex::new(WalletState { wallets, selected })),
        }
    }

    pub fn select(&self, id: &WalletId) -> Result<(), PortError> {
        let mut g = self.lock()?;
        if !g.wallets.iter().any(|w| &w.id == id) {
            return Err(PortError::NotFound(format!("wallet not found: {id}")));
        }
        g.selected = Some(id.clone());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, WalletState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("wallet lock poisoned: {e}")))
    }
}

impl WalletProvider for StaticWalletProvider {
    fn selected_wallet(&self) -> Result<Wallet, PortError> {
        let g = self.lock()?;
        let id = g
            .selected
            .as_ref()
            .ok_or_else(|| PortError::NotFound("no wallet selected".to_owned()))?;
        g.wallets
            .iter()
            .find(|w| &w.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("wallet not found: {id}")))
    }

    fn wallets(&self) -> Result<Vec<Wallet>, PortError> {
        Ok(self.lock()?.wallets.clone())
    }
}
