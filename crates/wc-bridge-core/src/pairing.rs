//! Pairing negotiation: pair, wait for the proposal, let the user pick a
//! wallet and decide, then approve and wait for settlement.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::callback::bridge;
use crate::domain::{RejectParams, Session, SettlementEvent, WalletId};
use crate::error::WcError;
use crate::events::EventHub;
use crate::ports::{SignClient, WalletProvider};
use crate::proposal::{SessionForApproval, SessionProposal};
use crate::sessions::SessionStore;

const STATE_BUFFER: usize = 16;
const REJECT_REASON: &str = "User rejected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingState {
    Loading,
    Proposal(SessionProposal),
    Approving(ApprovingState),
    Error(WcError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovingState {
    Loading(SessionForApproval),
    Result {
        approval: SessionForApproval,
        outcome: Result<Session, WcError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalAction {
    Approve(SessionForApproval),
    Reject,
}

#[derive(Clone)]
pub struct PairingCoordinator {
    client: Arc<dyn SignClient>,
    hub: Arc<EventHub>,
    store: Arc<SessionStore>,
    wallets: Arc<dyn WalletProvider>,
    denylist: Arc<Vec<String>>,
}

impl PairingCoordinator {
    pub fn new(
        client: Arc<dyn SignClient>,
        hub: Arc<EventHub>,
        store: Arc<SessionStore>,
        wallets: Arc<dyn WalletProvider>,
        denylist: Vec<String>,
    ) -> Self {
        Self {
            client,
            hub,
            store,
            wallets,
            denylist: Arc::new(
                denylist
                    .iter()
                    .map(|n| n.trim().to_lowercase())
                    .collect(),
            ),
        }
    }

    /// Starts one pairing attempt. Dropping the returned flow cancels it.
    pub fn pair_flow(&self, uri: impl Into<String>) -> PairingFlow {
        let (states_tx, states) = mpsc::channel(STATE_BUFFER);
        let (wallet_tx, wallet_rx) = mpsc::unbounded_channel();
        let (account_tx, account_rx) = mpsc::unbounded_channel();
        let (action_tx, action_rx) = mpsc::unbounded_channel();

        let attempt = Attempt {
            coordinator: self.clone(),
            uri: uri.into(),
            out: states_tx,
            wallet_rx,
            account_rx,
            action_rx,
        };
        let task = tokio::spawn(attempt.run());

        PairingFlow {
            states,
            wallet_tx,
            account_tx,
            action_tx,
            task,
        }
    }

    fn is_denied(&self, name: &str) -> bool {
        let name = name.trim().to_lowercase();
        self.denylist.iter().any(|d| *d == name)
    }
}

/// Handle to a running pairing attempt: its state stream plus the user's
/// inputs.
pub struct PairingFlow {
    states: mpsc::Receiver<PairingState>,
    wallet_tx: mpsc::UnboundedSender<WalletId>,
    account_tx: mpsc::UnboundedSender<String>,
    action_tx: mpsc::UnboundedSender<TerminalAction>,
    task: JoinHandle<()>,
}

impl PairingFlow {
    /// `None` once the attempt has finished.
    pub async fn next(&mut self) -> Option<PairingState> {
        self.states.recv().await
    }

    pub fn select_wallet(&self, wallet_id: WalletId) {
        let _ = self.wallet_tx.send(wallet_id);
    }

    pub fn select_account(&self, account: impl Into<String>) {
        let _ = self.account_tx.send(account.into());
    }

    pub fn approve(&self, approval: SessionForApproval) {
        let _ = self.action_tx.send(TerminalAction::Approve(approval));
    }

    pub fn reject(&self) {
        let _ = self.action_tx.send(TerminalAction::Reject);
    }

    /// Aborts the attempt. Same as dropping the flow.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PairingFlow {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Attempt {
    coordinator: PairingCoordinator,
    uri: String,
    out: mpsc::Sender<PairingState>,
    wallet_rx: mpsc::UnboundedReceiver<WalletId>,
    account_rx: mpsc::UnboundedReceiver<String>,
    action_rx: mpsc::UnboundedReceiver<TerminalAction>,
}

impl Attempt {
    async fn run(mut self) {
        let c = self.coordinator.clone();

        c.hub.clear_proposal();
        if !self.emit(PairingState::Loading).await {
            return;
        }
        let uri = self.uri.clone();
        if let Err(e) = bridge(|done| c.client.pair(&uri, done)).await {
            warn!(error = %e, "pair command failed");
            self.emit(PairingState::Error(e.into())).await;
            return;
        }
        debug!("pair command accepted, waiting for proposal");

        let event = match c.hub.next_proposal().await {
            Ok(event) => event,
            Err(e) => {
                self.emit(PairingState::Error(e.into())).await;
                return;
            }
        };
        let dapp_name = event.proposal.metadata.name.clone();
        if c.is_denied(&dapp_name) {
            info!(dapp = %dapp_name, "proposal vetoed, dApp is denylisted");
            self.emit(PairingState::Error(WcError::UnsupportedDApp(dapp_name)))
                .await;
            return;
        }

        let mut proposal = match c.wallets.selected_wallet() {
            Ok(wallet) => SessionProposal::for_wallet(&event, wallet),
            Err(e) => {
                self.emit(PairingState::Error(e.into())).await;
                return;
            }
        };
        info!(dapp = %dapp_name, wallet_id = %proposal.wallet.id, "proposal received");
        if !self.emit(PairingState::Proposal(proposal.clone())).await {
            return;
        }

        let mut wallets_open = true;
        let mut accounts_open = true;
        let action = loop {
            tokio::select! {
                selected = self.wallet_rx.recv(), if wallets_open => match selected {
                    Some(wallet_id) => match c.wallets.wallet(&wallet_id) {
                        Ok(wallet) => {
                            proposal = SessionProposal::for_wallet(&event, wallet);
                            debug!(%wallet_id, "wallet reselected");
                            if !self.emit(PairingState::Proposal(proposal.clone())).await {
                                return;
                            }
                        }
                        Err(e) => warn!(%wallet_id, error = %e, "wallet reselection ignored"),
                    },
                    None => wallets_open = false,
                },
                selected = self.account_rx.recv(), if accounts_open => match selected {
                    Some(account) => debug!(%account, "account selection is not supported yet"),
                    None => accounts_open = false,
                },
                action = self.action_rx.recv() => match action {
                    Some(action) => break action,
                    None => {
                        debug!("pairing abandoned before a decision");
                        return;
                    }
                },
            }
        };

        match action {
            TerminalAction::Reject => {
                let params = RejectParams {
                    proposer_public_key: proposal.raw.proposer_public_key.clone(),
                    reason: REJECT_REASON.to_owned(),
                };
                match bridge(|done| c.client.reject_session(params, done)).await {
                    Ok(()) => info!(dapp = %dapp_name, "proposal rejected"),
                    Err(e) => warn!(dapp = %dapp_name, error = %e, "reject command failed"),
                }
            }
            TerminalAction::Approve(approval) => self.approve(approval).await,
        }
    }

    async fn approve(&self, approval: SessionForApproval) {
        let c = &self.coordinator;
        c.hub.clear_settlement();
        if !self
            .emit(PairingState::Approving(ApprovingState::Loading(
                approval.clone(),
            )))
            .await
        {
            return;
        }

        let outcome = self.settle(&approval).await;
        if let Ok(session) = &outcome {
            info!(topic = %session.topic, wallet_id = %session.wallet_id, "session settled");
        }
        self.emit(PairingState::Approving(ApprovingState::Result {
            approval,
            outcome,
        }))
        .await;
    }

    async fn settle(&self, approval: &SessionForApproval) -> Result<Session, WcError> {
        let c = &self.coordinator;
        let params = approval.params()?;
        bridge(|done| c.client.approve_session(params, done)).await?;
        match c.hub.next_settlement().await? {
            SettlementEvent::Failed(message) => {
                warn!(%message, "session settlement failed");
                Err(WcError::ExternalApproval(message))
            }
            SettlementEvent::Settled(raw) => {
                let wallet_id = approval.wallet_id().clone();
                let session = Session::new(wallet_id.clone(), raw);
                c.store.save(&wallet_id, session.clone());
                Ok(session)
            }
        }
    }

    /// `false` once nobody is listening any more.
    async fn emit(&self, state: PairingState) -> bool {
        self.out.send(state).await.is_ok()
    }
}
