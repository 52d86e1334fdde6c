//! Fan-out of unsolicited transport events.
//!
//! Proposal and settlement events are kept in latest-value slots so a
//! subscriber that arrives after the SDK fired still sees the event. Request
//! and deletion events are broadcast; lagging receivers skip to the newest.

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::domain::{DeletedSession, RawProposal, SessionRequest, SettlementEvent, VerifyContext};
use crate::ports::PortError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalEvent {
    pub proposal: RawProposal,
    pub verify: VerifyContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub request: SessionRequest,
    pub verify: VerifyContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    SessionProposal(ProposalEvent),
    SessionSettleResponse(SettlementEvent),
    SessionRequest(IncomingRequest),
    SessionDelete(DeletedSession),
}

#[derive(Debug)]
pub struct EventHub {
    proposals: watch::Sender<Option<ProposalEvent>>,
    settlements: watch::Sender<Option<SettlementEvent>>,
    requests: broadcast::Sender<IncomingRequest>,
    deletions: broadcast::Sender<DeletedSession>,
}

impl EventHub {
    pub fn new(buffer: usize) -> Self {
        let buffer = buffer.max(1);
        let (proposals, _) = watch::channel(None);
        let (settlements, _) = watch::channel(None);
        let (requests, _) = broadcast::channel(buffer);
        let (deletions, _) = broadcast::channel(buffer);
        Self {
            proposals,
            settlements,
            requests,
            deletions,
        }
    }

    /// Entry point for the SDK delegate.
    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::SessionProposal(e) => {
                debug!(pairing_topic = %e.proposal.pairing_topic, "session proposal received");
                self.proposals.send_replace(Some(e));
            }
            TransportEvent::SessionSettleResponse(e) => {
                debug!(settled = matches!(e, SettlementEvent::Settled(_)), "settle response received");
                self.settlements.send_replace(Some(e));
            }
            TransportEvent::SessionRequest(e) => {
                let request_id = e.request.id;
                if self.requests.send(e).is_err() {
                    debug!(request_id, "session request dropped, no router subscribed");
                }
            }
            TransportEvent::SessionDelete(e) => {
                let topic = e.topic.clone();
                if self.deletions.send(e).is_err() {
                    debug!(%topic, "session delete dropped, no listener subscribed");
                }
            }
        }
    }

    pub fn clear_proposal(&self) {
        self.proposals.send_replace(None);
    }

    pub fn clear_settlement(&self) {
        self.settlements.send_replace(None);
    }

    pub async fn next_proposal(&self) -> Result<ProposalEvent, PortError> {
        self.next_proposal_matching(|_| true).await
    }

    /// Waits for the first cached or future proposal accepted by `pred`.
    pub async fn next_proposal_matching<F>(&self, pred: F) -> Result<ProposalEvent, PortError>
    where
        F: Fn(&ProposalEvent) -> bool,
    {
        first_matching(&self.proposals, pred).await
    }

    pub async fn next_settlement(&self) -> Result<SettlementEvent, PortError> {
        first_matching(&self.settlements, |_| true).await
    }

    pub fn subscribe_requests(&self) -> broadcast::Receiver<IncomingRequest> {
        self.requests.subscribe()
    }

    pub fn subscribe_deletions(&self) -> broadcast::Receiver<DeletedSession> {
        self.deletions.subscribe()
    }
}

async fn first_matching<T, F>(slot: &watch::Sender<Option<T>>, pred: F) -> Result<T, PortError>
where
    T: Clone,
    F: Fn(&T) -> bool,
{
    // The receiver is dropped on return or when the caller's future is.
    let mut rx = slot.subscribe();
    let value = rx
        .wait_for(|v| v.as_ref().is_some_and(&pred))
        .await
        .map_err(|_| PortError::Transport("event source closed".to_owned()))?;
    value
        .clone()
        .ok_or_else(|| PortError::Transport("event slot emptied while reading".to_owned()))
}
