use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, warn};

use wc_bridge_core::callback::Completion;
use wc_bridge_core::domain::{ApproveParams, RejectParams, RpcResponse, SettlementEvent};
use wc_bridge_core::events::{ProposalEvent, TransportEvent};
use wc_bridge_core::{EventHub, PortError, SignClient};

/// A command as the transport received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Pair { uri: String },
    Approve(ApproveParams),
    Reject(RejectParams),
    Respond(RpcResponse),
    Disconnect { topic: String },
}

impl ClientCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Pair { .. } => CommandKind::Pair,
            Self::Approve(_) => CommandKind::Approve,
            Self::Reject(_) => CommandKind::Reject,
            Self::Respond(_) => CommandKind::Respond,
            Self::Disconnect { .. } => CommandKind::Disconnect,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Pair,
    Approve,
    Reject,
    Respond,
    Disconnect,
}

/// How the transport completes the next command of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Succeed,
    Fail(PortError),
    /// Invokes the callback twice, success first.
    SucceedTwice,
    /// Keeps the callback without invoking it until released.
    Hang,
    /// Drops the callback without invoking it.
    Drop,
}

/// Loopback transport: records commands, completes them per script and
/// feeds scripted events back through the hub.
#[derive(Clone)]
pub struct InMemorySignClient {
    hub: Arc<EventHub>,
    log: Arc<watch::Sender<Vec<ClientCommand>>>,
    inner: Arc<Mutex<ClientState>>,
}

#[derive(Default)]
struct ClientState {
    replies: HashMap<CommandKind, VecDeque<Reply>>,
    proposals: VecDeque<ProposalEvent>,
    settlements: VecDeque<SettlementEvent>,
    held: Vec<Completion<()>>,
}

impl InMemorySignClient {
    pub fn new(hub: Arc<EventHub>) -> Self {
        let (log, _) = watch::channel(Vec::new());
        Self {
            hub,
            log: Arc::new(log),
            inner: Arc::new(Mutex::new(ClientState::default())),
        }
    }

    /// Proposal delivered after the next successful pair.
    pub fn script_proposal(&self, proposal: ProposalEvent) -> Result<(), PortError> {
        self.lock()?.proposals.push_back(proposal);
        Ok(())
    }

    /// Settle response delivered after the next successful approve.
    pub fn script_settlement(&self, settlement: SettlementEvent) -> Result<(), PortError> {
        self.lock()?.settlements.push_back(settlement);
        Ok(())
    }

    /// Queues the completion for the next command of `kind`. Unscripted
    /// commands succeed.
    pub fn script_reply(&self, kind: CommandKind, reply: Reply) -> Result<(), PortError> {
        self.lock()?.replies.entry(kind).or_default().push_back(reply);
        Ok(())
    }

    /// Completes every held callback with `result`. Returns how many there
    /// were.
    pub fn release_held(&self, result: Result<(), PortError>) -> Result<usize, PortError> {
        let held = std::mem::take(&mut self.lock()?.held);
        for done in &held {
            done.complete(result.clone());
        }
        Ok(held.len())
    }

    /// Delivers an unsolicited SDK event.
    pub fn emit(&self, event: TransportEvent) {
        self.hub.dispatch(event);
    }

    pub fn commands(&self) -> Vec<ClientCommand> {
        self.log.borrow().clone()
    }

    pub fn commands_of(&self, kind: CommandKind) -> Vec<ClientCommand> {
        self.log
            .borrow()
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn responses(&self) -> Vec<RpcResponse> {
        self.log
            .borrow()
            .iter()
            .filter_map(|c| match c {
                ClientCommand::Respond(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Waits until at least `count` commands of `kind` were received.
    pub async fn wait_for(&self, kind: CommandKind, count: usize) -> Vec<ClientCommand> {
        let mut rx = self.log.subscribe();
        let _ = rx
            .wait_for(|log| log.iter().filter(|c| c.kind() == kind).count() >= count)
            .await;
        self.commands_of(kind)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ClientState>, PortError> {
        self.inner
            .lock()
            .map_err(|e| PortError::Transport(format!("sign client lock poisoned: {e}")))
    }

    /// Records the command, completes it and returns whether it succeeded.
    fn accept(&self, command: ClientCommand, done: Completion<()>) -> bool {
        let kind = command.kind();
        self.log.send_modify(|log| log.push(command));

        let reply = match self.lock() {
            Ok(mut g) => g
                .replies
                .get_mut(&kind)
                .and_then(VecDeque::pop_front)
                .unwrap_or(Reply::Succeed),
            Err(e) => Reply::Fail(e),
        };
        debug!(?kind, ?reply, "transport command");
        match reply {
            Reply::Succeed => {
                done.success(());
                true
            }
            Reply::SucceedTwice => {
                done.success(());
                if done.success(()) {
                    warn!(?kind, "second completion was not ignored");
                }
                true
            }
            Reply::Fail(e) => {
                done.failure(e);
                false
            }
            Reply::Hang => {
                match self.lock() {
                    Ok(mut g) => g.held.push(done),
                    Err(e) => {
                        done.failure(e);
                    }
                }
                false
            }
            Reply::Drop => {
                drop(done);
                false
            }
        }
    }
}

impl SignClient for InMemorySignClient {
    fn pair(&self, uri: &str, done: Completion<()>) {
        let accepted = self.accept(
            ClientCommand::Pair {
                uri: uri.to_owned(),
            },
            done,
        );
        if !accepted {
            return;
        }
        let scripted = self.lock().ok().and_then(|mut g| g.proposals.pop_front());
        if let Some(proposal) = scripted {
            self.emit(TransportEvent::SessionProposal(proposal));
        }
    }

    fn approve_session(&self, params: ApproveParams, done: Completion<()>) {
        if !self.accept(ClientCommand::Approve(params), done) {
            return;
        }
        let scripted = self.lock().ok().and_then(|mut g| g.settlements.pop_front());
        if let Some(settlement) = scripted {
            self.emit(TransportEvent::SessionSettleResponse(settlement));
        }
    }

    fn reject_session(&self, params: RejectParams, done: Completion<()>) {
        self.accept(ClientCommand::Reject(params), done);
    }

    fn respond(&self, response: RpcResponse, done: Completion<()>) {
        self.accept(ClientCommand::Respond(response), done);
    }

    fn disconnect(&self, topic: &str, done: Completion<()>) {
        self.accept(
            ClientCommand::Disconnect {
                topic: topic.to_owned(),
            },
            done,
        );
    }
}
