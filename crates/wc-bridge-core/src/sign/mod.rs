//! Generic sign flow shared by every chain-specific signing use case.
//!
//! A flow moves `PreSign -> Signing -> Result`. The chain-specific part is a
//! [`SignStrategy`]; the orchestrator owns the state stream, the phase guard
//! and cancellation.

pub mod ethereum;
pub mod solana;

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use alloy::primitives::Bytes;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::domain::{Signable, SigningTarget};
use crate::error::WcError;
use crate::methods::WcMethod;
use crate::ports::{PortError, TransactionSigner};
use crate::respond::RespondService;
use crate::router::SignRequest;
use crate::security::{SecurityCheckState, SecurityChecks};
use crate::state_machine::{sign_transition, SignAction, SignPhase};

pub use ethereum::{
    EthMessageModel, EthMessageStrategy, EthTransactionModel, EthTransactionStrategy,
};
pub use solana::{SolanaModel, SolanaPayload, SolanaStrategy};

/// Result payload sent to the dApp, or why nothing was sent.
pub type SignOutcome = Result<Value, WcError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignState<T> {
    PreSign(T),
    Signing(T),
    Result { model: T, outcome: SignOutcome },
}

impl<T> SignState<T> {
    pub fn model(&self) -> &T {
        match self {
            Self::PreSign(m) | Self::Signing(m) | Self::Result { model: m, .. } => m,
        }
    }
}

pub type SignStates<T> = mpsc::UnboundedReceiver<SignState<T>>;

/// Whether the dApp may still be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Open,
    Answering,
    Cancelled,
}

/// Request-scoped collaborators handed to a strategy.
pub struct SignContext {
    pub request: SignRequest,
    responder: RespondService,
    security: Option<Arc<SecurityChecks>>,
    delivery: watch::Sender<Delivery>,
}

impl SignContext {
    pub fn new(request: SignRequest, responder: RespondService) -> Self {
        let (delivery, _) = watch::channel(Delivery::Open);
        Self {
            request,
            responder,
            security: None,
            delivery,
        }
    }

    pub fn with_security(mut self, security: Arc<SecurityChecks>) -> Self {
        self.security = Some(security);
        self
    }

    /// The request's chain, or the session's only chain when the request
    /// names none.
    pub fn chain_id(&self) -> Result<String, WcError> {
        if let Some(chain_id) = self.request.raw.chain_id.as_ref().filter(|c| !c.is_empty()) {
            return Ok(chain_id.clone());
        }
        let chains: BTreeSet<&str> = self
            .request
            .session
            .raw
            .namespaces
            .values()
            .flat_map(|ns| {
                ns.chains.iter().map(String::as_str).chain(
                    ns.accounts
                        .iter()
                        .filter_map(|account| account.rsplit_once(':').map(|(chain, _)| chain)),
                )
            })
            .collect();
        let mut chains = chains.into_iter();
        match (chains.next(), chains.next()) {
            (Some(only), None) => Ok(only.to_owned()),
            (None, _) => Err(invalid("request names no chain and the session has none")),
            (Some(_), Some(_)) => Err(invalid(
                "request names no chain and the session spans several",
            )),
        }
    }

    pub fn target(&self, address: impl Into<String>) -> Result<SigningTarget, WcError> {
        Ok(SigningTarget {
            wallet_id: self.request.session.wallet_id.clone(),
            chain_id: self.chain_id()?,
            address: address.into(),
        })
    }

    /// Account the session exposes for the request's chain.
    pub fn session_account(&self) -> Result<String, WcError> {
        let chain_id = self.chain_id()?;
        let prefix = format!("{chain_id}:");
        self.request
            .session
            .raw
            .namespaces
            .values()
            .flat_map(|ns| ns.accounts.iter())
            .find_map(|account| account.strip_prefix(&prefix).map(str::to_owned))
            .ok_or_else(|| invalid(format!("session has no account on {chain_id}")))
    }

    /// Answers the dApp when signing succeeded and folds a failed response
    /// into the outcome. A cancelled flow is never answered.
    pub async fn finish<T>(&self, model: T, signed: SignOutcome) -> (T, SignOutcome) {
        let outcome = match signed {
            Ok(payload) => {
                if !self.claim_delivery() {
                    debug!(request_id = self.request.id(), "flow cancelled, response withheld");
                    return (model, Err(WcError::UnexpectedTermination));
                }
                match self.responder.respond(&self.request.raw, payload.clone()).await {
                    Ok(()) => Ok(payload),
                    Err(e) => Err(WcError::Transport(e)),
                }
            }
            Err(e) => Err(e),
        };
        (model, outcome)
    }

    fn claim_delivery(&self) -> bool {
        self.delivery.send_if_modified(|d| {
            let open = *d == Delivery::Open;
            if open {
                *d = Delivery::Answering;
            }
            open
        })
    }

    /// `false` once the response is already on its way.
    fn withdraw_delivery(&self) -> bool {
        self.delivery.send_if_modified(|d| {
            let open = *d == Delivery::Open;
            if open {
                *d = Delivery::Cancelled;
            }
            open
        })
    }

    fn forget_security(&self) {
        if let Some(security) = &self.security {
            security.forget(self.request.id());
        }
    }
}

fn invalid(message: impl Into<String>) -> WcError {
    WcError::Signing(PortError::Validation(message.into()))
}

#[async_trait]
pub trait SignStrategy<T>: Send + Sync {
    /// Prepares, signs and answers the request. `None` means the model could
    /// not be prepared and nothing was sent.
    async fn on_sign(&self, model: T, ctx: &SignContext) -> Option<(T, SignOutcome)>;
}

struct FlowInner<T> {
    phase: SignPhase,
    states: Option<mpsc::UnboundedSender<SignState<T>>>,
}

pub struct SignOrchestrator<T> {
    strategy: Arc<dyn SignStrategy<T>>,
    context: SignContext,
    inner: Mutex<FlowInner<T>>,
}

impl<T> SignOrchestrator<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(strategy: Arc<dyn SignStrategy<T>>, context: SignContext) -> Self {
        Self {
            strategy,
            context,
            inner: Mutex::new(FlowInner {
                phase: SignPhase::Idle,
                states: None,
            }),
        }
    }

    pub fn request(&self) -> &SignRequest {
        &self.context.request
    }

    pub fn phase(&self) -> SignPhase {
        self.lock().phase
    }

    /// Opens the state stream with `PreSign`. One stream per flow.
    pub fn invoke(&self, initial: T) -> Result<SignStates<T>, WcError> {
        let mut g = self.lock();
        let (next, _) = sign_transition(g.phase, SignAction::Invoke)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(SignState::PreSign(initial));
        g.phase = next;
        g.states = Some(tx);
        debug!(request_id = self.request().id(), "sign flow started");
        Ok(rx)
    }

    /// Abandons the request: any in-flight signing is dropped, the stream
    /// closes without a result and the dApp gets no response. Ignored once
    /// the response is being sent.
    pub fn cancel(&self) {
        let mut g = self.lock();
        let next = match sign_transition(g.phase, SignAction::Cancel) {
            Ok((next, _)) => next,
            Err(e) => {
                debug!(error = %e, "cancel ignored");
                return;
            }
        };
        if !self.context.withdraw_delivery() {
            debug!(request_id = self.request().id(), "cancel ignored, response already sent");
            return;
        }
        g.phase = next;
        g.states = None;
        drop(g);
        self.context.forget_security();
        info!(request_id = self.request().id(), "sign flow cancelled");
    }

    pub async fn sign(&self, model: T) -> Result<(), WcError> {
        {
            let mut g = self.lock();
            let (next, _) = sign_transition(g.phase, SignAction::Sign)?;
            g.phase = next;
            emit(&g, SignState::Signing(model.clone()));
        }

        let mut delivery = self.context.delivery.subscribe();
        let produced = tokio::select! {
            biased;
            _ = async {
                let _ = delivery.wait_for(|d| *d == Delivery::Cancelled).await;
            } => {
                debug!(request_id = self.request().id(), "signing aborted, flow cancelled");
                return Ok(());
            }
            produced = self.strategy.on_sign(model, &self.context) => produced,
        };

        let mut g = self.lock();
        if g.phase == SignPhase::Cancelled {
            debug!(request_id = self.request().id(), "sign result dropped, flow cancelled");
            return Ok(());
        }
        let result = match produced {
            Some((model, outcome)) => {
                let (next, _) = sign_transition(g.phase, SignAction::Finish)?;
                g.phase = next;
                match &outcome {
                    Ok(_) => info!(request_id = self.request().id(), "request signed"),
                    Err(e) => warn!(request_id = self.request().id(), error = %e, "signing failed"),
                }
                emit(&g, SignState::Result { model, outcome });
                Ok(())
            }
            None => {
                let (next, _) = sign_transition(g.phase, SignAction::NothingToSign)?;
                g.phase = next;
                warn!(request_id = self.request().id(), "nothing to sign, flow terminated");
                Err(WcError::UnexpectedTermination)
            }
        };
        g.states = None;
        drop(g);
        self.context.forget_security();
        result
    }

    /// Advisory verdict stream for this request, started on first use.
    pub fn security_check(&self) -> Option<watch::Receiver<SecurityCheckState>> {
        let security = self.context.security.as_ref()?;
        let request = &self.context.request;
        security
            .verdicts(request.id())
            .or_else(|| Some(security.start(&request.raw, &request.verify)))
    }

    fn lock(&self) -> MutexGuard<'_, FlowInner<T>> {
        match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<T> Drop for SignOrchestrator<T> {
    fn drop(&mut self) {
        self.context.forget_security();
    }
}

fn emit<T>(inner: &FlowInner<T>, state: SignState<T>) {
    if let Some(tx) = &inner.states {
        let _ = tx.send(state);
    }
}

/// Takes the first signer output, which is the only one for single items.
pub(crate) fn single_output(outputs: Vec<Bytes>) -> Result<Bytes, WcError> {
    outputs
        .into_iter()
        .next()
        .ok_or_else(|| WcError::Signing(PortError::Signing("signer returned no output".to_owned())))
}

pub(crate) async fn sign_with(
    signer: &dyn TransactionSigner,
    target: &SigningTarget,
    payload: &Signable,
) -> Result<Vec<Bytes>, WcError> {
    signer.sign(target, payload).await.map_err(WcError::Signing)
}

/// A routed request paired with its orchestrator and initial model.
pub enum SignFlow {
    EthMessage {
        orchestrator: SignOrchestrator<EthMessageModel>,
        model: EthMessageModel,
    },
    EthTransaction {
        orchestrator: SignOrchestrator<EthTransactionModel>,
        model: EthTransactionModel,
    },
    Solana {
        orchestrator: SignOrchestrator<SolanaModel>,
        model: SolanaModel,
    },
}

impl SignFlow {
    pub fn request_id(&self) -> u64 {
        match self {
            Self::EthMessage { orchestrator, .. } => orchestrator.request().id(),
            Self::EthTransaction { orchestrator, .. } => orchestrator.request().id(),
            Self::Solana { orchestrator, .. } => orchestrator.request().id(),
        }
    }
}

/// Builds the chain-specific sign flow for a routed request.
#[derive(Clone)]
pub struct SignUseCases {
    responder: RespondService,
    signer: Arc<dyn TransactionSigner>,
    security: Option<Arc<SecurityChecks>>,
}

impl SignUseCases {
    pub fn new(responder: RespondService, signer: Arc<dyn TransactionSigner>) -> Self {
        Self {
            responder,
            signer,
            security: None,
        }
    }

    pub fn with_security(mut self, security: Arc<SecurityChecks>) -> Self {
        self.security = Some(security);
        self
    }

    pub fn for_request(&self, request: SignRequest) -> Result<SignFlow, WcError> {
        let method = request.method.clone();
        let mut context = SignContext::new(request, self.responder.clone());
        if let Some(security) = &self.security {
            context = context.with_security(Arc::clone(security));
        }
        let signer = Arc::clone(&self.signer);

        let flow = match method {
            WcMethod::EthSign { address, message } | WcMethod::PersonalSign { address, message } => {
                SignFlow::EthMessage {
                    orchestrator: SignOrchestrator::new(
                        Arc::new(EthMessageStrategy::new(signer)),
                        context,
                    ),
                    model: EthMessageModel {
                        address,
                        signable: Signable::Message(message),
                    },
                }
            }
            WcMethod::EthSignTypedData {
                address,
                typed_data,
            } => SignFlow::EthMessage {
                orchestrator: SignOrchestrator::new(
                    Arc::new(EthMessageStrategy::new(signer)),
                    context,
                ),
                model: EthMessageModel {
                    address,
                    signable: Signable::TypedData(typed_data),
                },
            },
            WcMethod::EthSignTransaction(transaction) => SignFlow::EthTransaction {
                orchestrator: SignOrchestrator::new(
                    Arc::new(EthTransactionStrategy::new(signer)),
                    context,
                ),
                model: EthTransactionModel {
                    transaction,
                    broadcast: false,
                },
            },
            WcMethod::EthSendTransaction(transaction) => SignFlow::EthTransaction {
                orchestrator: SignOrchestrator::new(
                    Arc::new(EthTransactionStrategy::new(signer)),
                    context,
                ),
                model: EthTransactionModel {
                    transaction,
                    broadcast: true,
                },
            },
            WcMethod::SolanaSignMessage { pubkey, message } => SignFlow::Solana {
                orchestrator: SignOrchestrator::new(Arc::new(SolanaStrategy::new(signer)), context),
                model: SolanaModel {
                    payload: SolanaPayload::Message { pubkey, message },
                },
            },
            WcMethod::SolanaSignTransaction { transaction } => SignFlow::Solana {
                orchestrator: SignOrchestrator::new(Arc::new(SolanaStrategy::new(signer)), context),
                model: SolanaModel {
                    payload: SolanaPayload::Transaction(transaction),
                },
            },
            WcMethod::SolanaSignAllTransactions { transactions } => SignFlow::Solana {
                orchestrator: SignOrchestrator::new(Arc::new(SolanaStrategy::new(signer)), context),
                model: SolanaModel {
                    payload: SolanaPayload::AllTransactions(transactions),
                },
            },
            WcMethod::Unsupported { method } => return Err(WcError::UnsupportedMethod(method)),
        };
        Ok(flow)
    }
}
