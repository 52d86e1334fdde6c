use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::{Session, SessionRequest, VerifyContext};
use crate::error::WcError;
use crate::events::{EventHub, IncomingRequest};
use crate::methods::{MethodRegistry, WcMethod};
use crate::respond::{RespondService, UNSUPPORTED_METHODS};
use crate::sessions::SessionStore;

/// A request resolved to its session and typed method. Consumed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest<M = WcMethod> {
    pub raw: SessionRequest,
    pub session: Session,
    pub method: M,
    pub verify: VerifyContext,
}

impl<M> SignRequest<M> {
    pub fn id(&self) -> u64 {
        self.raw.id
    }

    pub fn map_method<N>(self, f: impl FnOnce(M) -> N) -> SignRequest<N> {
        SignRequest {
            raw: self.raw,
            session: self.session,
            method: f(self.method),
            verify: self.verify,
        }
    }
}

/// Routes inbound session requests to method handlers.
///
/// Routing failures are answered with an error to the dApp and never reach
/// the outbound stream.
pub struct RequestRouter {
    store: Arc<SessionStore>,
    registry: Arc<MethodRegistry>,
    responder: RespondService,
    routed: broadcast::Sender<SignRequest>,
}

impl RequestRouter {
    pub fn new(
        store: Arc<SessionStore>,
        registry: Arc<MethodRegistry>,
        responder: RespondService,
        buffer: usize,
    ) -> Self {
        let (routed, _) = broadcast::channel(buffer.max(1));
        Self {
            store,
            registry,
            responder,
            routed,
        }
    }

    pub fn routed_requests(&self) -> broadcast::Receiver<SignRequest> {
        self.routed.subscribe()
    }

    pub async fn route(&self, incoming: IncomingRequest) -> Result<SignRequest, WcError> {
        let IncomingRequest { request, verify } = incoming;

        let Some(session) = self.store.find_by_topic(&request.topic) else {
            warn!(request_id = request.id, topic = %request.topic, "request for unknown session");
            self.reject(&request, "unsupported: session not found").await;
            return Err(WcError::SessionNotFound(request.topic));
        };

        let resolved = self.registry.resolve(&request.method).and_then(|handler| {
            handler
                .deserialize(&request.method, &request.params)
                .filter(WcMethod::is_supported)
                .map(|method| (handler, method))
        });
        let Some((handler, method)) = resolved else {
            warn!(request_id = request.id, method = %request.method, "no handler for request");
            let message = format!("unsupported method: {}", request.method);
            self.reject(&request, &message).await;
            return Err(WcError::UnsupportedMethod(request.method));
        };

        let sign_request = SignRequest {
            raw: request,
            session,
            method,
            verify,
        };
        handler.handle(&sign_request);
        info!(
            request_id = sign_request.id(),
            method = %sign_request.raw.method,
            handler = handler.name(),
            "request routed"
        );
        if self.routed.send(sign_request.clone()).is_err() {
            debug!(request_id = sign_request.id(), "no subscriber for routed requests");
        }
        Ok(sign_request)
    }

    /// Consumes request events, routing each one on its own task.
    pub fn spawn(self: Arc<Self>, hub: &EventHub) -> JoinHandle<()> {
        let mut requests = hub.subscribe_requests();
        tokio::spawn(async move {
            loop {
                match requests.recv().await {
                    Ok(incoming) => {
                        let router = Arc::clone(&self);
                        tokio::spawn(async move {
                            let _ = router.route(incoming).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "request router lagged, oldest requests dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn reject(&self, request: &SessionRequest, message: &str) {
        if let Err(e) = self
            .responder
            .reject_with(request, UNSUPPORTED_METHODS, message)
            .await
        {
            warn!(request_id = request.id, error = %e, "failed to reject request");
        }
    }
}
