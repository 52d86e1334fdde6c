use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eyre::{bail, eyre, WrapErr};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::info;

use wc_bridge_adapters::{
    BridgeConfig, DeterministicSigner, InMemorySessionRepository, InMemorySignClient,
    StaticSecurityScanner, StaticWalletProvider,
};
use wc_bridge_core::domain::{
    DAppMetadata, Network, ProposalNamespace, RawProposal, RawSession, SessionNamespace,
    SessionRequest, SettlementEvent, VerifyContext,
};
use wc_bridge_core::events::TransportEvent;
use wc_bridge_core::methods::{EthereumMethods, SolanaMethods};
use wc_bridge_core::{
    ApprovingState, EventHub, IncomingRequest, MethodRegistry, PairingCoordinator, PairingState,
    ProposalEvent, RequestRouter, RespondService, SecurityChecks, SessionLifecycle, SessionStore,
    SignFlow, SignUseCases, Wallet, WalletId,
};

const WALLET_ID: &str = "W";
const ETH_CHAIN: &str = "eip155:1";
const ETH_ADDRESS: &str = "0x1000000000000000000000000000000000000001";
const PAIRING_URI: &str = "wc:abc123";
const TOPIC: &str = "t1";

/// Bridge components wired to the in-memory transport.
pub struct App {
    config: BridgeConfig,
    client: InMemorySignClient,
    store: Arc<SessionStore>,
    coordinator: PairingCoordinator,
    router: Arc<RequestRouter>,
    use_cases: SignUseCases,
    lifecycle: SessionLifecycle,
    background: Vec<JoinHandle<()>>,
}

impl App {
    pub fn new(config: BridgeConfig) -> Self {
        let hub = Arc::new(EventHub::new(config.event_buffer));
        let client = InMemorySignClient::new(Arc::clone(&hub));
        let sign_client = Arc::new(client.clone());
        let store = Arc::new(SessionStore::new(Arc::new(
            InMemorySessionRepository::default(),
        )));
        let wallets = Arc::new(StaticWalletProvider::new(vec![demo_wallet()]));
        let security = Arc::new(SecurityChecks::new(Arc::new(
            StaticSecurityScanner::default(),
        )));
        let responder = RespondService::new(sign_client.clone());

        let registry = MethodRegistry::new()
            .with(Arc::new(EthereumMethods::with_security(Arc::clone(&security))))
            .with(Arc::new(SolanaMethods));
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&store),
            Arc::new(registry),
            responder.clone(),
            config.request_buffer,
        ));
        let use_cases = SignUseCases::new(responder, Arc::new(DeterministicSigner::default()))
            .with_security(security);
        let lifecycle = SessionLifecycle::new(sign_client.clone(), Arc::clone(&store));
        let coordinator = PairingCoordinator::new(
            sign_client,
            Arc::clone(&hub),
            Arc::clone(&store),
            wallets,
            config.dapp_denylist.clone(),
        );

        let background = vec![
            Arc::clone(&router).spawn(&hub),
            lifecycle.spawn_delete_listener(&hub),
        ];

        Self {
            config,
            client,
            store,
            coordinator,
            router,
            use_cases,
            lifecycle,
            background,
        }
    }

    /// Pairs with a scripted dApp, approves, signs one `eth_sign` request and
    /// disconnects.
    pub async fn run_scenario(&self) -> eyre::Result<()> {
        self.client
            .script_proposal(demo_proposal())
            .wrap_err("scripting proposal")?;
        self.client
            .script_settlement(SettlementEvent::Settled(demo_session()))
            .wrap_err("scripting settlement")?;

        let mut flow = self.coordinator.pair_flow(PAIRING_URI);
        let session = loop {
            let Some(state) = self.bounded(flow.next()).await? else {
                bail!("pairing ended without a session");
            };
            match state {
                PairingState::Loading => info!("pairing"),
                PairingState::Proposal(proposal) => {
                    info!(
                        dapp = proposal.dapp_name(),
                        available = ?proposal.available,
                        "approving proposal"
                    );
                    flow.approve(proposal.approve_available());
                }
                PairingState::Approving(ApprovingState::Loading(_)) => info!("awaiting settlement"),
                PairingState::Approving(ApprovingState::Result { outcome, .. }) => {
                    break outcome.wrap_err("session approval")?
                }
                PairingState::Error(e) => return Err(e).wrap_err("pairing failed"),
            }
        };
        info!(topic = %session.topic, sessions = self.store.all_sessions().len(), "session stored");

        let mut routed = self.router.routed_requests();
        self.client.emit(TransportEvent::SessionRequest(IncomingRequest {
            request: SessionRequest {
                id: 1,
                topic: TOPIC.to_owned(),
                chain_id: Some(ETH_CHAIN.to_owned()),
                method: "eth_sign".to_owned(),
                params: json!([ETH_ADDRESS, "0x68656c6c6f"]),
                peer: None,
            },
            verify: VerifyContext::default(),
        }));
        let request = self
            .bounded(routed.recv())
            .await?
            .wrap_err("routed request stream")?;

        let SignFlow::EthMessage {
            orchestrator,
            model,
        } = self.use_cases.for_request(request)?
        else {
            bail!("unexpected sign flow for eth_sign");
        };
        let mut states = orchestrator.invoke(model.clone())?;
        orchestrator.sign(model).await?;
        while let Some(state) = states.recv().await {
            info!(?state, "sign state");
        }

        self.lifecycle
            .disconnect(&session)
            .await
            .wrap_err("disconnect")?;
        info!(
            sessions = self.store.all_sessions().len(),
            commands = self.client.commands().len(),
            "scenario finished"
        );
        Ok(())
    }

    async fn bounded<F: Future>(&self, future: F) -> eyre::Result<F::Output> {
        tokio::time::timeout(Duration::from_millis(self.config.respond_timeout_ms), future)
            .await
            .map_err(|_| eyre!("timed out after {}ms", self.config.respond_timeout_ms))
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for task in &self.background {
            task.abort();
        }
    }
}

fn demo_wallet() -> Wallet {
    Wallet {
        id: WalletId::new(WALLET_ID),
        name: "Demo wallet".to_owned(),
        networks: vec![Network {
            chain_id: ETH_CHAIN.to_owned(),
            address: ETH_ADDRESS.to_owned(),
        }],
        supported_chains: vec![ETH_CHAIN.to_owned(), "eip155:137".to_owned()],
    }
}

fn demo_proposal() -> ProposalEvent {
    ProposalEvent {
        proposal: RawProposal {
            id: 1,
            pairing_topic: "abc123".to_owned(),
            proposer_public_key: "demo-proposer".to_owned(),
            metadata: DAppMetadata {
                name: "UnknownSafeDApp".to_owned(),
                url: "https://dapp.example".to_owned(),
                ..DAppMetadata::default()
            },
            required_namespaces: [(
                "eip155".to_owned(),
                ProposalNamespace {
                    chains: vec![ETH_CHAIN.to_owned()],
                    methods: vec!["eth_sign".to_owned(), "personal_sign".to_owned()],
                    events: vec!["accountsChanged".to_owned()],
                },
            )]
            .into(),
            optional_namespaces: Default::default(),
        },
        verify: VerifyContext::default(),
    }
}

fn demo_session() -> RawSession {
    RawSession {
        topic: TOPIC.to_owned(),
        pairing_topic: "abc123".to_owned(),
        peer: DAppMetadata {
            name: "UnknownSafeDApp".to_owned(),
            ..DAppMetadata::default()
        },
        namespaces: [(
            "eip155".to_owned(),
            SessionNamespace {
                chains: vec![ETH_CHAIN.to_owned()],
                accounts: vec![format!("{ETH_CHAIN}:{ETH_ADDRESS}")],
                methods: vec!["eth_sign".to_owned()],
                events: vec![],
            },
        )]
        .into(),
        expiry: 0,
    }
}
