#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use wc_bridge_adapters::{
    DeterministicSigner, InMemorySessionRepository, InMemorySignClient, StaticSecurityScanner,
    StaticWalletProvider,
};
use wc_bridge_core::domain::{
    DAppMetadata, Network, ProposalNamespace, RawProposal, RawSession, SessionNamespace,
    VerifyContext,
};
use wc_bridge_core::methods::{EthereumMethods, SolanaMethods};
use wc_bridge_core::{
    EventHub, IncomingRequest, MethodRegistry, PairingCoordinator, PairingFlow, PairingState,
    ProposalEvent, RequestRouter, RespondService, SecurityChecks, SessionLifecycle,
    SessionRequest, SessionStore, SignUseCases, Wallet, WalletId,
};

pub const WALLET: &str = "W";
pub const OTHER_WALLET: &str = "W2";
pub const ETH_ADDRESS: &str = "0x1000000000000000000000000000000000000001";
pub const SOL_ADDRESS: &str = "7EcDhSYGxXyscszYEp35KHN8vvw3svAuLKTzXwCFLtV";
pub const ETH_CHAIN: &str = "eip155:1";
pub const POLYGON_CHAIN: &str = "eip155:137";
pub const SOL_CHAIN: &str = "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp";
pub const PAIRING_URI: &str = "wc:abc123";
pub const STEP: Duration = Duration::from_secs(2);

pub struct Harness {
    pub hub: Arc<EventHub>,
    pub client: InMemorySignClient,
    pub repository: InMemorySessionRepository,
    pub store: Arc<SessionStore>,
    pub wallets: StaticWalletProvider,
    pub signer: DeterministicSigner,
    pub scanner: StaticSecurityScanner,
    pub security: Arc<SecurityChecks>,
    pub responder: RespondService,
    pub router: Arc<RequestRouter>,
    pub use_cases: SignUseCases,
    pub lifecycle: SessionLifecycle,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_repository(InMemorySessionRepository::default())
    }

    pub fn with_repository(repository: InMemorySessionRepository) -> Self {
        let hub = Arc::new(EventHub::new(16));
        let client = InMemorySignClient::new(Arc::clone(&hub));
        let store = Arc::new(SessionStore::new(Arc::new(repository.clone())));
        let wallets = StaticWalletProvider::new(vec![
            wallet(WALLET, &[ETH_CHAIN, SOL_CHAIN]),
            wallet(OTHER_WALLET, &[ETH_CHAIN, POLYGON_CHAIN]),
        ]);
        let signer = DeterministicSigner::default();
        let scanner = StaticSecurityScanner::default();
        let security = Arc::new(SecurityChecks::new(Arc::new(scanner.clone())));
        let responder = RespondService::new(Arc::new(client.clone()));
        let registry = MethodRegistry::new()
            .with(Arc::new(EthereumMethods::with_security(Arc::clone(&security))))
            .with(Arc::new(SolanaMethods));
        let router = Arc::new(RequestRouter::new(
            Arc::clone(&store),
            Arc::new(registry),
            responder.clone(),
            16,
        ));
        let use_cases = SignUseCases::new(responder.clone(), Arc::new(signer.clone()))
            .with_security(Arc::clone(&security));
        let lifecycle = SessionLifecycle::new(Arc::new(client.clone()), Arc::clone(&store));

        Self {
            hub,
            client,
            repository,
            store,
            wallets,
            signer,
            scanner,
            security,
            responder,
            router,
            use_cases,
            lifecycle,
        }
    }

    pub fn coordinator(&self, denylist: &[&str]) -> PairingCoordinator {
        PairingCoordinator::new(
            Arc::new(self.client.clone()),
            Arc::clone(&self.hub),
            Arc::clone(&self.store),
            Arc::new(self.wallets.clone()),
            denylist.iter().map(|n| (*n).to_owned()).collect(),
        )
    }

    /// Stores a settled session for `wallet` directly.
    pub fn settle(&self, wallet: &str, topic: &str) {
        let wallet_id = WalletId::new(wallet);
        self.store.save(
            &wallet_id,
            wc_bridge_core::Session::new(wallet_id.clone(), raw_session(topic)),
        );
    }
}

pub fn wallet(id: &str, chains: &[&str]) -> Wallet {
    Wallet {
        id: WalletId::new(id),
        name: format!("Wallet {id}"),
        networks: chains
            .iter()
            .map(|chain| Network {
                chain_id: (*chain).to_owned(),
                address: address_for(chain).to_owned(),
            })
            .collect(),
        supported_chains: vec![
            ETH_CHAIN.to_owned(),
            POLYGON_CHAIN.to_owned(),
            SOL_CHAIN.to_owned(),
        ],
    }
}

fn address_for(chain: &str) -> &'static str {
    if chain.starts_with("solana") {
        SOL_ADDRESS
    } else {
        ETH_ADDRESS
    }
}

pub fn proposal(name: &str) -> ProposalEvent {
    let mut required = BTreeMap::new();
    required.insert(
        "eip155".to_owned(),
        ProposalNamespace {
            chains: vec![ETH_CHAIN.to_owned()],
            methods: vec!["eth_sign".to_owned(), "personal_sign".to_owned()],
            events: vec!["accountsChanged".to_owned()],
        },
    );
    let mut optional = BTreeMap::new();
    optional.insert(
        "solana".to_owned(),
        ProposalNamespace {
            chains: vec![SOL_CHAIN.to_owned()],
            methods: vec!["solana_signMessage".to_owned()],
            events: vec![],
        },
    );
    ProposalEvent {
        proposal: RawProposal {
            id: 1,
            pairing_topic: "abc123".to_owned(),
            proposer_public_key: "proposer-key".to_owned(),
            metadata: DAppMetadata {
                name: name.to_owned(),
                url: "https://dapp.example".to_owned(),
                ..DAppMetadata::default()
            },
            required_namespaces: required,
            optional_namespaces: optional,
        },
        verify: VerifyContext::default(),
    }
}

pub fn raw_session(topic: &str) -> RawSession {
    let mut namespaces = BTreeMap::new();
    namespaces.insert(
        "eip155".to_owned(),
        SessionNamespace {
            chains: vec![ETH_CHAIN.to_owned()],
            accounts: vec![format!("{ETH_CHAIN}:{ETH_ADDRESS}")],
            methods: vec!["eth_sign".to_owned()],
            events: vec![],
        },
    );
    namespaces.insert(
        "solana".to_owned(),
        SessionNamespace {
            chains: vec![SOL_CHAIN.to_owned()],
            accounts: vec![format!("{SOL_CHAIN}:{SOL_ADDRESS}")],
            methods: vec!["solana_signTransaction".to_owned()],
            events: vec![],
        },
    );
    RawSession {
        topic: topic.to_owned(),
        pairing_topic: "abc123".to_owned(),
        peer: DAppMetadata {
            name: "UnknownSafeDApp".to_owned(),
            ..DAppMetadata::default()
        },
        namespaces,
        expiry: 1_739_750_400,
    }
}

pub fn incoming(id: u64, topic: &str, method: &str, params: Value) -> IncomingRequest {
    let chain = if method.starts_with("solana") {
        SOL_CHAIN
    } else {
        ETH_CHAIN
    };
    IncomingRequest {
        request: SessionRequest {
            id,
            topic: topic.to_owned(),
            chain_id: Some(chain.to_owned()),
            method: method.to_owned(),
            params,
            peer: None,
        },
        verify: VerifyContext::default(),
    }
}

pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(STEP, future)
        .await
        .expect("step finished in time")
}

pub async fn next_state(flow: &mut PairingFlow) -> PairingState {
    within(flow.next()).await.expect("pairing state")
}

pub async fn stream_ended(flow: &mut PairingFlow) -> bool {
    within(flow.next()).await.is_none()
}
