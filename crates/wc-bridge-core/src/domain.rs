use std::collections::BTreeMap;
use std::fmt;

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub String);

impl WalletId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Peer description as advertised by the dApp.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DAppMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalNamespace {
    #[serde(default)]
    pub chains: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNamespace {
    #[serde(default)]
    pub chains: Vec<String>,
    pub accounts: Vec<String>,
    pub methods: Vec<String>,
    pub events: Vec<String>,
}

/// Session proposal exactly as the transport delivered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawProposal {
    pub id: u64,
    pub pairing_topic: String,
    pub proposer_public_key: String,
    pub metadata: DAppMetadata,
    #[serde(default)]
    pub required_namespaces: BTreeMap<String, ProposalNamespace>,
    #[serde(default)]
    pub optional_namespaces: BTreeMap<String, ProposalNamespace>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Validation {
    Valid,
    Invalid,
    #[default]
    Unknown,
}

/// Trust metadata the transport attaches to proposals and requests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyContext {
    pub origin: String,
    pub validation: Validation,
    #[serde(default)]
    pub is_scam: bool,
}

/// Settled session model owned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSession {
    pub topic: String,
    pub pairing_topic: String,
    pub peer: DAppMetadata,
    pub namespaces: BTreeMap<String, SessionNamespace>,
    pub expiry: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub wallet_id: WalletId,
    pub topic: String,
    pub raw: RawSession,
}

impl Session {
    pub fn new(wallet_id: WalletId, raw: RawSession) -> Self {
        Self {
            wallet_id,
            topic: raw.topic.clone(),
            raw,
        }
    }
}

pub type SessionsByWallet = BTreeMap<WalletId, Vec<Session>>;

/// Inbound JSON-RPC request addressed to a settled session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub id: u64,
    pub topic: String,
    #[serde(default)]
    pub chain_id: Option<String>,
    pub method: String,
    pub params: serde_json::Value,
    #[serde(default)]
    pub peer: Option<DAppMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    /// CAIP-2 chain id, e.g. `eip155:1`.
    pub chain_id: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    /// Networks the user has added to this wallet.
    pub networks: Vec<Network>,
    /// Chains the wallet's card can sign for, added or not.
    pub supported_chains: Vec<String>,
}

impl Wallet {
    pub fn network(&self, chain_id: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApproveParams {
    pub proposer_public_key: String,
    pub namespaces: BTreeMap<String, SessionNamespace>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectParams {
    pub proposer_public_key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RpcResponse {
    Result {
        topic: String,
        id: u64,
        result: serde_json::Value,
    },
    Error {
        topic: String,
        id: u64,
        code: i64,
        message: String,
    },
}

impl RpcResponse {
    pub fn id(&self) -> u64 {
        match self {
            Self::Result { id, .. } | Self::Error { id, .. } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementEvent {
    Settled(RawSession),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedSession {
    pub topic: String,
}

/// `eth_signTransaction` / `eth_sendTransaction` parameter object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthTransaction {
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub data: Option<Bytes>,
    #[serde(default, alias = "gasLimit")]
    pub gas: Option<U256>,
    #[serde(default)]
    pub gas_price: Option<U256>,
    #[serde(default)]
    pub nonce: Option<U256>,
}

/// Payload handed to the external signing capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signable {
    Message(Bytes),
    TypedData(serde_json::Value),
    EvmTransaction {
        transaction: EthTransaction,
        broadcast: bool,
    },
    SolanaMessage(Bytes),
    SolanaTransactions(Vec<Bytes>),
}

/// Where a signature is produced: wallet, CAIP-2 chain and account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningTarget {
    pub wallet_id: WalletId,
    pub chain_id: String,
    pub address: String,
}
