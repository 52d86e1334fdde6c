pub mod config;
pub mod security;
pub mod session_repository;
pub mod sign_client;
pub mod signer;
pub mod wallets;

pub use config::BridgeConfig;
pub use security::StaticSecurityScanner;
pub use session_repository::InMemorySessionRepository;
pub use sign_client::{ClientCommand, CommandKind, InMemorySignClient, Reply};
pub use signer::DeterministicSigner;
pub use wallets::StaticWalletProvider;
