pub mod callback;
pub mod domain;
pub mod error;
pub mod events;
pub mod methods;
pub mod pairing;
pub mod ports;
pub mod proposal;
pub mod respond;
pub mod router;
pub mod security;
pub mod sessions;
pub mod sign;
pub mod state_machine;

pub use callback::{bridge, Completion};
pub use domain::{Session, SessionRequest, SessionsByWallet, Wallet, WalletId};
pub use error::WcError;
pub use events::{EventHub, IncomingRequest, ProposalEvent, TransportEvent};
pub use methods::{MethodHandler, MethodRegistry, WcMethod};
pub use pairing::{ApprovingState, PairingCoordinator, PairingFlow, PairingState};
pub use ports::{
    PortError, SecurityScanner, SessionRepository, SignClient, TransactionSigner, WalletProvider,
};
pub use proposal::{SessionForApproval, SessionProposal};
pub use respond::RespondService;
pub use router::{RequestRouter, SignRequest};
pub use security::{SecurityCheckState, SecurityChecks, SecurityVerdict};
pub use sessions::{SessionLifecycle, SessionStore};
pub use sign::{SignFlow, SignOrchestrator, SignState, SignStrategy, SignUseCases};
pub use state_machine::{SignPhase, StateTransition};
