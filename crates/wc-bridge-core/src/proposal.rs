use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{
    ApproveParams, ProposalNamespace, RawProposal, SessionNamespace, VerifyContext, Wallet,
    WalletId,
};
use crate::events::ProposalEvent;
use crate::ports::PortError;

/// A proposal evaluated against one wallet. Recomputed on every wallet
/// reselection and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProposal {
    pub raw: RawProposal,
    pub verify: VerifyContext,
    pub wallet: Wallet,
    /// Required chains the wallet cannot serve yet.
    pub missing_required: BTreeSet<String>,
    /// Requested chains the wallet has a network for.
    pub available: BTreeSet<String>,
    /// Requested chains the wallet supports but the user has not added.
    pub not_added: BTreeSet<String>,
}

impl SessionProposal {
    pub fn for_wallet(event: &ProposalEvent, wallet: Wallet) -> Self {
        let required = namespace_chains(&event.proposal.required_namespaces);
        let optional = namespace_chains(&event.proposal.optional_namespaces);

        let mut available = BTreeSet::new();
        let mut not_added = BTreeSet::new();
        for chain in required.union(&optional) {
            if wallet.network(chain).is_some() {
                available.insert(chain.clone());
            } else if wallet.supported_chains.iter().any(|c| c == chain) {
                not_added.insert(chain.clone());
            }
        }
        let missing_required = required.difference(&available).cloned().collect();

        Self {
            raw: event.proposal.clone(),
            verify: event.verify.clone(),
            wallet,
            missing_required,
            available,
            not_added,
        }
    }

    pub fn dapp_name(&self) -> &str {
        &self.raw.metadata.name
    }

    pub fn approve(&self, chains: impl IntoIterator<Item = String>) -> SessionForApproval {
        SessionForApproval {
            proposal: self.clone(),
            chains: chains.into_iter().collect(),
        }
    }

    pub fn approve_available(&self) -> SessionForApproval {
        self.approve(self.available.iter().cloned())
    }
}

/// The proposal the user approved and the chains they picked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionForApproval {
    pub proposal: SessionProposal,
    pub chains: BTreeSet<String>,
}

impl SessionForApproval {
    pub fn wallet_id(&self) -> &WalletId {
        &self.proposal.wallet.id
    }

    pub fn params(&self) -> Result<ApproveParams, PortError> {
        let proposal = &self.proposal;
        if !proposal.missing_required.is_empty() {
            return Err(PortError::Validation(format!(
                "required chains missing: {}",
                join(&proposal.missing_required)
            )));
        }
        let chains: BTreeSet<&String> = self
            .chains
            .iter()
            .filter(|c| proposal.available.contains(*c))
            .collect();
        if chains.is_empty() {
            return Err(PortError::Validation("no chains selected".to_owned()));
        }

        let requested: Vec<(&String, &ProposalNamespace)> = proposal
            .raw
            .required_namespaces
            .iter()
            .chain(proposal.raw.optional_namespaces.iter())
            .collect();

        let mut namespaces: BTreeMap<String, SessionNamespace> = BTreeMap::new();
        for chain in chains {
            let Some(network) = proposal.wallet.network(chain) else {
                continue;
            };
            let key = namespace_of(chain).to_owned();
            let ns = namespaces.entry(key.clone()).or_default();
            ns.chains.push(chain.clone());
            ns.accounts.push(format!("{chain}:{}", network.address));
            for (_, requested_ns) in requested.iter().filter(|(k, _)| namespace_of(k) == key) {
                merge_unique(&mut ns.methods, &requested_ns.methods);
                merge_unique(&mut ns.events, &requested_ns.events);
            }
        }

        Ok(ApproveParams {
            proposer_public_key: proposal.raw.proposer_public_key.clone(),
            namespaces,
        })
    }
}

/// Chains named by a namespace map. A key like `eip155:1` with no chain list
/// names the chain itself.
fn namespace_chains(namespaces: &BTreeMap<String, ProposalNamespace>) -> BTreeSet<String> {
    namespaces
        .iter()
        .flat_map(|(key, ns)| {
            if ns.chains.is_empty() && key.contains(':') {
                vec![key.clone()]
            } else {
                ns.chains.clone()
            }
        })
        .collect()
}

fn namespace_of(chain: &str) -> &str {
    chain.split(':').next().unwrap_or(chain)
}

fn merge_unique(into: &mut Vec<String>, from: &[String]) {
    for item in from {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().cloned().collect::<Vec<_>>().join(", ")
}
