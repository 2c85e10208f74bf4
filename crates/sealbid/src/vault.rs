//! local custody for bid secrets and proposal text
//!
//! layout:
//!
//! ```text
//! bid:{projectId}                      -> {"secret": "0x…", "amount": "0.5"}
//! proposal:{projectId}:{0xaddress}     -> plaintext proposal
//! ```
//!
//! one outstanding bid per project per device: a second `store` for the same
//! project overwrites the first. values are not encrypted at rest.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::commitment::create_commitment;
use crate::ledger::{ProjectId, ProjectRecord};
use crate::store::KvStore;
use crate::types::{Address, Commitment, Secret, Wei};
use crate::{Error, Result};

const BID_PREFIX: &str = "bid:";
const PROPOSAL_PREFIX: &str = "proposal:";

pub fn bid_key(project_id: ProjectId) -> String {
    format!("{}{}", BID_PREFIX, project_id)
}

pub fn proposal_key(project_id: ProjectId, address: &Address) -> String {
    format!("{}{}:{}", PROPOSAL_PREFIX, project_id, address.to_lower_hex())
}

/// secret and amount kept until reveal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBid {
    pub secret: Secret,
    /// whole-token decimal string, exactly as bid
    pub amount: String,
}

impl StoredBid {
    pub fn amount_decimal(&self) -> Result<Decimal> {
        self.amount
            .parse()
            .map_err(|e| Error::Validation(format!("stored amount {:?}: {}", self.amount, e)))
    }

    pub fn amount_wei(&self) -> Result<Wei> {
        Wei::from_decimal(self.amount_decimal()?)
    }

    /// recompute the commitment submitted with this bid
    pub fn commitment(&self) -> Result<Commitment> {
        create_commitment(&self.amount_wei()?, self.secret.as_bytes())
    }
}

/// bid secrets keyed by project
pub struct SecretVault<S: KvStore> {
    store: S,
}

impl<S: KvStore> SecretVault<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self, project_id: ProjectId, secret: &Secret, amount: Decimal) -> Result<()> {
        let record = StoredBid {
            secret: secret.clone(),
            amount: amount.to_string(),
        };
        self.put(project_id, &record)
    }

    /// write a full record, used to restore a previous entry
    pub fn put(&self, project_id: ProjectId, record: &StoredBid) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.store.set(&bid_key(project_id), &bytes)?;
        debug!("stored bid secret for project {}", project_id);
        Ok(())
    }

    pub fn get(&self, project_id: ProjectId) -> Result<Option<StoredBid>> {
        match self.store.get(&bid_key(project_id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// like `get`, but a missing secret is an error
    pub fn require(&self, project_id: ProjectId) -> Result<StoredBid> {
        self.get(project_id)?.ok_or_else(|| {
            Error::NotFound(format!("no bid secret stored for project {}", project_id))
        })
    }

    pub fn exists(&self, project_id: ProjectId) -> Result<bool> {
        self.store.contains(&bid_key(project_id))
    }

    pub fn remove(&self, project_id: ProjectId) -> Result<bool> {
        self.store.delete(&bid_key(project_id))
    }

    /// projects with a stored secret on this device
    pub fn projects(&self) -> Result<Vec<ProjectId>> {
        let mut ids: Vec<ProjectId> = self
            .store
            .keys_with_prefix(BID_PREFIX)?
            .iter()
            .filter_map(|k| k[BID_PREFIX.len()..].parse().ok())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

/// proposal plaintext keyed by project and submitter
///
/// readable only from the submitter's own storage. this type performs no
/// access control and no network transfer; callers decide who sees what.
pub struct ProposalVault<S: KvStore> {
    store: S,
}

impl<S: KvStore> ProposalVault<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self, project_id: ProjectId, address: &Address, proposal: &str) -> Result<()> {
        self.store
            .set(&proposal_key(project_id, address), proposal.as_bytes())
    }

    pub fn get(&self, project_id: ProjectId, address: &Address) -> Result<Option<String>> {
        match self.store.get(&proposal_key(project_id, address))? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn remove(&self, project_id: ProjectId, address: &Address) -> Result<bool> {
        self.store.delete(&proposal_key(project_id, address))
    }

    /// the winner's proposal, shown to the project's client
    ///
    /// only yields text when `caller` is the client, a winner is set and this
    /// device happens to hold the winner's proposal. a display rule, not an
    /// authorization check.
    pub fn winner_proposal_for_client(
        &self,
        project: &ProjectRecord,
        caller: &Address,
    ) -> Result<Option<String>> {
        match project.winner {
            Some(winner) if project.is_client(caller) => self.get(project.id, &winner),
            _ => Ok(None),
        }
    }
}
