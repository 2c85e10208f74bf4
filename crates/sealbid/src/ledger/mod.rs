//! ledger seam
//!
//! the ledger is the authoritative, external state machine holding projects
//! and bids. this crate only mirrors its records, submits transactions
//! through [`Ledger`] and replays its event log. a write is never assumed to
//! have succeeded until the ledger says so.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::fhe::EncryptedBid;
use crate::types::{Address, Commitment, ProposalHash, Secret, Wei};
use crate::Result;

pub use memory::MemoryLedger;

/// ledger-assigned project identifier
pub type ProjectId = u64;

/// project status as reported by the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProjectStatus {
    Active = 0,
    Closed = 1,
    Revealing = 2,
    Selecting = 3,
    InProgress = 4,
    Completed = 5,
    Disputed = 6,
    Cancelled = 7,
}

impl ProjectStatus {
    /// decode the on-chain enum discriminant
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Active,
            1 => Self::Closed,
            2 => Self::Revealing,
            3 => Self::Selecting,
            4 => Self::InProgress,
            5 => Self::Completed,
            6 => Self::Disputed,
            7 => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Closed => "Closed",
            Self::Revealing => "Revealing",
            Self::Selecting => "Selecting",
            Self::InProgress => "In Progress",
            Self::Completed => "Completed",
            Self::Disputed => "Disputed",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// bid status as reported by the ledger
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BidStatus {
    Submitted = 0,
    Revealed = 1,
    Selected = 2,
    Rejected = 3,
    Withdrawn = 4,
}

impl BidStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Self::Submitted,
            1 => Self::Revealed,
            2 => Self::Selected,
            3 => Self::Rejected,
            4 => Self::Withdrawn,
            _ => return None,
        })
    }
}

/// mirrored project record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: ProjectId,
    pub client: Address,
    pub title: String,
    pub description: String,
    /// lower bound of accepted bids (inclusive)
    pub min_budget: Wei,
    /// upper bound of accepted bids (inclusive)
    pub max_budget: Wei,
    /// bidding deadline, unix seconds
    pub deadline: u64,
    pub status: ProjectStatus,
    pub winner: Option<Address>,
    pub bid_count: u64,
    pub created_at: u64,
}

impl ProjectRecord {
    pub fn is_client(&self, caller: &Address) -> bool {
        self.client == *caller
    }

    pub fn is_winner(&self, bidder: &Address) -> bool {
        self.winner.as_ref() == Some(bidder)
    }
}

/// mirrored bid record
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidRecord {
    pub freelancer: Address,
    pub commitment: Commitment,
    pub proposal_hash: ProposalHash,
    /// unix seconds
    pub submitted_at: u64,
    /// zero until revealed
    pub amount: Wei,
    pub stake: Wei,
    /// whether the secret has been disclosed on-chain
    pub revealed: bool,
    pub status: BidStatus,
    /// encrypted amount handle, if the bid went through the fhe gateway
    #[serde(default)]
    pub encrypted_amount: Option<[u8; 32]>,
}

/// project creation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub min_budget: Wei,
    pub max_budget: Wei,
    /// bidding window in days
    pub duration_days: u64,
}

/// bid submission parameters
#[derive(Clone, Debug)]
pub struct BidSubmission {
    pub project_id: ProjectId,
    pub commitment: Commitment,
    pub proposal_hash: ProposalHash,
    /// value attached to the transaction
    pub stake: Wei,
    pub encrypted: Option<EncryptedBid>,
}

/// events emitted by the ledger, replayed to refresh local views
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LedgerEvent {
    ProjectCreated {
        project_id: ProjectId,
        client: Address,
        title: String,
    },
    BidSubmitted {
        project_id: ProjectId,
        freelancer: Address,
    },
    BidRevealed {
        project_id: ProjectId,
        freelancer: Address,
        amount: Wei,
    },
    BidsRevealed {
        project_id: ProjectId,
        count: u64,
    },
    WinnerSelected {
        project_id: ProjectId,
        winner: Address,
    },
    PaymentReleased {
        project_id: ProjectId,
        winner: Address,
        amount: Wei,
    },
}

impl LedgerEvent {
    pub fn project_id(&self) -> ProjectId {
        match self {
            Self::ProjectCreated { project_id, .. }
            | Self::BidSubmitted { project_id, .. }
            | Self::BidRevealed { project_id, .. }
            | Self::BidsRevealed { project_id, .. }
            | Self::WinnerSelected { project_id, .. }
            | Self::PaymentReleased { project_id, .. } => *project_id,
        }
    }
}

/// ledger collaborator surface
///
/// reads return `Ok(None)` for unknown ids. transport failures surface as
/// `Error::Network`, refused transactions as `Error::Rejected`.
#[async_trait]
pub trait Ledger: Send + Sync {
    // === reads ===

    async fn project(&self, project_id: ProjectId) -> Result<Option<ProjectRecord>>;

    async fn bid(&self, project_id: ProjectId, bidder: &Address) -> Result<Option<BidRecord>>;

    async fn bidders(&self, project_id: ProjectId) -> Result<Vec<Address>>;

    async fn project_count(&self) -> Result<u64>;

    // === writes ===

    async fn create_project(&self, from: &Address, project: NewProject) -> Result<ProjectId>;

    async fn submit_bid(&self, from: &Address, bid: BidSubmission) -> Result<()>;

    async fn reveal_bid(
        &self,
        from: &Address,
        project_id: ProjectId,
        amount: &Wei,
        secret: &Secret,
    ) -> Result<()>;

    async fn select_winner(&self, from: &Address, project_id: ProjectId, winner: &Address) -> Result<()>;

    async fn release_payment(&self, from: &Address, project_id: ProjectId, value: &Wei) -> Result<()>;

    async fn cancel_project(&self, from: &Address, project_id: ProjectId) -> Result<()>;

    // === event log ===

    /// events at positions `>= cursor`, plus the next cursor
    async fn events_since(&self, cursor: u64) -> Result<(Vec<LedgerEvent>, u64)>;
}

/// fetch every project, ids `0..project_count`
pub async fn load_projects<L: Ledger + ?Sized>(ledger: &L) -> Result<Vec<ProjectRecord>> {
    let count = ledger.project_count().await?;
    let mut projects = Vec::with_capacity(count as usize);
    for project_id in 0..count {
        if let Some(project) = ledger.project(project_id).await? {
            projects.push(project);
        }
    }
    Ok(projects)
}

/// fetch a project together with every bid on it
pub async fn load_project_bids<L: Ledger + ?Sized>(
    ledger: &L,
    project_id: ProjectId,
) -> Result<Option<(ProjectRecord, Vec<BidRecord>)>> {
    let Some(project) = ledger.project(project_id).await? else {
        return Ok(None);
    };

    let mut bids = Vec::new();
    for bidder in ledger.bidders(project_id).await? {
        if let Some(bid) = ledger.bid(project_id, &bidder).await? {
            bids.push(bid);
        }
    }
    Ok(Some((project, bids)))
}
