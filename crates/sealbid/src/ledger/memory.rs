//! memory ledger - in-process model of the bidding contract
//!
//! enforces the same rules as the on-chain contract so the client flow can be
//! exercised without a network. time is an explicit clock so reveal windows
//! can be driven from tests. NOT a replacement for the real ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tracing::debug;

use crate::commitment::verify_commitment;
use crate::ledger::{
    BidRecord, BidStatus, BidSubmission, Ledger, LedgerEvent, NewProject, ProjectId,
    ProjectRecord, ProjectStatus,
};
use crate::types::{Address, Secret, Wei};
use crate::{Error, Result};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Default)]
struct State {
    projects: BTreeMap<ProjectId, ProjectRecord>,
    /// bids per project, in submission order
    bids: HashMap<ProjectId, Vec<BidRecord>>,
    events: Vec<LedgerEvent>,
}

/// in-memory ledger
pub struct MemoryLedger {
    state: Mutex<State>,
    now: AtomicU64,
    offline: AtomicBool,
}

impl MemoryLedger {
    /// ledger whose clock starts at the current wall-clock time
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self::with_time(now)
    }

    /// ledger whose clock starts at `now` (unix seconds)
    pub fn with_time(now: u64) -> Self {
        Self {
            state: Mutex::new(State::default()),
            now: AtomicU64::new(now),
            offline: AtomicBool::new(false),
        }
    }

    pub fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    pub fn set_time(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance_time(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }

    /// simulate a transport outage: every call fails with `Error::Network`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// end the bidding window once the deadline has passed
    ///
    /// projects with bids move to `Revealing`, empty ones to `Closed`.
    pub fn close_bidding(&self, project_id: ProjectId) -> Result<ProjectStatus> {
        let now = self.now();
        let mut guard = self.lock()?;
        let project = project_mut(&mut guard.projects, project_id)?;

        if project.status != ProjectStatus::Active {
            return Err(Error::Rejected("bidding is not active".into()));
        }
        if now <= project.deadline {
            return Err(Error::Rejected("deadline has not passed".into()));
        }

        let next = if project.bid_count > 0 {
            ProjectStatus::Revealing
        } else {
            ProjectStatus::Closed
        };
        transition(project, next)?;
        Ok(next)
    }

    /// end the reveal window and open winner selection
    pub fn finish_reveal(&self, project_id: ProjectId) -> Result<u64> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        transition(project_mut(&mut state.projects, project_id)?, ProjectStatus::Selecting)?;

        let count = state
            .bids
            .get(&project_id)
            .map(|bids| bids.iter().filter(|b| b.revealed).count() as u64)
            .unwrap_or(0);
        state.events.push(LedgerEvent::BidsRevealed { project_id, count });
        Ok(count)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|e| Error::Network(e.to_string()))
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("ledger unreachable".into()));
        }
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn project_mut(
    projects: &mut BTreeMap<ProjectId, ProjectRecord>,
    project_id: ProjectId,
) -> Result<&mut ProjectRecord> {
    projects
        .get_mut(&project_id)
        .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
}

fn transition(project: &mut ProjectRecord, next: ProjectStatus) -> Result<()> {
    if !project.status.can_transition_to(next) {
        return Err(Error::Rejected(format!(
            "invalid transition {:?} -> {:?}",
            project.status, next
        )));
    }
    debug!("project {} {:?} -> {:?}", project.id, project.status, next);
    project.status = next;
    Ok(())
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn project(&self, project_id: ProjectId) -> Result<Option<ProjectRecord>> {
        self.check_online()?;
        Ok(self.lock()?.projects.get(&project_id).cloned())
    }

    async fn bid(&self, project_id: ProjectId, bidder: &Address) -> Result<Option<BidRecord>> {
        self.check_online()?;
        let state = self.lock()?;
        Ok(state
            .bids
            .get(&project_id)
            .and_then(|bids| bids.iter().find(|b| b.freelancer == *bidder))
            .cloned())
    }

    async fn bidders(&self, project_id: ProjectId) -> Result<Vec<Address>> {
        self.check_online()?;
        let state = self.lock()?;
        Ok(state
            .bids
            .get(&project_id)
            .map(|bids| bids.iter().map(|b| b.freelancer).collect())
            .unwrap_or_default())
    }

    async fn project_count(&self) -> Result<u64> {
        self.check_online()?;
        Ok(self.lock()?.projects.len() as u64)
    }

    async fn create_project(&self, from: &Address, project: NewProject) -> Result<ProjectId> {
        self.check_online()?;
        if project.min_budget > project.max_budget {
            return Err(Error::Rejected("min budget exceeds max budget".into()));
        }
        if project.duration_days == 0 {
            return Err(Error::Rejected("duration must be at least one day".into()));
        }

        let now = self.now();
        let mut state = self.lock()?;
        let id = state.projects.len() as ProjectId;

        state.projects.insert(
            id,
            ProjectRecord {
                id,
                client: *from,
                title: project.title.clone(),
                description: project.description,
                min_budget: project.min_budget,
                max_budget: project.max_budget,
                deadline: now + project.duration_days * SECONDS_PER_DAY,
                status: ProjectStatus::Active,
                winner: None,
                bid_count: 0,
                created_at: now,
            },
        );
        state.events.push(LedgerEvent::ProjectCreated {
            project_id: id,
            client: *from,
            title: project.title,
        });
        Ok(id)
    }

    async fn submit_bid(&self, from: &Address, bid: BidSubmission) -> Result<()> {
        self.check_online()?;
        let now = self.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let project = project_mut(&mut state.projects, bid.project_id)?;

        if project.status != ProjectStatus::Active {
            return Err(Error::Rejected("project is not accepting bids".into()));
        }
        if now > project.deadline {
            return Err(Error::Rejected("bidding deadline has passed".into()));
        }
        if project.client == *from {
            return Err(Error::Rejected("client cannot bid on own project".into()));
        }

        let bids = state.bids.entry(bid.project_id).or_default();
        if bids.iter().any(|b| b.freelancer == *from) {
            return Err(Error::Rejected("already bid on this project".into()));
        }

        bids.push(BidRecord {
            freelancer: *from,
            commitment: bid.commitment,
            proposal_hash: bid.proposal_hash,
            submitted_at: now,
            amount: Wei::zero(),
            stake: bid.stake,
            revealed: false,
            status: BidStatus::Submitted,
            encrypted_amount: bid.encrypted.as_ref().map(|e| e.handle()),
        });
        project.bid_count += 1;

        state.events.push(LedgerEvent::BidSubmitted {
            project_id: bid.project_id,
            freelancer: *from,
        });
        Ok(())
    }

    async fn reveal_bid(
        &self,
        from: &Address,
        project_id: ProjectId,
        amount: &Wei,
        secret: &Secret,
    ) -> Result<()> {
        self.check_online()?;
        let now = self.now();
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let project = project_mut(&mut state.projects, project_id)?;

        if project.status != ProjectStatus::Revealing || now <= project.deadline {
            return Err(Error::Rejected("not in reveal phase".into()));
        }
        if *amount < project.min_budget || *amount > project.max_budget {
            return Err(Error::Rejected("revealed amount outside budget".into()));
        }

        let bid = state
            .bids
            .get_mut(&project_id)
            .and_then(|bids| bids.iter_mut().find(|b| b.freelancer == *from))
            .ok_or_else(|| Error::NotFound(format!("bid by {} on project {}", from, project_id)))?;

        if bid.revealed {
            return Err(Error::Rejected("bid already revealed".into()));
        }
        if !verify_commitment(amount, secret.as_bytes(), &bid.commitment) {
            return Err(Error::Rejected("commitment mismatch".into()));
        }

        bid.revealed = true;
        bid.amount = amount.clone();
        bid.status = BidStatus::Revealed;

        state.events.push(LedgerEvent::BidRevealed {
            project_id,
            freelancer: *from,
            amount: amount.clone(),
        });
        Ok(())
    }

    async fn select_winner(&self, from: &Address, project_id: ProjectId, winner: &Address) -> Result<()> {
        self.check_online()?;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let project = project_mut(&mut state.projects, project_id)?;

        if project.client != *from {
            return Err(Error::Rejected("only the client can select a winner".into()));
        }
        if project.status != ProjectStatus::Selecting {
            return Err(Error::Rejected("project is not selecting".into()));
        }

        let bids = state.bids.entry(project_id).or_default();
        if !bids.iter().any(|b| b.freelancer == *winner && b.revealed) {
            return Err(Error::Rejected("winner has no revealed bid".into()));
        }

        transition(project, ProjectStatus::InProgress)?;
        project.winner = Some(*winner);
        for bid in bids.iter_mut().filter(|b| b.revealed) {
            bid.status = if bid.freelancer == *winner {
                BidStatus::Selected
            } else {
                BidStatus::Rejected
            };
        }

        state.events.push(LedgerEvent::WinnerSelected {
            project_id,
            winner: *winner,
        });
        Ok(())
    }

    async fn release_payment(&self, from: &Address, project_id: ProjectId, value: &Wei) -> Result<()> {
        self.check_online()?;
        let mut guard = self.lock()?;
        let state = &mut *guard;
        let project = project_mut(&mut state.projects, project_id)?;

        if project.client != *from {
            return Err(Error::Rejected("only the client can release payment".into()));
        }
        if project.status != ProjectStatus::InProgress {
            return Err(Error::Rejected("project is not in progress".into()));
        }
        let winner = project
            .winner
            .ok_or_else(|| Error::Rejected("no winner selected".into()))?;

        let owed = state
            .bids
            .get(&project_id)
            .and_then(|bids| bids.iter().find(|b| b.freelancer == winner))
            .map(|b| b.amount.clone())
            .unwrap_or_default();
        if *value < owed {
            return Err(Error::Rejected("payment below winning bid".into()));
        }

        transition(project, ProjectStatus::Completed)?;
        state.events.push(LedgerEvent::PaymentReleased {
            project_id,
            winner,
            amount: value.clone(),
        });
        Ok(())
    }

    async fn cancel_project(&self, from: &Address, project_id: ProjectId) -> Result<()> {
        self.check_online()?;
        let mut guard = self.lock()?;
        let project = project_mut(&mut guard.projects, project_id)?;

        if project.client != *from {
            return Err(Error::Rejected("only the client can cancel".into()));
        }
        if project.bid_count > 0 {
            return Err(Error::Rejected("cannot cancel a project with bids".into()));
        }
        transition(project, ProjectStatus::Cancelled)
    }

    async fn events_since(&self, cursor: u64) -> Result<(Vec<LedgerEvent>, u64)> {
        self.check_online()?;
        let state = self.lock()?;
        let start = (cursor as usize).min(state.events.len());
        Ok((state.events[start..].to_vec(), state.events.len() as u64))
    }
}
