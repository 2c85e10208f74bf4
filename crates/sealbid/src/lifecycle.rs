//! bid lifecycle
//!
//! derives which actions a caller may take from ledger-reported state. nothing
//! here writes to the ledger; the flags only gate what a client offers.
//!
//! ```text
//! Active ──► Revealing ──► Selecting ──► InProgress ──► Completed
//!   │  │         ▲            ▲                 └──────► Disputed
//!   │  └──► Closed ───────────┘
//!   └──► Cancelled (no bids)
//! ```
//!
//! a closed project goes straight to selection, or back to revealing when the
//! ledger reopens the reveal window for it.

use serde::{Deserialize, Serialize};

use crate::ledger::{BidRecord, LedgerEvent, ProjectRecord, ProjectStatus};
use crate::types::Address;

impl ProjectStatus {
    /// whether the ledger may move a project from `self` to `next`
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Active, Closed)
                | (Active, Revealing)
                | (Active, Cancelled)
                | (Closed, Revealing)
                | (Closed, Selecting)
                | (Revealing, Selecting)
                | (Selecting, InProgress)
                | (InProgress, Completed)
                | (InProgress, Disputed)
        )
    }

    /// no further transitions possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProjectStatus::Completed | ProjectStatus::Disputed | ProjectStatus::Cancelled
        )
    }
}

/// actions a caller may take on a project right now
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedActions {
    pub can_submit_bid: bool,
    pub can_reveal: bool,
    pub can_select_winner: bool,
    pub can_release_payment: bool,
    pub can_cancel: bool,
}

/// classify permitted actions for `caller`
///
/// `caller_bid` is the caller's own bid on this project, if the ledger (or
/// local custody) knows of one. `now` is unix seconds.
pub fn allowed_actions(
    project: &ProjectRecord,
    caller_bid: Option<&BidRecord>,
    caller: &Address,
    now: u64,
) -> AllowedActions {
    let is_client = project.is_client(caller);
    let status = project.status;

    AllowedActions {
        can_submit_bid: status == ProjectStatus::Active && caller_bid.is_none() && !is_client,
        can_reveal: caller_bid.map_or(false, |bid| !bid.revealed)
            && status == ProjectStatus::Revealing
            && now > project.deadline,
        can_select_winner: is_client && status == ProjectStatus::Selecting,
        can_release_payment: is_client && status == ProjectStatus::InProgress,
        can_cancel: is_client && status == ProjectStatus::Active && project.bid_count == 0,
    }
}

/// a caller's mirrored view of one project, kept fresh from the event log
#[derive(Clone, Debug)]
pub struct ProjectView {
    pub project: ProjectRecord,
    pub caller: Address,
    pub caller_bid: Option<BidRecord>,
}

impl ProjectView {
    pub fn new(project: ProjectRecord, caller: Address, caller_bid: Option<BidRecord>) -> Self {
        Self {
            project,
            caller,
            caller_bid,
        }
    }

    pub fn actions(&self, now: u64) -> AllowedActions {
        allowed_actions(&self.project, self.caller_bid.as_ref(), &self.caller, now)
    }

    /// fold an event into the view
    ///
    /// returns true when the event concerns this project and the caller should
    /// refetch authoritative records from the ledger.
    pub fn apply(&mut self, event: &LedgerEvent) -> bool {
        if event.project_id() != self.project.id {
            return false;
        }

        match event {
            LedgerEvent::ProjectCreated { .. } => {}
            LedgerEvent::BidSubmitted { .. } => {
                self.project.bid_count += 1;
            }
            LedgerEvent::BidRevealed { freelancer, amount, .. } => {
                if *freelancer == self.caller {
                    if let Some(bid) = self.caller_bid.as_mut() {
                        bid.revealed = true;
                        bid.amount = amount.clone();
                    }
                }
            }
            LedgerEvent::BidsRevealed { .. } => {
                self.advance(ProjectStatus::Selecting);
            }
            LedgerEvent::WinnerSelected { winner, .. } => {
                self.project.winner = Some(*winner);
                self.advance(ProjectStatus::InProgress);
            }
            LedgerEvent::PaymentReleased { .. } => {
                self.advance(ProjectStatus::Completed);
            }
        }
        true
    }

    fn advance(&mut self, next: ProjectStatus) {
        // out-of-order events are left for the refetch to settle
        if self.project.status.can_transition_to(next) {
            self.project.status = next;
        }
    }
}
