//! high-level client for sealed bidding
//!
//! ties together: commitments, local custody, encryption gateway, ledger

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::commitment::{create_commitment, generate_secret, hash_proposal, verify_commitment};
use crate::fhe::{EncryptedBid, FheGateway};
use crate::ledger::{
    load_project_bids, load_projects, BidRecord, BidSubmission, Ledger, NewProject, ProjectId,
    ProjectRecord,
};
use crate::lifecycle::{allowed_actions, AllowedActions};
use crate::reencrypt::ReEncryptionFlow;
use crate::store::KvStore;
use crate::types::{Address, Commitment, ProposalHash, Wei};
use crate::vault::{ProposalVault, SecretVault};
use crate::{Error, Result};

/// what a successful submission put on the ledger
#[derive(Clone, Debug)]
pub struct SubmittedBid {
    pub project_id: ProjectId,
    pub commitment: Commitment,
    pub proposal_hash: ProposalHash,
    pub encrypted: Option<EncryptedBid>,
}

/// bid options beyond amount and proposal
#[derive(Clone, Debug, Default)]
pub struct BidOptions {
    /// value attached to the submission
    pub stake: Wei,
    /// also submit the amount through the encryption gateway
    pub encrypt: bool,
}

/// a project as seen by this account
#[derive(Clone, Debug)]
pub struct ProjectSummary {
    pub project: ProjectRecord,
    /// this account's bid, if any
    pub own_bid: Option<BidRecord>,
    pub actions: AllowedActions,
}

/// sealed-bid client acting for one account against one contract
pub struct BidClient<L: Ledger, S: KvStore + Clone> {
    ledger: Arc<L>,
    account: Address,
    contract: Address,
    secrets: SecretVault<S>,
    proposals: ProposalVault<S>,
    gateway: Option<Arc<FheGateway>>,
}

impl<L: Ledger, S: KvStore + Clone> BidClient<L, S> {
    pub fn new(ledger: Arc<L>, store: S, account: Address, contract: Address) -> Self {
        Self {
            ledger,
            account,
            contract,
            secrets: SecretVault::new(store.clone()),
            proposals: ProposalVault::new(store),
            gateway: None,
        }
    }

    pub fn with_gateway(mut self, gateway: Arc<FheGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    pub fn secrets(&self) -> &SecretVault<S> {
        &self.secrets
    }

    pub fn proposals(&self) -> &ProposalVault<S> {
        &self.proposals
    }

    async fn require_project(&self, project_id: ProjectId) -> Result<ProjectRecord> {
        self.ledger
            .project(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    /// post a project as its client
    pub async fn create_project(&self, project: NewProject) -> Result<ProjectId> {
        if project.min_budget > project.max_budget {
            return Err(Error::Validation("min budget exceeds max budget".into()));
        }
        let id = self.ledger.create_project(&self.account, project).await?;
        info!("created project {}", id);
        Ok(id)
    }

    /// commit to `amount` (whole tokens) with `proposal` and submit
    ///
    /// # flow
    /// 1. check the amount against the project's budget range
    /// 2. generate a secret and commit to (amount, secret)
    /// 3. optionally encrypt the amount through the gateway
    /// 4. persist secret and proposal locally
    /// 5. submit commitment, proposal hash and ciphertext to the ledger
    ///
    /// if a local write or the ledger write fails, the previous local entries
    /// are restored.
    pub async fn submit_bid(
        &self,
        project_id: ProjectId,
        amount: Decimal,
        proposal: &str,
        options: BidOptions,
    ) -> Result<SubmittedBid> {
        let project = self.require_project(project_id).await?;
        let min = project.min_budget.to_decimal()?;
        let max = project.max_budget.to_decimal()?;
        if amount < min || amount > max {
            return Err(Error::OutOfRange {
                amount: amount.to_string(),
                min: min.to_string(),
                max: max.to_string(),
            });
        }

        let secret = generate_secret();
        let commitment = create_commitment(&Wei::from_decimal(amount)?, secret.as_bytes())?;
        let proposal_hash = hash_proposal(proposal);

        let encrypted = match (&self.gateway, options.encrypt) {
            (Some(gateway), true) => Some(
                gateway
                    .encrypt_bid_amount(amount, min, max, &self.contract, &self.account)
                    .await?,
            ),
            (None, true) => {
                return Err(Error::Initialization("no encryption gateway configured".into()))
            }
            (_, false) => None,
        };

        let previous_secret = self.secrets.get(project_id)?;
        let previous_proposal = self.proposals.get(project_id, &self.account)?;
        let persisted = self
            .secrets
            .store(project_id, &secret, amount)
            .and_then(|()| self.proposals.store(project_id, &self.account, proposal));
        if let Err(e) = persisted {
            warn!("could not persist bid on project {}: {}", project_id, e);
            self.restore(project_id, previous_secret, previous_proposal)?;
            return Err(e);
        }

        let submission = BidSubmission {
            project_id,
            commitment,
            proposal_hash,
            stake: options.stake,
            encrypted: encrypted.clone(),
        };
        if let Err(e) = self.ledger.submit_bid(&self.account, submission).await {
            warn!("bid on project {} not accepted: {}", project_id, e);
            self.restore(project_id, previous_secret, previous_proposal)?;
            return Err(e);
        }

        info!("submitted sealed bid on project {}", project_id);
        Ok(SubmittedBid {
            project_id,
            commitment,
            proposal_hash,
            encrypted,
        })
    }

    fn restore(
        &self,
        project_id: ProjectId,
        secret: Option<crate::vault::StoredBid>,
        proposal: Option<String>,
    ) -> Result<()> {
        match secret {
            Some(record) => self.secrets.put(project_id, &record)?,
            None => {
                self.secrets.remove(project_id)?;
            }
        }
        match proposal {
            Some(text) => self.proposals.store(project_id, &self.account, &text)?,
            None => {
                self.proposals.remove(project_id, &self.account)?;
            }
        }
        Ok(())
    }

    /// disclose the stored (amount, secret) to the ledger
    ///
    /// fails with `NotFound` before touching the ledger when this device holds
    /// no secret for the project.
    pub async fn reveal_bid(&self, project_id: ProjectId) -> Result<Wei> {
        let stored = self.secrets.require(project_id)?;
        let amount = stored.amount_wei()?;

        let bid = self
            .ledger
            .bid(project_id, &self.account)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no bid on project {}", project_id)))?;
        if !verify_commitment(&amount, stored.secret.as_bytes(), &bid.commitment) {
            return Err(Error::Validation(
                "stored secret does not match the submitted commitment".into(),
            ));
        }

        self.ledger
            .reveal_bid(&self.account, project_id, &amount, &stored.secret)
            .await?;
        info!("revealed bid on project {}", project_id);
        Ok(amount)
    }

    /// decrypt this account's encrypted bid amount through re-encryption
    pub async fn view_encrypted_amount(
        &self,
        flow: &ReEncryptionFlow,
        project_id: ProjectId,
    ) -> Result<Wei> {
        let handle = self
            .ledger
            .bid(project_id, &self.account)
            .await?
            .and_then(|bid| bid.encrypted_amount)
            .ok_or_else(|| {
                Error::NotFound(format!("no encrypted amount on project {}", project_id))
            })?;
        flow.reencrypt_bid_amount(&handle, &self.contract, &self.account)
            .await
    }

    /// actions available to this account right now
    ///
    /// revealing additionally needs the secret on this device.
    pub async fn project_actions(&self, project_id: ProjectId, now: u64) -> Result<AllowedActions> {
        let project = self.require_project(project_id).await?;
        let own_bid = self.ledger.bid(project_id, &self.account).await?;
        Ok(self.summarize(project, own_bid, now)?.actions)
    }

    fn summarize(
        &self,
        project: ProjectRecord,
        own_bid: Option<BidRecord>,
        now: u64,
    ) -> Result<ProjectSummary> {
        let mut actions = allowed_actions(&project, own_bid.as_ref(), &self.account, now);
        actions.can_reveal &= self.secrets.exists(project.id)?;
        Ok(ProjectSummary {
            project,
            own_bid,
            actions,
        })
    }

    /// every project on the ledger
    pub async fn projects(&self) -> Result<Vec<ProjectRecord>> {
        load_projects(self.ledger.as_ref()).await
    }

    /// projects this account has bid on, with its bid and actions
    pub async fn my_bids(&self, now: u64) -> Result<Vec<ProjectSummary>> {
        let mut out = Vec::new();
        for project in self.projects().await? {
            if let Some(bid) = self.ledger.bid(project.id, &self.account).await? {
                out.push(self.summarize(project, Some(bid), now)?);
            }
        }
        Ok(out)
    }

    /// projects this account posted as client, with its actions
    pub async fn my_projects(&self, now: u64) -> Result<Vec<ProjectSummary>> {
        let mut out = Vec::new();
        for project in self.projects().await? {
            if project.is_client(&self.account) {
                out.push(self.summarize(project, None, now)?);
            }
        }
        Ok(out)
    }

    /// every bid on a project, for the client's selection view
    pub async fn project_bids(&self, project_id: ProjectId) -> Result<Vec<BidRecord>> {
        load_project_bids(self.ledger.as_ref(), project_id)
            .await?
            .map(|(_, bids)| bids)
            .ok_or_else(|| Error::NotFound(format!("project {}", project_id)))
    }

    pub async fn select_winner(&self, project_id: ProjectId, winner: &Address) -> Result<()> {
        self.ledger
            .select_winner(&self.account, project_id, winner)
            .await?;
        info!("selected {} on project {}", winner, project_id);
        Ok(())
    }

    pub async fn release_payment(&self, project_id: ProjectId, value: &Wei) -> Result<()> {
        self.ledger
            .release_payment(&self.account, project_id, value)
            .await?;
        info!("released payment on project {}", project_id);
        Ok(())
    }

    pub async fn cancel_project(&self, project_id: ProjectId) -> Result<()> {
        self.ledger.cancel_project(&self.account, project_id).await?;
        info!("cancelled project {}", project_id);
        Ok(())
    }

    /// the winner's proposal, if this account is the client and holds it
    pub async fn winner_proposal(&self, project_id: ProjectId) -> Result<Option<String>> {
        let project = self.require_project(project_id).await?;
        self.proposals
            .winner_proposal_for_client(&project, &self.account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryLedger, ProjectStatus};
    use crate::store::memory::MemoryStore;
    use std::str::FromStr;

    /// store whose proposal writes fail
    #[derive(Clone, Default)]
    struct NoProposalStore(MemoryStore);

    impl KvStore for NoProposalStore {
        fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            self.0.get(key)
        }

        fn set(&self, key: &str, value: &[u8]) -> Result<()> {
            if key.starts_with("proposal:") {
                return Err(Error::Storage("disk full".into()));
            }
            self.0.set(key, value)
        }

        fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key)
        }

        fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
            self.0.keys_with_prefix(prefix)
        }
    }

    const T0: u64 = 1_700_000_000;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    async fn setup() -> (Arc<MemoryLedger>, BidClient<MemoryLedger, MemoryStore>, ProjectId) {
        let ledger = Arc::new(MemoryLedger::with_time(T0));
        let client = BidClient::new(ledger.clone(), MemoryStore::new(), Address([1; 20]), Address([0xc0; 20]));
        let project_id = client
            .create_project(NewProject {
                title: "landing page".into(),
                description: "one page, responsive".into(),
                min_budget: Wei::parse_ether("0.1").unwrap(),
                max_budget: Wei::parse_ether("1.0").unwrap(),
                duration_days: 7,
            })
            .await
            .unwrap();
        let freelancer = BidClient::new(ledger.clone(), MemoryStore::new(), Address([2; 20]), Address([0xc0; 20]));
        (ledger, freelancer, project_id)
    }

    #[tokio::test]
    async fn test_submit_stores_secret_and_proposal() {
        let (ledger, freelancer, id) = setup().await;
        let submitted = freelancer
            .submit_bid(id, dec("0.5"), "fast and clean", BidOptions::default())
            .await
            .unwrap();

        let stored = freelancer.secrets().require(id).unwrap();
        assert_eq!(stored.commitment().unwrap(), submitted.commitment);
        assert_eq!(
            freelancer.proposals().get(id, freelancer.account()).unwrap().unwrap(),
            "fast and clean"
        );

        let bid = ledger.bid(id, freelancer.account()).await.unwrap().unwrap();
        assert_eq!(bid.commitment, submitted.commitment);
        assert_eq!(bid.proposal_hash, hash_proposal("fast and clean"));
        assert!(bid.encrypted_amount.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_rejected_locally() {
        let (_, freelancer, id) = setup().await;
        let result = freelancer
            .submit_bid(id, dec("1.5"), "too pricey", BidOptions::default())
            .await;
        assert!(matches!(result, Err(Error::OutOfRange { .. })));
        assert!(!freelancer.secrets().exists(id).unwrap());
    }

    #[tokio::test]
    async fn test_failed_write_restores_previous_entries() {
        let (_, freelancer, id) = setup().await;
        let first = freelancer
            .submit_bid(id, dec("0.5"), "first", BidOptions::default())
            .await
            .unwrap();

        // the ledger refuses a second bid from the same account
        let result = freelancer
            .submit_bid(id, dec("0.7"), "second", BidOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Rejected(_))));

        let stored = freelancer.secrets().require(id).unwrap();
        assert_eq!(stored.amount, "0.5");
        assert_eq!(stored.commitment().unwrap(), first.commitment);
        assert_eq!(
            freelancer.proposals().get(id, freelancer.account()).unwrap().unwrap(),
            "first"
        );
    }

    #[tokio::test]
    async fn test_offline_ledger_leaves_state_unchanged() {
        let (ledger, freelancer, id) = setup().await;
        ledger.set_offline(true);

        let result = freelancer
            .submit_bid(id, dec("0.5"), "p", BidOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert!(!freelancer.secrets().exists(id).unwrap());
    }

    #[tokio::test]
    async fn test_rejected_write_leaves_no_secret() {
        let (ledger, freelancer, id) = setup().await;
        ledger.advance_time(8 * 24 * 60 * 60);

        let result = freelancer
            .submit_bid(id, dec("0.5"), "late", BidOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Rejected(_))));
        assert!(!freelancer.secrets().exists(id).unwrap());
    }

    #[tokio::test]
    async fn test_reveal_without_secret_is_not_found() {
        let (ledger, freelancer, id) = setup().await;
        freelancer
            .submit_bid(id, dec("0.5"), "p", BidOptions::default())
            .await
            .unwrap();
        freelancer.secrets().remove(id).unwrap();

        ledger.advance_time(7 * 24 * 60 * 60 + 1);
        ledger.close_bidding(id).unwrap();

        assert!(matches!(freelancer.reveal_bid(id).await, Err(Error::NotFound(_))));
        let bid = ledger.bid(id, freelancer.account()).await.unwrap().unwrap();
        assert!(!bid.revealed);
    }

    #[tokio::test]
    async fn test_reveal_with_mismatched_secret_never_reaches_ledger() {
        let (ledger, freelancer, id) = setup().await;
        freelancer
            .submit_bid(id, dec("0.5"), "p", BidOptions::default())
            .await
            .unwrap();
        // overwritten by a bid from another tab
        freelancer.secrets().store(id, &generate_secret(), dec("0.5")).unwrap();

        ledger.advance_time(7 * 24 * 60 * 60 + 1);
        ledger.close_bidding(id).unwrap();

        assert!(matches!(freelancer.reveal_bid(id).await, Err(Error::Validation(_))));
        let (events, _) = ledger.events_since(0).await.unwrap();
        assert!(!events.iter().any(|e| matches!(e, crate::ledger::LedgerEvent::BidRevealed { .. })));
    }

    #[tokio::test]
    async fn test_actions_need_local_secret_to_reveal() {
        let (ledger, freelancer, id) = setup().await;
        freelancer
            .submit_bid(id, dec("0.5"), "p", BidOptions::default())
            .await
            .unwrap();
        ledger.advance_time(7 * 24 * 60 * 60 + 1);
        ledger.close_bidding(id).unwrap();

        let now = ledger.now();
        assert!(freelancer.project_actions(id, now).await.unwrap().can_reveal);

        freelancer.secrets().remove(id).unwrap();
        assert!(!freelancer.project_actions(id, now).await.unwrap().can_reveal);
    }

    #[tokio::test]
    async fn test_encrypt_without_gateway_fails_before_storing() {
        let (_, freelancer, id) = setup().await;
        let options = BidOptions {
            encrypt: true,
            ..Default::default()
        };
        let result = freelancer.submit_bid(id, dec("0.5"), "p", options).await;
        assert!(matches!(result, Err(Error::Initialization(_))));
        assert!(!freelancer.secrets().exists(id).unwrap());
    }

    #[tokio::test]
    async fn test_mock_encrypted_bid_recorded() {
        let (ledger, freelancer, id) = setup().await;
        let freelancer = freelancer.with_gateway(Arc::new(FheGateway::offline()));
        let options = BidOptions {
            encrypt: true,
            ..Default::default()
        };

        let submitted = freelancer.submit_bid(id, dec("0.5"), "p", options).await.unwrap();
        let encrypted = submitted.encrypted.unwrap();
        assert!(encrypted.mode.is_mock());

        let bid = ledger.bid(id, freelancer.account()).await.unwrap().unwrap();
        assert_eq!(bid.encrypted_amount, Some(encrypted.handle()));
    }

    #[tokio::test]
    async fn test_failed_proposal_write_restores_secret() {
        let (ledger, _, id) = setup().await;
        let freelancer = BidClient::new(
            ledger.clone(),
            NoProposalStore::default(),
            Address([2; 20]),
            Address([0xc0; 20]),
        );
        let earlier = generate_secret();
        freelancer.secrets().store(id, &earlier, dec("0.3")).unwrap();

        let result = freelancer
            .submit_bid(id, dec("0.5"), "p", BidOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Storage(_))));

        let stored = freelancer.secrets().require(id).unwrap();
        assert_eq!(stored.secret, earlier);
        assert_eq!(stored.amount, "0.3");
        assert!(freelancer.proposals().get(id, freelancer.account()).unwrap().is_none());
        assert_eq!(ledger.project(id).await.unwrap().unwrap().bid_count, 0);
    }

    #[tokio::test]
    async fn test_my_bids_and_projects() {
        let (ledger, freelancer, first) = setup().await;
        let owner =
            BidClient::new(ledger.clone(), MemoryStore::new(), Address([1; 20]), Address([0xc0; 20]));
        let second = owner
            .create_project(NewProject {
                title: "api docs".into(),
                description: "openapi spec".into(),
                min_budget: Wei::parse_ether("0.1").unwrap(),
                max_budget: Wei::parse_ether("1.0").unwrap(),
                duration_days: 3,
            })
            .await
            .unwrap();
        freelancer
            .submit_bid(first, dec("0.5"), "p", BidOptions::default())
            .await
            .unwrap();

        assert_eq!(owner.projects().await.unwrap().len(), 2);

        let now = ledger.now();
        let mine = owner.my_projects(now).await.unwrap();
        assert_eq!(mine.len(), 2);
        // only the project without bids can be cancelled
        assert!(!mine[0].actions.can_cancel);
        assert!(mine[1].actions.can_cancel);
        assert!(freelancer.my_projects(now).await.unwrap().is_empty());

        let bids = freelancer.my_bids(now).await.unwrap();
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].project.id, first);
        assert!(!bids[0].actions.can_reveal);
        assert!(owner.my_bids(now).await.unwrap().is_empty());

        ledger.advance_time(7 * 24 * 60 * 60 + 1);
        ledger.close_bidding(first).unwrap();
        let bids = freelancer.my_bids(ledger.now()).await.unwrap();
        assert_eq!(bids[0].project.status, ProjectStatus::Revealing);
        assert!(bids[0].actions.can_reveal);
        assert!(!bids[0].own_bid.as_ref().unwrap().revealed);

        let on_first = owner.project_bids(first).await.unwrap();
        assert_eq!(on_first.len(), 1);
        assert_eq!(on_first[0].freelancer, *freelancer.account());
        assert!(owner.project_bids(second).await.unwrap().is_empty());
        assert!(matches!(owner.project_bids(42).await, Err(Error::NotFound(_))));
    }
}
