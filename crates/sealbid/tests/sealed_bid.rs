//! end-to-end sealed bidding against the in-memory ledger and fhe devnet

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use sealbid::commitment::create_commitment;
use sealbid::ledger::{Ledger, NewProject};
use sealbid::lifecycle::ProjectView;
use sealbid::store::disk::SledStore;
use sealbid::store::memory::MemoryStore;
use sealbid::{
    Account, Address, BidClient, BidOptions, EncryptionMode, Error, FheGateway, LedgerEvent,
    LocalFheNetwork, MemoryLedger, ProjectStatus, ReEncryptionFlow, Wei,
};

const T0: u64 = 1_700_000_000;
const WEEK: u64 = 7 * 24 * 60 * 60;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn contract() -> Address {
    "0x5fbdb2315678afecb367f032d93f642f64180aa3".parse().unwrap()
}

async fn post_project(ledger: &Arc<MemoryLedger>, client: &Address) -> u64 {
    ledger
        .create_project(
            client,
            NewProject {
                title: "logo redesign".into(),
                description: "vector logo, three concepts".into(),
                min_budget: Wei::parse_ether("0.1").unwrap(),
                max_budget: Wei::parse_ether("1.0").unwrap(),
                duration_days: 7,
            },
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn test_sealed_bid_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(MemoryLedger::with_time(T0));
    let client_addr = Address([0x11; 20]);
    let freelancer = Account::generate().unwrap();

    let project_id = post_project(&ledger, &client_addr).await;
    let project = ledger.project(project_id).await.unwrap().unwrap();
    assert_eq!(project.deadline, T0 + WEEK);

    // submit, then drop the client as if the process exited
    let commitment = {
        let store = SledStore::open(dir.path().join("db")).unwrap();
        let bidder = BidClient::new(ledger.clone(), store, freelancer.address(), contract());
        let submitted = bidder
            .submit_bid(
                project_id,
                dec("0.5"),
                "three concepts in five days",
                BidOptions::default(),
            )
            .await
            .unwrap();
        submitted.commitment
    };

    // nothing about the amount is visible on the ledger before reveal
    let bid = ledger.bid(project_id, &freelancer.address()).await.unwrap().unwrap();
    assert_eq!(bid.commitment, commitment);
    assert!(bid.amount.is_zero());
    assert!(!bid.revealed);

    ledger.advance_time(WEEK + 1);
    assert_eq!(ledger.close_bidding(project_id).unwrap(), ProjectStatus::Revealing);

    // a restarted client finds the secret on disk
    let store = SledStore::open(dir.path().join("db")).unwrap();
    let bidder = BidClient::new(ledger.clone(), store, freelancer.address(), contract());

    let stored = bidder.secrets().require(project_id).unwrap();
    let recomputed =
        create_commitment(&stored.amount_wei().unwrap(), stored.secret.as_bytes()).unwrap();
    assert_eq!(recomputed, commitment);

    let actions = bidder.project_actions(project_id, ledger.now()).await.unwrap();
    assert!(actions.can_reveal);
    assert!(!actions.can_submit_bid);

    let revealed = bidder.reveal_bid(project_id).await.unwrap();
    assert_eq!(revealed, Wei::parse_ether("0.5").unwrap());

    let bid = ledger.bid(project_id, &freelancer.address()).await.unwrap().unwrap();
    assert!(bid.revealed);
    assert_eq!(bid.amount, revealed);

    // client side: selection and payment
    ledger.finish_reveal(project_id).unwrap();
    let owner = BidClient::new(ledger.clone(), MemoryStore::new(), client_addr, contract());
    assert!(owner.project_actions(project_id, ledger.now()).await.unwrap().can_select_winner);

    owner.select_winner(project_id, &freelancer.address()).await.unwrap();
    owner.release_payment(project_id, &revealed).await.unwrap();

    let project = ledger.project(project_id).await.unwrap().unwrap();
    assert_eq!(project.status, ProjectStatus::Completed);
    assert!(project.is_winner(&freelancer.address()));
}

#[tokio::test]
async fn test_view_follows_event_log() {
    let ledger = Arc::new(MemoryLedger::with_time(T0));
    let client_addr = Address([0x11; 20]);
    let freelancer = Address([0x22; 20]);
    let project_id = post_project(&ledger, &client_addr).await;

    let bidder = BidClient::new(ledger.clone(), MemoryStore::new(), freelancer, contract());
    bidder
        .submit_bid(project_id, dec("0.25"), "quick turnaround", BidOptions::default())
        .await
        .unwrap();

    let project = ledger.project(project_id).await.unwrap().unwrap();
    let own_bid = ledger.bid(project_id, &freelancer).await.unwrap();
    let mut view = ProjectView::new(project, freelancer, own_bid);
    let (_, mut cursor) = ledger.events_since(0).await.unwrap();

    ledger.advance_time(WEEK + 1);
    ledger.close_bidding(project_id).unwrap();
    view.project.status = ledger.project(project_id).await.unwrap().unwrap().status;

    bidder.reveal_bid(project_id).await.unwrap();
    ledger.finish_reveal(project_id).unwrap();

    let (events, next) = ledger.events_since(cursor).await.unwrap();
    cursor = next;
    assert!(matches!(events[0], LedgerEvent::BidRevealed { .. }));
    assert!(matches!(events[1], LedgerEvent::BidsRevealed { count: 1, .. }));
    for event in &events {
        assert!(view.apply(event));
    }
    assert_eq!(view.project.status, ProjectStatus::Selecting);
    assert!(view.caller_bid.as_ref().unwrap().revealed);

    let (rest, _) = ledger.events_since(cursor).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn test_encrypted_bid_owner_view() {
    let ledger = Arc::new(MemoryLedger::with_time(T0));
    let network = Arc::new(LocalFheNetwork::new());
    let gateway = Arc::new(FheGateway::new(Some(network.clone()), false));

    let freelancer = Arc::new(Account::generate().unwrap());
    network.register_account(freelancer.public_key()).unwrap();

    let project_id = post_project(&ledger, &Address([0x11; 20])).await;
    let bidder = BidClient::new(
        ledger.clone(),
        MemoryStore::new(),
        freelancer.address(),
        contract(),
    )
    .with_gateway(gateway.clone());

    let submitted = bidder
        .submit_bid(
            project_id,
            dec("0.75"),
            "senior designer",
            BidOptions {
                encrypt: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let encrypted = submitted.encrypted.unwrap();
    assert_eq!(encrypted.mode, EncryptionMode::Real);

    // the network accepts the input only for this contract and submitter
    assert!(network
        .ingest(&encrypted.proof, &Address([0x99; 20]), &freelancer.address())
        .is_err());
    let handle = network.ingest(&encrypted.proof, &contract(), &freelancer.address()).unwrap();
    assert_eq!(handle, encrypted.handle());

    let flow = ReEncryptionFlow::new(gateway, freelancer.clone(), network.clone());
    let amount = bidder.view_encrypted_amount(&flow, project_id).await.unwrap();
    assert_eq!(amount, Wei::parse_ether("0.75").unwrap());
    assert_eq!(network.key_fetch_count(), 1);
}

#[tokio::test]
async fn test_strict_gateway_blocks_submission_when_network_down() {
    let ledger = Arc::new(MemoryLedger::with_time(T0));
    let network = Arc::new(LocalFheNetwork::new());
    network.set_offline(true);
    let gateway = Arc::new(FheGateway::new(Some(network.clone()), false));

    let project_id = post_project(&ledger, &Address([0x11; 20])).await;
    let bidder = BidClient::new(ledger.clone(), MemoryStore::new(), Address([0x22; 20]), contract())
        .with_gateway(gateway);
    let options = BidOptions {
        encrypt: true,
        ..Default::default()
    };

    let result = bidder.submit_bid(project_id, dec("0.5"), "p", options.clone()).await;
    assert!(matches!(result, Err(Error::Initialization(_))));
    assert!(!bidder.secrets().exists(project_id).unwrap());
    assert_eq!(ledger.project(project_id).await.unwrap().unwrap().bid_count, 0);

    // the failed key fetch is not cached
    network.set_offline(false);
    let submitted = bidder.submit_bid(project_id, dec("0.5"), "p", options).await.unwrap();
    assert_eq!(submitted.encrypted.unwrap().mode, EncryptionMode::Real);
    assert_eq!(network.key_fetch_count(), 2);
}
