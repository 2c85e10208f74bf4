//! # sealbid
//!
//! sealed-bid commitments for freelance project auctions. bid amounts stay
//! hidden until the reveal deadline; secrets never leave the bidder's device
//! before reveal.
//!
//! ## architecture
//!
//! ```text
//!   amount + proposal
//!          │
//!          ▼
//!   ┌──────────────┐   secret    ┌──────────────┐
//!   │  commitment  │────────────►│ secret vault │  (local kv store)
//!   └──────┬───────┘             └──────┬───────┘
//!          │ keccak256(amount ‖ secret) │ after deadline
//!          ▼                            ▼
//!   ┌──────────────┐  reveal(amount, secret)
//!   │    ledger    │◄───────────────────┘
//!   └──────┬───────┘
//!          │ encrypted handle (optional)
//!          ▼
//!   ┌──────────────┐  ephemeral key  ┌──────────────┐
//!   │ fhe gateway  │◄───────────────►│ re-encryption│  owner-only view
//!   └──────────────┘                 └──────────────┘
//! ```
//!
//! ## properties
//!
//! - commitments are binding and hiding: keccak256 over 64 packed bytes
//! - a reveal recomputes the commitment locally before any ledger write
//! - encrypted inputs are bound to (chain, contract, user)
//! - mock encryption is explicit: every ciphertext carries its mode
//!
//! ## usage
//!
//! ```rust,ignore
//! use sealbid::{BidClient, BidOptions, MemoryLedger, store::memory::MemoryStore};
//!
//! let client = BidClient::new(ledger, MemoryStore::new(), me, contract);
//! let bid = client.submit_bid(project_id, "0.5".parse()?, "my proposal", BidOptions::default()).await?;
//!
//! // after the deadline
//! let amount = client.reveal_bid(project_id).await?;
//! ```

pub mod account;
pub mod client;
pub mod commitment;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fhe;
pub mod ledger;
pub mod lifecycle;
pub mod reencrypt;
pub mod store;
pub mod types;
pub mod vault;

#[cfg(feature = "devnet")]
pub mod devnet;

#[cfg(feature = "network")]
pub mod network;

pub use account::Account;
pub use client::{BidClient, BidOptions, ProjectSummary, SubmittedBid};
pub use config::Config;
pub use error::{Error, Result};
pub use fhe::{EncryptedBid, EncryptionMode, FheGateway};
pub use ledger::{Ledger, LedgerEvent, MemoryLedger, ProjectId, ProjectStatus};
pub use lifecycle::AllowedActions;
pub use reencrypt::ReEncryptionFlow;
pub use types::{Address, Commitment, ProposalHash, Secret, Wei};
pub use vault::{ProposalVault, SecretVault};

#[cfg(feature = "devnet")]
pub use devnet::LocalFheNetwork;
