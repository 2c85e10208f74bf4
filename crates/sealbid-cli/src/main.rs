//! sealbid - sealed-bid commitments from the command line
//!
//! usage:
//!   sealbid secret                                       # fresh bid secret
//!   sealbid hash-proposal "i can ship in a week"
//!   sealbid commit --project 3 --amount 0.5 --address 0xabc… --proposal "…"
//!   sealbid reveal --project 3                           # reveal call arguments
//!   sealbid encrypt --amount 0.5 --min 0.1 --max 1 --contract 0x… --user 0x…
//!   sealbid status --snapshot project.json --caller 0x…
//!   sealbid account                                      # local signer address
//!   sealbid view --handle 0x… --contract 0x…             # decrypt own encrypted bid
//!
//! data stored in ~/.sealbid/

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use sealbid::commitment::{create_commitment, generate_secret, hash_proposal};
use sealbid::config::{default_data_dir, Config};
use sealbid::crypto::random_bytes;
use sealbid::fhe::{FheGateway, NetworkProvider};
use sealbid::ledger::{BidRecord, ProjectRecord};
use sealbid::lifecycle::allowed_actions;
use sealbid::network::{HttpReencryptionService, JsonRpcProvider};
use sealbid::store::disk::SledStore;
use sealbid::types::{parse_hex_array, to_hex_prefixed};
use sealbid::{Account, Address, Commitment, ProposalVault, ReEncryptionFlow, SecretVault, Wei};

/// sealbid - sealed-bid commitments and local secret custody
#[derive(Parser)]
#[command(name = "sealbid")]
#[command(about = "sealed-bid commitments and local secret custody")]
#[command(version)]
struct Args {
    /// data directory (default: ~/.sealbid)
    #[arg(short, long, env = "SEALBID_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// config file (default: <data dir>/config.toml)
    #[arg(short, long, env = "SEALBID_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// generate a fresh 32-byte bid secret
    Secret,

    /// keccak256 of proposal text
    HashProposal {
        text: String,
    },

    /// create a commitment and keep its secret for reveal
    Commit {
        /// project id
        #[arg(short, long)]
        project: u64,

        /// bid amount in whole tokens
        #[arg(short, long)]
        amount: Decimal,

        /// bidder address, used as the proposal key
        #[arg(long)]
        address: Option<Address>,

        /// proposal text kept next to the secret
        #[arg(long)]
        proposal: Option<String>,
    },

    /// load the stored secret and print the reveal arguments
    Reveal {
        #[arg(short, long)]
        project: u64,

        /// commitment recorded on the ledger, checked before printing
        #[arg(long)]
        expect: Option<Commitment>,
    },

    /// encrypt an amount through the fhe gateway
    Encrypt {
        #[arg(short, long)]
        amount: Decimal,

        #[arg(long)]
        min: Decimal,

        #[arg(long)]
        max: Decimal,

        /// contract the input is bound to
        #[arg(long)]
        contract: Address,

        /// submitter the input is bound to
        #[arg(long)]
        user: Address,

        /// json-rpc endpoint (overrides config)
        #[arg(long, env = "SEALBID_RPC_URL")]
        rpc_url: Option<String>,

        /// skip the network key fetch, always mock
        #[arg(long)]
        offline: bool,

        /// fail instead of falling back to mock encryption
        #[arg(long)]
        strict: bool,
    },

    /// derive allowed actions from a project snapshot
    Status {
        /// json file: {"project": {...}, "bid": {...} | null}
        #[arg(short, long)]
        snapshot: PathBuf,

        #[arg(long)]
        caller: Address,

        /// unix seconds (default: now)
        #[arg(long)]
        now: Option<u64>,
    },

    /// print the local signer (created on first use)
    Account,

    /// decrypt one of your encrypted bid amounts through the gateway
    View {
        /// 32-byte ciphertext handle recorded with the bid
        #[arg(long)]
        handle: String,

        /// contract the bid was submitted to
        #[arg(long)]
        contract: Address,

        /// json-rpc endpoint (overrides config)
        #[arg(long, env = "SEALBID_RPC_URL")]
        rpc_url: Option<String>,

        /// re-encryption gateway (overrides config)
        #[arg(long, env = "SEALBID_GATEWAY_URL")]
        gateway_url: Option<String>,
    },
}

#[derive(Deserialize)]
struct Snapshot {
    project: ProjectRecord,
    #[serde(default)]
    bid: Option<BidRecord>,
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// load the signer seed, generating it on first use
fn load_or_create_account(data_dir: &Path) -> Result<Account> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let seed_path = data_dir.join("account.seed");

    let seed: [u8; 32] = if seed_path.exists() {
        let bytes = std::fs::read(&seed_path)
            .with_context(|| format!("failed to read {}", seed_path.display()))?;
        match bytes.try_into() {
            Ok(seed) => seed,
            Err(_) => bail!("{} must hold 32 bytes", seed_path.display()),
        }
    } else {
        let seed: [u8; 32] = random_bytes();
        std::fs::write(&seed_path, seed)
            .with_context(|| format!("failed to write {}", seed_path.display()))?;
        info!("created signer seed at {}", seed_path.display());
        seed
    };
    Ok(Account::from_seed(&seed)?)
}

fn open_store(data_dir: &Path, config: &Config) -> Result<SledStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
    let db_path = config.db_path(data_dir);
    SledStore::open(&db_path).with_context(|| format!("failed to open database {}", db_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("sealbid=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    let config_path = args.config.unwrap_or_else(|| data_dir.join("config.toml"));
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    match args.command {
        Command::Secret => {
            println!("{}", generate_secret().to_hex());
        }

        Command::HashProposal { text } => {
            println!("{}", hash_proposal(&text));
        }

        Command::Commit {
            project,
            amount,
            address,
            proposal,
        } => {
            if amount.is_sign_negative() {
                bail!("amount must not be negative");
            }
            if proposal.is_some() && address.is_none() {
                bail!("--proposal needs --address");
            }
            let store = open_store(&data_dir, &config)?;
            let secrets = SecretVault::new(store.clone());

            if secrets.exists(project)? {
                warn!("replacing the stored secret for project {}", project);
            }

            let secret = generate_secret();
            let commitment = create_commitment(&Wei::from_decimal(amount)?, secret.as_bytes())?;
            secrets.store(project, &secret, amount)?;

            let proposal_hash = match (proposal, address) {
                (Some(text), Some(address)) => {
                    ProposalVault::new(store).store(project, &address, &text)?;
                    Some(hash_proposal(&text))
                }
                _ => None,
            };

            info!("stored secret for project {} in {}", project, data_dir.display());
            print_json(&json!({
                "project": project,
                "commitment": commitment,
                "proposal_hash": proposal_hash,
            }))?;
        }

        Command::Reveal { project, expect } => {
            let store = open_store(&data_dir, &config)?;
            let stored = SecretVault::new(store).require(project)?;
            let commitment = stored.commitment()?;

            if let Some(expected) = expect {
                if expected != commitment {
                    bail!(
                        "stored secret does not match commitment {} (recomputed {})",
                        expected,
                        commitment
                    );
                }
            }

            print_json(&json!({
                "project": project,
                "amount": stored.amount,
                "amount_wei": stored.amount_wei()?,
                "secret": stored.secret,
                "commitment": commitment,
            }))?;
        }

        Command::Encrypt {
            amount,
            min,
            max,
            contract,
            user,
            rpc_url,
            offline,
            strict,
        } => {
            let provider: Option<Arc<dyn NetworkProvider>> = if offline {
                None
            } else {
                let url = rpc_url.unwrap_or_else(|| config.gateway.rpc_url.clone());
                info!("probing fhe network via {}", url);
                Some(Arc::new(JsonRpcProvider::new(&url)) as Arc<dyn NetworkProvider>)
            };
            let allow_mock = config.gateway.allow_mock && !strict;

            let gateway = FheGateway::new(provider, allow_mock);
            let encrypted = gateway
                .encrypt_bid_amount(amount, min, max, &contract, &user)
                .await?;
            if encrypted.mode.is_mock() {
                warn!("mock ciphertext: the amount is NOT hidden");
            }

            print_json(&json!({
                "mode": encrypted.mode,
                "chain_id": gateway.chain_id(),
                "handle": to_hex_prefixed(&encrypted.handle()),
                "encrypted_amount": encrypted.encrypted_amount_hex(),
                "proof": encrypted.proof_hex(),
            }))?;
        }

        Command::Status {
            snapshot,
            caller,
            now,
        } => {
            let contents = std::fs::read_to_string(&snapshot)
                .with_context(|| format!("failed to read snapshot {}", snapshot.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&contents)
                .with_context(|| format!("failed to parse snapshot {}", snapshot.display()))?;

            let now = match now {
                Some(now) => now,
                None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
            };
            let actions = allowed_actions(&snapshot.project, snapshot.bid.as_ref(), &caller, now);

            print_json(&json!({
                "project": snapshot.project.id,
                "status": snapshot.project.status.label(),
                "actions": actions,
            }))?;
        }

        Command::Account => {
            let account = load_or_create_account(&data_dir)?;
            print_json(&json!({
                "address": account.address(),
                "public_key": to_hex_prefixed(account.public_key().as_bytes()),
            }))?;
        }

        Command::View {
            handle,
            contract,
            rpc_url,
            gateway_url,
        } => {
            let handle: [u8; 32] = parse_hex_array(&handle)?;
            let account = Arc::new(load_or_create_account(&data_dir)?);

            let rpc_url = rpc_url.unwrap_or_else(|| config.gateway.rpc_url.clone());
            let gateway_url = gateway_url.unwrap_or_else(|| config.gateway.gateway_url.clone());
            info!("re-encrypting via {}", gateway_url);

            // re-encryption needs the real network, never mock
            let gateway = Arc::new(FheGateway::new(
                Some(Arc::new(JsonRpcProvider::new(&rpc_url)) as Arc<dyn NetworkProvider>),
                false,
            ));
            let flow = ReEncryptionFlow::new(
                gateway,
                account.clone(),
                Arc::new(HttpReencryptionService::new(&gateway_url)),
            )
            .with_signing_timeout(config.gateway.signing_timeout());

            let amount = flow
                .reencrypt_bid_amount(&handle, &contract, &account.address())
                .await?;
            print_json(&json!({
                "handle": to_hex_prefixed(&handle),
                "amount": amount.to_decimal()?.to_string(),
                "amount_wei": amount,
            }))?;
        }
    }

    Ok(())
}
