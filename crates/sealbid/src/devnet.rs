//! in-process fhe network for development and testing
//!
//! serves a network key to the gateway key fetch, verifies sealed inputs and
//! answers re-encryption requests for registered accounts.
//! no real homomorphic evaluation and no hardware key custody: NOT for
//! production.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::account::{address_of, verify_authorization};
use crate::crypto::seal_to;
use crate::fhe::real::{encode_abi_bytes, open_sealed_input};
use crate::fhe::{NetworkProvider, FHE_LIB_ADDRESS, PUBKEY_CALLDATA};
use crate::reencrypt::{AuthorizationPayload, ReencryptRequest, ReencryptionService, REENCRYPT_INFO};
use crate::types::{Address, Wei};
use crate::{Error, Result};

/// chain id reported by default (sepolia)
pub const DEVNET_CHAIN_ID: u64 = 11155111;

#[derive(Default)]
struct State {
    /// handle -> plaintext
    values: HashMap<[u8; 32], Wei>,
    /// (handle, user) pairs allowed to decrypt
    acl: HashSet<([u8; 32], Address)>,
    /// signing keys of known accounts
    accounts: HashMap<Address, VerifyingKey>,
}

/// in-memory fhe network
pub struct LocalFheNetwork {
    chain_id: u64,
    network_secret: StaticSecret,
    state: Arc<RwLock<State>>,
    offline: AtomicBool,
    key_fetches: AtomicUsize,
}

impl LocalFheNetwork {
    pub fn new() -> Self {
        Self::with_chain_id(DEVNET_CHAIN_ID)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        Self {
            chain_id,
            network_secret: StaticSecret::random_from_rng(rand::thread_rng()),
            state: Arc::new(RwLock::new(State::default())),
            offline: AtomicBool::new(false),
            key_fetches: AtomicUsize::new(0),
        }
    }

    pub fn network_key(&self) -> PublicKey {
        PublicKey::from(&self.network_secret)
    }

    /// simulate an unreachable node
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// number of chain id queries served, one per gateway key fetch
    pub fn key_fetch_count(&self) -> usize {
        self.key_fetches.load(Ordering::SeqCst)
    }

    /// make an account's signatures verifiable
    pub fn register_account(&self, key: VerifyingKey) -> Result<Address> {
        let address = address_of(&key);
        self.write()?.accounts.insert(address, key);
        Ok(address)
    }

    /// accept a sealed input submitted to `contract` by `user`
    ///
    /// verifies the binding, stores the value and grants `user` decryption
    /// rights. returns the handle.
    pub fn ingest(&self, proof: &[u8], contract: &Address, user: &Address) -> Result<[u8; 32]> {
        let (handle, amount) =
            open_sealed_input(&self.network_secret, proof, self.chain_id, contract, user)?;
        let mut state = self.write()?;
        state.values.insert(handle, amount);
        state.acl.insert((handle, *user));
        Ok(handle)
    }

    /// grant another user decryption rights on a handle
    pub fn allow(&self, handle: [u8; 32], user: Address) -> Result<()> {
        self.write()?.acl.insert((handle, user));
        Ok(())
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network("fhe node unreachable".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| Error::Storage(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| Error::Storage(format!("lock poisoned: {}", e)))
    }
}

impl Default for LocalFheNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkProvider for LocalFheNetwork {
    async fn chain_id(&self) -> Result<u64> {
        self.key_fetches.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;
        Ok(self.chain_id)
    }

    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        self.check_online()?;
        if *to != FHE_LIB_ADDRESS || data != PUBKEY_CALLDATA.as_slice() {
            return Err(Error::Network(format!("execution reverted: unknown call to {}", to)));
        }
        Ok(encode_abi_bytes(self.network_key().as_bytes()))
    }
}

#[async_trait]
impl ReencryptionService for LocalFheNetwork {
    async fn reencrypt(&self, request: &ReencryptRequest) -> Result<Vec<u8>> {
        self.check_online()?;

        let handle = request.handle_bytes()?;
        let public_key = request.public_key_bytes()?;
        let signature = request.signature_bytes()?;
        let payload = AuthorizationPayload::new(self.chain_id, request.contract_address, public_key);

        let state = self.read()?;
        let key = state.accounts.get(&request.user_address).ok_or_else(|| {
            Error::Authorization(format!("unknown account {}", request.user_address))
        })?;
        verify_authorization(key, &payload, &signature)?;

        if !state.acl.contains(&(handle, request.user_address)) {
            return Err(Error::Authorization(format!(
                "{} may not decrypt this handle",
                request.user_address
            )));
        }
        let amount = state
            .values
            .get(&handle)
            .ok_or_else(|| Error::NotFound("unknown ciphertext handle".into()))?;

        seal_to(
            &PublicKey::from(public_key),
            &amount.to_be_bytes(),
            &handle,
            REENCRYPT_INFO,
        )
    }
}
