//! private disclosure of an encrypted amount to its owner
//!
//! # flow
//! 1. generate an ephemeral x25519 keypair for this request only
//! 2. build a typed-data authorization binding the public key to the contract
//! 3. ask the signer to approve it (bounded by the signing timeout)
//! 4. send handle + signature + public key to the re-encryption service
//! 5. open the response with the ephemeral secret
//!
//! every failure collapses into `Error::DecryptionFailed`; no partial result
//! is ever returned.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::crypto::{keccak256, open_with};
use crate::fhe::{EncryptionMode, FheGateway};
use crate::types::{parse_hex, parse_hex_array, to_hex_prefixed, Address, Wei};
use crate::{Error, Result};

/// hkdf info for values sealed to the ephemeral key
pub const REENCRYPT_INFO: &[u8] = b"sealbid:reencrypt:v1";

/// default time a user gets to approve the signature prompt
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(120);

const DOMAIN_NAME: &str = "Authorization token";
const DOMAIN_VERSION: &str = "1";
const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const REENCRYPT_TYPE: &str = "Reencrypt(bytes publicKey)";

/// ephemeral keypair for exactly one re-encryption request
///
/// the secret is zeroized on drop.
pub struct KeyMaterial {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyMaterial {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// open a value the service sealed to this key
    pub fn open(&self, sealed: &[u8], handle: &[u8; 32]) -> Result<Vec<u8>> {
        open_with(&self.secret, sealed, handle, REENCRYPT_INFO)
    }
}

/// typed-data authorization for one re-encryption key
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationPayload {
    pub chain_id: u64,
    pub verifying_contract: Address,
    pub public_key: [u8; 32],
}

impl AuthorizationPayload {
    pub fn new(chain_id: u64, verifying_contract: Address, public_key: [u8; 32]) -> Self {
        Self {
            chain_id,
            verifying_contract,
            public_key,
        }
    }

    pub fn domain_separator(&self) -> [u8; 32] {
        let mut chain = [0u8; 32];
        chain[24..].copy_from_slice(&self.chain_id.to_be_bytes());
        keccak256(&[
            &keccak256(&[DOMAIN_TYPE.as_bytes()]),
            &keccak256(&[DOMAIN_NAME.as_bytes()]),
            &keccak256(&[DOMAIN_VERSION.as_bytes()]),
            &chain,
            &self.verifying_contract.to_word(),
        ])
    }

    pub fn struct_hash(&self) -> [u8; 32] {
        keccak256(&[
            &keccak256(&[REENCRYPT_TYPE.as_bytes()]),
            &keccak256(&[&self.public_key]),
        ])
    }

    /// the 32 bytes a signer commits to
    pub fn digest(&self) -> [u8; 32] {
        keccak256(&[&[0x19u8, 0x01], &self.domain_separator(), &self.struct_hash()])
    }

    /// typed-data json as shown by wallet prompts
    pub fn to_typed_data(&self) -> serde_json::Value {
        json!({
            "types": {
                "EIP712Domain": [
                    { "name": "name", "type": "string" },
                    { "name": "version", "type": "string" },
                    { "name": "chainId", "type": "uint256" },
                    { "name": "verifyingContract", "type": "address" },
                ],
                "Reencrypt": [
                    { "name": "publicKey", "type": "bytes" },
                ],
            },
            "primaryType": "Reencrypt",
            "domain": {
                "name": DOMAIN_NAME,
                "version": DOMAIN_VERSION,
                "chainId": self.chain_id,
                "verifyingContract": self.verifying_contract,
            },
            "message": {
                "publicKey": to_hex_prefixed(&self.public_key),
            },
        })
    }
}

/// interactive signing capability (wallet prompt, local key, ...)
#[async_trait]
pub trait AuthorizationSigner: Send + Sync {
    /// address the signature is attributed to
    fn address(&self) -> Address;

    async fn sign_authorization(&self, payload: &AuthorizationPayload) -> Result<Vec<u8>>;
}

/// re-encryption request as sent to the gateway
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReencryptRequest {
    pub handle: String,
    pub signature: String,
    pub public_key: String,
    pub contract_address: Address,
    pub user_address: Address,
}

impl ReencryptRequest {
    pub fn new(
        handle: &[u8; 32],
        signature: &[u8],
        public_key: &PublicKey,
        contract: &Address,
        user: &Address,
    ) -> Self {
        Self {
            handle: to_hex_prefixed(handle),
            signature: to_hex_prefixed(signature),
            public_key: to_hex_prefixed(public_key.as_bytes()),
            contract_address: *contract,
            user_address: *user,
        }
    }

    pub fn handle_bytes(&self) -> Result<[u8; 32]> {
        parse_hex_array(&self.handle)
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>> {
        parse_hex(&self.signature)
    }

    pub fn public_key_bytes(&self) -> Result<[u8; 32]> {
        parse_hex_array(&self.public_key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReencryptResponse {
    /// value sealed to the requester's ephemeral key
    pub response: String,
}

/// the key-management side that re-encrypts a handle to a requester's key
#[async_trait]
pub trait ReencryptionService: Send + Sync {
    /// returns the value sealed to `request.public_key`
    async fn reencrypt(&self, request: &ReencryptRequest) -> Result<Vec<u8>>;
}

/// owner-only decryption of encrypted bid amounts
pub struct ReEncryptionFlow {
    gateway: Arc<FheGateway>,
    signer: Arc<dyn AuthorizationSigner>,
    service: Arc<dyn ReencryptionService>,
    signing_timeout: Duration,
}

impl ReEncryptionFlow {
    pub fn new(
        gateway: Arc<FheGateway>,
        signer: Arc<dyn AuthorizationSigner>,
        service: Arc<dyn ReencryptionService>,
    ) -> Self {
        Self {
            gateway,
            signer,
            service,
            signing_timeout: DEFAULT_SIGNING_TIMEOUT,
        }
    }

    pub fn with_signing_timeout(mut self, timeout: Duration) -> Self {
        self.signing_timeout = timeout;
        self
    }

    /// decrypt `handle` for `user`, who must be authorized on `contract`
    pub async fn reencrypt_bid_amount(
        &self,
        handle: &[u8; 32],
        contract: &Address,
        user: &Address,
    ) -> Result<Wei> {
        match self.run(handle, contract, user).await {
            Ok(amount) => Ok(amount),
            Err(e) => {
                warn!("re-encryption failed: {}", e);
                Err(match e {
                    Error::DecryptionFailed(msg) => Error::DecryptionFailed(msg),
                    other => Error::DecryptionFailed(other.to_string()),
                })
            }
        }
    }

    async fn run(&self, handle: &[u8; 32], contract: &Address, user: &Address) -> Result<Wei> {
        let signer = self.signer.address();
        if signer != *user {
            return Err(Error::DecryptionFailed(format!(
                "signer {} cannot authorize re-encryption for {}",
                signer, user
            )));
        }

        let mode = self.gateway.init().await?;
        let chain_id = match (mode, self.gateway.chain_id()) {
            (EncryptionMode::Real, Some(chain_id)) => chain_id,
            _ => {
                return Err(Error::DecryptionFailed(
                    "gateway is in mock mode, nothing to re-encrypt".into(),
                ))
            }
        };

        let keys = KeyMaterial::generate();
        let payload = AuthorizationPayload::new(chain_id, *contract, *keys.public_key().as_bytes());

        let signature = tokio::time::timeout(self.signing_timeout, self.signer.sign_authorization(&payload))
            .await
            .map_err(|_| {
                Error::Authorization(format!(
                    "no signature within {}s",
                    self.signing_timeout.as_secs()
                ))
            })??;

        let request = ReencryptRequest::new(handle, &signature, keys.public_key(), contract, user);
        let sealed = self.service.reencrypt(&request).await?;

        let plaintext = keys.open(&sealed, handle)?;
        let amount: [u8; 32] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| Error::DecryptionFailed("unexpected plaintext length".into()))?;
        debug!("re-encrypted handle {}", to_hex_prefixed(handle));
        Ok(Wei::from_be_bytes(&amount))
    }
}
