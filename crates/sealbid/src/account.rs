//! local identity
//!
//! seed-derived ed25519 key that can approve re-encryption requests without a
//! wallet, for operator tools and tests.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::crypto::{keccak256, random_bytes};
use crate::reencrypt::{AuthorizationPayload, AuthorizationSigner};
use crate::types::Address;
use crate::{Error, Result};

/// account derived from seed
pub struct Account {
    signing_key: SigningKey,
    address: Address,
}

impl Account {
    /// derive account from seed
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(None, seed);
        let mut signing_bytes = [0u8; 32];
        hk.expand(b"sealbid:ed25519:v1", &mut signing_bytes)
            .map_err(|_| Error::KeyDerivationFailed)?;

        let signing_key = SigningKey::from_bytes(&signing_bytes);
        let address = address_of(&signing_key.verifying_key());

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// fresh random account
    pub fn generate() -> Result<Self> {
        Self::from_seed(&random_bytes())
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

/// 20-byte address of an ed25519 key: last 20 bytes of keccak256(pubkey)
pub fn address_of(key: &VerifyingKey) -> Address {
    let hash = keccak256(&[key.as_bytes()]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address(address)
}

/// check a signature produced by [`Account`] over an authorization payload
pub fn verify_authorization(
    key: &VerifyingKey,
    payload: &AuthorizationPayload,
    signature: &[u8],
) -> Result<()> {
    let signature = Signature::from_slice(signature)
        .map_err(|e| Error::Authorization(format!("malformed signature: {}", e)))?;
    key.verify(&payload.digest(), &signature)
        .map_err(|_| Error::Authorization("signature does not match payload".into()))
}

#[async_trait]
impl AuthorizationSigner for Account {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_authorization(&self, payload: &AuthorizationPayload) -> Result<Vec<u8>> {
        Ok(self.sign(&payload.digest()).to_bytes().to_vec())
    }
}
