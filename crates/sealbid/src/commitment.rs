//! bid commitments
//!
//! commitment = keccak256(amount_be32 ‖ secret32)
//!
//! the packed encoding has no separators: both fields are fixed width, so
//! every (amount, secret) pair maps to exactly one 64-byte preimage.

use crate::crypto::{keccak256, random_bytes};
use crate::types::{Commitment, ProposalHash, Secret, Wei};
use crate::{Error, Result};

/// generate a fresh 32-byte bid secret
pub fn generate_secret() -> Secret {
    Secret::from_bytes(random_bytes())
}

/// bind `amount` to `secret`
///
/// fails with `Validation` unless `secret` is exactly 32 bytes.
pub fn create_commitment(amount: &Wei, secret: &[u8]) -> Result<Commitment> {
    if secret.len() != Secret::LEN {
        return Err(Error::Validation(format!(
            "secret must be {} bytes, got {}",
            Secret::LEN,
            secret.len()
        )));
    }
    Ok(Commitment(keccak256(&[&amount.to_be_bytes(), secret])))
}

/// recompute and compare against a previously submitted commitment
pub fn verify_commitment(amount: &Wei, secret: &[u8], expected: &Commitment) -> bool {
    match create_commitment(amount, secret) {
        Ok(c) => c == *expected,
        Err(_) => false,
    }
}

/// public, content-hiding commitment to proposal text
pub fn hash_proposal(text: &str) -> ProposalHash {
    ProposalHash(keccak256(&[text.as_bytes()]))
}
