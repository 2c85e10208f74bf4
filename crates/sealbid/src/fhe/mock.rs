//! placeholder encryption for development without an fhe network
//!
//! NOT SECURE. the mask travels next to the masked amount, so anyone holding
//! the ciphertext can recover the amount. set `allow_mock = false` in
//! production.

use super::{EncryptedBid, EncryptionMode, Encryptor};
use crate::crypto::{random_bytes, xor};
use crate::types::{Address, Wei};
use crate::Result;

const MOCK_PROOF_LEN: usize = 96;

pub struct MockEncryptor;

impl Encryptor for MockEncryptor {
    fn mode(&self) -> EncryptionMode {
        EncryptionMode::Mock
    }

    fn chain_id(&self) -> Option<u64> {
        None
    }

    fn encrypt(&self, amount: &Wei, _contract: &Address, _user: &Address) -> Result<EncryptedBid> {
        let mask: [u8; 32] = random_bytes();
        let mut encrypted_amount = mask.to_vec();
        encrypted_amount.extend(xor(&amount.to_be_bytes(), &mask));

        Ok(EncryptedBid {
            mode: EncryptionMode::Mock,
            encrypted_amount,
            proof: random_bytes::<MOCK_PROOF_LEN>().to_vec(),
        })
    }
}
