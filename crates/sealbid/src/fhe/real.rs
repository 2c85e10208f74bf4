//! network-key encryption of bid inputs
//!
//! input layout:
//!
//! ```text
//! binding = keccak256(chain_id (u256) ‖ contract ‖ user)
//! blob    = ephemeral_pk (32) ‖ nonce (12) ‖ aead(amount_be32, aad = binding)
//! handle  = keccak256(HANDLE_DOMAIN ‖ blob ‖ binding), bytes 29..32 = index, type, version
//! proof   = 0x01 ‖ handle ‖ blob
//! ```

use x25519_dalek::{PublicKey, StaticSecret};

use super::{EncryptedBid, EncryptionMode, Encryptor};
use crate::crypto::{keccak256, open_with, seal_to, SEAL_HEADER_LEN, TAG_LEN};
use crate::types::{Address, Wei};
use crate::{Error, Result};

/// precompile exposing the network public key
pub const FHE_LIB_ADDRESS: Address = {
    let mut bytes = [0u8; 20];
    bytes[19] = 0x5d;
    Address(bytes)
};

/// `fhePubKey(bytes1)` selector followed by the `0x01` argument
pub const PUBKEY_CALLDATA: [u8; 5] = [0xd9, 0xd4, 0x7b, 0xb0, 0x01];

const HANDLE_DOMAIN: &[u8] = b"sealbid:handle:v1";
const SEAL_INFO: &[u8] = b"sealbid:input:v1";

/// 256-bit unsigned ciphertext type tag
const TYPE_UINT256: u8 = 8;
const HANDLE_VERSION: u8 = 0;

const BLOB_LEN: usize = SEAL_HEADER_LEN + 32 + TAG_LEN;
const PROOF_LEN: usize = 1 + 32 + BLOB_LEN;

/// encrypts to the network key fetched during initialization
pub struct RealEncryptor {
    chain_id: u64,
    network_key: PublicKey,
}

impl RealEncryptor {
    pub fn new(chain_id: u64, network_key: PublicKey) -> Self {
        Self {
            chain_id,
            network_key,
        }
    }

    pub fn network_key(&self) -> &PublicKey {
        &self.network_key
    }
}

impl Encryptor for RealEncryptor {
    fn mode(&self) -> EncryptionMode {
        EncryptionMode::Real
    }

    fn chain_id(&self) -> Option<u64> {
        Some(self.chain_id)
    }

    fn encrypt(&self, amount: &Wei, contract: &Address, user: &Address) -> Result<EncryptedBid> {
        let binding = input_binding(self.chain_id, contract, user);
        let blob = seal_to(&self.network_key, &amount.to_be_bytes(), &binding, SEAL_INFO)?;
        let handle = derive_handle(&blob, &binding, 0);

        let mut proof = Vec::with_capacity(PROOF_LEN);
        proof.push(1);
        proof.extend_from_slice(&handle);
        proof.extend_from_slice(&blob);

        Ok(EncryptedBid {
            mode: EncryptionMode::Real,
            encrypted_amount: handle.to_vec(),
            proof,
        })
    }
}

/// domain binding an input to one chain, contract and submitter
pub fn input_binding(chain_id: u64, contract: &Address, user: &Address) -> [u8; 32] {
    let mut chain = [0u8; 32];
    chain[24..].copy_from_slice(&chain_id.to_be_bytes());
    keccak256(&[&chain, contract.as_bytes(), user.as_bytes()])
}

fn derive_handle(blob: &[u8], binding: &[u8; 32], index: u8) -> [u8; 32] {
    let mut handle = keccak256(&[HANDLE_DOMAIN, blob, binding]);
    handle[29] = index;
    handle[30] = TYPE_UINT256;
    handle[31] = HANDLE_VERSION;
    handle
}

/// verifier side: check the proof binding and recover (handle, amount)
///
/// fails for any proof produced for a different chain, contract or user.
pub fn open_sealed_input(
    network_secret: &StaticSecret,
    proof: &[u8],
    chain_id: u64,
    contract: &Address,
    user: &Address,
) -> Result<([u8; 32], Wei)> {
    if proof.len() != PROOF_LEN || proof[0] != 1 {
        return Err(Error::DecryptionFailed(format!(
            "malformed input proof ({} bytes)",
            proof.len()
        )));
    }
    let mut handle = [0u8; 32];
    handle.copy_from_slice(&proof[1..33]);
    let blob = &proof[33..];

    let binding = input_binding(chain_id, contract, user);
    if derive_handle(blob, &binding, 0) != handle {
        return Err(Error::DecryptionFailed("input not bound to this contract and user".into()));
    }

    let plaintext = open_with(network_secret, blob, &binding, SEAL_INFO)?;
    let amount: [u8; 32] = plaintext
        .as_slice()
        .try_into()
        .map_err(|_| Error::DecryptionFailed("unexpected plaintext length".into()))?;
    Ok((handle, Wei::from_be_bytes(&amount)))
}

/// decode the ABI `bytes` return value of the public key call
pub fn decode_abi_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let offset = read_word_usize(data, 0)?;
    let len = read_word_usize(data, offset)?;
    let start = offset
        .checked_add(32)
        .ok_or_else(|| Error::Initialization("abi offset overflows".into()))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| Error::Initialization("abi length overflows".into()))?;
    data.get(start..end)
        .map(|b| b.to_vec())
        .ok_or_else(|| Error::Initialization("abi bytes truncated".into()))
}

/// abi-encode a single `bytes` value
pub fn encode_abi_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = (bytes.len() + 31) / 32 * 32;
    let mut out = vec![0u8; 64 + padded];
    out[31] = 0x20;
    out[56..64].copy_from_slice(&(bytes.len() as u64).to_be_bytes());
    out[64..64 + bytes.len()].copy_from_slice(bytes);
    out
}

fn read_word_usize(data: &[u8], at: usize) -> Result<usize> {
    let end = at
        .checked_add(32)
        .ok_or_else(|| Error::Initialization("abi offset overflows".into()))?;
    let word = data
        .get(at..end)
        .ok_or_else(|| Error::Initialization("abi word out of bounds".into()))?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(Error::Initialization("abi word overflows".into()));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[24..]);
    usize::try_from(u64::from_be_bytes(be))
        .map_err(|_| Error::Initialization("abi word overflows".into()))
}

/// extract the 32-byte network key from raw call output
pub fn decode_network_key(data: &[u8]) -> Result<PublicKey> {
    let bytes = decode_abi_bytes(data)?;
    let key: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        Error::Initialization(format!("network key must be 32 bytes, got {}", bytes.len()))
    })?;
    Ok(PublicKey::from(key))
}
