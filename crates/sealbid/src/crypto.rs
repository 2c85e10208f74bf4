//! cryptographic primitives for sealbid
//!
//! - keccak256 for commitments, handles and typed-data digests
//! - x25519 + hkdf-sha256 for sealing values to a recipient key
//! - chacha20poly1305 for authenticated encryption

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::{Error, Result};

/// length of a sealed box header: ephemeral pubkey + nonce
pub const SEAL_HEADER_LEN: usize = 32 + 12;

/// chacha20poly1305 tag length
pub const TAG_LEN: usize = 16;

/// keccak256 over the concatenation of `parts`
pub fn keccak256(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// generate random bytes
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// xor two 32-byte words
pub fn xor(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

/// encrypt with chacha20poly1305, authenticating `aad`
pub fn encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| Error::EncryptionFailed(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
        .map_err(|e| Error::EncryptionFailed(e.to_string()))
}

/// decrypt with chacha20poly1305, authenticating `aad`
pub fn decrypt(key: &[u8; 32], nonce: &[u8; 12], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| Error::DecryptionFailed(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|e| Error::DecryptionFailed(e.to_string()))
}

/// derive a symmetric key from an x25519 shared secret
///
/// both public keys are mixed in so the key is bound to this exchange.
pub fn derive_shared_key(
    shared: &[u8; 32],
    sender_pk: &[u8; 32],
    recipient_pk: &[u8; 32],
    info: &[u8],
) -> Result<[u8; 32]> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(sender_pk);
    salt[32..].copy_from_slice(recipient_pk);

    let hk = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut key = [0u8; 32];
    hk.expand(info, &mut key).map_err(|_| Error::KeyDerivationFailed)?;
    Ok(key)
}

/// seal `plaintext` to `recipient` with a fresh ephemeral key
///
/// output: ephemeral_pk (32) ‖ nonce (12) ‖ ciphertext+tag
pub fn seal_to(recipient: &PublicKey, plaintext: &[u8], aad: &[u8], info: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let ephemeral_pk = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(recipient);

    let key = derive_shared_key(shared.as_bytes(), ephemeral_pk.as_bytes(), recipient.as_bytes(), info)?;
    let nonce: [u8; 12] = random_bytes();
    let ciphertext = encrypt(&key, &nonce, plaintext, aad)?;

    let mut sealed = Vec::with_capacity(SEAL_HEADER_LEN + ciphertext.len());
    sealed.extend_from_slice(ephemeral_pk.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend(ciphertext);
    Ok(sealed)
}

/// open a box produced by [`seal_to`] with the recipient's static secret
pub fn open_with(recipient: &StaticSecret, sealed: &[u8], aad: &[u8], info: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < SEAL_HEADER_LEN + TAG_LEN {
        return Err(Error::DecryptionFailed("sealed data too short".into()));
    }
    let (sender_pk, nonce, ciphertext) = split_sealed(sealed)?;
    let shared = recipient.diffie_hellman(&PublicKey::from(sender_pk));
    let recipient_pk = PublicKey::from(recipient);

    let key = derive_shared_key(shared.as_bytes(), &sender_pk, recipient_pk.as_bytes(), info)?;
    decrypt(&key, &nonce, ciphertext, aad)
}

/// split a sealed box into (sender pubkey, nonce, ciphertext)
pub fn split_sealed(sealed: &[u8]) -> Result<([u8; 32], [u8; 12], &[u8])> {
    if sealed.len() < SEAL_HEADER_LEN {
        return Err(Error::DecryptionFailed("sealed data too short".into()));
    }
    let mut sender_pk = [0u8; 32];
    sender_pk.copy_from_slice(&sealed[..32]);
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&sealed[32..SEAL_HEADER_LEN]);
    Ok((sender_pk, nonce, &sealed[SEAL_HEADER_LEN..]))
}
