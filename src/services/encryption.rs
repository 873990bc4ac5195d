//! At-rest encryption for the generated card-network fields.
//!
//! Card number and CVV are stored as AES-256-GCM ciphertext and decrypted
//! only while serializing a response. Layout: `[nonce (12 bytes)][ciphertext
//! + auth tag]`, with the 32-byte key derived from the configured secret via
//! SHA-256.

use ring::aead::{
    Aad, BoundKey, Nonce, NonceSequence, OpeningKey, SealingKey, UnboundKey, AES_256_GCM,
};
use ring::error::Unspecified;
use ring::rand::{SecureRandom, SystemRandom};

const NONCE_LEN: usize = 12;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid ciphertext format")]
    InvalidFormat,
}

impl From<Unspecified> for CryptoError {
    fn from(_: Unspecified) -> Self {
        CryptoError::EncryptionFailed
    }
}

struct SingleNonce {
    nonce: [u8; NONCE_LEN],
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> Result<Nonce, Unspecified> {
        Nonce::try_assume_unique_for_key(&self.nonce)
    }
}

pub fn encrypt(plaintext: &str, key: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
    let rng = SystemRandom::new();

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)?;
    let mut sealing_key = SealingKey::new(unbound_key, SingleNonce { nonce: nonce_bytes });

    let mut in_out = plaintext.as_bytes().to_vec();
    sealing_key
        .seal_in_place_append_tag(Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::EncryptionFailed)?;

    let mut result = Vec::with_capacity(NONCE_LEN + in_out.len());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&in_out);

    Ok(result)
}

pub fn decrypt(ciphertext: &[u8], key: &[u8; 32]) -> Result<String, CryptoError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&ciphertext[..NONCE_LEN]);

    let unbound_key = UnboundKey::new(&AES_256_GCM, key)?;
    let mut opening_key = OpeningKey::new(unbound_key, SingleNonce { nonce: nonce_bytes });

    let mut in_out = ciphertext[NONCE_LEN..].to_vec();
    let plaintext = opening_key
        .open_in_place(Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::DecryptionFailed)
}

/// Derives the 32-byte AES key from the configured secret via SHA-256.
pub fn derive_key(secret: &str) -> [u8; 32] {
    use ring::digest;

    let hash = digest::digest(&digest::SHA256, secret.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(hash.as_ref());
    key
}
