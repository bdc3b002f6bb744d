//! Cryptography module: PBKDF2-HMAC-SHA256 key derivation and AES-256-GCM.
//!
//! Salt and IV are fresh per archive and stored in the clear; only their
//! uniqueness matters. The engine accepts any non-empty password, but short
//! passwords are cheap to brute-force offline no matter the iteration count.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{QcxError, Result};

pub const KEY_SIZE: usize = 32; // 256 bits for AES-256
pub const IV_SIZE: usize = 12; // 96 bits for GCM
pub const SALT_SIZE: usize = 16; // 128 bits for salt
pub const TAG_SIZE: usize = 16;
pub const DEFAULT_PBKDF2_ROUNDS: u32 = 200_000;

pub const KDF_ALGO: &str = "PBKDF2";
pub const KDF_HASH: &str = "SHA-256";
pub const CIPHER_ALGO: &str = "AES-GCM";

/// A derived AES-256 key. Wiped from memory on drop.
pub struct ArchiveKey(Zeroizing<[u8; KEY_SIZE]>);

impl ArchiveKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ArchiveKey(..)")
    }
}

pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// Derives the archive key with PBKDF2-HMAC-SHA256.
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Result<ArchiveKey> {
    if password.is_empty() {
        return Err(QcxError::InvalidInput("password must not be empty".into()));
    }
    if iterations == 0 {
        return Err(QcxError::InvalidInput("kdf iteration count must be positive".into()));
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key[..]);
    Ok(ArchiveKey(key))
}

/// Encrypts `plaintext`, returning `ciphertext || tag`.
pub fn encrypt(key: &ArchiveKey, iv: &[u8; IV_SIZE], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| QcxError::InvalidInput("payload too large for AES-GCM".into()))
}

/// Decrypts `ciphertext || tag`. Any tag mismatch is reported as
/// [`QcxError::AuthenticationFailure`] with no further detail.
pub fn decrypt(key: &ArchiveKey, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(QcxError::AuthenticationFailure);
    }
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    cipher
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| QcxError::AuthenticationFailure)
}
