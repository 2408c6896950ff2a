//! AES-256-GCM-SIV encryption and decryption of individual field values.
//!
//! **Fixed IV per key version.** Every encryption under one key generation uses
//! the IV stored alongside that key, so identical plaintexts under the same
//! version produce identical ciphertext. Existing rows depend on this, so it is
//! kept as-is. AES-GCM-SIV (RFC 8452) is nonce-misuse-resistant: the reuse
//! reveals plaintext equality and nothing more, and authentication still holds.
//!
//! **Do NOT substitute plain AES-256-GCM.** GCM nonce reuse is catastrophic:
//! it breaks both confidentiality and authentication.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Key, Nonce,
};
use thiserror::Error;
use zeroize::Zeroizing;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce, stored per key version as its IV.
pub const NONCE_LEN: usize = 12;

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid IV length: expected {NONCE_LEN} bytes, got {0}")]
    InvalidIvLength(usize),

    /// AES-GCM-SIV encryption failed.
    #[error("aead encryption failed")]
    EncryptFailure,

    /// Authentication failed: wrong key or tampered ciphertext.
    #[error("aead decryption failed")]
    DecryptFailure,
}

/// Key bytes and IV for one key generation.
///
/// The key buffer is zeroed when this value is dropped.
pub struct KeyMaterial {
    key: Zeroizing<[u8; KEY_LEN]>,
    iv: [u8; NONCE_LEN],
}

impl KeyMaterial {
    /// Copy `key` and `iv` into a new [`KeyMaterial`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] or [`CipherError::InvalidIvLength`]
    /// if either slice has the wrong length.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        if iv.len() != NONCE_LEN {
            return Err(CipherError::InvalidIvLength(iv.len()));
        }
        let mut buf = Zeroizing::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(iv);
        Ok(Self { key: buf, iv: nonce })
    }

    /// Generate a fresh random key and IV from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        OsRng.fill_bytes(&mut key[..]);
        let mut iv = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Raw key bytes. Only the key generator needs these, to wrap them.
    pub fn key(&self) -> &[u8] {
        &self.key[..]
    }

    pub fn iv(&self) -> &[u8; NONCE_LEN] {
        &self.iv
    }

    /// Build a single-use encryptor bound to this key and IV.
    pub fn encryptor(&self) -> Encryptor {
        Encryptor {
            cipher: self.build_cipher(),
            nonce: self.iv,
        }
    }

    /// Build a single-use decryptor bound to this key and IV.
    pub fn decryptor(&self) -> Decryptor {
        Decryptor {
            cipher: self.build_cipher(),
            nonce: self.iv,
        }
    }

    fn build_cipher(&self) -> Aes256GcmSiv {
        Aes256GcmSiv::new(Key::<Aes256GcmSiv>::from_slice(&self.key[..]))
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("KeyMaterial([REDACTED])")
    }
}

/// Single-use encryption handle. Consumed by [`Encryptor::encrypt`].
pub struct Encryptor {
    cipher: Aes256GcmSiv,
    nonce: [u8; NONCE_LEN],
}

impl Encryptor {
    /// Encrypt `plaintext`, returning ciphertext with the 16-byte tag appended.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::EncryptFailure`] on an internal AEAD error.
    pub fn encrypt(self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.cipher
            .encrypt(Nonce::from_slice(&self.nonce), plaintext)
            .map_err(|_| CipherError::EncryptFailure)
    }
}

/// Single-use decryption handle. Consumed by [`Decryptor::decrypt`].
pub struct Decryptor {
    cipher: Aes256GcmSiv,
    nonce: [u8; NONCE_LEN],
}

impl Decryptor {
    /// Decrypt and authenticate `ciphertext`.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::DecryptFailure`] if authentication fails (wrong key
    /// or tampered data) or the input is shorter than the tag.
    pub fn decrypt(self, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        self.cipher
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext)
            .map_err(|_| CipherError::DecryptFailure)
    }
}
