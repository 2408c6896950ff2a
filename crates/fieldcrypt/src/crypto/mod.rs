//! Cryptographic primitives: the per-version field cipher and the key wrap codec.
//!
//! Nothing here depends on repositories, records or configuration, and nothing
//! here knows about versions.
//!
//! # Envelope layout
//!
//! ```text
//! P-256 key pair ──wrap──► wrapped data key (persisted)
//!                               │ unwrap (private half)
//!                               ▼
//!                     AES-256-GCM-SIV key + IV ──► field ciphertext
//! ```

pub mod cipher;
pub mod keypair;
pub mod wrap;

pub use cipher::{CipherError, Decryptor, Encryptor, KeyMaterial, KEY_LEN, NONCE_LEN};
pub use keypair::{normalize_fingerprint, KeyPairError, WrappingKeyPair};
pub use wrap::{unwrap_key, wrap_key, WrapError, WRAPPED_KEY_LEN};
