//! Envelope key management: where symmetric keys are stored, how their
//! wrapping key pairs are found, and the active in-memory key store.

pub mod generator;
pub mod handle;
pub mod provider;
pub mod repository;
pub mod store;

pub use generator::{KeyGenError, KeyGenerator};
pub use handle::KeyStoreHandle;
pub use provider::{InMemoryKeyPairProvider, JwkDirectoryProvider, KeyPairProvider, ProviderError};
pub use repository::{FileKeyRepository, InMemoryKeyRepository, KeyRepository, RepositoryError, KEYS_FILE_NAME};
pub use store::{EnvelopeKeyStore, KeyStoreError, UnwrappedKeyEntry};
