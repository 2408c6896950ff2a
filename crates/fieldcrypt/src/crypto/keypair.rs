//! [`WrappingKeyPair`]: the asymmetric key pair that protects symmetric keys.

use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Errors produced while importing a key pair.
#[derive(Debug, Error)]
pub enum KeyPairError {
    #[error("not a valid P-256 JWK")]
    InvalidJwk,
}

/// A P-256 key pair identified by its fingerprint.
///
/// The private half is optional: a pair resolved from a public-only source can
/// still wrap new keys, but any attempt to unwrap with it fails.
#[derive(Clone)]
pub struct WrappingKeyPair {
    public: PublicKey,
    secret: Option<SecretKey>,
    fingerprint: String,
}

impl WrappingKeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::random(&mut p256::elliptic_curve::rand_core::OsRng))
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self {
            fingerprint: fingerprint_of(&public),
            public,
            secret: Some(secret),
        }
    }

    pub fn from_public(public: PublicKey) -> Self {
        Self {
            fingerprint: fingerprint_of(&public),
            public,
            secret: None,
        }
    }

    /// Import from a JWK string. A JWK carrying `d` yields a full pair; a
    /// public-only JWK yields a pair without a private half.
    ///
    /// # Errors
    ///
    /// Returns [`KeyPairError::InvalidJwk`] if the JWK is neither a valid P-256
    /// private nor public key.
    pub fn from_jwk_str(jwk: &str) -> Result<Self, KeyPairError> {
        if let Ok(secret) = SecretKey::from_jwk_str(jwk) {
            return Ok(Self::from_secret(secret));
        }
        PublicKey::from_jwk_str(jwk)
            .map(Self::from_public)
            .map_err(|_| KeyPairError::InvalidJwk)
    }

    /// A copy of this pair with the private half removed.
    pub fn public_only(&self) -> Self {
        Self::from_public(self.public.clone())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> Option<&SecretKey> {
        self.secret.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.secret.is_some()
    }

    /// Uppercase hex SHA-256 of the uncompressed SEC1 public point.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn to_public_jwk(&self) -> String {
        self.public.to_jwk_string()
    }

    pub fn to_private_jwk(&self) -> Option<Zeroizing<String>> {
        self.secret.as_ref().map(SecretKey::to_jwk_string)
    }
}

impl std::fmt::Debug for WrappingKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappingKeyPair")
            .field("fingerprint", &self.fingerprint)
            .field("has_private_key", &self.secret.is_some())
            .finish()
    }
}

fn fingerprint_of(public: &PublicKey) -> String {
    let point = public.to_encoded_point(false);
    hex::encode_upper(Sha256::digest(point.as_bytes()))
}

/// Canonicalise a caller-supplied fingerprint: drop spaces and colons, uppercase.
pub fn normalize_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_hex() {
        let pair = WrappingKeyPair::generate();
        assert_eq!(pair.fingerprint().len(), 64);
        assert!(pair.fingerprint().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        assert_eq!(pair.public_only().fingerprint(), pair.fingerprint());
    }

    #[test]
    fn distinct_pairs_have_distinct_fingerprints() {
        assert_ne!(
            WrappingKeyPair::generate().fingerprint(),
            WrappingKeyPair::generate().fingerprint()
        );
    }

    #[test]
    fn jwk_import_distinguishes_private_and_public() {
        let pair = WrappingKeyPair::generate();
        let private = pair.to_private_jwk().unwrap();
        let full = WrappingKeyPair::from_jwk_str(&private).unwrap();
        assert!(full.has_private_key());
        assert_eq!(full.fingerprint(), pair.fingerprint());

        let public = WrappingKeyPair::from_jwk_str(&pair.to_public_jwk()).unwrap();
        assert!(!public.has_private_key());
        assert_eq!(public.fingerprint(), pair.fingerprint());
    }

    #[test]
    fn invalid_jwk_rejected() {
        assert!(WrappingKeyPair::from_jwk_str(r#"{"kty":"EC"}"#).is_err());
        assert!(WrappingKeyPair::from_jwk_str("not json").is_err());
    }

    #[test]
    fn normalize_strips_separators_and_uppercases() {
        assert_eq!(normalize_fingerprint("db c8 ae:88"), "DBC8AE88");
    }

    #[test]
    fn debug_does_not_print_secret() {
        let pair = WrappingKeyPair::generate();
        let dbg = format!("{pair:?}");
        assert!(dbg.contains(pair.fingerprint()));
        assert!(dbg.contains("has_private_key: true"));
    }
}
