//! Key wrap codec: protects raw symmetric key bytes with a P-256 key pair.
//!
//! Wrapping uses ECDH-ES with a fresh ephemeral key, HKDF-SHA256 to derive a
//! 256-bit key-encryption key, and AES Key Wrap (RFC 3394) over the raw key.
//!
//! ```text
//! wrapped = ephemeral_public (65 bytes, uncompressed SEC1) || aes_kw(kek, key) (40 bytes)
//! kek     = HKDF-SHA256(ikm = ECDH(ephemeral, recipient), salt = ephemeral_public, info)
//! ```

use aes_kw::KekAes256;
use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::Sha256;
use thiserror::Error;
use zeroize::Zeroizing;

use super::cipher::KEY_LEN;
use super::keypair::WrappingKeyPair;

/// Length of the uncompressed SEC1 ephemeral public point.
const EPK_LEN: usize = 65;

/// AES-KW output for a 32-byte key: 32 + 8 = 40 bytes.
const KW_OUTPUT_LEN: usize = KEY_LEN + 8;

/// Total length of a wrapped key.
pub const WRAPPED_KEY_LEN: usize = EPK_LEN + KW_OUTPUT_LEN;

/// HKDF info string binding derived KEKs to this wrap format.
const HKDF_INFO: &[u8] = b"fieldcrypt/key-wrap/v1";

/// Errors produced by the key wrap codec.
#[derive(Debug, Error)]
pub enum WrapError {
    /// The key pair has no usable private half.
    #[error("private key of key pair {0} is not accessible")]
    KeyPairAccess(String),

    #[error("key wrap failed: {0}")]
    WrapFailure(String),

    /// Corrupt input or the wrong key pair.
    #[error("key unwrap failed: {0}")]
    UnwrapFailure(String),
}

/// Wrap `raw_key` for `recipient`.
///
/// # Errors
///
/// Returns [`WrapError::WrapFailure`] if `raw_key` is not [`KEY_LEN`] bytes or
/// the key wrap primitive fails.
pub fn wrap_key(raw_key: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, WrapError> {
    if raw_key.len() != KEY_LEN {
        return Err(WrapError::WrapFailure(format!(
            "expected a {KEY_LEN}-byte key, got {} bytes",
            raw_key.len()
        )));
    }

    let ephemeral = EphemeralSecret::random(&mut p256::elliptic_curve::rand_core::OsRng);
    let epk = ephemeral.public_key().to_encoded_point(false);
    let shared = ephemeral.diffie_hellman(recipient);

    let kek = derive_kek(shared.raw_secret_bytes().as_slice(), epk.as_bytes())
        .map_err(|e| WrapError::WrapFailure(format!("HKDF expand failed: {e}")))?;

    let mut out = vec![0u8; WRAPPED_KEY_LEN];
    out[..EPK_LEN].copy_from_slice(epk.as_bytes());
    kek.wrap(raw_key, &mut out[EPK_LEN..])
        .map_err(|e| WrapError::WrapFailure(format!("AES-KW wrap failed: {e:?}")))?;
    Ok(out)
}

/// Unwrap a key produced by [`wrap_key`] using the private half of `pair`.
///
/// # Errors
///
/// Returns [`WrapError::KeyPairAccess`] if `pair` has no private half, and
/// [`WrapError::UnwrapFailure`] for malformed input or the wrong key pair.
pub fn unwrap_key(wrapped: &[u8], pair: &WrappingKeyPair) -> Result<Zeroizing<Vec<u8>>, WrapError> {
    let secret = pair
        .secret_key()
        .ok_or_else(|| WrapError::KeyPairAccess(pair.fingerprint().to_owned()))?;

    if wrapped.len() != WRAPPED_KEY_LEN {
        return Err(WrapError::UnwrapFailure(format!(
            "expected {WRAPPED_KEY_LEN} bytes, got {}",
            wrapped.len()
        )));
    }
    let (epk_bytes, kw_bytes) = wrapped.split_at(EPK_LEN);

    let epk = PublicKey::from_sec1_bytes(epk_bytes)
        .map_err(|_| WrapError::UnwrapFailure("invalid ephemeral public key".into()))?;
    let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), epk.as_affine());

    let kek = derive_kek(shared.raw_secret_bytes().as_slice(), epk_bytes)
        .map_err(|e| WrapError::UnwrapFailure(format!("HKDF expand failed: {e}")))?;

    let mut raw = Zeroizing::new(vec![0u8; KEY_LEN]);
    kek.unwrap(kw_bytes, raw.as_mut_slice())
        .map_err(|e| WrapError::UnwrapFailure(format!("AES-KW unwrap failed: {e:?}")))?;
    Ok(raw)
}

fn derive_kek(shared_secret: &[u8], salt: &[u8]) -> Result<KekAes256, hkdf::InvalidLength> {
    let hk = Hkdf::<Sha256>::new(Some(salt), shared_secret);
    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    hk.expand(HKDF_INFO, &mut okm[..])?;
    Ok(KekAes256::from(*okm))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_unwrap_round_trip() {
        let pair = WrappingKeyPair::generate();
        let raw = [0x5au8; KEY_LEN];
        let wrapped = wrap_key(&raw, pair.public_key()).unwrap();
        assert_eq!(wrapped.len(), WRAPPED_KEY_LEN);
        assert_ne!(&wrapped[EPK_LEN..EPK_LEN + KEY_LEN], &raw[..]);
        let unwrapped = unwrap_key(&wrapped, &pair).unwrap();
        assert_eq!(unwrapped.as_slice(), &raw[..]);
    }

    #[test]
    fn wrapping_is_randomised() {
        let pair = WrappingKeyPair::generate();
        let raw = [1u8; KEY_LEN];
        assert_ne!(
            wrap_key(&raw, pair.public_key()).unwrap(),
            wrap_key(&raw, pair.public_key()).unwrap()
        );
    }

    #[test]
    fn public_only_pair_cannot_unwrap() {
        let pair = WrappingKeyPair::generate();
        let wrapped = wrap_key(&[2u8; KEY_LEN], pair.public_key()).unwrap();
        assert!(matches!(
            unwrap_key(&wrapped, &pair.public_only()),
            Err(WrapError::KeyPairAccess(fp)) if fp == pair.fingerprint()
        ));
    }

    #[test]
    fn wrong_pair_fails_unwrap() {
        let pair = WrappingKeyPair::generate();
        let other = WrappingKeyPair::generate();
        let wrapped = wrap_key(&[3u8; KEY_LEN], pair.public_key()).unwrap();
        assert!(matches!(
            unwrap_key(&wrapped, &other),
            Err(WrapError::UnwrapFailure(_))
        ));
    }

    #[test]
    fn corrupted_wrapped_key_fails_unwrap() {
        let pair = WrappingKeyPair::generate();
        let mut wrapped = wrap_key(&[4u8; KEY_LEN], pair.public_key()).unwrap();
        wrapped[WRAPPED_KEY_LEN - 1] ^= 0x01;
        assert!(matches!(
            unwrap_key(&wrapped, &pair),
            Err(WrapError::UnwrapFailure(_))
        ));
        assert!(unwrap_key(&wrapped[..10], &pair).is_err());
    }

    #[test]
    fn wrong_key_length_rejected() {
        let pair = WrappingKeyPair::generate();
        assert!(matches!(
            wrap_key(&[0u8; 16], pair.public_key()),
            Err(WrapError::WrapFailure(_))
        ));
    }
}
