//! Digest and RSA signature primitives
//!
//! Remote servers disagree on RSA padding: some sign with PSS, most of the
//! fediverse (Mastodon included) still signs with PKCS#1 v1.5. Verification
//! therefore tries PSS first and falls back to PKCS#1 v1.5; signing uses
//! whichever padding the caller picks.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey, pkcs1v15, pss};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// RSA padding scheme used when producing a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignaturePadding {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    #[default]
    Pkcs1v15,
    /// RSASSA-PSS with SHA-256, salt length equal to the digest length
    Pss,
}

/// PEM-encoded RSA key pair for a local actor
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// PKCS#8 private key
    pub private_key_pem: String,
    /// SPKI public key
    pub public_key_pem: String,
}

/// Base64 of the SHA-256 hash of `bytes`, without any `SHA-256=` prefix.
pub fn sha256_base64(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    BASE64.encode(hasher.finalize())
}

/// Value of a `Digest` header for `body`.
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn digest_header(body: &[u8]) -> String {
    format!("SHA-256={}", sha256_base64(body))
}

/// Parse an RSA public key from SPKI (`BEGIN PUBLIC KEY`) or PKCS#1
/// (`BEGIN RSA PUBLIC KEY`) PEM.
pub fn parse_public_key(public_key_pem: &str) -> Result<RsaPublicKey, AppError> {
    let pem = public_key_pem.trim();
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::Crypto(format!("Invalid public key: {}", e)))
}

/// Parse an RSA private key from PKCS#8 or PKCS#1 PEM.
pub fn parse_private_key(private_key_pem: &str) -> Result<RsaPrivateKey, AppError> {
    let pem = private_key_pem.trim();
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| AppError::Crypto(format!("Invalid private key: {}", e)))
}

/// Sign `message` with an already parsed private key.
pub fn sign_with_key(
    message: &[u8],
    private_key: &RsaPrivateKey,
    padding: SignaturePadding,
) -> Result<Vec<u8>, AppError> {
    match padding {
        SignaturePadding::Pkcs1v15 => {
            let signing_key = pkcs1v15::SigningKey::<Sha256>::new(private_key.clone());
            let signature = signing_key
                .try_sign(message)
                .map_err(|e| AppError::Crypto(format!("PKCS#1 v1.5 signing failed: {}", e)))?;
            Ok(signature.to_vec())
        }
        SignaturePadding::Pss => {
            let signing_key = pss::SigningKey::<Sha256>::new(private_key.clone());
            let mut rng = rand::thread_rng();
            let signature = signing_key
                .try_sign_with_rng(&mut rng, message)
                .map_err(|e| AppError::Crypto(format!("PSS signing failed: {}", e)))?;
            Ok(signature.to_vec())
        }
    }
}

/// Sign `message` with a PEM private key.
///
/// # Errors
/// `AppError::Crypto` if the PEM is malformed or signing fails.
pub fn sign(
    message: &[u8],
    private_key_pem: &str,
    padding: SignaturePadding,
) -> Result<Vec<u8>, AppError> {
    let private_key = parse_private_key(private_key_pem)?;
    sign_with_key(message, &private_key, padding)
}

/// Verify `signature` over `message` with a parsed public key.
///
/// Tries PSS, then PKCS#1 v1.5. Both attempts are always made before the
/// signature is declared invalid.
pub fn verify_with_key(message: &[u8], signature: &[u8], public_key: &RsaPublicKey) -> bool {
    let pss_valid = pss::Signature::try_from(signature)
        .map(|sig| {
            pss::VerifyingKey::<Sha256>::new(public_key.clone())
                .verify(message, &sig)
                .is_ok()
        })
        .unwrap_or(false);
    if pss_valid {
        return true;
    }

    pkcs1v15::Signature::try_from(signature)
        .map(|sig| {
            pkcs1v15::VerifyingKey::<Sha256>::new(public_key.clone())
                .verify(message, &sig)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Verify `signature` over `message` with a PEM public key.
///
/// # Returns
/// `Ok(false)` for a well-formed key that does not match.
///
/// # Errors
/// `AppError::Crypto` if the PEM cannot be parsed.
pub fn verify(message: &[u8], signature: &[u8], public_key_pem: &str) -> Result<bool, AppError> {
    let public_key = parse_public_key(public_key_pem)?;
    Ok(verify_with_key(message, signature, &public_key))
}

/// Generate a fresh RSA key pair encoded as PEM.
pub fn generate_keypair(bits: usize) -> Result<KeyPair, AppError> {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| AppError::Crypto(format!("Key generation failed: {}", e)))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_key_pem = private_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| AppError::Crypto(format!("Private key encoding failed: {}", e)))?
        .to_string();
    let public_key_pem = public_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| AppError::Crypto(format!("Public key encoding failed: {}", e)))?;

    Ok(KeyPair {
        private_key_pem,
        public_key_pem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::EncodeRsaPublicKey;

    fn test_keypair() -> KeyPair {
        generate_keypair(1024).expect("key generation should work")
    }

    #[test]
    fn sha256_base64_matches_known_vector() {
        assert_eq!(
            sha256_base64(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_eq!(
            digest_header(b""),
            "SHA-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[test]
    fn pkcs1v15_signature_verifies() {
        let keys = test_keypair();
        let message = b"(request-target): post /inbox";
        let signature = sign(message, &keys.private_key_pem, SignaturePadding::Pkcs1v15)
            .expect("signing should work");

        assert!(verify(message, &signature, &keys.public_key_pem).expect("valid key"));
    }

    #[test]
    fn pss_signature_verifies() {
        let keys = test_keypair();
        let message = b"(request-target): post /inbox";
        let signature =
            sign(message, &keys.private_key_pem, SignaturePadding::Pss).expect("signing should work");

        assert!(verify(message, &signature, &keys.public_key_pem).expect("valid key"));
    }

    #[test]
    fn tampered_message_is_rejected_under_both_paddings() {
        let keys = test_keypair();
        for padding in [SignaturePadding::Pkcs1v15, SignaturePadding::Pss] {
            let signature =
                sign(b"original", &keys.private_key_pem, padding).expect("signing should work");
            assert!(!verify(b"tampered", &signature, &keys.public_key_pem).expect("valid key"));
        }
    }

    #[test]
    fn different_key_is_rejected() {
        let signer = test_keypair();
        let other = test_keypair();
        let signature = sign(b"message", &signer.private_key_pem, SignaturePadding::Pkcs1v15)
            .expect("signing should work");

        assert!(!verify(b"message", &signature, &other.public_key_pem).expect("valid key"));
    }

    #[test]
    fn pkcs1_public_key_pem_is_accepted() {
        let keys = test_keypair();
        let public_key = parse_public_key(&keys.public_key_pem).expect("spki pem");
        let pkcs1_pem = public_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("pkcs1 encoding");

        let signature = sign(b"message", &keys.private_key_pem, SignaturePadding::Pkcs1v15)
            .expect("signing should work");
        assert!(verify(b"message", &signature, &pkcs1_pem).expect("pkcs1 key"));
    }

    #[test]
    fn malformed_pem_is_a_crypto_error() {
        match verify(b"message", b"sig", "not a key") {
            Err(AppError::Crypto(msg)) => assert!(msg.contains("Invalid public key")),
            other => panic!("expected crypto error, got: {other:?}"),
        }
        match sign(b"message", "not a key", SignaturePadding::Pkcs1v15) {
            Err(AppError::Crypto(msg)) => assert!(msg.contains("Invalid private key")),
            other => panic!("expected crypto error, got: {other:?}"),
        }
    }

    #[test]
    fn garbage_signature_bytes_do_not_verify() {
        let keys = test_keypair();
        assert!(!verify(b"message", b"short", &keys.public_key_pem).expect("valid key"));
    }
}
