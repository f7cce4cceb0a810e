//! Signed content and checksums.
//!
//! Signed content travels as a compact JWS with an Ed25519 signature:
//! `b64url(header).b64url(payload).b64url(signature)`. Public and secret
//! keys are exchanged as standard base64 of their 32 raw bytes.

use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde_json::Value;
use sha2::{Digest, Sha256};

const JWS_HEADER: &str = r#"{"alg":"EdDSA"}"#;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("signed content is malformed: {reason}")]
    Malformed { reason: String },

    #[error("invalid key: {reason}")]
    InvalidKey { reason: String },

    #[error("the signature could not be validated")]
    BadSignature,
}

fn malformed(reason: impl Into<String>) -> CryptoError {
    CryptoError::Malformed {
        reason: reason.into(),
    }
}

/// An Ed25519 key pair that signs JSON payloads.
#[derive(Clone)]
pub struct PayloadSigner {
    key: SigningKey,
}

impl PayloadSigner {
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        Self {
            key: SigningKey::generate(&mut rng),
        }
    }

    pub fn from_secret_base64(secret: &str) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = decode_key_bytes(secret)?;
        Ok(Self {
            key: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn secret_base64(&self) -> String {
        BASE64.encode(self.key.to_bytes())
    }

    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.key.verifying_key().to_bytes())
    }

    /// Sign the compact JSON form of `payload`.
    pub fn sign(&self, payload: &Value) -> String {
        let signing_input = format!(
            "{}.{}",
            BASE64_URL.encode(JWS_HEADER),
            BASE64_URL.encode(payload.to_string())
        );
        let signature = self.key.sign(signing_input.as_bytes());
        format!("{signing_input}.{}", BASE64_URL.encode(signature.to_bytes()))
    }
}

impl std::fmt::Debug for PayloadSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadSigner")
            .field("public_key", &self.public_key_base64())
            .finish()
    }
}

fn decode_key_bytes(encoded: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CryptoError::InvalidKey {
            reason: e.to_string(),
        })?;
    bytes.try_into().map_err(|bytes: Vec<u8>| CryptoError::InvalidKey {
        reason: format!("expected 32 bytes, got {}", bytes.len()),
    })
}

fn split(jws: &str) -> Result<(&str, &str, &str), CryptoError> {
    let mut parts = jws.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None) => Ok((header, payload, signature)),
        _ => Err(malformed("expected three dot-separated segments")),
    }
}

/// Decode the payload of signed content without checking the signature.
pub fn decode_payload(jws: &str) -> Result<Value, CryptoError> {
    let (_, payload, _) = split(jws)?;
    let bytes = BASE64_URL
        .decode(payload)
        .map_err(|e| malformed(format!("payload is not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| malformed(format!("payload is not JSON: {e}")))
}

/// Check the signature of `jws` against a base64 public key and return the
/// decoded payload.
pub fn verify(jws: &str, public_key: &str) -> Result<Value, CryptoError> {
    let (header, payload, signature) = split(jws)?;
    let key = VerifyingKey::from_bytes(&decode_key_bytes(public_key)?).map_err(|e| {
        CryptoError::InvalidKey {
            reason: e.to_string(),
        }
    })?;
    let signature_bytes = BASE64_URL
        .decode(signature)
        .map_err(|e| malformed(format!("signature is not base64url: {e}")))?;
    let signature =
        Signature::from_slice(&signature_bytes).map_err(|_| CryptoError::BadSignature)?;
    key.verify(format!("{header}.{payload}").as_bytes(), &signature)
        .map_err(|_| CryptoError::BadSignature)?;
    decode_payload(jws)
}

/// Hex SHA-256.
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Checksum of signed content: the hash of the compact JWS string.
pub fn signed_content_checksum(jws: &str) -> String {
    sha256_hex(jws.as_bytes())
}

/// Checksum of a JSON document over its compact form. `serde_json::Map`
/// keeps keys sorted, so equal documents hash equally.
pub fn json_checksum(value: &Value) -> String {
    sha256_hex(value.to_string().as_bytes())
}

/// Checksum of a base64 encoded document, or `None` if it is not base64.
pub fn document_checksum(content_base64: &str) -> Option<String> {
    BASE64.decode(content_base64).ok().map(|b| sha256_hex(&b))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn signed_payload_verifies_with_matching_key_only() {
        let signer = PayloadSigner::generate();
        let other = PayloadSigner::generate();
        let jws = signer.sign(&json!({"responseCode": "RECE"}));

        let payload = verify(&jws, &signer.public_key_base64()).unwrap();
        assert_eq!(payload["responseCode"], "RECE");
        assert!(matches!(
            verify(&jws, &other.public_key_base64()),
            Err(CryptoError::BadSignature)
        ));
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let signer = PayloadSigner::generate();
        let jws = signer.sign(&json!({"responseCode": "RECE"}));
        let (header, _, signature) = split(&jws).unwrap();
        let forged = format!(
            "{header}.{}.{signature}",
            BASE64_URL.encode(r#"{"responseCode":"BSIG"}"#)
        );
        assert_eq!(decode_payload(&forged).unwrap()["responseCode"], "BSIG");
        assert!(verify(&forged, &signer.public_key_base64()).is_err());
    }

    #[test]
    fn secret_key_survives_export() {
        let signer = PayloadSigner::generate();
        let restored = PayloadSigner::from_secret_base64(&signer.secret_base64()).unwrap();
        assert_eq!(restored.public_key_base64(), signer.public_key_base64());
        assert!(PayloadSigner::from_secret_base64("c2hvcnQ=").is_err());
    }

    #[test]
    fn json_checksum_ignores_key_order() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": [1, 2]}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": [1, 2], "b": 1}"#).unwrap();
        assert_eq!(json_checksum(&a), json_checksum(&b));
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn malformed_content_is_rejected() {
        assert!(matches!(
            decode_payload("only.two"),
            Err(CryptoError::Malformed { .. })
        ));
        assert!(document_checksum("not base64!").is_none());
    }
}
