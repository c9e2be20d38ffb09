use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{AppError, Result};

type HmacSha512 = Hmac<Sha512>;

/// Header carrying the hex HMAC-SHA512 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

/// Verifies that a webhook delivery was signed with the shared secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: Vec<u8>,
}

impl WebhookVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Checks `signature_hex` against the HMAC of the exact bytes received.
    /// The comparison is constant time.
    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> Result<()> {
        if self.secret.is_empty() {
            return Err(AppError::InvalidSignature(
                "no webhook secret configured".to_string(),
            ));
        }

        let expected = hex::decode(signature_hex.trim())
            .map_err(|_| AppError::InvalidSignature("signature is not hex".to_string()))?;

        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .map_err(|e| AppError::InvalidSignature(e.to_string()))?;
        mac.update(payload);

        mac.verify_slice(&expected)
            .map_err(|_| AppError::InvalidSignature("signature mismatch".to_string()))
    }

    /// Produces the signature a sender would attach to `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        let mut mac = HmacSha512::new_from_slice(&self.secret)
            .map_err(|e| AppError::InvalidSignature(e.to_string()))?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_accepts_own_signature() {
        let verifier = WebhookVerifier::new("sk_test_secret");
        let body = br#"{"event":"charge.success"}"#;
        let signature = verifier.sign(body).unwrap();

        assert_eq!(signature.len(), 128);
        assert_ok!(verifier.verify(body, &signature));
    }

    #[test]
    fn test_rejects_tampered_body() {
        let verifier = WebhookVerifier::new("sk_test_secret");
        let signature = verifier.sign(br#"{"amount":500000}"#).unwrap();

        let err = verifier.verify(br#"{"amount":5000000}"#, &signature).unwrap_err();
        assert!(matches!(err, AppError::InvalidSignature(_)));
    }

    #[test]
    fn test_rejects_other_secret() {
        let signer = WebhookVerifier::new("attacker");
        let verifier = WebhookVerifier::new("sk_test_secret");
        let body = b"{}";
        let signature = signer.sign(body).unwrap();

        assert_err!(verifier.verify(body, &signature));
    }

    #[test]
    fn test_rejects_non_hex_and_empty_secret() {
        let verifier = WebhookVerifier::new("sk_test_secret");
        assert_err!(verifier.verify(b"{}", "not-hex"));

        let unconfigured = WebhookVerifier::new("");
        assert_err!(unconfigured.verify(b"{}", "00"));
    }

    #[test]
    fn test_debug_hides_secret() {
        let verifier = WebhookVerifier::new("sk_live_real");
        assert!(!format!("{:?}", verifier).contains("sk_live_real"));
    }
}
