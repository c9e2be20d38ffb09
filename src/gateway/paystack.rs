use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};

use super::{GatewayError, GatewayVerification, PaymentGateway};
use crate::observability::get_metrics;

/// Configuration for the Paystack client.
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub base_url: String,
    pub secret_key: String,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.paystack.co".to_string(),
            secret_key: String::new(),
        }
    }
}

/// Envelope Paystack wraps every API response in.
#[derive(Debug, Deserialize)]
struct PaystackEnvelope {
    status: bool,
    #[serde(default)]
    message: String,
    data: Option<GatewayVerification>,
}

/// HTTP client for the Paystack transaction API.
pub struct PaystackClient {
    config: PaystackConfig,
    http: reqwest::Client,
}

impl PaystackClient {
    pub fn new(config: PaystackConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn verify_url(&self, reference: &str) -> String {
        format!(
            "{}/transaction/verify/{}",
            self.config.base_url.trim_end_matches('/'),
            reference
        )
    }

    fn decode(reference: &str, status: u16, body: &[u8]) -> Result<GatewayVerification, GatewayError> {
        // Error statuses may carry non-JSON bodies.
        if status == 404 {
            return Err(GatewayError::NotFound(reference.to_string()));
        }
        if !(200..300).contains(&status) {
            let message = match serde_json::from_slice::<PaystackEnvelope>(body) {
                Ok(envelope) => envelope.message,
                Err(_) => String::from_utf8_lossy(body).chars().take(200).collect(),
            };
            return Err(GatewayError::Status { status, message });
        }

        let envelope: PaystackEnvelope = serde_json::from_slice(body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if !envelope.status {
            return Err(GatewayError::Malformed(format!(
                "gateway reported failure envelope: {}",
                envelope.message
            )));
        }

        let data = envelope
            .data
            .ok_or_else(|| GatewayError::Malformed("response has no data".to_string()))?;

        if data.reference != reference {
            return Err(GatewayError::Malformed(format!(
                "response reference '{}' does not match requested '{}'",
                data.reference, reference
            )));
        }

        Ok(data)
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    fn provider(&self) -> &'static str {
        "paystack"
    }

    async fn verify(
        &self,
        reference: &str,
        timeout: Duration,
    ) -> Result<GatewayVerification, GatewayError> {
        let start = Instant::now();

        let response = self
            .http
            .get(self.verify_url(reference))
            .bearer_auth(&self.config.secret_key)
            .timeout(timeout)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                get_metrics().record_gateway_verify(start.elapsed().as_secs_f64() * 1000.0, false);
                if e.is_timeout() {
                    return Err(GatewayError::Timeout(timeout));
                }
                return Err(GatewayError::Transport(e.to_string()));
            }
        };

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(timeout)
            } else {
                GatewayError::Transport(e.to_string())
            }
        });

        let result = body.and_then(|bytes| Self::decode(reference, status, &bytes));

        get_metrics().record_gateway_verify(start.elapsed().as_secs_f64() * 1000.0, result.is_ok());
        tracing::debug!(reference = %reference, http_status = status, ok = result.is_ok(), "Gateway verification finished");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::GatewayPaymentStatus;

    #[test]
    fn test_decode_success() {
        let body = br#"{
            "status": true,
            "message": "Verification successful",
            "data": {
                "reference": "TIX_ABC",
                "status": "success",
                "amount": 500000,
                "currency": "NGN",
                "metadata": {"expected_amount": 500000},
                "paid_at": "2026-03-01T10:00:00.000Z",
                "channel": "card"
            }
        }"#;

        let verification = PaystackClient::decode("TIX_ABC", 200, body).unwrap();
        assert_eq!(verification.status, GatewayPaymentStatus::Success);
        assert_eq!(verification.amount, 500000);
        assert!(verification.paid_at.is_some());
    }

    #[test]
    fn test_decode_not_found() {
        let body = br#"{"status": false, "message": "Transaction reference not found"}"#;
        let err = PaystackClient::decode("TIX_MISSING", 404, body).unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[test]
    fn test_decode_not_found_with_html_body() {
        let err = PaystackClient::decode("TIX_MISSING", 404, b"<html>Not Found</html>").unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(ref r) if r == "TIX_MISSING"));
    }

    #[test]
    fn test_decode_gateway_error_page_keeps_status() {
        let err = PaystackClient::decode("TIX_ABC", 503, b"<html>Service Unavailable</html>").unwrap_err();
        assert!(
            matches!(err, GatewayError::Status { status: 503, ref message } if message.contains("Service Unavailable"))
        );
    }

    #[test]
    fn test_decode_server_error() {
        let body = br#"{"status": false, "message": "upstream down"}"#;
        let err = PaystackClient::decode("TIX_ABC", 502, body).unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 502, .. }));
    }

    #[test]
    fn test_decode_malformed_body() {
        let err = PaystackClient::decode("TIX_ABC", 200, b"<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_foreign_reference() {
        let body = br#"{
            "status": true,
            "message": "ok",
            "data": {"reference": "TIX_OTHER", "status": "success", "amount": 1, "currency": "NGN"}
        }"#;
        let err = PaystackClient::decode("TIX_ABC", 200, body).unwrap_err();
        assert!(matches!(err, GatewayError::Malformed(_)));
    }

    #[test]
    fn test_verify_url() {
        let client = PaystackClient::new(PaystackConfig {
            base_url: "https://api.paystack.co/".to_string(),
            secret_key: "sk_test".to_string(),
        });
        assert_eq!(
            client.verify_url("TIX_ABC"),
            "https://api.paystack.co/transaction/verify/TIX_ABC"
        );
    }
}
