use serde::{Deserialize, Serialize};

use super::GatewayVerification;
use crate::error::{AppError, Result};

/// Event name for a completed charge.
pub const CHARGE_SUCCESS: &str = "charge.success";

/// A webhook delivery from the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: GatewayVerification,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("malformed webhook body: {}", e)))
    }

    pub fn is_charge_success(&self) -> bool {
        self.event == CHARGE_SUCCESS
    }

    pub fn reference(&self) -> &str {
        &self.data.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_charge_success() {
        let body = br#"{
            "event": "charge.success",
            "data": {
                "reference": "TIX_ABC",
                "status": "success",
                "amount": 500000,
                "currency": "NGN",
                "metadata": "{\"expected_amount\":500000}"
            }
        }"#;

        let event = WebhookEvent::parse(body).unwrap();
        assert!(event.is_charge_success());
        assert_eq!(event.reference(), "TIX_ABC");
        assert!(event.data.metadata.is_string());
    }

    #[test]
    fn test_other_events_are_not_charge_success() {
        let body = br#"{
            "event": "transfer.success",
            "data": {"reference": "TRF_1", "status": "success", "amount": 100, "currency": "NGN"}
        }"#;
        let event = WebhookEvent::parse(body).unwrap();
        assert!(!event.is_charge_success());
    }

    #[test]
    fn test_malformed_body() {
        assert!(matches!(
            WebhookEvent::parse(b"not json"),
            Err(AppError::Validation(_))
        ));
    }
}
