pub mod paystack;
pub mod signature;
pub mod webhook;

pub use paystack::{PaystackClient, PaystackConfig};
pub use signature::WebhookVerifier;
pub use webhook::{WebhookEvent, CHARGE_SUCCESS};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::AppError;

/// Payment status as reported by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayPaymentStatus {
    Success,
    Failed,
    Abandoned,
    Reversed,
    Pending,
    Ongoing,
    #[serde(other)]
    Unknown,
}

impl GatewayPaymentStatus {
    /// The gateway has definitively said this charge will not succeed.
    pub fn is_definitive_failure(&self) -> bool {
        matches!(
            self,
            GatewayPaymentStatus::Failed
                | GatewayPaymentStatus::Abandoned
                | GatewayPaymentStatus::Reversed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayPaymentStatus::Success => "success",
            GatewayPaymentStatus::Failed => "failed",
            GatewayPaymentStatus::Abandoned => "abandoned",
            GatewayPaymentStatus::Reversed => "reversed",
            GatewayPaymentStatus::Pending => "pending",
            GatewayPaymentStatus::Ongoing => "ongoing",
            GatewayPaymentStatus::Unknown => "unknown",
        }
    }
}

/// Transaction data returned by verification or carried by a webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayVerification {
    pub reference: String,
    pub status: GatewayPaymentStatus,
    /// Charged amount in minor currency units.
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channel: Option<String>,
}

impl GatewayVerification {
    pub fn is_successful(&self) -> bool {
        self.status == GatewayPaymentStatus::Success
    }
}

/// Gateway call failures. None of these say anything about the payment
/// itself except `NotFound`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out after {0:?}")]
    Timeout(Duration),

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transaction reference {0} unknown to gateway")]
    NotFound(String),

    #[error("malformed gateway response: {0}")]
    Malformed(String),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(reference) => {
                AppError::NotFound(format!("transaction reference '{}' not found", reference))
            }
            other => AppError::GatewayUnavailable(other.to_string()),
        }
    }
}

/// Server-to-server verification of a transaction reference.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Provider name used in webhook routes and logs.
    fn provider(&self) -> &'static str;

    async fn verify(
        &self,
        reference: &str,
        timeout: Duration,
    ) -> Result<GatewayVerification, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_status_deserializes() {
        let status: GatewayPaymentStatus = serde_json::from_str("\"queued\"").unwrap();
        assert_eq!(status, GatewayPaymentStatus::Unknown);
        assert!(!status.is_definitive_failure());
    }

    #[test]
    fn test_definitive_failures() {
        assert!(GatewayPaymentStatus::Failed.is_definitive_failure());
        assert!(GatewayPaymentStatus::Abandoned.is_definitive_failure());
        assert!(!GatewayPaymentStatus::Pending.is_definitive_failure());
        assert!(!GatewayPaymentStatus::Success.is_definitive_failure());
    }

    #[test]
    fn test_gateway_errors_never_imply_failure() {
        let err: AppError = GatewayError::Timeout(Duration::from_secs(15)).into();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));
        assert!(err.is_retryable());

        let err: AppError = GatewayError::Malformed("eof".into()).into();
        assert!(matches!(err, AppError::GatewayUnavailable(_)));

        let err: AppError = GatewayError::NotFound("TIX_X".into()).into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
