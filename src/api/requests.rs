use serde::{Deserialize, Serialize};

use crate::models::OrderMetadata;

/// Registers a pending order before the customer is sent to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePendingOrderRequest {
    pub reference: String,
    pub metadata: OrderMetadata,
}

impl CreatePendingOrderRequest {
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if let Err(e) = crate::services::validate_reference(&self.reference) {
            errors.push(ValidationError {
                field: "reference".to_string(),
                message: e.to_string(),
            });
        }
        if let Err(e) = self.metadata.validate() {
            errors.push(ValidationError {
                field: "metadata".to_string(),
                message: e.to_string(),
            });
        }
        if self.metadata.currency.len() != 3 {
            errors.push(ValidationError {
                field: "metadata.currency".to_string(),
                message: "currency must be a 3-letter ISO 4217 code".to_string(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

/// Query parameters for admin listings.
#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

impl ListQuery {
    pub fn clamped_limit(&self) -> i64 {
        self.limit.clamp(1, 500)
    }
}
