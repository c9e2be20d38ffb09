use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by the finalization pipeline.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("kafka error: {0}")]
    Kafka(#[from] rskafka::client::error::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Timeout, transport failure, 5xx or malformed gateway body. The payment
    /// state is unknown; callers may retry.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway answered, and the charge is not successful.
    #[error("payment {reference} not confirmed (gateway status: {status})")]
    PaymentNotConfirmed { reference: String, status: String },

    /// Charged amount differs from the expected amount. Terminal.
    #[error("amount mismatch for {reference}: expected {expected}, charged {charged}")]
    FraudMismatch {
        reference: String,
        expected: i64,
        charged: i64,
    },

    /// Ticket issuance did not complete. The order is parked in
    /// `TICKETS_ISSUING` for the reconciliation auditor.
    #[error("ticket issuance incomplete for {reference}: {reason}")]
    PartialCommitFailure { reference: String, reason: String },

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Returns true when the same request may succeed if retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_)
                | AppError::Redis(_)
                | AppError::Kafka(_)
                | AppError::GatewayUnavailable(_)
                | AppError::PartialCommitFailure { .. }
        )
    }

    /// Stable machine-readable code used in API error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Redis(_) => "CACHE_ERROR",
            AppError::Kafka(_) => "EVENT_BUS_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::GatewayUnavailable(_) => "GATEWAY_UNAVAILABLE",
            AppError::PaymentNotConfirmed { .. } => "PAYMENT_NOT_CONFIRMED",
            AppError::FraudMismatch { .. } => "PAYMENT_AMOUNT_MISMATCH",
            AppError::PartialCommitFailure { .. } => "FINALIZATION_INCOMPLETE",
            AppError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AppError::Entropy(_) => "ENTROPY_FAILURE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
