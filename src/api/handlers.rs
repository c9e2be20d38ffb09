use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use crate::api::requests::{CreatePendingOrderRequest, ListQuery};
use crate::api::responses::{
    ApiResponse, BrokenOrdersResponse, ErrorResponse, FinalizationResponse, HealthResponse,
    OrderResponse, ValidationErrorDetail,
};
use crate::error::AppError;
use crate::gateway::signature::SIGNATURE_HEADER;
use crate::models::FraudReview;
use crate::observability::HealthReport;
use crate::services::{AuditReport, FinalizationOutcome, RepairReport, WebhookAck};

use super::routes::AppState;

type ApiError = (StatusCode, Json<ApiResponse<()>>);

/// HTTP status for each error kind.
pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::Validation(_) => StatusCode::BAD_REQUEST,
        AppError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
        AppError::PaymentNotConfirmed { .. } => StatusCode::PAYMENT_REQUIRED,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::FraudMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AppError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::PartialCommitFailure { .. }
        | AppError::Database(_)
        | AppError::Redis(_)
        | AppError::Kafka(_)
        | AppError::Entropy(_)
        | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Maps an error to a response without leaking internals.
pub fn error_reply(err: AppError) -> ApiError {
    let status = status_for(&err);
    let message = match &err {
        AppError::Validation(msg) | AppError::NotFound(msg) => msg.clone(),
        AppError::InvalidSignature(_) => "Webhook authentication failed".to_string(),
        AppError::PaymentNotConfirmed { status, .. } => {
            format!("Payment not confirmed by gateway (status: {})", status)
        }
        AppError::FraudMismatch { .. } => {
            "Charged amount does not match the order; payment held for review".to_string()
        }
        AppError::GatewayUnavailable(_) => {
            "Payment gateway unavailable, retry later".to_string()
        }
        AppError::PartialCommitFailure { .. } => {
            "Order finalization incomplete, retrying is safe".to_string()
        }
        _ => "An internal error occurred".to_string(),
    };

    if status.is_server_error() {
        tracing::error!(code = err.code(), "Request failed: {}", err);
    }

    (
        status,
        Json(ApiResponse::<()>::error(
            ErrorResponse::new(err.code(), message).retryable(err.is_retryable()),
        )),
    )
}

/// Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    let status = match &state.health_checker {
        Some(checker) => checker.check_all().await.status.as_str().to_string(),
        None => "healthy".to_string(),
    };

    Json(ApiResponse::success(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now(),
    }))
}

/// Per-dependency health.
pub async fn detailed_health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<HealthReport>>, ApiError> {
    let checker = state
        .health_checker
        .as_ref()
        .ok_or_else(|| error_reply(AppError::NotFound("health checker not configured".to_string())))?;

    Ok(Json(ApiResponse::success(checker.check_all().await)))
}

/// Readiness check endpoint.
pub async fn readiness_check(State(state): State<AppState>) -> StatusCode {
    match &state.health_checker {
        Some(checker) if !checker.is_ready().await => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    }
}

/// Liveness check endpoint.
pub async fn liveness_check() -> StatusCode {
    StatusCode::OK
}

/// Prometheus scrape endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(StatusCode::NOT_FOUND)
}

// ============================================================================
// Payment Handlers
// ============================================================================

/// Client poll after the gateway redirect.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<(StatusCode, Json<ApiResponse<FinalizationResponse>>), ApiError> {
    let outcome = state
        .finalization
        .verify_and_finalize(&reference)
        .await
        .map_err(error_reply)?;

    let status = match outcome {
        FinalizationOutcome::InProgress(_) => StatusCode::ACCEPTED,
        _ => StatusCode::OK,
    };

    Ok((status, Json(ApiResponse::success(outcome.into()))))
}

/// Gateway webhook. Acknowledged with 200 once authenticated.
pub async fn receive_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let ack = state
        .finalization
        .handle_webhook(&provider, &body, signature)
        .await
        .map_err(error_reply)?;

    Ok(Json(ApiResponse::success(ack)))
}

/// Registers a pending order at checkout.
pub async fn create_pending_order(
    State(state): State<AppState>,
    Json(request): Json<CreatePendingOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ApiError> {
    if let Err(errors) = request.validate() {
        let details: Vec<ValidationErrorDetail> = errors
            .into_iter()
            .map(|e| ValidationErrorDetail {
                field: e.field,
                message: e.message,
            })
            .collect();

        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<()>::error(
                ErrorResponse::new("VALIDATION_ERROR", "Request validation failed")
                    .with_details(details),
            )),
        ));
    }

    let order = state
        .finalization
        .register_pending(&request.reference, &request.metadata)
        .await
        .map_err(error_reply)?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(order.into()))))
}

// ============================================================================
// Admin Handlers
// ============================================================================

pub async fn list_broken_orders(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BrokenOrdersResponse>>, ApiError> {
    let order_ids = state.auditor.scan().await.map_err(error_reply)?;
    Ok(Json(ApiResponse::success(BrokenOrdersResponse {
        count: order_ids.len(),
        order_ids,
    })))
}

pub async fn repair_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<RepairReport>>, ApiError> {
    let report = state.auditor.repair(id).await.map_err(error_reply)?;
    Ok(Json(ApiResponse::success(report)))
}

/// Runs one auditor pass on demand.
pub async fn run_reconciliation(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AuditReport>>, ApiError> {
    let report = state.auditor.run_once().await.map_err(error_reply)?;
    Ok(Json(ApiResponse::success(report)))
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<FraudReview>>>, ApiError> {
    let reviews = state
        .finalization
        .open_reviews(query.clamped_limit())
        .await
        .map_err(error_reply)?;
    Ok(Json(ApiResponse::success(reviews)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AppError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&AppError::InvalidSignature("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&AppError::PaymentNotConfirmed {
                reference: "TIX_1".into(),
                status: "abandoned".into()
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status_for(&AppError::FraudMismatch {
                reference: "TIX_1".into(),
                expected: 500000,
                charged: 450000
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&AppError::GatewayUnavailable("timeout".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_partial_commit_reply_is_retryable() {
        let (status, Json(body)) = error_reply(AppError::PartialCommitFailure {
            reference: "TIX_1".into(),
            reason: "2 of 3 tickets stored".into(),
        });
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = body.error.unwrap();
        assert!(error.retryable);
        assert_eq!(error.code, "FINALIZATION_INCOMPLETE");
        assert!(!error.message.contains("2 of 3"));
    }
}
