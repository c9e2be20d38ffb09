use crate::error::{AppError, Result};
use crate::models::FraudReview;
use sqlx::PgPool;

/// Repository for the manual review queue.
pub struct FraudReviewRepository {
    pool: PgPool,
}

impl FraudReviewRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, review: &FraudReview) -> Result<FraudReview> {
        let row = sqlx::query_as::<_, FraudReview>(
            r#"
            INSERT INTO fraud_reviews (id, reference, kind, expected_amount, charged_amount, trigger, payload, created_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, reference, kind, expected_amount, charged_amount, trigger, payload, created_at, resolved_at
            "#,
        )
        .bind(review.id)
        .bind(&review.reference)
        .bind(review.kind)
        .bind(review.expected_amount)
        .bind(review.charged_amount)
        .bind(review.trigger)
        .bind(&review.payload)
        .bind(review.created_at)
        .bind(review.resolved_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Vec<FraudReview>> {
        let rows = sqlx::query_as::<_, FraudReview>(
            r#"
            SELECT id, reference, kind, expected_amount, charged_amount, trigger, payload, created_at, resolved_at
            FROM fraud_reviews
            WHERE reference = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(reference)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    /// Reviews nobody has resolved yet, oldest first.
    pub async fn list_open(&self, limit: i64) -> Result<Vec<FraudReview>> {
        let rows = sqlx::query_as::<_, FraudReview>(
            r#"
            SELECT id, reference, kind, expected_amount, charged_amount, trigger, payload, created_at, resolved_at
            FROM fraud_reviews
            WHERE resolved_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }
}
