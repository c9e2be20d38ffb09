use crate::error::{AppError, Result};
use crate::models::Order;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, reference, status, currency, expected_amount, amount_charged, \
    subtotal, fee, vat, total, customer_name, customer_email, customer_phone, items, \
    ticket_quantity, failure_reason, issuing_started_at, finalized_at, created_at, updated_at";

/// Repository for Order rows.
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts the order unless its reference exists. Returns `None` on conflict.
    pub async fn insert_if_absent(&self, order: &Order) -> Result<Option<Order>> {
        let sql = format!(
            r#"
            INSERT INTO orders ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (reference) DO NOTHING
            RETURNING {cols}
            "#,
            cols = ORDER_COLUMNS
        );

        let row = bind_order(sqlx::query_as::<_, Order>(&sql), order)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Inserts `claimed` (already in `TICKETS_ISSUING`), or flips an existing
    /// `PENDING` row to it. Returns `None` if the reference is held in any
    /// other status.
    ///
    /// A single statement, so two callers racing on one reference serialize on
    /// the unique index and exactly one sees a returned row.
    pub async fn claim(&self, claimed: &Order) -> Result<Option<Order>> {
        let sql = format!(
            r#"
            INSERT INTO orders ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (reference) DO UPDATE
            SET status = EXCLUDED.status,
                amount_charged = EXCLUDED.amount_charged,
                issuing_started_at = EXCLUDED.issuing_started_at,
                updated_at = EXCLUDED.updated_at
            WHERE orders.status = 'PENDING'
            RETURNING {cols}
            "#,
            cols = ORDER_COLUMNS
        );

        let row = bind_order(sqlx::query_as::<_, Order>(&sql), claimed)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_reference(&self, reference: &str) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE reference = $1", ORDER_COLUMNS);

        let row = sqlx::query_as::<_, Order>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);

        let row = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// `PENDING -> FAILED`.
    pub async fn mark_failed(&self, reference: &str, reason: &str) -> Result<Option<Order>> {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = 'FAILED', failure_reason = $2, updated_at = NOW()
            WHERE reference = $1 AND status = 'PENDING'
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, Order>(&sql)
            .bind(reference)
            .bind(reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// `TICKETS_ISSUING -> SUCCESS`, guarded by the stored ticket count.
    /// Runs on whatever executor the caller holds so it can join a transaction.
    pub async fn mark_success<'e, E>(executor: E, order_id: Uuid) -> Result<Option<Order>>
    where
        E: PgExecutor<'e>,
    {
        let sql = format!(
            r#"
            UPDATE orders
            SET status = 'SUCCESS', finalized_at = NOW(), updated_at = NOW()
            WHERE id = $1
              AND status = 'TICKETS_ISSUING'
              AND (SELECT COUNT(*) FROM tickets WHERE tickets.order_id = orders.id) >= orders.ticket_quantity
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );

        let row = sqlx::query_as::<_, Order>(&sql)
            .bind(order_id)
            .fetch_optional(executor)
            .await
            .map_err(AppError::Database)?;

        Ok(row)
    }

    /// Orders marked `SUCCESS` whose ticket set is short.
    pub async fn find_incomplete_success(&self, limit: i64) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM orders o
            WHERE o.status = 'SUCCESS'
              AND (SELECT COUNT(*) FROM tickets t WHERE t.order_id = o.id) < o.ticket_quantity
            ORDER BY o.updated_at ASC
            LIMIT $1
            "#,
            prefixed_columns("o")
        );

        let rows = sqlx::query_as::<_, Order>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn find_stale_issuing(&self, claimed_before: DateTime<Utc>, limit: i64) -> Result<Vec<Order>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM orders
            WHERE status = 'TICKETS_ISSUING' AND issuing_started_at < $1
            ORDER BY issuing_started_at ASC
            LIMIT $2
            "#,
            ORDER_COLUMNS
        );

        let rows = sqlx::query_as::<_, Order>(&sql)
            .bind(claimed_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)?;

        Ok(rows)
    }
}

fn prefixed_columns(alias: &str) -> String {
    ORDER_COLUMNS
        .split(',')
        .map(|c| format!("{}.{}", alias, c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_order<'q>(
    query: sqlx::query::QueryAs<'q, sqlx::Postgres, Order, sqlx::postgres::PgArguments>,
    order: &'q Order,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, Order, sqlx::postgres::PgArguments> {
    query
        .bind(order.id)
        .bind(&order.reference)
        .bind(order.status)
        .bind(&order.currency)
        .bind(order.expected_amount)
        .bind(order.amount_charged)
        .bind(order.totals.subtotal)
        .bind(order.totals.fee)
        .bind(order.totals.vat)
        .bind(order.totals.total)
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(&order.customer.phone)
        .bind(&order.items)
        .bind(order.ticket_quantity)
        .bind(&order.failure_reason)
        .bind(order.issuing_started_at)
        .bind(order.finalized_at)
        .bind(order.created_at)
        .bind(order.updated_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_columns() {
        let cols = prefixed_columns("o");
        assert!(cols.starts_with("o.id, o.reference"));
        assert!(cols.ends_with("o.updated_at"));
        assert_eq!(cols.matches("o.").count(), ORDER_COLUMNS.split(',').count());
    }
}
