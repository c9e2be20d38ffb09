use crate::error::{AppError, Result};
use crate::models::Ticket;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Repository for Ticket rows.
pub struct TicketRepository {
    pool: PgPool,
}

impl TicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one ticket. A ticket whose `(order_id, sequence_index)` or code
    /// is already stored is skipped; returns rows written (0 or 1).
    pub async fn insert<'e, E>(executor: E, ticket: &Ticket) -> Result<u64>
    where
        E: PgExecutor<'e>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO tickets (id, order_id, sequence_index, code, event_id, event_title, tier_name, price, owner_name, owner_email, used, used_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(ticket.id)
        .bind(ticket.order_id)
        .bind(ticket.sequence_index)
        .bind(&ticket.code)
        .bind(&ticket.event_id)
        .bind(&ticket.event_title)
        .bind(&ticket.tier_name)
        .bind(ticket.price)
        .bind(&ticket.owner_name)
        .bind(&ticket.owner_email)
        .bind(ticket.used)
        .bind(ticket.used_at)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(executor)
        .await
        .map_err(AppError::Database)?;

        Ok(result.rows_affected())
    }

    /// Inserts tickets one statement at a time, outside any transaction.
    pub async fn insert_all(&self, tickets: &[Ticket]) -> Result<u64> {
        let mut written = 0;
        for ticket in tickets {
            written += Self::insert(&self.pool, ticket).await?;
        }
        Ok(written)
    }

    /// Lists an order's tickets in sequence order.
    pub async fn find_by_order(&self, order_id: Uuid) -> Result<Vec<Ticket>> {
        let rows = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT id, order_id, sequence_index, code, event_id, event_title, tier_name, price, owner_name, owner_email, used, used_at, created_at, updated_at
            FROM tickets
            WHERE order_id = $1
            ORDER BY sequence_index ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(rows)
    }

    pub async fn count_by_order(&self, order_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM tickets WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::Database)?;

        Ok(count.0)
    }
}
