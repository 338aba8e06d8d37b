// SQLite MessageTransport Implementation
//
// A small durable broker on three tables: bindings route
// exchange/routing_key to queues, messages carry a state
// (READY -> IN_FLIGHT -> deleted | READY | DEAD) and a visibility time.

use crate::error::map_transport_error;
use async_trait::async_trait;
use catalog_ingest_core::domain::{DeadLetter, Delivery, DeliveryId, ImportMessage};
use catalog_ingest_core::error::{AppError, Result};
use catalog_ingest_core::port::{MessageTransport, TimeProvider, Topology};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const STATE_READY: &str = "READY";
const STATE_IN_FLIGHT: &str = "IN_FLIGHT";
const STATE_DEAD: &str = "DEAD";

pub struct SqliteMessageTransport {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteMessageTransport {
    /// The broker may share the job database or live in its own file
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    async fn dead_letter_queue_of(&self, queue: &str) -> Result<String> {
        let dlq: Option<String> =
            sqlx::query_scalar("SELECT dead_letter_queue FROM broker_queues WHERE queue = ?")
                .bind(queue)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_transport_error)?;
        Ok(dlq.unwrap_or_else(|| format!("{}.dlq", queue)))
    }

    fn unknown_delivery(delivery: &Delivery) -> AppError {
        AppError::Transport(format!(
            "delivery {} is not in flight",
            delivery.delivery_id
        ))
    }
}

#[async_trait]
impl MessageTransport for SqliteMessageTransport {
    async fn declare_topology(&self, topology: &Topology) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(map_transport_error)?;

        sqlx::query(
            "INSERT OR IGNORE INTO broker_bindings (exchange, routing_key, queue) VALUES (?, ?, ?)",
        )
        .bind(&topology.exchange)
        .bind(&topology.routing_key)
        .bind(&topology.queue)
        .execute(&mut *tx)
        .await
        .map_err(map_transport_error)?;

        sqlx::query(
            r#"
            INSERT INTO broker_queues (queue, dead_letter_queue) VALUES (?, ?)
            ON CONFLICT (queue) DO UPDATE SET dead_letter_queue = excluded.dead_letter_queue
            "#,
        )
        .bind(&topology.queue)
        .bind(&topology.dead_letter_queue)
        .execute(&mut *tx)
        .await
        .map_err(map_transport_error)?;

        tx.commit().await.map_err(map_transport_error)?;

        info!(
            exchange = %topology.exchange,
            routing_key = %topology.routing_key,
            queue = %topology.queue,
            dead_letter_queue = %topology.dead_letter_queue,
            "Topology declared"
        );
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &ImportMessage,
        delay: Duration,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();
        let visible_at = now.saturating_add(delay.as_millis().min(i64::MAX as u128) as i64);
        let payload = message.to_bytes()?;

        // Resolved outside the write transaction: a deferred transaction that
        // reads first cannot wait for the write lock.
        let queues: Vec<String> = sqlx::query_scalar(
            "SELECT queue FROM broker_bindings WHERE exchange = ? AND routing_key = ?",
        )
        .bind(exchange)
        .bind(routing_key)
        .fetch_all(&self.pool)
        .await
        .map_err(map_transport_error)?;

        if queues.is_empty() {
            return Err(AppError::Transport(format!(
                "unroutable: no queue bound to {}/{}",
                exchange, routing_key
            )));
        }

        let mut tx = self.pool.begin().await.map_err(map_transport_error)?;
        for queue in &queues {
            sqlx::query(
                r#"
                INSERT INTO broker_messages (queue, payload, state, visible_at, enqueued_at)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(queue)
            .bind(&payload)
            .bind(STATE_READY)
            .bind(visible_at)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_transport_error)?;
        }

        tx.commit().await.map_err(map_transport_error)?;

        debug!(
            job_id = %message.job_id,
            attempt = message.attempt,
            delay_ms = delay.as_millis() as u64,
            queues = queues.len(),
            "Message published"
        );
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        let now = self.time_provider.now_millis();

        let row: Option<(i64, Vec<u8>, i32)> = sqlx::query_as(
            r#"
            UPDATE broker_messages
            SET state = ?, delivery_count = delivery_count + 1
            WHERE id = (
                SELECT id FROM broker_messages
                WHERE queue = ? AND state = ? AND visible_at <= ?
                ORDER BY visible_at ASC, id ASC
                LIMIT 1
            )
            RETURNING id, payload, delivery_count
            "#,
        )
        .bind(STATE_IN_FLIGHT)
        .bind(queue)
        .bind(STATE_READY)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_transport_error)?;

        let Some((id, payload, delivery_count)) = row else {
            return Ok(None);
        };

        match ImportMessage::from_bytes(&payload) {
            Ok(message) => Ok(Some(Delivery {
                delivery_id: id,
                queue: queue.to_string(),
                message,
                delivery_count,
            })),
            Err(e) => {
                // Undecodable payloads go straight to the dead-letter queue
                warn!(delivery_id = id, error = %e, "Dead-lettering undecodable message");
                let dlq = self.dead_letter_queue_of(queue).await?;
                sqlx::query(
                    r#"
                    UPDATE broker_messages
                    SET state = ?, origin_queue = queue, queue = ?, dead_lettered_at = ?
                    WHERE id = ?
                    "#,
                )
                .bind(STATE_DEAD)
                .bind(&dlq)
                .bind(now)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_transport_error)?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query("DELETE FROM broker_messages WHERE id = ? AND state = ?")
            .bind(delivery.delivery_id)
            .bind(STATE_IN_FLIGHT)
            .execute(&self.pool)
            .await
            .map_err(map_transport_error)?;

        if result.rows_affected() == 0 {
            return Err(Self::unknown_delivery(delivery));
        }
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
        let now = self.time_provider.now_millis();

        let result = if requeue {
            sqlx::query("UPDATE broker_messages SET state = ?, visible_at = ? WHERE id = ? AND state = ?")
                .bind(STATE_READY)
                .bind(now)
                .bind(delivery.delivery_id)
                .bind(STATE_IN_FLIGHT)
                .execute(&self.pool)
                .await
        } else {
            let dlq = self.dead_letter_queue_of(&delivery.queue).await?;
            sqlx::query(
                r#"
                UPDATE broker_messages
                SET state = ?, origin_queue = queue, queue = ?, dead_lettered_at = ?
                WHERE id = ? AND state = ?
                "#,
            )
            .bind(STATE_DEAD)
            .bind(&dlq)
            .bind(now)
            .bind(delivery.delivery_id)
            .bind(STATE_IN_FLIGHT)
            .execute(&self.pool)
            .await
        };
        let result = result.map_err(map_transport_error)?;

        if result.rows_affected() == 0 {
            return Err(Self::unknown_delivery(delivery));
        }
        Ok(())
    }

    async fn requeue_unacked(&self, queue: &str) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            "UPDATE broker_messages SET state = ?, visible_at = ? WHERE queue = ? AND state = ?",
        )
        .bind(STATE_READY)
        .bind(now)
        .bind(queue)
        .bind(STATE_IN_FLIGHT)
        .execute(&self.pool)
        .await
        .map_err(map_transport_error)?;

        Ok(result.rows_affected())
    }

    async fn list_dead_letters(
        &self,
        dead_letter_queue: &str,
        limit: u32,
    ) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, queue, origin_queue, payload, dead_lettered_at
            FROM broker_messages
            WHERE queue = ? AND state = ?
            ORDER BY id ASC
            LIMIT ?
            "#,
        )
        .bind(dead_letter_queue)
        .bind(STATE_DEAD)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(map_transport_error)?;

        rows.into_iter().map(DeadLetterRow::into_dead_letter).collect()
    }

    async fn find_dead_letter(&self, id: DeliveryId) -> Result<Option<DeadLetter>> {
        let row = sqlx::query_as::<_, DeadLetterRow>(
            r#"
            SELECT id, queue, origin_queue, payload, dead_lettered_at
            FROM broker_messages
            WHERE id = ? AND state = ?
            "#,
        )
        .bind(id)
        .bind(STATE_DEAD)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_transport_error)?;

        row.map(DeadLetterRow::into_dead_letter).transpose()
    }

    async fn remove_dead_letter(&self, id: DeliveryId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM broker_messages WHERE id = ? AND state = ?")
            .bind(id)
            .bind(STATE_DEAD)
            .execute(&self.pool)
            .await
            .map_err(map_transport_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn queue_depth(&self, queue: &str) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM broker_messages WHERE queue = ? AND state IN (?, ?)")
            .bind(queue)
            .bind(STATE_READY)
            .bind(STATE_DEAD)
            .fetch_one(&self.pool)
            .await
            .map_err(map_transport_error)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DeadLetterRow {
    id: i64,
    queue: String,
    origin_queue: Option<String>,
    payload: Vec<u8>,
    dead_lettered_at: Option<i64>,
}

impl DeadLetterRow {
    fn into_dead_letter(self) -> Result<DeadLetter> {
        Ok(DeadLetter {
            id: self.id,
            origin_queue: self.origin_queue.unwrap_or_default(),
            message: ImportMessage::from_bytes(&self.payload)?,
            dead_lettered_at: self.dead_lettered_at.unwrap_or_default(),
            queue: self.queue,
        })
    }
}
