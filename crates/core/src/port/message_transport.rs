// Message Transport Port
// Durable exchange/queue abstraction with at-least-once delivery.

use crate::domain::{DeadLetter, Delivery, DeliveryId, ImportMessage};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Exchange / routing key / queue addressing, fixed per deployment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    /// Target of `nack(requeue = false)`; never consumed automatically
    pub dead_letter_queue: String,
}

impl Default for Topology {
    fn default() -> Self {
        Self {
            exchange: "catalog.import".to_string(),
            routing_key: "catalog.import.csv".to_string(),
            queue: "catalog.import.csv".to_string(),
            dead_letter_queue: "catalog.import.csv.dlq".to_string(),
        }
    }
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Bind `exchange/routing_key` to `queue` and register its dead-letter
    /// queue. Idempotent.
    async fn declare_topology(&self, topology: &Topology) -> Result<()>;

    /// Route a message to every queue bound to `exchange/routing_key`.
    /// The message becomes visible after `delay`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &ImportMessage,
        delay: Duration,
    ) -> Result<()>;

    /// Take the next visible message off `queue`, if any. The delivery stays
    /// in flight until acked or nacked.
    async fn receive(&self, queue: &str) -> Result<Option<Delivery>>;

    /// Remove a delivered message for good
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// `requeue = true`: make it visible again immediately.
    /// `requeue = false`: move it to the queue's dead-letter queue.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()>;

    /// Return deliveries left in flight (by a crashed consumer) to the queue
    async fn requeue_unacked(&self, queue: &str) -> Result<u64>;

    /// Messages parked on a dead-letter queue, oldest first
    async fn list_dead_letters(&self, dead_letter_queue: &str, limit: u32)
        -> Result<Vec<DeadLetter>>;

    /// A single dead letter by id
    async fn find_dead_letter(&self, id: DeliveryId) -> Result<Option<DeadLetter>>;

    /// Drop a dead letter (after operator replay)
    async fn remove_dead_letter(&self, id: DeliveryId) -> Result<bool>;

    /// Messages waiting (visible or delayed) on a queue; for a dead-letter
    /// queue, the parked messages
    async fn queue_depth(&self, queue: &str) -> Result<i64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone)]
    struct Stored {
        id: DeliveryId,
        message: ImportMessage,
        visible_at: Instant,
        delivery_count: i32,
    }

    #[derive(Default)]
    struct State {
        next_id: DeliveryId,
        bindings: HashMap<(String, String), Vec<String>>,
        dead_letter_queues: HashMap<String, String>,
        queues: HashMap<String, VecDeque<Stored>>,
        in_flight: HashMap<DeliveryId, (String, Stored)>,
        dead: Vec<DeadLetter>,
        published: Vec<ImportMessage>,
        failing_publishes: usize,
    }

    /// In-memory broker (not durable) mirroring the SQLite transport's semantics
    #[derive(Default)]
    pub struct InMemoryTransport {
        state: Mutex<State>,
    }

    impl InMemoryTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Transport with the default topology already declared
        pub fn with_topology(topology: &Topology) -> Self {
            let transport = Self::default();
            transport.declare(topology);
            transport
        }

        fn declare(&self, topology: &Topology) {
            let mut state = self.state.lock().unwrap();
            let bound = state
                .bindings
                .entry((topology.exchange.clone(), topology.routing_key.clone()))
                .or_default();
            if !bound.contains(&topology.queue) {
                bound.push(topology.queue.clone());
            }
            state
                .dead_letter_queues
                .insert(topology.queue.clone(), topology.dead_letter_queue.clone());
            state.queues.entry(topology.queue.clone()).or_default();
        }

        /// The next `n` publishes fail with a TransportError
        pub fn fail_next_publishes(&self, n: usize) {
            self.state.lock().unwrap().failing_publishes = n;
        }

        /// Every message accepted by publish, in order
        pub fn published(&self) -> Vec<ImportMessage> {
            self.state.lock().unwrap().published.clone()
        }

        pub fn in_flight_count(&self) -> usize {
            self.state.lock().unwrap().in_flight.len()
        }

        pub fn dead_letter_count(&self) -> usize {
            self.state.lock().unwrap().dead.len()
        }

        /// Deliver a copy of an already published message again, as a
        /// broker would after a lost ack
        pub fn duplicate(&self, queue: &str, message: &ImportMessage) {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let stored = Stored {
                id: state.next_id,
                message: message.clone(),
                visible_at: Instant::now(),
                delivery_count: 0,
            };
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(stored);
        }
    }

    #[async_trait]
    impl MessageTransport for InMemoryTransport {
        async fn declare_topology(&self, topology: &Topology) -> Result<()> {
            self.declare(topology);
            Ok(())
        }

        async fn publish(
            &self,
            exchange: &str,
            routing_key: &str,
            message: &ImportMessage,
            delay: Duration,
        ) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(AppError::Transport("broker unreachable".to_string()));
            }
            let queues = state
                .bindings
                .get(&(exchange.to_string(), routing_key.to_string()))
                .cloned()
                .ok_or_else(|| {
                    AppError::Transport(format!("unroutable: {}/{}", exchange, routing_key))
                })?;
            for queue in queues {
                state.next_id += 1;
                let stored = Stored {
                    id: state.next_id,
                    message: message.clone(),
                    visible_at: Instant::now() + delay,
                    delivery_count: 0,
                };
                state.queues.entry(queue).or_default().push_back(stored);
            }
            state.published.push(message.clone());
            Ok(())
        }

        async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            let Some(pending) = state.queues.get_mut(queue) else {
                return Ok(None);
            };
            let Some(position) = pending.iter().position(|m| m.visible_at <= now) else {
                return Ok(None);
            };
            let Some(mut stored) = pending.remove(position) else {
                return Ok(None);
            };
            stored.delivery_count += 1;
            let delivery = Delivery {
                delivery_id: stored.id,
                queue: queue.to_string(),
                message: stored.message.clone(),
                delivery_count: stored.delivery_count,
            };
            state
                .in_flight
                .insert(stored.id, (queue.to_string(), stored));
            Ok(Some(delivery))
        }

        async fn ack(&self, delivery: &Delivery) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state
                .in_flight
                .remove(&delivery.delivery_id)
                .map(|_| ())
                .ok_or_else(|| {
                    AppError::Transport(format!("unknown delivery {}", delivery.delivery_id))
                })
        }

        async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            let (queue, mut stored) =
                state.in_flight.remove(&delivery.delivery_id).ok_or_else(|| {
                    AppError::Transport(format!("unknown delivery {}", delivery.delivery_id))
                })?;
            if requeue {
                stored.visible_at = Instant::now();
                state.queues.entry(queue).or_default().push_back(stored);
            } else {
                let dlq = state
                    .dead_letter_queues
                    .get(&queue)
                    .cloned()
                    .unwrap_or_else(|| format!("{}.dlq", queue));
                state.dead.push(DeadLetter {
                    id: stored.id,
                    queue: dlq,
                    origin_queue: queue,
                    message: stored.message,
                    dead_lettered_at: chrono::Utc::now().timestamp_millis(),
                });
            }
            Ok(())
        }

        async fn requeue_unacked(&self, queue: &str) -> Result<u64> {
            let mut state = self.state.lock().unwrap();
            let ids: Vec<DeliveryId> = state
                .in_flight
                .iter()
                .filter(|(_, (q, _))| q == queue)
                .map(|(id, _)| *id)
                .collect();
            for id in &ids {
                if let Some((q, mut stored)) = state.in_flight.remove(id) {
                    stored.visible_at = Instant::now();
                    state.queues.entry(q).or_default().push_back(stored);
                }
            }
            Ok(ids.len() as u64)
        }

        async fn list_dead_letters(
            &self,
            dead_letter_queue: &str,
            limit: u32,
        ) -> Result<Vec<DeadLetter>> {
            let state = self.state.lock().unwrap();
            Ok(state
                .dead
                .iter()
                .filter(|d| d.queue == dead_letter_queue)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn find_dead_letter(&self, id: DeliveryId) -> Result<Option<DeadLetter>> {
            let state = self.state.lock().unwrap();
            Ok(state.dead.iter().find(|d| d.id == id).cloned())
        }

        async fn remove_dead_letter(&self, id: DeliveryId) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            let before = state.dead.len();
            state.dead.retain(|d| d.id != id);
            Ok(state.dead.len() != before)
        }

        async fn queue_depth(&self, queue: &str) -> Result<i64> {
            let state = self.state.lock().unwrap();
            let waiting = state.queues.get(queue).map(|q| q.len()).unwrap_or(0);
            let parked = state.dead.iter().filter(|d| d.queue == queue).count();
            Ok((waiting + parked) as i64)
        }
    }
}
