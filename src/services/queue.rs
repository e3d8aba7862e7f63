use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// A message reserved from the response queue. It stays reserved until it is
/// acknowledged or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub payload: String,
}

/// Outbound side: hands a serialized job to the worker queue.
#[async_trait]
pub trait JobTransport: Send + Sync {
    async fn send(&self, payload: String) -> Result<(), QueueError>;
}

/// Inbound side: at-least-once source of worker result messages.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// Reserve the next message, or `None` when the queue is empty.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    /// Drop a reserved message after it was handled.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Move a reserved message to the dead-letter list.
    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError>;
}

/// Redis list names used by the queue.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    pub jobs: String,
    pub responses: String,
    pub processing: String,
    pub dead_letter: String,
}

impl QueueKeys {
    pub fn new(jobs: &str, responses: &str) -> Self {
        Self {
            jobs: jobs.to_string(),
            responses: responses.to_string(),
            processing: format!("{responses}:processing"),
            dead_letter: format!("{responses}:dead_letter"),
        }
    }
}

/// Redis-backed job and result queues.
pub struct RedisQueue {
    client: redis::Client,
    keys: QueueKeys,
}

impl RedisQueue {
    pub fn new(redis_url: &str, keys: QueueKeys) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client, keys })
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)
    }

    /// Check Redis connectivity (for health checks).
    pub async fn health_check(&self) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    /// Number of result messages waiting to be reconciled.
    pub async fn response_depth(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let depth: u64 = conn.llen(&self.keys.responses).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }
}

#[async_trait]
impl JobTransport for RedisQueue {
    async fn send(&self, payload: String) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.keys.jobs, payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl ResultSource for RedisQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .rpoplpush(&self.keys.responses, &self.keys.processing)
            .await
            .map_err(QueueError::Redis)?;
        Ok(payload.map(|payload| Delivery { payload }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        conn.lrem::<_, _, ()>(&self.keys.processing, 1, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .lrem(&self.keys.processing, 1, &delivery.payload)
            .ignore()
            .lpush(&self.keys.dead_letter, &delivery.payload)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// Process-local queue with the same reserve/ack/reject semantics as
/// [`RedisQueue`]. Used by tests and local wiring.
#[derive(Default)]
pub struct InMemoryQueue {
    state: Mutex<InMemoryQueueState>,
}

#[derive(Default)]
struct InMemoryQueueState {
    jobs: Vec<String>,
    responses: VecDeque<String>,
    processing: Vec<String>,
    dead_letter: Vec<String>,
    fail_sends: bool,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose `send` always fails with a transport error.
    pub fn failing() -> Self {
        Self {
            state: Mutex::new(InMemoryQueueState {
                fail_sends: true,
                ..Default::default()
            }),
        }
    }

    pub async fn push_response(&self, payload: impl Into<String>) {
        self.state.lock().await.responses.push_back(payload.into());
    }

    pub async fn sent_jobs(&self) -> Vec<String> {
        self.state.lock().await.jobs.clone()
    }

    pub async fn dead_letters(&self) -> Vec<String> {
        self.state.lock().await.dead_letter.clone()
    }

    pub async fn pending_responses(&self) -> usize {
        self.state.lock().await.responses.len()
    }

    pub async fn in_flight(&self) -> usize {
        self.state.lock().await.processing.len()
    }
}

#[async_trait]
impl JobTransport for InMemoryQueue {
    async fn send(&self, payload: String) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if state.fail_sends {
            return Err(QueueError::Unavailable("in-memory queue configured to fail".to_string()));
        }
        state.jobs.push(payload);
        Ok(())
    }
}

#[async_trait]
impl ResultSource for InMemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock().await;
        Ok(state.responses.pop_front().map(|payload| {
            state.processing.push(payload.clone());
            Delivery { payload }
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.processing.iter().position(|p| *p == delivery.payload) {
            state.processing.remove(pos);
        }
        Ok(())
    }

    async fn reject(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.processing.iter().position(|p| *p == delivery.payload) {
            state.processing.remove(pos);
        }
        state.dead_letter.push(delivery.payload.clone());
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys_derive_from_response_list() {
        let keys = QueueKeys::new("pets:analysis:jobs", "pets:analysis:responses");
        assert_eq!(keys.processing, "pets:analysis:responses:processing");
        assert_eq!(keys.dead_letter, "pets:analysis:responses:dead_letter");
    }

    #[tokio::test]
    async fn test_in_memory_reserve_ack_and_reject() {
        let queue = InMemoryQueue::new();
        queue.push_response("first").await;
        queue.push_response("second").await;

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.payload, "first");
        assert_eq!(queue.in_flight().await, 2);

        queue.ack(&first).await.unwrap();
        queue.reject(&second).await.unwrap();

        assert_eq!(queue.in_flight().await, 0);
        assert_eq!(queue.dead_letters().await, vec!["second".to_string()]);
        assert!(queue.receive().await.unwrap().is_none());
    }
}
