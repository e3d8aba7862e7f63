use std::sync::Arc;

use crate::models::message::AnalysisJobMessage;
use crate::services::queue::{JobTransport, QueueError};

/// Serializes analysis jobs and hands them to the worker queue. Does not
/// retry and does not wait for the worker.
pub struct OutboundDispatcher {
    transport: Arc<dyn JobTransport>,
}

impl OutboundDispatcher {
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self { transport }
    }

    pub async fn publish(&self, job: &AnalysisJobMessage) -> Result<(), DispatchError> {
        let payload = serde_json::to_string(job).map_err(DispatchError::Serialize)?;
        self.transport
            .send(payload)
            .await
            .map_err(DispatchError::Transport)?;

        tracing::debug!(
            analysis_id = job.analysis_id,
            analysis_type = %job.analysis_type,
            "Analysis job published"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to serialize job: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to publish job: {0}")]
    Transport(#[source] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::AnalysisKind;
    use crate::models::pet::Species;
    use crate::services::queue::InMemoryQueue;

    #[tokio::test]
    async fn test_publish_pushes_json_job() {
        let queue = Arc::new(InMemoryQueue::new());
        let dispatcher = OutboundDispatcher::new(queue.clone());
        let job = AnalysisJobMessage::new(5, None, Species::Cat, AnalysisKind::Emotional);

        dispatcher.publish(&job).await.unwrap();

        let sent = queue.sent_jobs().await;
        assert_eq!(sent.len(), 1);
        let decoded: AnalysisJobMessage = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(decoded, job);
        assert!(sent[0].contains(r#""imageUrl":null"#));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let dispatcher = OutboundDispatcher::new(Arc::new(InMemoryQueue::failing()));
        let job = AnalysisJobMessage::new(5, None, Species::Dog, AnalysisKind::Breed);

        let err = dispatcher.publish(&job).await.unwrap_err();
        assert!(matches!(err, DispatchError::Transport(_)));
    }
}
