use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;

use crate::error::{AnalysisError, ValidationError};
use crate::models::message::AnalysisResultMessage;
use crate::services::queue::{Delivery, QueueError, ResultSource};
use crate::services::reconciler::{InboundReconciler, ReconcileOutcome};

/// Pulls result messages off the response queue and runs each through the
/// reconciler on a bounded set of tokio tasks.
///
/// Shutdown is only observed between messages: once signalled, no new message
/// is reserved and the loop waits for in-flight handlers to finish.
pub struct ResultConsumer {
    source: Arc<dyn ResultSource>,
    reconciler: Arc<InboundReconciler>,
    concurrency: usize,
    poll_interval: Duration,
}

impl ResultConsumer {
    pub fn new(
        source: Arc<dyn ResultSource>,
        reconciler: Arc<InboundReconciler>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            reconciler,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let permits = Arc::new(Semaphore::new(self.concurrency));

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.changed() => break,
            };

            match self.source.receive().await {
                Ok(Some(delivery)) => {
                    let source = self.source.clone();
                    let reconciler = self.reconciler.clone();
                    tokio::spawn(async move {
                        let settled =
                            process_delivery(source.as_ref(), &reconciler, &delivery).await;
                        if let Err(e) = settled {
                            tracing::error!(error = %e, "Failed to settle result message");
                        }
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tracing::trace!("No results available, sleeping");
                    tokio::select! {
                        _ = sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "Error receiving result message, will retry");
                    tokio::select! {
                        _ = sleep(self.poll_interval) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }

        tracing::info!("Result consumer stopping, waiting for in-flight messages");
        let all = u32::try_from(self.concurrency).unwrap_or(u32::MAX);
        if let Err(e) = permits.acquire_many(all).await {
            tracing::warn!(error = %e, "Permit pool closed before in-flight messages drained");
        }
        tracing::info!("Result consumer stopped");
    }
}

/// Decode, reconcile and settle a single delivery. Handled messages are
/// acknowledged; anything the reconciler rejects goes to the dead-letter list.
pub async fn process_delivery(
    source: &dyn ResultSource,
    reconciler: &InboundReconciler,
    delivery: &Delivery,
) -> Result<(), QueueError> {
    let result = match serde_json::from_str::<AnalysisResultMessage>(&delivery.payload) {
        Ok(message) => reconciler.on_result(&message).await.map_err(|e| (Some(message), e)),
        Err(e) => Err((
            None,
            AnalysisError::from(ValidationError::MalformedMessage(e.to_string())),
        )),
    };

    match result {
        Ok(outcome) => {
            let label = match outcome {
                ReconcileOutcome::Completed { .. } => "completed",
                ReconcileOutcome::Failed => "failed",
                ReconcileOutcome::Duplicate(_) => "duplicate",
            };
            metrics::counter!("analysis_results_total", "outcome" => label).increment(1);
            source.ack(delivery).await
        }
        Err((message, error)) => {
            let analysis_id = message.as_ref().map(|m| m.analysis_id);
            match &error {
                AnalysisError::NotFound(_) | AnalysisError::Validation(_) => {
                    tracing::warn!(?analysis_id, error = %error, "Result message rejected")
                }
                _ => tracing::error!(?analysis_id, error = %error, "Result message rejected"),
            }
            metrics::counter!("analysis_results_rejected").increment(1);
            source.reject(delivery).await
        }
    }
}
