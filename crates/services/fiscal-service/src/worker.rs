//! Receipt poller: advances pending documents in the background.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use common::SefazClientConfig;

use crate::service::FiscalService;

/// Periodically calls [`FiscalService::process_pending`].
pub struct ReceiptPoller {
    service: Arc<dyn FiscalService>,
    interval: Duration,
    batch_size: u64,
}

impl ReceiptPoller {
    pub fn new(service: Arc<dyn FiscalService>, config: &SefazClientConfig) -> Self {
        Self {
            service,
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            batch_size: config.poll_batch_size.max(1),
        }
    }

    /// Run one batch; full batches are followed immediately by another.
    pub async fn tick(&self) {
        loop {
            match self.service.process_pending(self.batch_size).await {
                Ok(summary) => {
                    if summary.processed > 0 {
                        tracing::info!(
                            processed = summary.processed,
                            authorized = summary.authorized,
                            rejected = summary.rejected,
                            waiting = summary.waiting,
                            failed = summary.failed,
                            "Pending documents processed"
                        );
                    }
                    if (summary.processed as u64) < self.batch_size {
                        return;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "Receipt poller batch failed");
                    return;
                }
            }
        }
    }

    /// Poll until `shutdown` flips to `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Receipt poller started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Receipt poller shutting down");
                        break;
                    }
                }
                _ = interval.tick() => self.tick().await,
            }
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MockFiscalService, PollSummary};
    use common::AppError;

    fn config(batch: u64) -> SefazClientConfig {
        SefazClientConfig {
            poll_interval_secs: 1,
            poll_batch_size: batch,
            ..Default::default()
        }
    }

    fn processed(n: usize) -> PollSummary {
        PollSummary {
            processed: n,
            waiting: n,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_full_batches_drain_backlog() {
        let mut service = MockFiscalService::new();
        let mut seq = mockall::Sequence::new();
        service
            .expect_process_pending()
            .withf(|batch| *batch == 2)
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(processed(2)));
        service
            .expect_process_pending()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(processed(1)));

        ReceiptPoller::new(Arc::new(service), &config(2)).tick().await;
    }

    #[tokio::test]
    async fn test_failed_batch_ends_tick() {
        let mut service = MockFiscalService::new();
        service
            .expect_process_pending()
            .times(1)
            .returning(|_| Err(AppError::internal("connection refused")));

        ReceiptPoller::new(Arc::new(service), &config(10)).tick().await;
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let mut service = MockFiscalService::new();
        service
            .expect_process_pending()
            .returning(|_| Ok(PollSummary::default()));
        let (tx, rx) = watch::channel(false);

        let handle = ReceiptPoller::new(Arc::new(service), &config(10)).spawn(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
