//! Message-driven ingestion pipeline.
//!
//! Structured the same way the teacher's `cli/src/hub/workers.rs` pool pulls
//! jobs off a shared receiver: a handful of worker tasks share one
//! subscription and race against a `CancellationToken` rather than each
//! owning a private poll loop.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::constants::PROCESSOR_WORKER_COUNT;
use crate::error::{BusError, ProcessorError};
use crate::repository::{ScanEntry, ScanEntryRepository};
use crate::scan;

/// Owns one subscription's lifetime against a configured topic.
pub struct Processor<B: MessageBus + 'static> {
    bus: Arc<B>,
    topic_id: String,
    repository: ScanEntryRepository,
    cancel: CancellationToken,
}

impl<B: MessageBus + 'static> Processor<B> {
    pub fn new(
        bus: B,
        topic_id: String,
        repository: ScanEntryRepository,
        cancel: CancellationToken,
    ) -> Self {
        Processor {
            bus: Arc::new(bus),
            topic_id,
            repository,
            cancel,
        }
    }

    /// Verifies the topic, opens a fresh subscription, and runs the worker
    /// pool to completion (i.e. until the token is cancelled).
    pub async fn run(self) -> Result<(), ProcessorError> {
        if !self.bus.topic_exists(&self.topic_id).await? {
            return Err(ProcessorError::Bus(BusError::TopicMissing(self.topic_id.clone())));
        }

        let subscription_id = format!("scan-ingest-{}", Uuid::new_v4());
        log::info!("creating subscription {subscription_id} on topic {}", self.topic_id);
        let subscription = self
            .bus
            .create_subscription(&subscription_id, &self.topic_id)
            .await?;
        let subscription = Arc::new(Mutex::new(subscription));

        let mut workers = Vec::with_capacity(PROCESSOR_WORKER_COUNT);
        for id in 0..PROCESSOR_WORKER_COUNT {
            let subscription = subscription.clone();
            let repository = self.repository.clone();
            let cancel = self.cancel.clone();
            workers.push(tokio::spawn(async move {
                run_worker(id, subscription, repository, cancel).await
            }));
        }

        for worker in workers {
            if let Err(err) = worker.await {
                log::error!("processor worker panicked: {err}");
            }
        }

        Ok(())
    }
}

async fn run_worker(
    worker_id: usize,
    subscription: Arc<Mutex<Box<dyn crate::bus::Subscription>>>,
    repository: ScanEntryRepository,
    cancel: CancellationToken,
) {
    loop {
        let delivered = tokio::select! {
            message = async {
                let mut subscription = subscription.lock().await;
                subscription.recv().await
            } => message,
            _ = cancel.cancelled() => {
                log::debug!("worker {worker_id} shutting down");
                return;
            }
        };

        let message = match delivered {
            Ok(Some(message)) => message,
            Ok(None) => {
                log::debug!("worker {worker_id}: subscription closed");
                return;
            }
            Err(err) => {
                log::error!("worker {worker_id}: recv failed: {err}");
                continue;
            }
        };

        handle_message(worker_id, &repository, message).await;
    }
}

async fn handle_message(
    worker_id: usize,
    repository: &ScanEntryRepository,
    message: crate::bus::DeliveredMessage,
) {
    let payload = message.payload.clone();
    let scan = match scan::decode(&payload) {
        Ok(scan) => scan,
        Err(err) => {
            log::warn!(
                "worker {worker_id}: poison message ({err}), payload={}",
                truncated(&payload)
            );
            message.ack().await;
            return;
        }
    };

    let updated_on = timestamp_to_naive(scan.timestamp);
    let entry = ScanEntry {
        ip: scan.ip,
        port: scan.port,
        service: scan.service,
        updated_on,
        data: scan.response,
    };

    match repository.add_entry(&entry).await {
        Ok(()) => message.ack().await,
        Err(err) => {
            log::error!("worker {worker_id}: storage failure, nacking: {err}");
            message.nack().await;
        }
    }
}

fn timestamp_to_naive(seconds_since_epoch: i64) -> NaiveDateTime {
    DateTime::<Utc>::from_timestamp(seconds_since_epoch, 0)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).expect("epoch is representable"))
        .naive_utc()
}

fn truncated(payload: &[u8]) -> String {
    const MAX: usize = 200;
    let text = String::from_utf8_lossy(payload);
    if text.len() > MAX {
        format!("{}...", &text[..MAX])
    } else {
        text.into_owned()
    }
}
