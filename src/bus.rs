//! Message bus abstraction.
//!
//! Kept as a small trait surface so the processor never depends on
//! `google-cloud-pubsub` directly, matching the teacher's `Channel` trait in
//! `channel/mod.rs` that abstracts the concrete ActionCable transport away
//! from anything that merely needs to send/receive frames.

use async_trait::async_trait;

use crate::error::BusError;

/// One delivered message: payload bytes plus a consuming ack/nack.
pub struct DeliveredMessage {
    pub payload: Vec<u8>,
    inner: Box<dyn Ackable>,
}

impl DeliveredMessage {
    pub fn new(payload: Vec<u8>, inner: Box<dyn Ackable>) -> Self {
        DeliveredMessage { payload, inner }
    }

    /// Acknowledges successful processing; the message will not be redelivered.
    pub async fn ack(self) {
        self.inner.ack().await;
    }

    /// Signals transient failure; the bus is free to redeliver.
    pub async fn nack(self) {
        self.inner.nack().await;
    }
}

/// Object-safe ack/nack pair backing a [`DeliveredMessage`].
#[async_trait]
pub trait Ackable: Send + Sync {
    async fn ack(self: Box<Self>);
    async fn nack(self: Box<Self>);
}

/// An open subscription's receive side.
#[async_trait]
pub trait Subscription: Send + Sync {
    /// Waits for the next message. Returns `Ok(None)` once the subscription
    /// has been closed or the underlying context cancelled.
    async fn recv(&mut self) -> Result<Option<DeliveredMessage>, BusError>;
}

/// A connected message bus client.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn topic_exists(&self, topic_id: &str) -> Result<bool, BusError>;
    async fn create_subscription(
        &self,
        subscription_id: &str,
        topic_id: &str,
    ) -> Result<Box<dyn Subscription>, BusError>;
}

pub mod pubsub {
    //! Google Cloud Pub/Sub-backed [`MessageBus`].

    use async_trait::async_trait;
    use google_cloud_pubsub::client::{Client, ClientConfig};
    use google_cloud_pubsub::subscription::SubscriptionConfig;

    use super::{Ackable, DeliveredMessage, MessageBus, Subscription};
    use crate::error::BusError;

    pub struct PubsubBus {
        client: Client,
    }

    impl PubsubBus {
        /// Connects to the given GCP project, defaulting to the emulator
        /// when `PUBSUB_EMULATOR_HOST` is set (the usual local-dev path for
        /// this kind of client, same as the original's dev-mode toggle).
        pub async fn connect(project_id: &str) -> Result<Self, BusError> {
            let config = ClientConfig::default()
                .with_auth()
                .await
                .map_err(|err| BusError::Client(err.to_string()))?;
            let client = Client::new(config)
                .await
                .map_err(|err| BusError::Client(err.to_string()))?;
            let _ = project_id;
            Ok(PubsubBus { client })
        }
    }

    #[async_trait]
    impl MessageBus for PubsubBus {
        async fn topic_exists(&self, topic_id: &str) -> Result<bool, BusError> {
            let topic = self.client.topic(topic_id);
            topic
                .exists(None)
                .await
                .map_err(|err| BusError::Client(err.to_string()))
        }

        async fn create_subscription(
            &self,
            subscription_id: &str,
            topic_id: &str,
        ) -> Result<Box<dyn Subscription>, BusError> {
            let topic = self.client.topic(topic_id);
            let subscription = self.client.subscription(subscription_id);
            if !subscription
                .exists(None)
                .await
                .map_err(|err| BusError::Client(err.to_string()))?
            {
                subscription
                    .create(topic.fully_qualified_name(), SubscriptionConfig::default(), None)
                    .await
                    .map_err(|err| BusError::Client(err.to_string()))?;
            }
            Ok(Box::new(PubsubSubscription { subscription }))
        }
    }

    struct PubsubSubscription {
        subscription: google_cloud_pubsub::subscription::Subscription,
    }

    #[async_trait]
    impl Subscription for PubsubSubscription {
        async fn recv(&mut self) -> Result<Option<DeliveredMessage>, BusError> {
            // An empty pull just means nothing was waiting; it is not a
            // closure signal, so retry instead of returning `None` (which
            // the processor treats as "stop this worker for good").
            loop {
                let mut stream = self
                    .subscription
                    .pull(1, None)
                    .await
                    .map_err(|err| BusError::Client(err.to_string()))?;
                if let Some(message) = stream.pop() {
                    let payload = message.message.data.clone();
                    return Ok(Some(DeliveredMessage::new(payload, Box::new(PubsubAck { message }))));
                }
                tokio::time::sleep(crate::constants::PUBSUB_EMPTY_PULL_BACKOFF).await;
            }
        }
    }

    struct PubsubAck {
        message: google_cloud_pubsub::subscriber::ReceivedMessage,
    }

    #[async_trait]
    impl Ackable for PubsubAck {
        async fn ack(self: Box<Self>) {
            if let Err(err) = self.message.ack().await {
                log::warn!("ack failed: {err}");
            }
        }

        async fn nack(self: Box<Self>) {
            if let Err(err) = self.message.nack().await {
                log::warn!("nack failed: {err}");
            }
        }
    }
}

#[cfg(test)]
pub mod fake {
    //! In-memory [`MessageBus`] double driving processor unit tests.

    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{Ackable, DeliveredMessage, MessageBus, Subscription};
    use crate::error::BusError;

    #[derive(Clone)]
    pub struct FakeBus {
        pub existing_topics: Arc<Mutex<Vec<String>>>,
        pub queue: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub acked: Arc<Mutex<Vec<Vec<u8>>>>,
        pub nacked: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FakeBus {
        pub fn new(topic: &str, messages: Vec<Vec<u8>>) -> Self {
            FakeBus {
                existing_topics: Arc::new(Mutex::new(vec![topic.to_string()])),
                queue: Arc::new(Mutex::new(messages.into())),
                acked: Arc::new(Mutex::new(Vec::new())),
                nacked: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl MessageBus for FakeBus {
        async fn topic_exists(&self, topic_id: &str) -> Result<bool, BusError> {
            Ok(self.existing_topics.lock().await.iter().any(|t| t == topic_id))
        }

        async fn create_subscription(
            &self,
            _subscription_id: &str,
            _topic_id: &str,
        ) -> Result<Box<dyn Subscription>, BusError> {
            Ok(Box::new(FakeSubscription { bus: self.clone() }))
        }
    }

    struct FakeSubscription {
        bus: FakeBus,
    }

    #[async_trait]
    impl Subscription for FakeSubscription {
        async fn recv(&mut self) -> Result<Option<DeliveredMessage>, BusError> {
            let payload = self.bus.queue.lock().await.pop_front();
            Ok(payload.map(|payload| {
                DeliveredMessage::new(
                    payload.clone(),
                    Box::new(FakeAck {
                        bus: self.bus.clone(),
                        payload,
                    }),
                )
            }))
        }
    }

    struct FakeAck {
        bus: FakeBus,
        payload: Vec<u8>,
    }

    #[async_trait]
    impl Ackable for FakeAck {
        async fn ack(self: Box<Self>) {
            self.bus.acked.lock().await.push(self.payload);
        }

        async fn nack(self: Box<Self>) {
            self.bus.nacked.lock().await.push(self.payload);
        }
    }
}
