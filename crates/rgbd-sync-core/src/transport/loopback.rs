use super::{ChannelSpec, MessageSink, Transport};
use crate::message::Payload;
use eyre::bail;
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};
use tracing::debug;

/// An in-process transport.
///
/// Messages handed to [publish](LoopbackTransport::publish) go straight
/// to the sink subscribed on that topic. Useful for tests, replays and
/// for feeding a runtime from code that already owns the messages.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    sinks: HashMap<String, (u64, MessageSink)>,
    refused: HashSet<String>,
    next_id: u64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make later subscriptions to `topic` fail.
    pub fn refuse(&self, topic: impl Into<String>) {
        self.lock().refused.insert(topic.into());
    }

    /// Deliver a message to the subscriber of `topic`.
    ///
    /// Returns `false` if nobody is subscribed or the subscriber dropped
    /// the message.
    pub fn publish(&self, topic: &str, payload: impl Into<Payload>) -> bool {
        let Some(sink) = self.lock().sinks.get(topic).map(|(_, sink)| sink.clone()) else {
            debug!(topic, "No subscriber for published message");
            return false;
        };
        sink.deliver(payload)
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.lock().sinks.contains_key(topic)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().sinks.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackTransport {
    type Subscription = LoopbackSubscription;

    fn subscribe(&self, spec: &ChannelSpec, sink: MessageSink) -> eyre::Result<Self::Subscription> {
        let mut inner = self.lock();

        if inner.refused.contains(&spec.topic) {
            bail!("Subscription to {} was refused", spec.topic);
        }
        if inner.sinks.contains_key(&spec.topic) {
            bail!("Topic {} already has a subscriber", spec.topic);
        }

        let id = inner.next_id;
        inner.next_id += 1;
        inner.sinks.insert(spec.topic.clone(), (id, sink));

        debug!(
            stream = %spec.kind,
            topic = %spec.topic,
            queue_size = spec.queue_size,
            "Loopback subscription created"
        );

        Ok(LoopbackSubscription {
            inner: Arc::downgrade(&self.inner),
            topic: spec.topic.clone(),
            id,
        })
    }
}

/// Keeps a loopback subscription alive. Dropping it unsubscribes.
#[derive(Debug)]
pub struct LoopbackSubscription {
    inner: Weak<Mutex<Inner>>,
    topic: String,
    id: u64,
}

impl LoopbackSubscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Drop for LoopbackSubscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);

        if inner.sinks.get(&self.topic).is_some_and(|(id, _)| *id == self.id) {
            inner.sinks.remove(&self.topic);
            debug!(topic = %self.topic, "Loopback subscription dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::TransportHints, runtime::DeliveryQueue, types::StreamKind};
    use std::sync::atomic::AtomicBool;

    fn queue() -> DeliveryQueue {
        DeliveryQueue::bounded(10, Arc::new(AtomicBool::new(false)))
    }

    fn spec(topic: &str) -> ChannelSpec {
        ChannelSpec {
            kind: StreamKind::Calibration,
            topic: topic.to_string(),
            queue_size: 10,
            hints: TransportHints::default(),
        }
    }

    #[test]
    fn test_publish_reaches_subscriber() {
        let transport = LoopbackTransport::new();
        let queue = queue();
        let sink = MessageSink::new(StreamKind::Calibration, "/info", queue.clone());

        let _sub = transport.subscribe(&spec("/info"), sink).unwrap();
        assert!(transport.is_subscribed("/info"));
        assert!(transport.publish("/info", crate::message::CameraInfo::default()));
        assert_eq!(queue.pop().map(|msg| msg.kind()), Some(StreamKind::Calibration));

        assert!(!transport.publish("/other", crate::message::CameraInfo::default()));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let transport = LoopbackTransport::new();
        let sink = MessageSink::new(StreamKind::Calibration, "/info", queue());

        let sub = transport.subscribe(&spec("/info"), sink).unwrap();
        assert_eq!(sub.topic(), "/info");
        assert_eq!(transport.subscriber_count(), 1);

        drop(sub);
        assert_eq!(transport.subscriber_count(), 0);
        assert!(!transport.publish("/info", crate::message::CameraInfo::default()));
    }

    #[test]
    fn test_refused_topic() {
        let transport = LoopbackTransport::new();
        transport.refuse("/info");

        let sink = MessageSink::new(StreamKind::Calibration, "/info", queue());
        assert!(transport.subscribe(&spec("/info"), sink).is_err());
        assert!(!transport.is_subscribed("/info"));
    }

    #[test]
    fn test_duplicate_subscription_rejected() {
        let transport = LoopbackTransport::new();
        let queue = queue();

        let _first = transport
            .subscribe(&spec("/info"), MessageSink::new(StreamKind::Calibration, "/info", queue.clone()))
            .unwrap();
        let second =
            transport.subscribe(&spec("/info"), MessageSink::new(StreamKind::Calibration, "/info", queue));
        assert!(second.is_err());
        assert_eq!(transport.subscriber_count(), 1);
    }
}
