//! Subscription intake.
//!
//! A [`Transport`] creates one subscription per input stream. Each
//! subscription receives a [`MessageSink`] and pushes every delivered
//! message into it. The sink only enqueues into its stream's bounded
//! delivery queue, dropping the oldest queued message when the queue is
//! full; the synchronization and decode pipeline never runs on the
//! transport's thread.
//!
//! # Example
//!
//! ```ignore
//! impl Transport for MyMiddleware {
//!     type Subscription = MyHandle;
//!
//!     fn subscribe(&self, spec: &ChannelSpec, sink: MessageSink) -> eyre::Result<MyHandle> {
//!         let handle = self.node.subscribe(&spec.topic, spec.queue_size, move |msg| {
//!             sink.deliver(convert(msg));
//!         })?;
//!         Ok(handle)
//!     }
//! }
//! ```

mod loopback;

pub use loopback::{LoopbackSubscription, LoopbackTransport};

use crate::{
    config::TransportHints, message::Payload, runtime::DeliveryQueue, types::StreamKind,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything a transport needs to open one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSpec {
    /// The stream the subscription feeds.
    pub kind: StreamKind,

    /// Topic name.
    pub topic: String,

    /// Requested queue depth.
    pub queue_size: usize,

    /// Opaque hints, passed through unchanged.
    pub hints: TransportHints,
}

/// A message source for a [DispatchRuntime](crate::DispatchRuntime).
pub trait Transport {
    /// Handle that keeps the subscription alive. Dropping it must stop
    /// delivery.
    type Subscription: Send + 'static;

    fn subscribe(&self, spec: &ChannelSpec, sink: MessageSink) -> eyre::Result<Self::Subscription>;
}

/// Enqueues messages of one stream into a runtime's delivery queue.
///
/// Sinks are cheap to clone and safe to call from any thread.
#[derive(Debug, Clone)]
pub struct MessageSink {
    kind: StreamKind,
    topic: Arc<str>,
    queue: DeliveryQueue,
}

impl MessageSink {
    pub(crate) fn new(kind: StreamKind, topic: &str, queue: DeliveryQueue) -> Self {
        Self {
            kind,
            topic: topic.into(),
            queue,
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueue one message.
    ///
    /// Returns `false` if the payload does not fit the stream or the
    /// runtime has shut down. The message is dropped in both cases.
    ///
    /// A full queue never blocks the caller: the oldest queued message of
    /// the stream is dropped to make room.
    pub fn deliver(&self, payload: impl Into<Payload>) -> bool {
        let msg = match payload.into().into_sensor_message(self.kind) {
            Ok(msg) => msg,
            Err(payload) => {
                warn!(
                    stream = %self.kind,
                    topic = %self.topic,
                    timestamp = ?payload.timestamp(),
                    "Dropped payload of the wrong type for this stream"
                );
                return false;
            }
        };

        if self.queue.is_closed() {
            debug!(
                stream = %self.kind,
                topic = %self.topic,
                "Dropped message delivered after shutdown"
            );
            return false;
        }

        let dropped = self.queue.push(msg);
        if dropped > 0 {
            debug!(
                stream = %self.kind,
                topic = %self.topic,
                dropped,
                "Delivery queue full, dropped oldest message"
            );
        }

        true
    }
}
