//! The dispatch runtime: one worker thread running the whole
//! synchronize, decode and deliver pipeline.
//!
//! Transports push into private per-stream delivery queues through
//! their [MessageSink]s. Each queue holds at most `queue_size` messages;
//! when a slow consumer lets one fill up, the oldest queued message of
//! that stream is dropped. The worker pops one message at a time, feeds
//! the [Synchronizer] and, for every triplet that comes out, builds a
//! frame and calls the consumer's callback. Everything after the enqueue
//! runs on the worker, strictly in order.
//!
//! Dropping the runtime (or calling
//! [shutdown](DispatchRuntime::shutdown)) releases the subscriptions,
//! discards whatever is still queued and joins the worker. A message
//! already mid-pipeline runs to completion first.

use crate::{
    camera::CameraIntrinsics,
    config::SubscriptionOptions,
    decode::FrameDecoder,
    depth::DepthEncoding,
    error::FrameError,
    frame::build_frame,
    image::{ColorImage, DepthImage},
    message::SensorMessage,
    synchronizer::{SyncStats, Synchronizer},
    transport::{ChannelSpec, MessageSink, Transport},
    types::{MatchedTriplet, StreamKind},
};
use eyre::{Result, WrapErr, bail};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// A request on the worker's control channel.
#[derive(Debug)]
enum Envelope {
    /// Reply with a stats snapshot once everything queued before has
    /// been processed.
    Flush(flume::Sender<RuntimeStats>),
    Shutdown,
}

/// The bounded delivery queue of one stream.
///
/// Both ends are shared: sinks push, the worker pops, and a push into a
/// full queue pops the oldest message itself.
#[derive(Debug, Clone)]
pub(crate) struct DeliveryQueue {
    tx: flume::Sender<SensorMessage>,
    rx: flume::Receiver<SensorMessage>,
    dropped: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl DeliveryQueue {
    pub(crate) fn bounded(capacity: usize, closed: Arc<AtomicBool>) -> Self {
        let (tx, rx) = flume::bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
            closed,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Enqueue a message, dropping the oldest queued ones while the
    /// queue is full. Returns the number of dropped messages.
    pub(crate) fn push(&self, mut msg: SensorMessage) -> usize {
        let mut dropped = 0;

        loop {
            match self.tx.try_send(msg) {
                Ok(()) => break,
                Err(flume::TrySendError::Full(rejected)) => {
                    msg = rejected;
                    if self.rx.try_recv().is_ok() {
                        dropped += 1;
                    }
                }
                // Unreachable while this queue holds a receiver.
                Err(flume::TrySendError::Disconnected(_)) => {
                    dropped += 1;
                    break;
                }
            }
        }

        self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        dropped
    }

    pub(crate) fn pop(&self) -> Option<SensorMessage> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Counters kept by the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Messages taken off the queue and processed.
    pub delivered: u64,

    /// Frames handed to the callback.
    pub frames_delivered: u64,

    /// Triplets dropped because color or depth bytes were malformed.
    pub decode_errors: u64,

    /// Depth messages dropped for an unknown encoding tag.
    pub unsupported_encoding: u64,

    /// Triplets dropped because the calibration record was unusable.
    pub invalid_calibration: u64,

    /// Queued messages discarded at shutdown.
    pub discarded: u64,

    /// Messages dropped at intake because their stream's delivery queue
    /// was full.
    pub dropped: u64,

    /// Synchronizer counters.
    pub sync: SyncStats,
}

/// Owns the subscriptions and the worker thread of one RGB-D pipeline.
///
/// # Example
///
/// ```
/// use rgbd_sync_core::{BridgeDecoder, DispatchRuntime, LoopbackTransport, SubscriptionOptions};
///
/// # fn main() -> eyre::Result<()> {
/// let transport = LoopbackTransport::new();
/// let options = SubscriptionOptions::default();
///
/// let runtime = DispatchRuntime::new(&transport, &options, BridgeDecoder, |color, depth, k| {
///     println!("{}x{} frame, fx = {}", color.width(), depth.height(), k.fx());
/// })?;
/// assert!(transport.is_subscribed(&options.depth_topic));
///
/// let stats = runtime.shutdown()?;
/// assert_eq!(stats.frames_delivered, 0);
/// # Ok(())
/// # }
/// ```
pub struct DispatchRuntime<S> {
    /// Subscriptions (kept alive).
    subscriptions: Vec<S>,
    control: flume::Sender<Envelope>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<RuntimeStats>>,
}

impl<S> DispatchRuntime<S>
where
    S: Send + 'static,
{
    /// Start the worker and subscribe to the color, depth and
    /// calibration topics.
    ///
    /// If any subscription fails, the ones already made are released,
    /// the worker is joined and the error is returned.
    pub fn new<T, D, F>(
        transport: &T,
        options: &SubscriptionOptions,
        decoder: D,
        callback: F,
    ) -> Result<Self>
    where
        T: Transport<Subscription = S>,
        D: FrameDecoder,
        F: FnMut(ColorImage, DepthImage<u16>, CameraIntrinsics) + Send + 'static,
    {
        options.validate()?;

        let cancelled = Arc::new(AtomicBool::new(false));
        let queues: [DeliveryQueue; 3] = std::array::from_fn(|_| {
            DeliveryQueue::bounded(options.queue_size, cancelled.clone())
        });

        let worker = Worker {
            synchronizer: Synchronizer::new(options.sync_config())?,
            decoder,
            callback,
            queues: queues.clone(),
            cancelled: cancelled.clone(),
            stats: RuntimeStats::default(),
        };

        let (control, control_rx) = flume::unbounded();

        let handle = thread::Builder::new()
            .name("rgbd-sync".to_string())
            .spawn(move || worker.run(control_rx))
            .wrap_err("Failed to spawn dispatch worker thread")?;

        let mut runtime = Self {
            subscriptions: Vec::with_capacity(StreamKind::ALL.len()),
            control,
            cancelled,
            worker: Some(handle),
        };

        for kind in StreamKind::ALL {
            let spec = ChannelSpec {
                kind,
                topic: options.topic(kind).to_string(),
                queue_size: options.queue_size,
                hints: options.hints.clone(),
            };
            let sink = MessageSink::new(kind, &spec.topic, queues[kind.index()].clone());

            // On failure `runtime` is dropped, which tears everything down.
            let subscription = transport
                .subscribe(&spec, sink)
                .wrap_err_with(|| format!("Failed to subscribe to {} topic {}", kind, spec.topic))?;
            runtime.subscriptions.push(subscription);
        }

        info!(
            color_topic = %options.color_topic,
            depth_topic = %options.depth_topic,
            camera_info_topic = %options.camera_info_topic,
            tolerance = ?options.tolerance,
            queue_size = options.queue_size,
            "Dispatch runtime started"
        );

        Ok(runtime)
    }
}

impl<S> DispatchRuntime<S> {
    /// Wait until every message queued so far has been processed, then
    /// return the current counters.
    pub fn flush(&self) -> Result<RuntimeStats> {
        let (reply_tx, reply_rx) = flume::bounded(1);

        if self.control.send(Envelope::Flush(reply_tx)).is_err() {
            bail!("Dispatch worker has stopped");
        }
        reply_rx
            .recv()
            .wrap_err("Dispatch worker stopped before the flush completed")
    }

    /// Returns `false` once the worker has exited, e.g. after a panic in
    /// the callback.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Tear down the runtime and return the final counters.
    ///
    /// Fails if the worker panicked.
    pub fn shutdown(mut self) -> Result<RuntimeStats> {
        match self.stop() {
            Some(Ok(stats)) => Ok(stats),
            Some(Err(_)) => bail!("Dispatch worker panicked"),
            None => bail!("Dispatch runtime was already stopped"),
        }
    }

    fn stop(&mut self) -> Option<thread::Result<RuntimeStats>> {
        let worker = self.worker.take()?;

        self.subscriptions.clear();
        self.cancelled.store(true, Ordering::Release);
        // Fails only if the worker is already gone.
        let _ = self.control.send(Envelope::Shutdown);

        Some(worker.join())
    }
}

impl<S> Drop for DispatchRuntime<S> {
    fn drop(&mut self) {
        if let Some(Err(_)) = self.stop() {
            error!("Dispatch worker panicked");
        }
    }
}

/// What woke the worker up.
enum Event {
    Data(SensorMessage),
    Control(Envelope),
    Timeout,
    Disconnected,
}

struct Worker<D, F> {
    synchronizer: Synchronizer<SensorMessage>,
    decoder: D,
    callback: F,
    queues: [DeliveryQueue; 3],
    cancelled: Arc<AtomicBool>,
    stats: RuntimeStats,
}

impl<D, F> Worker<D, F>
where
    D: FrameDecoder,
    F: FnMut(ColorImage, DepthImage<u16>, CameraIntrinsics),
{
    fn run(mut self, control: flume::Receiver<Envelope>) -> RuntimeStats {
        debug!("Dispatch worker started");
        let mut last_stats_log = Instant::now();

        loop {
            let timeout = STATS_LOG_INTERVAL.saturating_sub(last_stats_log.elapsed());
            let event = self.next_event(&control, timeout);

            if self.cancelled.load(Ordering::Acquire) {
                if let Event::Data(_) = event {
                    self.stats.discarded += 1;
                }
                break;
            }

            match event {
                Event::Data(msg) => self.handle(msg),
                Event::Control(Envelope::Flush(reply)) => {
                    self.drain_queues();
                    let _ = reply.send(self.snapshot());
                }
                Event::Control(Envelope::Shutdown) | Event::Disconnected => break,
                Event::Timeout => {}
            }

            if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                self.log_stats();
                last_stats_log = Instant::now();
            }
        }

        let discarded: usize = self
            .queues
            .iter()
            .map(|queue| std::iter::from_fn(|| queue.pop()).count())
            .sum();
        self.stats.discarded += discarded as u64;

        info!("Dispatch worker stopped");
        self.log_stats();

        self.snapshot()
    }

    /// Block until a message, a control request or the timeout arrives.
    fn next_event(&self, control: &flume::Receiver<Envelope>, timeout: Duration) -> Event {
        let selector = flume::Selector::new()
            .recv(control, |envelope| envelope.map_or(Event::Disconnected, Event::Control));

        self.queues
            .iter()
            .fold(selector, |selector, queue| {
                selector.recv(&queue.rx, |msg| msg.map_or(Event::Disconnected, Event::Data))
            })
            .wait_timeout(timeout)
            .unwrap_or(Event::Timeout)
    }

    /// Process every queued message, taking one per stream in turn.
    fn drain_queues(&mut self) {
        loop {
            let batch: Vec<_> = self.queues.iter().filter_map(DeliveryQueue::pop).collect();
            if batch.is_empty() {
                break;
            }
            for msg in batch {
                self.handle(msg);
            }
        }
    }

    fn handle(&mut self, msg: SensorMessage) {
        self.stats.delivered += 1;
        let kind = msg.kind();

        if let SensorMessage::Depth(image) = &msg
            && let Err(err) = DepthEncoding::from_tag(&image.encoding)
        {
            self.stats.unsupported_encoding += 1;
            warn!(
                stream = %kind,
                timestamp = ?image.header.stamp,
                encoding = %err.encoding,
                "Dropped depth message with unsupported encoding"
            );
            return;
        }

        if let Some(triplet) = self.synchronizer.ingest(kind, msg) {
            self.dispatch(triplet);
        }
    }

    fn dispatch(&mut self, triplet: MatchedTriplet<SensorMessage>) {
        let reference = triplet.reference_timestamp();
        let MatchedTriplet {
            color: SensorMessage::Color(color),
            depth: SensorMessage::Depth(depth),
            calibration: SensorMessage::Calibration(info),
        } = triplet
        else {
            error!(reference_ts = ?reference, "Matched triplet has mismatched streams");
            return;
        };

        match build_frame(&self.decoder, &color, &depth, &info) {
            Ok(frame) => {
                self.stats.frames_delivered += 1;
                debug!(
                    reference_ts = ?reference,
                    width = frame.color.width(),
                    height = frame.color.height(),
                    "Delivering frame"
                );
                let (color, depth, intrinsics) = frame.into_parts();
                (self.callback)(color, depth, intrinsics);
            }
            Err(err) => {
                match &err {
                    FrameError::Decode(_) => self.stats.decode_errors += 1,
                    FrameError::UnsupportedEncoding(_) => self.stats.unsupported_encoding += 1,
                    FrameError::InvalidCalibration(_) => self.stats.invalid_calibration += 1,
                }
                warn!(
                    reference_ts = ?reference,
                    color_encoding = %color.encoding,
                    depth_encoding = %depth.encoding,
                    error = %err,
                    "Dropped frame"
                );
            }
        }
    }

    fn snapshot(&self) -> RuntimeStats {
        RuntimeStats {
            dropped: self.queues.iter().map(DeliveryQueue::dropped).sum(),
            sync: self.synchronizer.stats(),
            ..self.stats.clone()
        }
    }

    fn log_stats(&self) {
        let sync = self.synchronizer.stats();
        info!(
            delivered = self.stats.delivered,
            frames_delivered = self.stats.frames_delivered,
            decode_errors = self.stats.decode_errors,
            unsupported_encoding = self.stats.unsupported_encoding,
            invalid_calibration = self.stats.invalid_calibration,
            discarded = self.stats.discarded,
            dropped = self.queues.iter().map(DeliveryQueue::dropped).sum::<u64>(),
            queued = self.queues.iter().map(DeliveryQueue::len).sum::<usize>(),
            triplets_emitted = sync.triplets_emitted,
            late_rejected = sync.late_rejected,
            evicted = sync.evicted,
            superseded = sync.superseded,
            buffer_sizes = ?sync.buffer_sizes,
            "Dispatch statistics"
        );
    }
}

impl<D, F> Drop for Worker<D, F> {
    fn drop(&mut self) {
        // Runs on panic too, so sinks stop accepting messages.
        self.cancelled.store(true, Ordering::Release);
    }
}
