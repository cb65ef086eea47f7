use rgbd_sync_core::{
    BridgeDecoder, CameraInfo, CameraIntrinsics, ColorImage, DepthImage, DispatchRuntime, Header,
    ImageMessage, LoopbackSubscription, LoopbackTransport, MatchedTriplet, StreamKind,
    SubscriptionOptions, WithTimestamp,
};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub timestamp: Duration,
    pub data: String,
}

impl TestMessage {
    pub fn new(timestamp_ms: u64, data: &str) -> Self {
        Self {
            timestamp: Duration::from_millis(timestamp_ms),
            data: data.to_string(),
        }
    }
}

impl WithTimestamp for TestMessage {
    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

pub fn create_message(timestamp_ms: u64) -> TestMessage {
    TestMessage::new(timestamp_ms, &format!("msg_{}", timestamp_ms))
}

/// StreamBuilder for creating interleaved three-stream inputs
#[derive(Default)]
pub struct StreamBuilder {
    messages: Vec<(StreamKind, TestMessage)>,
}

#[allow(dead_code)]
impl StreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(mut self, kind: StreamKind, timestamp_ms: u64) -> Self {
        self.messages.push((kind, create_message(timestamp_ms)));
        self
    }

    pub fn add_messages(mut self, kind: StreamKind, timestamps_ms: &[u64]) -> Self {
        for &ts in timestamps_ms {
            self.messages.push((kind, create_message(ts)));
        }
        self
    }

    pub fn build(self) -> Vec<(StreamKind, TestMessage)> {
        self.messages
    }
}

/// Assert that every triplet fits within the tolerance window
#[allow(dead_code)]
pub fn assert_triplets_valid<T: WithTimestamp>(triplets: &[MatchedTriplet<T>], tolerance: Duration) {
    for triplet in triplets {
        let timestamps = triplet.timestamps();
        let min_ts = timestamps.iter().min().unwrap();
        let max_ts = timestamps.iter().max().unwrap();

        assert!(
            *max_ts - *min_ts <= tolerance,
            "Triplet exceeds tolerance: min={:?}, max={:?}, tolerance={:?}",
            min_ts,
            max_ts,
            tolerance
        );
    }
}

/// Assert that triplets are emitted in reference timestamp order
#[allow(dead_code)]
pub fn assert_timestamp_ordering<T: WithTimestamp>(triplets: &[MatchedTriplet<T>]) {
    let mut prev_ts: Option<Duration> = None;

    for triplet in triplets {
        let ts = triplet.reference_timestamp();

        if let Some(prev) = prev_ts {
            assert!(
                ts >= prev,
                "Triplets not in timestamp order: prev={:?}, current={:?}",
                prev,
                ts
            );
        }

        prev_ts = Some(ts);
    }
}

pub fn header(timestamp_ms: u64) -> Header {
    Header::new(
        Duration::from_millis(timestamp_ms),
        "camera_rgb_optical_frame",
    )
}

/// A 2x2 bgr8 image whose first pixel encodes the timestamp.
#[allow(dead_code)]
pub fn color_image(timestamp_ms: u64) -> ImageMessage {
    let mut data = vec![0u8; 12];
    data[0] = (timestamp_ms % 256) as u8;
    ImageMessage::new(header(timestamp_ms), 2, 2, "bgr8", 6, data)
}

/// A 2x2 16UC1 image filled with `millimeters`.
#[allow(dead_code)]
pub fn depth_mm(timestamp_ms: u64, millimeters: u16) -> ImageMessage {
    let data: Vec<u8> = std::iter::repeat_n(millimeters.to_le_bytes(), 4)
        .flatten()
        .collect();
    ImageMessage::new(header(timestamp_ms), 2, 2, "16UC1", 4, data)
}

/// A 32FC1 image with one row holding `meters`.
#[allow(dead_code)]
pub fn depth_meters(timestamp_ms: u64, meters: &[f32]) -> ImageMessage {
    let data: Vec<u8> = meters.iter().flat_map(|m| m.to_le_bytes()).collect();
    let width = meters.len() as u32;
    ImageMessage::new(header(timestamp_ms), width, 1, "32FC1", width * 4, data)
}

#[allow(dead_code)]
pub fn depth_with_encoding(timestamp_ms: u64, encoding: &str) -> ImageMessage {
    ImageMessage::new(header(timestamp_ms), 2, 2, encoding, 2, vec![0u8; 4])
}

#[allow(dead_code)]
pub fn camera_info(timestamp_ms: u64) -> CameraInfo {
    CameraInfo {
        header: header(timestamp_ms),
        height: 2,
        width: 2,
        distortion_model: "plumb_bob".to_string(),
        d: vec![0.0; 5],
        k: vec![525.0, 0.0, 319.5, 0.0, 525.0, 239.5, 0.0, 0.0, 1.0],
        r: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        p: vec![
            525.0, 0.0, 319.5, 0.0, 0.0, 525.0, 239.5, 0.0, 0.0, 0.0, 1.0, 0.0,
        ],
        ..Default::default()
    }
}

pub type Frame = (ColorImage, DepthImage<u16>, CameraIntrinsics);

/// Start a runtime on a loopback transport whose frames land in a
/// channel.
#[allow(dead_code)]
pub fn start_runtime(
    transport: &LoopbackTransport,
    options: &SubscriptionOptions,
) -> (
    DispatchRuntime<LoopbackSubscription>,
    flume::Receiver<Frame>,
) {
    let (frame_tx, frame_rx) = flume::unbounded();
    let runtime = DispatchRuntime::new(transport, options, BridgeDecoder, move |c, d, k| {
        let _ = frame_tx.send((c, d, k));
    })
    .unwrap();
    (runtime, frame_rx)
}

/// Options with a custom tolerance
#[allow(dead_code)]
pub fn options_with_tolerance(tolerance_ms: u64) -> SubscriptionOptions {
    SubscriptionOptions {
        tolerance: Duration::from_millis(tolerance_ms),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn recv_frame(frame_rx: &flume::Receiver<Frame>) -> Frame {
    frame_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("no frame within 5s")
}
