//! This library pairs up color images, depth images and camera
//! calibration records that were captured at nearly the same time, and
//! turns each matched triplet into a decoded RGB-D frame with depth in
//! millimeters.
//!
//! The building blocks can be used on their own:
//!
//! - [Synchronizer] does approximate-time matching over three bounded
//!   buffers, and [sync()] wraps it around an async stream.
//! - [normalize] converts float-meter depth to 16-bit millimeters.
//! - [CameraIntrinsics] extracts the pinhole matrix from a
//!   [CameraInfo].
//!
//! [DispatchRuntime] ties them together behind a [Transport] and a
//! callback, on one dedicated worker thread.
//!
//! # Usage
//!
//! ```rust
//! use rgbd_sync_core::{
//!     BridgeDecoder, CameraInfo, DispatchRuntime, Header, ImageMessage, LoopbackTransport,
//!     SubscriptionOptions,
//! };
//! use std::time::Duration;
//!
//! # fn main() -> eyre::Result<()> {
//! let transport = LoopbackTransport::new();
//! let options = SubscriptionOptions::from_yaml("tolerance: 5ms")?;
//!
//! let (frame_tx, frame_rx) = flume::unbounded();
//! let runtime = DispatchRuntime::new(&transport, &options, BridgeDecoder, move |color, depth, k| {
//!     let _ = frame_tx.send((color, depth, k));
//! })?;
//!
//! let stamp = |ms| Header::new(Duration::from_millis(ms), "camera_rgb_optical_frame");
//! let color = ImageMessage::new(stamp(100), 1, 1, "bgr8", 3, vec![0u8, 0, 255]);
//! let depth = ImageMessage::new(stamp(102), 1, 1, "16UC1", 2, 1500u16.to_le_bytes().to_vec());
//! let info = CameraInfo {
//!     header: stamp(99),
//!     k: vec![525.0, 0.0, 319.5, 0.0, 525.0, 239.5, 0.0, 0.0, 1.0],
//!     ..Default::default()
//! };
//!
//! transport.publish(&options.color_topic, color);
//! transport.publish(&options.depth_topic, depth);
//! transport.publish(&options.camera_info_topic, info);
//!
//! let (color, depth, intrinsics) = frame_rx.recv_timeout(Duration::from_secs(5))?;
//! assert_eq!(color.pixel(0, 0), Some([0, 0, 255]));
//! assert_eq!(depth.as_slice(), &[1500]);
//! assert_eq!(intrinsics.fx(), 525.0);
//!
//! let stats = runtime.shutdown()?;
//! assert_eq!(stats.frames_delivered, 1);
//! # Ok(())
//! # }
//! ```

pub mod buffer;
mod camera;
mod config;
pub mod decode;
pub mod depth;
mod error;
mod frame;
mod image;
mod message;
mod runtime;
pub mod synchronizer;
mod sync;
pub mod transport;
mod types;

pub use camera::CameraIntrinsics;
pub use config::{Reliability, SubscriptionOptions, SyncConfig, TransportHints};
pub use decode::{BridgeDecoder, FrameDecoder};
pub use depth::{DecodedDepth, DepthEncoding, NO_DATA, normalize};
pub use error::{CalibrationError, DecodeError, FrameError, UnsupportedEncoding};
pub use frame::{DecodedFrame, build_frame};
pub use image::{ColorImage, DepthImage};
pub use message::{
    CameraInfo, Header, ImageMessage, Payload, RegionOfInterest, SensorMessage,
    ros_time_to_duration,
};
pub use runtime::{DispatchRuntime, RuntimeStats};
pub use sync::sync;
pub use synchronizer::{SyncStats, Synchronizer};
pub use transport::{ChannelSpec, LoopbackSubscription, LoopbackTransport, MessageSink, Transport};
pub use types::*;
