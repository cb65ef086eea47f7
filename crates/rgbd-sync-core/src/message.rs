//! Message types delivered by the transport.
//!
//! The layouts follow `sensor_msgs/Image` and `sensor_msgs/CameraInfo`
//! closely enough that a transport binding can fill them field by
//! field.

use crate::types::{StreamKind, WithTimestamp};
use bytes::Bytes;
use std::time::Duration;

/// Message header carrying the producer-assigned timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    /// Acquisition time as a duration since the epoch.
    pub stamp: Duration,

    /// Coordinate frame the data is expressed in.
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: Duration, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }

    /// Create from a ROS header timestamp.
    pub fn from_ros_time(sec: i32, nanosec: u32, frame_id: impl Into<String>) -> Self {
        Self::new(ros_time_to_duration(sec, nanosec), frame_id)
    }
}

/// Convert ROS time (sec, nanosec) to Duration.
///
/// ROS uses `builtin_interfaces/Time` with:
/// - `sec`: i32 (seconds since epoch, can be negative for pre-1970)
/// - `nanosec`: u32 (nanoseconds component, 0-999999999)
///
/// # Example
///
/// ```
/// use rgbd_sync_core::ros_time_to_duration;
/// use std::time::Duration;
///
/// let duration = ros_time_to_duration(1000, 500_000_000);
/// assert_eq!(duration, Duration::new(1000, 500_000_000));
///
/// // Negative timestamps floor to zero
/// let duration = ros_time_to_duration(-1, 0);
/// assert_eq!(duration, Duration::ZERO);
/// ```
pub fn ros_time_to_duration(sec: i32, nanosec: u32) -> Duration {
    if sec >= 0 {
        Duration::new(sec as u64, nanosec)
    } else {
        Duration::ZERO
    }
}

/// A raw, undecoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub header: Header,

    /// Number of rows.
    pub height: u32,

    /// Number of columns.
    pub width: u32,

    /// Pixel encoding tag, e.g. "bgr8", "16UC1" or "32FC1".
    pub encoding: String,

    /// Byte order of multi-byte pixel values.
    pub is_bigendian: bool,

    /// Length of one row in bytes, including padding.
    pub step: u32,

    /// Pixel data, `step * height` bytes.
    pub data: Bytes,
}

impl ImageMessage {
    /// Create a little-endian image message.
    pub fn new(
        header: Header,
        width: u32,
        height: u32,
        encoding: impl Into<String>,
        step: u32,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            header,
            height,
            width,
            encoding: encoding.into(),
            is_bigendian: false,
            step,
            data: data.into(),
        }
    }

    pub fn with_bigendian(mut self, is_bigendian: bool) -> Self {
        self.is_bigendian = is_bigendian;
        self
    }
}

/// Region of interest within the full sensor resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub x_offset: u32,
    pub y_offset: u32,
    pub height: u32,
    pub width: u32,
    pub do_rectify: bool,
}

/// Calibration record of a pinhole camera.
///
/// Matrices are row-major. A record straight from an uncalibrated
/// driver leaves `k` zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CameraInfo {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub distortion_model: String,

    /// Distortion coefficients.
    pub d: Vec<f64>,

    /// Intrinsic camera matrix, 3x3.
    pub k: Vec<f64>,

    /// Rectification matrix, 3x3.
    pub r: Vec<f64>,

    /// Projection matrix, 3x4.
    pub p: Vec<f64>,

    pub binning_x: u32,
    pub binning_y: u32,
    pub roi: RegionOfInterest,
}

/// A message as delivered on one subscription, before it is tagged
/// with its stream.
#[derive(Debug, Clone)]
pub enum Payload {
    Image(ImageMessage),
    CameraInfo(CameraInfo),
}

impl Payload {
    /// Tag the payload with the stream it was delivered on.
    ///
    /// Returns the payload back if its shape does not fit the stream.
    pub fn into_sensor_message(self, kind: StreamKind) -> Result<SensorMessage, Payload> {
        match (kind, self) {
            (StreamKind::Color, Payload::Image(image)) => Ok(SensorMessage::Color(image)),
            (StreamKind::Depth, Payload::Image(image)) => Ok(SensorMessage::Depth(image)),
            (StreamKind::Calibration, Payload::CameraInfo(info)) => {
                Ok(SensorMessage::Calibration(info))
            }
            (_, payload) => Err(payload),
        }
    }

    pub fn timestamp(&self) -> Duration {
        match self {
            Payload::Image(image) => image.header.stamp,
            Payload::CameraInfo(info) => info.header.stamp,
        }
    }
}

impl From<ImageMessage> for Payload {
    fn from(image: ImageMessage) -> Self {
        Payload::Image(image)
    }
}

impl From<CameraInfo> for Payload {
    fn from(info: CameraInfo) -> Self {
        Payload::CameraInfo(info)
    }
}

/// A message tagged with the stream it belongs to.
#[derive(Debug, Clone)]
pub enum SensorMessage {
    Color(ImageMessage),
    Depth(ImageMessage),
    Calibration(CameraInfo),
}

impl SensorMessage {
    pub fn kind(&self) -> StreamKind {
        match self {
            SensorMessage::Color(_) => StreamKind::Color,
            SensorMessage::Depth(_) => StreamKind::Depth,
            SensorMessage::Calibration(_) => StreamKind::Calibration,
        }
    }

    pub fn as_image(&self) -> Option<&ImageMessage> {
        match self {
            SensorMessage::Color(image) | SensorMessage::Depth(image) => Some(image),
            SensorMessage::Calibration(_) => None,
        }
    }

    pub fn as_camera_info(&self) -> Option<&CameraInfo> {
        match self {
            SensorMessage::Calibration(info) => Some(info),
            _ => None,
        }
    }
}

impl WithTimestamp for SensorMessage {
    fn timestamp(&self) -> Duration {
        match self {
            SensorMessage::Color(image) | SensorMessage::Depth(image) => image.header.stamp,
            SensorMessage::Calibration(info) => info.header.stamp,
        }
    }
}
