//! Per-triplet pipeline step: decode, normalize, extract.

use crate::{
    camera::CameraIntrinsics,
    decode::FrameDecoder,
    depth::DepthEncoding,
    error::FrameError,
    image::{ColorImage, DepthImage},
    message::{CameraInfo, ImageMessage},
};
use std::time::Duration;

/// A fully decoded RGB-D frame, ready for the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub color: ColorImage,

    /// Depth in millimeters, `0` where there is no data.
    pub depth: DepthImage<u16>,

    pub intrinsics: CameraIntrinsics,

    /// Reference timestamp of the triplet the frame was built from.
    pub timestamp: Duration,
}

impl DecodedFrame {
    pub fn into_parts(self) -> (ColorImage, DepthImage<u16>, CameraIntrinsics) {
        (self.color, self.depth, self.intrinsics)
    }
}

/// Turn one matched color/depth/calibration triplet into a frame.
///
/// Steps run in a fixed order and the first failure wins: color decode,
/// depth tag check, depth decode, normalization, intrinsics extraction.
pub fn build_frame<D>(
    decoder: &D,
    color: &ImageMessage,
    depth: &ImageMessage,
    info: &CameraInfo,
) -> Result<DecodedFrame, FrameError>
where
    D: FrameDecoder + ?Sized,
{
    let color_image = decoder.decode_color(color)?;
    let encoding = DepthEncoding::from_tag(&depth.encoding)?;
    let depth_image = decoder.decode_depth(depth, encoding)?.normalize();
    let intrinsics = CameraIntrinsics::from_camera_info(info)?;

    Ok(DecodedFrame {
        color: color_image,
        depth: depth_image,
        intrinsics,
        timestamp: color.header.stamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decode::BridgeDecoder,
        error::{CalibrationError, DecodeError},
        message::Header,
    };

    fn header(ms: u64) -> Header {
        Header::new(Duration::from_millis(ms), "camera")
    }

    fn color(ms: u64) -> ImageMessage {
        ImageMessage::new(header(ms), 1, 1, "rgb8", 3, vec![1u8, 2, 3])
    }

    fn depth_f32(ms: u64, meters: f32) -> ImageMessage {
        ImageMessage::new(header(ms), 1, 1, "32FC1", 4, meters.to_le_bytes().to_vec())
    }

    fn info(ms: u64) -> CameraInfo {
        CameraInfo {
            header: header(ms),
            k: vec![525.0, 0.0, 319.5, 0.0, 525.0, 239.5, 0.0, 0.0, 1.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_build_frame() {
        let frame = build_frame(&BridgeDecoder, &color(100), &depth_f32(102, 2.5), &info(99))
            .unwrap();

        assert_eq!(frame.timestamp, Duration::from_millis(100));
        assert_eq!(frame.color.as_bytes(), &[3, 2, 1]);
        assert_eq!(frame.depth.as_slice(), &[2500]);
        assert_eq!(frame.intrinsics.fx(), 525.0);

        let (color, depth, intrinsics) = frame.into_parts();
        assert_eq!(color.width(), 1);
        assert_eq!(depth.height(), 1);
        assert_eq!(intrinsics.cy(), 239.5);
    }

    #[test]
    fn test_unsupported_depth_encoding() {
        let depth = ImageMessage::new(header(100), 1, 1, "8UC1", 1, vec![0u8]);
        let err = build_frame(&BridgeDecoder, &color(100), &depth, &info(100)).unwrap_err();
        assert!(matches!(err, FrameError::UnsupportedEncoding(_)));
    }

    #[test]
    fn test_decode_error() {
        let depth = ImageMessage::new(header(100), 2, 2, "16UC1", 4, vec![0u8; 3]);
        let err = build_frame(&BridgeDecoder, &color(100), &depth, &info(100)).unwrap_err();
        assert!(matches!(err, FrameError::Decode(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_invalid_calibration() {
        let err = build_frame(
            &BridgeDecoder,
            &color(100),
            &depth_f32(100, 1.0),
            &CameraInfo::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidCalibration(CalibrationError::MissingField { .. })
        ));
    }
}
