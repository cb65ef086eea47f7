//! Conversion of raw image messages into pixel buffers.
//!
//! [`FrameDecoder`] is the seam to whatever codec library the host
//! application already uses. [`BridgeDecoder`] covers the uncompressed
//! encodings published by common RGB-D drivers.

use crate::{
    depth::{DecodedDepth, DepthEncoding},
    error::DecodeError,
    image::{ColorImage, DepthImage},
    message::ImageMessage,
};

/// Decodes color and depth messages into pixel buffers.
pub trait FrameDecoder: Send + 'static {
    /// Decode a color image into 8-bit BGR.
    fn decode_color(&self, msg: &ImageMessage) -> Result<ColorImage, DecodeError>;

    /// Decode a depth image whose tag has already been parsed into
    /// `encoding`.
    fn decode_depth(
        &self,
        msg: &ImageMessage,
        encoding: DepthEncoding,
    ) -> Result<DecodedDepth, DecodeError>;
}

/// Decoder for uncompressed images.
///
/// Color: `bgr8`, `rgb8`, `bgra8`, `rgba8` and `mono8`, converted to
/// BGR. Depth: `16UC1`/`mono16` and `32FC1` in either byte order. Row
/// padding beyond `width * pixel size` is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct BridgeDecoder;

impl BridgeDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorLayout {
    Bgr,
    Rgb,
    Bgra,
    Rgba,
    Mono,
}

impl ColorLayout {
    fn from_tag(tag: &str) -> Option<Self> {
        let layout = match tag {
            "bgr8" | "8UC3" => ColorLayout::Bgr,
            "rgb8" => ColorLayout::Rgb,
            "bgra8" | "8UC4" => ColorLayout::Bgra,
            "rgba8" => ColorLayout::Rgba,
            "mono8" | "8UC1" => ColorLayout::Mono,
            _ => return None,
        };
        Some(layout)
    }

    fn channels(self) -> usize {
        match self {
            ColorLayout::Bgr | ColorLayout::Rgb => 3,
            ColorLayout::Bgra | ColorLayout::Rgba => 4,
            ColorLayout::Mono => 1,
        }
    }

    fn to_bgr(self, px: &[u8]) -> [u8; 3] {
        match self {
            ColorLayout::Bgr | ColorLayout::Bgra => [px[0], px[1], px[2]],
            ColorLayout::Rgb | ColorLayout::Rgba => [px[2], px[1], px[0]],
            ColorLayout::Mono => [px[0], px[0], px[0]],
        }
    }
}

impl FrameDecoder for BridgeDecoder {
    fn decode_color(&self, msg: &ImageMessage) -> Result<ColorImage, DecodeError> {
        let layout = ColorLayout::from_tag(&msg.encoding).ok_or_else(|| {
            DecodeError::UnsupportedColorEncoding {
                encoding: msg.encoding.clone(),
            }
        })?;
        let channels = layout.channels();
        let rows = rows(msg, channels)?;

        let mut data = Vec::with_capacity(msg.width as usize * msg.height as usize * 3);
        for row in rows {
            for px in row.chunks_exact(channels) {
                data.extend_from_slice(&layout.to_bgr(px));
            }
        }

        ColorImage::from_bgr(msg.width, msg.height, data).ok_or(DecodeError::TooLarge {
            width: msg.width,
            height: msg.height,
        })
    }

    fn decode_depth(
        &self,
        msg: &ImageMessage,
        encoding: DepthEncoding,
    ) -> Result<DecodedDepth, DecodeError> {
        let bytes_per_pixel = encoding.bytes_per_pixel();
        let big_endian = msg.is_bigendian;
        let rows = rows(msg, bytes_per_pixel)?;
        let too_large = || DecodeError::TooLarge {
            width: msg.width,
            height: msg.height,
        };

        let depth = match encoding {
            DepthEncoding::Millimeters16 => {
                let pixels = rows
                    .flat_map(|row| row.chunks_exact(2))
                    .map(|b| {
                        let b = [b[0], b[1]];
                        if big_endian {
                            u16::from_be_bytes(b)
                        } else {
                            u16::from_le_bytes(b)
                        }
                    })
                    .collect();
                let image =
                    DepthImage::from_vec(msg.width, msg.height, pixels).ok_or_else(too_large)?;
                DecodedDepth::Millimeters(image)
            }
            DepthEncoding::Meters32 => {
                let pixels = rows
                    .flat_map(|row| row.chunks_exact(4))
                    .map(|b| {
                        let b = [b[0], b[1], b[2], b[3]];
                        if big_endian {
                            f32::from_be_bytes(b)
                        } else {
                            f32::from_le_bytes(b)
                        }
                    })
                    .collect();
                let image =
                    DepthImage::from_vec(msg.width, msg.height, pixels).ok_or_else(too_large)?;
                DecodedDepth::Meters(image)
            }
        };

        Ok(depth)
    }
}

/// Validate the buffer geometry and iterate over the pixel bytes of
/// each row, without padding.
fn rows(
    msg: &ImageMessage,
    bytes_per_pixel: usize,
) -> Result<impl Iterator<Item = &[u8]>, DecodeError> {
    let width = msg.width as usize;
    let height = msg.height as usize;
    let step = msg.step as usize;

    if width == 0 || height == 0 {
        return Err(DecodeError::EmptyImage {
            width: msg.width,
            height: msg.height,
        });
    }

    let too_large = DecodeError::TooLarge {
        width: msg.width,
        height: msg.height,
    };
    let row_bytes = width.checked_mul(bytes_per_pixel).ok_or(too_large.clone())?;
    if step < row_bytes {
        return Err(DecodeError::StepTooSmall {
            encoding: msg.encoding.clone(),
            step,
            required: row_bytes,
        });
    }

    let expected = step.checked_mul(height).ok_or(too_large)?;
    if msg.data.len() < expected {
        return Err(DecodeError::Truncated {
            expected,
            actual: msg.data.len(),
        });
    }

    Ok(msg.data[..expected]
        .chunks_exact(step)
        .map(move |row| &row[..row_bytes]))
}
