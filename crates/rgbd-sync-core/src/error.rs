//! Error types for the per-frame pipeline.
//!
//! None of these are fatal to a [DispatchRuntime](crate::DispatchRuntime):
//! the offending message or triplet is dropped and the stream goes on.

use thiserror::Error;

/// Malformed color or depth bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Width or height is zero
    #[error("image has zero size ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },

    /// Row stride cannot hold one row of pixels
    #[error("row step {step} is shorter than the {required} bytes of one '{encoding}' row")]
    StepTooSmall {
        encoding: String,
        step: usize,
        required: usize,
    },

    /// Fewer bytes than `step * height`
    #[error("image data has {actual} bytes, expected {expected}")]
    Truncated { expected: usize, actual: usize },

    /// Image dimensions overflow the address space
    #[error("image dimensions {width}x{height} are too large")]
    TooLarge { width: u32, height: u32 },

    /// No conversion from this encoding to bgr8
    #[error("cannot convert '{encoding}' to bgr8")]
    UnsupportedColorEncoding { encoding: String },
}

/// A depth encoding tag that is neither 16-bit millimeters nor 32-bit
/// float meters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported depth encoding '{encoding}'")]
pub struct UnsupportedEncoding {
    pub encoding: String,
}

/// Missing or unusable intrinsic parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalibrationError {
    #[error("calibration field '{field}' has {actual} entries, expected {expected}")]
    MissingField {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("camera is uncalibrated: K and P are all zeros")]
    Uncalibrated,

    #[error("invalid focal length fx={fx}, fy={fy}")]
    InvalidFocalLength { fx: f64, fy: f64 },

    #[error("invalid principal point cx={cx}, cy={cy}")]
    InvalidPrincipalPoint { cx: f64, cy: f64 },
}

/// Why a matched triplet did not become a frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    UnsupportedEncoding(#[from] UnsupportedEncoding),

    #[error("invalid calibration: {0}")]
    InvalidCalibration(#[from] CalibrationError),
}
