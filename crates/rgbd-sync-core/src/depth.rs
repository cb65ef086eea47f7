//! Depth format normalization.
//!
//! Depth sensors publish either 16-bit unsigned millimeters or 32-bit
//! float meters. Everything downstream of this module sees millimeters
//! as `u16`.
//!
//! Meters are converted with round-half-to-even on the exact product
//! `meters * 1000`. Non-finite and negative values become
//! [`NO_DATA`]; values past 65535 mm saturate at `u16::MAX`.

use crate::{error::UnsupportedEncoding, image::DepthImage};
use std::{fmt, str::FromStr};

/// The depth value meaning "no valid measurement at this pixel".
pub const NO_DATA: u16 = 0;

/// The two depth encodings understood by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthEncoding {
    /// `16UC1` (or `mono16`): unsigned 16-bit millimeters.
    Millimeters16,
    /// `32FC1`: 32-bit float meters.
    Meters32,
}

impl DepthEncoding {
    pub fn from_tag(tag: &str) -> Result<Self, UnsupportedEncoding> {
        match tag {
            "16UC1" | "mono16" => Ok(DepthEncoding::Millimeters16),
            "32FC1" => Ok(DepthEncoding::Meters32),
            other => Err(UnsupportedEncoding {
                encoding: other.to_string(),
            }),
        }
    }

    /// The canonical encoding tag.
    pub fn tag(self) -> &'static str {
        match self {
            DepthEncoding::Millimeters16 => "16UC1",
            DepthEncoding::Meters32 => "32FC1",
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            DepthEncoding::Millimeters16 => 2,
            DepthEncoding::Meters32 => 4,
        }
    }
}

impl FromStr for DepthEncoding {
    type Err = UnsupportedEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

impl fmt::Display for DepthEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A decoded depth buffer tagged with its encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedDepth {
    Millimeters(DepthImage<u16>),
    Meters(DepthImage<f32>),
}

impl DecodedDepth {
    pub fn encoding(&self) -> DepthEncoding {
        match self {
            DecodedDepth::Millimeters(_) => DepthEncoding::Millimeters16,
            DecodedDepth::Meters(_) => DepthEncoding::Meters32,
        }
    }

    pub fn normalize(self) -> DepthImage<u16> {
        normalize(self)
    }
}

/// Convert a depth buffer to 16-bit millimeters.
///
/// Millimeter buffers are returned unchanged. Meter buffers are
/// converted pixel by pixel in parallel.
pub fn normalize(depth: DecodedDepth) -> DepthImage<u16> {
    match depth {
        DecodedDepth::Millimeters(image) => image,
        DecodedDepth::Meters(image) => image.par_map(|&meters| meters_to_millimeters(meters)),
    }
}

/// Convert one depth value from meters to millimeters.
pub fn meters_to_millimeters(meters: f32) -> u16 {
    if !meters.is_finite() {
        return NO_DATA;
    }

    // Exact in f64: a 24-bit mantissa times 1000 fits in 53 bits.
    let millimeters = (f64::from(meters) * 1000.0).round_ties_even();

    if millimeters <= 0.0 {
        NO_DATA
    } else if millimeters >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        millimeters as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn meters_image(values: Vec<f32>) -> DecodedDepth {
        let width = values.len() as u32;
        DecodedDepth::Meters(DepthImage::from_vec(width, 1, values).unwrap())
    }

    #[test]
    fn test_encoding_tags() {
        assert_eq!(
            DepthEncoding::from_tag("16UC1"),
            Ok(DepthEncoding::Millimeters16)
        );
        assert_eq!(
            DepthEncoding::from_tag("mono16"),
            Ok(DepthEncoding::Millimeters16)
        );
        assert_eq!(DepthEncoding::from_tag("32FC1"), Ok(DepthEncoding::Meters32));
        assert_eq!("32FC1".parse::<DepthEncoding>(), Ok(DepthEncoding::Meters32));
        assert_eq!(DepthEncoding::Meters32.to_string(), "32FC1");
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let err = DepthEncoding::from_tag("8UC1").unwrap_err();
        assert_eq!(err.encoding, "8UC1");
        assert_eq!(err.to_string(), "unsupported depth encoding '8UC1'");
    }

    #[test]
    fn test_millimeters_pass_through() {
        let pixels = vec![0u16, 1, 500, 2500, 65535];
        let image = DepthImage::from_vec(5, 1, pixels.clone()).unwrap();

        let normalized = normalize(DecodedDepth::Millimeters(image));
        assert_eq!(normalized.as_slice(), pixels.as_slice());
        assert_eq!(normalized.width(), 5);
        assert_eq!(normalized.height(), 1);
    }

    #[test]
    fn test_meters_converted() {
        let normalized = meters_image(vec![2.5, 0.001, 1.0]).normalize();
        assert_eq!(normalized.as_slice(), &[2500, 1, 1000]);
    }

    #[test]
    fn test_non_finite_is_no_data() {
        let normalized =
            meters_image(vec![f32::NAN, f32::INFINITY, f32::NEG_INFINITY]).normalize();
        assert_eq!(normalized.as_slice(), &[NO_DATA, NO_DATA, NO_DATA]);
    }

    #[test]
    fn test_saturates_instead_of_wrapping() {
        let normalized = meters_image(vec![100.0, 65.535, 65.5356, 1.0e30]).normalize();
        assert_eq!(normalized.as_slice(), &[65535, 65535, 65535, 65535]);
    }

    #[test]
    fn test_negative_is_no_data() {
        let normalized = meters_image(vec![-0.5, -1.0e-6, 0.0, -0.0]).normalize();
        assert_eq!(normalized.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_round_half_to_even() {
        // 1/16 m = 62.5 mm and 3/16 m = 187.5 mm are exact in f32.
        assert_eq!(meters_to_millimeters(0.0625), 62);
        assert_eq!(meters_to_millimeters(0.1875), 188);
        // Sub-half fractions round to nearest.
        assert_eq!(meters_to_millimeters(0.0004), 0);
        assert_eq!(meters_to_millimeters(0.0006), 1);
    }

    #[test]
    fn test_conversion_error_bound() {
        let mut rng = rand::rng();
        let values: Vec<f32> = (0..10_000)
            .map(|_| rng.random_range(0.0f32..65.5))
            .collect();

        let normalized = meters_image(values.clone()).normalize();

        for (&meters, &millimeters) in values.iter().zip(normalized.as_slice()) {
            let exact = f64::from(meters) * 1000.0;
            assert!(
                (f64::from(millimeters) - exact).abs() <= 0.5,
                "{meters} m became {millimeters} mm"
            );
        }
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let values: Vec<f32> = (0..4096).map(|i| i as f32 * 0.0137).collect();
        let first = meters_image(values.clone()).normalize();
        let second = meters_image(values).normalize();
        assert_eq!(first, second);
    }
}
