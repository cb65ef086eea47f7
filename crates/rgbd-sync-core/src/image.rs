//! Decoded pixel buffers.

use rayon::prelude::*;

/// An 8-bit-per-channel image with interleaved BGR pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl ColorImage {
    pub const CHANNELS: usize = 3;

    /// Wrap BGR bytes. Returns `None` unless `data` holds exactly
    /// `width * height * 3` bytes.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(Self::CHANNELS)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved BGR bytes in row-major order.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// The `[b, g, r]` value of a pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * Self::CHANNELS;
        let px = self.data.get(offset..offset + Self::CHANNELS)?;
        Some([px[0], px[1], px[2]])
    }
}

/// A single-channel depth image.
///
/// After normalization the pixel type is `u16` in millimeters, with `0`
/// meaning "no data".
#[derive(Debug, Clone, PartialEq)]
pub struct DepthImage<T> {
    width: u32,
    height: u32,
    data: Vec<T>,
}

impl<T> DepthImage<T> {
    /// Wrap row-major pixels. Returns `None` unless `data` holds exactly
    /// `width * height` pixels.
    pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Option<Self> {
        let expected = (width as usize).checked_mul(height as usize)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get(y as usize * self.width as usize + x as usize)
    }
}

impl<T> DepthImage<T>
where
    T: Sync,
{
    /// Apply `f` to every pixel in parallel, keeping the layout.
    pub fn par_map<U, F>(&self, f: F) -> DepthImage<U>
    where
        U: Send,
        F: Fn(&T) -> U + Sync + Send,
    {
        DepthImage {
            width: self.width,
            height: self.height,
            data: self.data.par_iter().map(f).collect(),
        }
    }
}
