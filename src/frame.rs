//! The RGB frame buffer every stage reads and writes.

use crate::error::{TurbResult, TurbulenceError, try_zeroed};

/// Maximum allowed frame dimension (per side).
///
/// A 4096² run with ten frames already holds ~2 GB of noise volumes and
/// another ~2 GB of blur stack in flight per worker thread.
pub const MAX_DIMENSION: u32 = 4096;

/// Dimension guard for frames and noise lattices.
///
/// Returns an error for zero-sized frames or dimensions that exceed
/// [`MAX_DIMENSION`].
#[inline]
pub fn validate_dimensions(width: u32, height: u32) -> TurbResult<()> {
    if width == 0 || height == 0 {
        return Err(TurbulenceError::ZeroDimension { width, height });
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(TurbulenceError::DimensionTooLarge {
            width,
            height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// An RGB image with `f32` channels in `[0, 1]`.
///
/// Pixels are stored row-major and interleaved in **R, G, B** order; this is
/// the order handed to every [`crate::pipeline::FrameSink`].
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<f32>,
}

impl Frame {
    /// A black frame.
    pub fn new(width: u32, height: u32) -> TurbResult<Self> {
        validate_dimensions(width, height)?;
        let pixels = try_zeroed(width as usize * height as usize * 3)?;
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// A frame where every pixel has the colour `rgb`.
    pub fn filled(width: u32, height: u32, rgb: [f32; 3]) -> TurbResult<Self> {
        let mut frame = Self::new(width, height)?;
        for px in frame.pixels.chunks_exact_mut(3) {
            px.copy_from_slice(&rgb);
        }
        Ok(frame)
    }

    /// Wrap an interleaved RGB buffer of length `width * height * 3`.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<f32>) -> TurbResult<Self> {
        validate_dimensions(width, height)?;
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(TurbulenceError::ShapeMismatch {
                what: "frame pixels",
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Decode an interleaved RGB8 buffer into `[0, 1]` channels.
    pub fn from_rgb8(width: u32, height: u32, bytes: &[u8]) -> TurbResult<Self> {
        let pixels = bytes.iter().map(|&b| b as f32 / 255.0).collect();
        Self::from_pixels(width, height, pixels)
    }

    /// Quantise to interleaved RGB8, rounding and saturating each channel.
    pub fn to_rgb8(&self) -> Vec<u8> {
        self.pixels.iter().map(|&c| to_u8(c)).collect()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels (`width * height`).
    #[inline]
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Always `false`: zero-sized frames cannot be constructed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [f32] {
        &mut self.pixels
    }

    /// The RGB triple at `(x, y)`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [f32; 3] {
        let i = (y * self.width as usize + x) * 3;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2]]
    }

    /// A black frame with the same dimensions.
    pub(crate) fn blank_like(&self) -> TurbResult<Self> {
        Self::new(self.width, self.height)
    }
}

/// Map a `[0, 1]` channel value to a byte, rounding to nearest.
#[inline]
pub fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_dimensions() {
        assert!(matches!(
            Frame::new(0, 4),
            Err(TurbulenceError::ZeroDimension { .. })
        ));
        assert!(matches!(
            Frame::new(MAX_DIMENSION + 1, 4),
            Err(TurbulenceError::DimensionTooLarge { .. })
        ));
    }

    #[test]
    fn rgb8_survives_quantisation_exactly() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4 * 4 * 3).collect();
        let frame = Frame::from_rgb8(4, 4, &bytes).unwrap();
        assert_eq!(frame.to_rgb8(), bytes);
    }

    #[test]
    fn from_pixels_checks_length() {
        let err = Frame::from_pixels(2, 2, vec![0.0; 11]).unwrap_err();
        assert!(matches!(
            err,
            TurbulenceError::ShapeMismatch {
                expected: 12,
                got: 11,
                ..
            }
        ));
    }

    #[test]
    fn pixel_reads_interleaved_rgb() {
        let mut frame = Frame::new(3, 2).unwrap();
        let i = (1 * 3 + 2) * 3;
        frame.pixels_mut()[i..i + 3].copy_from_slice(&[0.1, 0.2, 0.3]);
        assert_eq!(frame.pixel(2, 1), [0.1, 0.2, 0.3]);
        assert_eq!(frame.pixel(0, 0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn to_u8_saturates_out_of_range_values() {
        assert_eq!(to_u8(-0.5), 0);
        assert_eq!(to_u8(2.0), 255);
        assert_eq!(to_u8(0.5), 128);
    }
}
