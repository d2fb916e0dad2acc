//! 3-D coherent-noise lattices.
//!
//! A [`NoiseField`] holds one real value per lattice point `(x, y, z)`, where
//! `x`/`y` are pixel columns/rows and `z` is the frame index.  Values are
//! produced by sampling a 3-D noise function at
//!
//!   nx = x · frequency + rx
//!   ny = y · frequency + ry
//!   nz = z · frequency · temporal_scale
//!
//! `(rx, ry)` is a [`RandomOffset`]; shifting the lattice origin far apart in
//! noise space decorrelates fields drawn from the same underlying function.
//! No normalisation happens here: values keep the native range of the noise
//! function (roughly `[-1, 1]`).

use noise::NoiseFn;
use rand::Rng;
use rayon::prelude::*;

use crate::error::{TurbResult, TurbulenceError, try_zeroed};
use crate::frame::validate_dimensions;

/// Exclusive upper bound of the uniform offset draw.
pub const OFFSET_RANGE: u32 = 500_000;

/// Lattice-origin shift for one sampled field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomOffset {
    pub x: u32,
    pub y: u32,
}

impl RandomOffset {
    /// Draw both components uniformly from `[0, OFFSET_RANGE)`.
    pub fn draw<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            x: rng.random_range(0..OFFSET_RANGE),
            y: rng.random_range(0..OFFSET_RANGE),
        }
    }

    /// No shift.
    pub const ZERO: Self = Self { x: 0, y: 0 };
}

/// Extent of a noise lattice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatticeDims {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl LatticeDims {
    /// Reject lattices with an empty axis before anything is sampled.
    pub fn validate(&self) -> TurbResult<()> {
        validate_dimensions(self.width, self.height)?;
        if self.depth == 0 {
            return Err(TurbulenceError::config("lattice depth (frame count) must be ≥ 1"));
        }
        Ok(())
    }

    /// Number of lattice points in one depth layer.
    #[inline]
    pub fn layer_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total number of lattice points.
    #[inline]
    pub fn len(&self) -> usize {
        self.layer_len() * self.depth as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A dense 3-D array of noise values.
///
/// Storage is depth-major then row-major, so [`NoiseField::layer`] returns a
/// contiguous `H × W` map indexed as `map[y * W + x]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseField {
    dims: LatticeDims,
    values: Vec<f64>,
}

impl NoiseField {
    /// A field of zeros.
    pub fn zeros(dims: LatticeDims) -> TurbResult<Self> {
        dims.validate()?;
        Ok(Self {
            dims,
            values: try_zeroed(dims.len())?,
        })
    }

    /// Wrap existing values laid out as described on [`NoiseField`].
    pub fn from_values(dims: LatticeDims, values: Vec<f64>) -> TurbResult<Self> {
        dims.validate()?;
        if values.len() != dims.len() {
            return Err(TurbulenceError::ShapeMismatch {
                what: "noise field",
                expected: dims.len(),
                got: values.len(),
            });
        }
        Ok(Self { dims, values })
    }

    #[inline]
    pub fn dims(&self) -> LatticeDims {
        self.dims
    }

    #[inline]
    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        let w = self.dims.width as usize;
        let h = self.dims.height as usize;
        (z * h + y) * w + x
    }

    /// Value at lattice point `(x, y, z)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f64 {
        self.values[self.index(x, y, z)]
    }

    /// The `H × W` map at depth `z`.
    pub fn layer(&self, z: usize) -> &[f64] {
        let n = self.dims.layer_len();
        &self.values[z * n..(z + 1) * n]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The field reversed along the x and z axes:
    /// `out(x, y, z) = self(W-1-x, y, D-1-z)`.
    pub fn flipped_xz(&self) -> TurbResult<Self> {
        let mut out = Self::zeros(self.dims)?;
        let w = self.dims.width as usize;
        let h = self.dims.height as usize;
        let d = self.dims.depth as usize;
        out.values
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(row, dst)| {
                let z = row / h;
                let y = row % h;
                let src = self.index(0, y, d - 1 - z);
                for (x, v) in dst.iter_mut().enumerate() {
                    *v = self.values[src + (w - 1 - x)];
                }
            });
        Ok(out)
    }

    /// Element-wise arithmetic mean of two fields of identical shape.
    pub fn mean_with(&self, other: &Self) -> TurbResult<Self> {
        if self.dims != other.dims {
            return Err(TurbulenceError::ShapeMismatch {
                what: "noise field mean",
                expected: self.dims.len(),
                got: other.dims.len(),
            });
        }
        let values = self
            .values
            .par_iter()
            .zip(other.values.par_iter())
            .map(|(a, b)| (a + b) / 2.0)
            .collect();
        Ok(Self {
            dims: self.dims,
            values,
        })
    }
}

/// Samples any 3-D noise function on a scaled, offset lattice.
pub struct VolumeSampler<N> {
    noise: N,
    /// Spatial frequency: noise-space distance between adjacent pixels.
    pub frequency: f64,
    /// Multiplier applied to `frequency` along the frame axis.
    pub temporal_scale: f64,
}

impl<N: NoiseFn<f64, 3> + Sync> VolumeSampler<N> {
    pub fn new(noise: N, frequency: f64, temporal_scale: f64) -> Self {
        Self {
            noise,
            frequency,
            temporal_scale,
        }
    }

    /// Sample the noise at lattice point `(x, y, z)` shifted by `offset`.
    #[inline]
    pub fn get(&self, x: u32, y: u32, z: u32, offset: RandomOffset) -> f64 {
        let nx = x as f64 * self.frequency + offset.x as f64;
        let ny = y as f64 * self.frequency + offset.y as f64;
        let nz = z as f64 * self.frequency * self.temporal_scale;
        self.noise.get([nx, ny, nz])
    }

    /// Fill a whole lattice, one row per rayon task.
    pub fn sample(&self, dims: LatticeDims, offset: RandomOffset) -> TurbResult<NoiseField> {
        let mut field = NoiseField::zeros(dims)?;
        let w = dims.width as usize;
        let h = dims.height;
        field
            .values
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(row, dst)| {
                let z = row as u32 / h;
                let y = row as u32 % h;
                for (x, v) in dst.iter_mut().enumerate() {
                    *v = self.get(x as u32, y, z, offset);
                }
            });
        Ok(field)
    }
}
