//! Turbulence volume generation: the x/y displacement and blur-strength
//! fields for one video.
//!
//! Two modes trade channel independence for speed:
//!
//! * [`NoiseMode::Accurate`] samples three fields, each at its own
//!   [`RandomOffset`].
//! * [`NoiseMode::Fast`] samples only the x field.  The y field is the x field
//!   reversed along x and z, and the blur field is the mean of the two.  One
//!   noise evaluation per lattice point instead of three, at the cost of y and
//!   blur being deterministic functions of x.

use std::time::Instant;

use noise::{Fbm, MultiFractal, Simplex};
use rand::Rng;
use tracing::debug;

use crate::{
    error::{TurbResult, TurbulenceError},
    noise::{LatticeDims, NoiseField, RandomOffset, VolumeSampler},
};

/// Speed/quality trade-off for [`NoiseVolumeGenerator::generate`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMode {
    /// One sampled field; y and blur derived by symmetry.
    #[default]
    Fast,
    /// Three independently offset fields.
    Accurate,
}

/// The three per-video fields.  All share the same [`LatticeDims`].
#[derive(Clone, Debug)]
pub struct TurbulenceVolumes {
    pub x: NoiseField,
    pub y: NoiseField,
    pub blur: NoiseField,
}

impl TurbulenceVolumes {
    /// Assemble volumes from precomputed fields, checking they agree in shape.
    pub fn new(x: NoiseField, y: NoiseField, blur: NoiseField) -> TurbResult<Self> {
        for (what, field) in [("y displacement field", &y), ("blur field", &blur)] {
            if field.dims() != x.dims() {
                return Err(TurbulenceError::ShapeMismatch {
                    what,
                    expected: x.dims().len(),
                    got: field.dims().len(),
                });
            }
        }
        Ok(Self { x, y, blur })
    }

    #[inline]
    pub fn dims(&self) -> LatticeDims {
        self.x.dims()
    }

    /// Number of frames the volumes cover.
    #[inline]
    pub fn depth(&self) -> usize {
        self.x.dims().depth as usize
    }
}

/// Produces [`TurbulenceVolumes`] from multi-octave simplex fBm.
pub struct NoiseVolumeGenerator {
    sampler: VolumeSampler<Fbm<Simplex>>,
    mode: NoiseMode,
}

impl NoiseVolumeGenerator {
    /// `frequency` is the spatial noise frequency per pixel; the frame axis is
    /// scaled by `frequency · temporal_scale`.
    pub fn new(frequency: f64, temporal_scale: f64, octaves: usize, mode: NoiseMode) -> Self {
        let fbm: Fbm<Simplex> = Fbm::new(0).set_octaves(octaves);
        Self {
            sampler: VolumeSampler::new(fbm, frequency, temporal_scale),
            mode,
        }
    }

    pub fn mode(&self) -> NoiseMode {
        self.mode
    }

    /// Sample the volumes for one video.  Fresh offsets are drawn from `rng`
    /// for every sampled field.
    #[tracing::instrument(skip(self, rng), fields(mode = ?self.mode))]
    pub fn generate<R: Rng + ?Sized>(
        &self,
        dims: LatticeDims,
        rng: &mut R,
    ) -> TurbResult<TurbulenceVolumes> {
        dims.validate()?;
        let started = Instant::now();
        let volumes = match self.mode {
            NoiseMode::Fast => {
                let x = self.sampler.sample(dims, RandomOffset::draw(rng))?;
                let y = x.flipped_xz()?;
                let blur = x.mean_with(&y)?;
                TurbulenceVolumes { x, y, blur }
            }
            NoiseMode::Accurate => {
                let x = self.sampler.sample(dims, RandomOffset::draw(rng))?;
                let y = self.sampler.sample(dims, RandomOffset::draw(rng))?;
                let blur = self.sampler.sample(dims, RandomOffset::draw(rng))?;
                TurbulenceVolumes { x, y, blur }
            }
        };
        debug!(elapsed = ?started.elapsed(), points = dims.len(), "noise volumes ready");
        Ok(volumes)
    }
}
