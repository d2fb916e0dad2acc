//! Run configuration.
//!
//! A [`TurbulenceConfig`] is built once (defaults, JSON file, CLI overrides),
//! validated, and then passed by reference into every stage.  Nothing reads
//! configuration from ambient state.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use noise::{Fbm, Simplex};

use crate::{
    blur::LevelBlend,
    error::{TurbResult, TurbulenceError},
    frame::validate_dimensions,
    volume::NoiseMode,
};

/// Target size the source image is resampled to before simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResizeTarget {
    pub width: u32,
    pub height: u32,
}

/// Every tunable of a simulation run.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TurbulenceConfig {
    /// Displacement in pixels per unit of noise.
    pub turbulence_strength: f64,
    /// Blur ceiling: stack level `i` is blurred with `√i · max_blur_sigma / blur_levels`.
    pub max_blur_sigma: f64,
    /// Spatial noise frequency per pixel (smaller = larger eddies).
    pub spatial_scale: f64,
    /// Multiplier on `spatial_scale` along the frame axis (larger = faster change).
    pub temporal_scale: f64,
    /// fBm octaves.
    pub octaves: usize,
    /// Number of discrete blur levels in the stack.
    pub blur_levels: usize,
    pub blend: LevelBlend,
    pub frames_per_video: usize,
    pub num_videos: usize,
    pub mode: NoiseMode,
    /// `None` keeps the source resolution.
    pub resize: Option<ResizeTarget>,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Fixes every random offset of the run; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// Worker threads; `None` uses one per core.
    pub threads: Option<usize>,
}

impl Default for TurbulenceConfig {
    fn default() -> Self {
        Self {
            turbulence_strength: 10.0,
            max_blur_sigma: 12.0,
            spatial_scale: 1.0 / 64.0,
            temporal_scale: 2.0,
            octaves: 8,
            blur_levels: 20,
            blend: LevelBlend::Hard,
            frames_per_video: 10,
            num_videos: 1,
            mode: NoiseMode::Fast,
            resize: Some(ResizeTarget {
                width: 512,
                height: 512,
            }),
            input: PathBuf::from("input/stripe.jpg"),
            output_dir: PathBuf::from("Simulated_Images"),
            seed: None,
            threads: None,
        }
    }
}

impl TurbulenceConfig {
    /// Read a JSON config.  Missing fields take their default.
    pub fn from_json_file(path: &Path) -> TurbResult<Self> {
        let file = File::open(path).map_err(|source| TurbulenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Reject inconsistent settings before any work starts.
    pub fn validate(&self) -> TurbResult<()> {
        finite("turbulence_strength", self.turbulence_strength)?;
        finite("spatial_scale", self.spatial_scale)?;
        finite("temporal_scale", self.temporal_scale)?;
        finite("max_blur_sigma", self.max_blur_sigma)?;
        if self.max_blur_sigma < 0.0 {
            return Err(TurbulenceError::config(format!(
                "max_blur_sigma must be ≥ 0 (got {})",
                self.max_blur_sigma
            )));
        }
        if self.octaves == 0 || self.octaves > Fbm::<Simplex>::MAX_OCTAVES {
            return Err(TurbulenceError::config(format!(
                "octaves must be in 1..={} (got {})",
                Fbm::<Simplex>::MAX_OCTAVES,
                self.octaves
            )));
        }
        at_least_one("blur_levels", self.blur_levels)?;
        at_least_one("frames_per_video", self.frames_per_video)?;
        at_least_one("num_videos", self.num_videos)?;
        if self.frames_per_video > u32::MAX as usize {
            return Err(TurbulenceError::config("frames_per_video does not fit a lattice axis"));
        }
        if let Some(r) = self.resize {
            validate_dimensions(r.width, r.height)?;
        }
        if self.threads == Some(0) {
            return Err(TurbulenceError::config("threads must be ≥ 1 when set"));
        }
        Ok(())
    }
}

fn finite(name: &str, v: f64) -> TurbResult<()> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(TurbulenceError::config(format!("{name} must be finite (got {v})")))
    }
}

fn at_least_one(name: &str, v: usize) -> TurbResult<()> {
    if v == 0 {
        Err(TurbulenceError::config(format!("{name} must be ≥ 1")))
    } else {
        Ok(())
    }
}
