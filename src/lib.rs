//! `turbsim` — synthetic atmospheric-turbulence image sequences.
//!
//! # Architecture
//! A run turns one still image into `num_videos × frames_per_video` frames:
//!
//! 1. [`volume::NoiseVolumeGenerator`] samples 3-D fBm over
//!    `(width, height, frame)` into x/y displacement and blur-strength fields.
//! 2. [`warp::warp_frame`] backward-warps the source by the displacement
//!    layer of each frame.
//! 3. [`blur::VariableBlur`] blurs the warped frame per pixel by selecting from
//!    a recursively blurred stack according to the blur-strength layer.
//! 4. [`pipeline::Simulator`] sequences the above and hands frames to a
//!    [`pipeline::FrameSink`] such as [`image_io::PngSequenceWriter`].
//!
//! All parameters live in an immutable [`TurbulenceConfig`].

pub mod blur;
pub mod config;
pub mod error;
pub mod frame;
pub mod image_io;
pub mod noise;
pub mod pipeline;
pub mod volume;
pub mod warp;

pub use blur::{BlurStack, LevelBlend, VariableBlur};
pub use config::{ResizeTarget, TurbulenceConfig};
pub use error::{TurbResult, TurbulenceError};
pub use frame::Frame;
pub use image_io::{PngSequenceWriter, frame_filename, load_source};
pub use crate::noise::{LatticeDims, NoiseField, RandomOffset};
pub use pipeline::{FrameSink, RunSummary, Simulator};
pub use volume::{NoiseMode, NoiseVolumeGenerator, TurbulenceVolumes};
