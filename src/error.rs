//! Error taxonomy shared by every stage of the simulator.

use std::path::PathBuf;

/// Convenience result type used across the crate.
pub type TurbResult<T> = Result<T, TurbulenceError>;

/// Everything that can abort a simulation run.
///
/// A flat blur-strength map is deliberately absent: it is resolved by
/// selecting level 0 everywhere rather than being reported.
#[derive(thiserror::Error, Debug)]
pub enum TurbulenceError {
    /// Either `width` or `height` was zero.
    #[error("image dimensions must be non-zero (got {width}×{height})")]
    ZeroDimension { width: u32, height: u32 },

    /// One or both dimensions exceeded [`crate::frame::MAX_DIMENSION`].
    #[error("image dimensions {width}×{height} exceed MAX_DIMENSION={max}")]
    DimensionTooLarge { width: u32, height: u32, max: u32 },

    /// The source image is missing or cannot be decoded.
    #[error("cannot read source image '{}': {source}", path.display())]
    SourceImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Inconsistent configuration value.
    #[error("config error: {0}")]
    Config(String),

    /// Malformed configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A map or field does not match the shape of the data it is applied to.
    #[error("{what}: expected {expected} values, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// A bulk buffer (noise volume, frame) could not be allocated.
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// Filesystem failure while preparing output.
    #[error("io error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The encoder failed to write an output frame.
    #[error("cannot write frame '{}': {source}", path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl TurbulenceError {
    /// Build a [`TurbulenceError::Config`] value.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Allocate a zero-initialised buffer of `len` elements, reporting allocation
/// failure instead of aborting the process.
pub(crate) fn try_zeroed<T: Clone + Default>(len: usize) -> TurbResult<Vec<T>> {
    let bytes = len.saturating_mul(std::mem::size_of::<T>());
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| TurbulenceError::OutOfMemory { bytes })?;
    buf.resize(len, T::default());
    Ok(buf)
}
