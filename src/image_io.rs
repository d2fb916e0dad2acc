//! Source decoding and PNG sequence output.

use std::path::{Path, PathBuf};

use image::{RgbImage, imageops::FilterType};
use tracing::debug;

use crate::{
    config::ResizeTarget,
    error::{TurbResult, TurbulenceError},
    frame::Frame,
    pipeline::FrameSink,
};

/// Decode `path` as RGB and optionally resample it to `resize`.
pub fn load_source(path: &Path, resize: Option<ResizeTarget>) -> TurbResult<Frame> {
    let decoded = image::open(path)
        .map_err(|source| TurbulenceError::SourceImage {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let rgb = match resize {
        Some(r) if (decoded.width(), decoded.height()) != (r.width, r.height) => {
            debug!(
                from = ?decoded.dimensions(),
                to = ?(r.width, r.height),
                "resizing source"
            );
            image::imageops::resize(&decoded, r.width, r.height, FilterType::Triangle)
        }
        _ => decoded,
    };
    Frame::from_rgb8(rgb.width(), rgb.height(), rgb.as_raw())
}

/// Output file name for frame `frame` of video `video`:
/// `frame_{video:05}_{frame:04}.png`.
pub fn frame_filename(video: usize, frame: usize) -> String {
    format!("frame_{video:05}_{frame:04}.png")
}

/// Writes every frame as an 8-bit RGB PNG into one directory.
pub struct PngSequenceWriter {
    dir: PathBuf,
}

impl PngSequenceWriter {
    /// Create `dir` (and parents) if needed.
    pub fn create(dir: impl Into<PathBuf>) -> TurbResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| TurbulenceError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a given frame is written to.
    pub fn path_for(&self, video: usize, frame: usize) -> PathBuf {
        self.dir.join(frame_filename(video, frame))
    }
}

impl FrameSink for PngSequenceWriter {
    fn write_frame(&mut self, video: usize, index: usize, frame: &Frame) -> TurbResult<()> {
        let path = self.path_for(video, index);
        // Frames are RGB and so is the PNG encoder input; no swizzle needed.
        let rgb = RgbImage::from_raw(frame.width(), frame.height(), frame.to_rgb8()).ok_or(
            TurbulenceError::ShapeMismatch {
                what: "encoded frame",
                expected: frame.len() * 3,
                got: frame.pixels().len(),
            },
        )?;
        rgb.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|source| TurbulenceError::Encode {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "frame written");
        Ok(())
    }
}
