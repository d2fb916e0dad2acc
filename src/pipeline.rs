//! Run orchestration: volumes → warp → variable blur → sink.
//!
//! Each video gets fresh [`TurbulenceVolumes`]; once they exist, every frame is
//! independent, so frames are rendered in parallel on a private [`rayon`] pool
//! and handed to the [`FrameSink`] afterwards in frame order.
//!
//! # Usage
//! ```rust,ignore
//! let config = TurbulenceConfig::default();
//! let simulator = Simulator::new(&config)?;
//! let source = load_source(&config.input, config.resize)?;
//! let mut sink = PngSequenceWriter::create(&config.output_dir)?;
//! let summary = simulator.run(&source, &mut sink)?;
//! ```

use std::time::{Duration, Instant};

use rand::{SeedableRng, rngs::StdRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    blur::VariableBlur,
    config::TurbulenceConfig,
    error::{TurbResult, TurbulenceError},
    frame::Frame,
    noise::LatticeDims,
    volume::{NoiseVolumeGenerator, TurbulenceVolumes},
    warp::warp_frame,
};

/// Receives finished frames.  Frames arrive in RGB order (see [`Frame`]).
pub trait FrameSink {
    fn write_frame(&mut self, video: usize, index: usize, frame: &Frame) -> TurbResult<()>;
}

/// Collects frames in memory.
impl FrameSink for Vec<(usize, usize, Frame)> {
    fn write_frame(&mut self, video: usize, index: usize, frame: &Frame) -> TurbResult<()> {
        self.push((video, index, frame.clone()));
        Ok(())
    }
}

/// What a completed [`Simulator::run`] produced.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub videos: usize,
    pub frames_per_video: usize,
    pub width: u32,
    pub height: u32,
    pub elapsed: Duration,
}

/// Drives a whole run from a validated [`TurbulenceConfig`].
pub struct Simulator {
    volumes: NoiseVolumeGenerator,
    blur: VariableBlur,
    displacement_factor: f64,
    frames_per_video: usize,
    num_videos: usize,
    seed: Option<u64>,
    pool: rayon::ThreadPool,
}

impl Simulator {
    /// Validate `config` and prepare the worker pool.  Fails before any
    /// noise is generated.
    pub fn new(config: &TurbulenceConfig) -> TurbResult<Self> {
        config.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("turbsim-{i}"));
        if let Some(n) = config.threads {
            builder = builder.num_threads(n);
        }
        let pool = builder
            .build()
            .map_err(|e| TurbulenceError::config(format!("cannot start worker pool: {e}")))?;
        Ok(Self {
            volumes: NoiseVolumeGenerator::new(
                config.spatial_scale,
                config.temporal_scale,
                config.octaves,
                config.mode,
            ),
            blur: VariableBlur::new(config.max_blur_sigma, config.blur_levels, config.blend)?,
            displacement_factor: config.turbulence_strength,
            frames_per_video: config.frames_per_video,
            num_videos: config.num_videos,
            seed: config.seed,
            pool,
        })
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn lattice(&self, source: &Frame) -> LatticeDims {
        LatticeDims {
            width: source.width(),
            height: source.height(),
            depth: self.frames_per_video as u32,
        }
    }

    /// Render frame `z` of a video from precomputed volumes.
    pub fn render_frame(
        &self,
        source: &Frame,
        volumes: &TurbulenceVolumes,
        z: usize,
    ) -> TurbResult<Frame> {
        let dims = volumes.dims();
        if (dims.width, dims.height) != (source.width(), source.height()) {
            return Err(TurbulenceError::ShapeMismatch {
                what: "noise layer",
                expected: source.len(),
                got: dims.layer_len(),
            });
        }
        let warped = warp_frame(
            source,
            volumes.x.layer(z),
            volumes.y.layer(z),
            self.displacement_factor,
        )?;
        self.blur.apply(warped, volumes.blur.layer(z))
    }

    /// Render every frame of one video from the given volumes, in order.
    pub fn render_video(
        &self,
        source: &Frame,
        volumes: &TurbulenceVolumes,
    ) -> TurbResult<Vec<Frame>> {
        self.pool.install(|| {
            (0..volumes.depth())
                .into_par_iter()
                .map(|z| {
                    let frame = self.render_frame(source, volumes, z);
                    debug!(frame = z, "frame rendered");
                    frame
                })
                .collect()
        })
    }

    /// Sample fresh volumes from `rng` and render one video.
    pub fn simulate_video(&self, source: &Frame, rng: &mut StdRng) -> TurbResult<Vec<Frame>> {
        let dims = self.lattice(source);
        let volumes = self.pool.install(|| self.volumes.generate(dims, rng))?;
        self.render_video(source, &volumes)
    }

    /// Generate every configured video and hand each frame to `sink`.
    ///
    /// Any failure aborts the whole run; videos already written stay on disk.
    pub fn run(&self, source: &Frame, sink: &mut dyn FrameSink) -> TurbResult<RunSummary> {
        let started = Instant::now();
        let mut rng = self.rng();
        for video in 0..self.num_videos {
            info!(video, of = self.num_videos, "simulating video");
            let frames = self.simulate_video(source, &mut rng)?;
            for (index, frame) in frames.iter().enumerate() {
                sink.write_frame(video, index, frame)?;
            }
        }
        let summary = RunSummary {
            videos: self.num_videos,
            frames_per_video: self.frames_per_video,
            width: source.width(),
            height: source.height(),
            elapsed: started.elapsed(),
        };
        info!(
            videos = summary.videos,
            frames = summary.frames_per_video,
            resolution = %format_args!("{}x{}", summary.width, summary.height),
            elapsed = ?summary.elapsed,
            "run complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blur::LevelBlend,
        config::ResizeTarget,
        noise::NoiseField,
        volume::NoiseMode,
    };

    fn config() -> TurbulenceConfig {
        TurbulenceConfig {
            turbulence_strength: 3.0,
            max_blur_sigma: 2.0,
            spatial_scale: 1.0 / 8.0,
            octaves: 3,
            blur_levels: 4,
            frames_per_video: 3,
            num_videos: 2,
            resize: Some(ResizeTarget {
                width: 16,
                height: 12,
            }),
            seed: Some(11),
            threads: Some(2),
            ..Default::default()
        }
    }

    fn textured(w: u32, h: u32) -> Frame {
        let pixels = (0..h)
            .flat_map(|y| {
                (0..w).flat_map(move |x| {
                    let v = ((x * 7 + y * 3) % 11) as f32 / 10.0;
                    [v, 1.0 - v, 0.5]
                })
            })
            .collect();
        Frame::from_pixels(w, h, pixels).unwrap()
    }

    fn flat_volumes(w: u32, h: u32, depth: u32) -> TurbulenceVolumes {
        let dims = LatticeDims {
            width: w,
            height: h,
            depth,
        };
        let z = NoiseField::zeros(dims).unwrap();
        TurbulenceVolumes::new(z.clone(), z.clone(), z).unwrap()
    }

    #[test]
    fn flat_gray_source_with_zero_noise_is_unchanged() {
        let gray = Frame::from_rgb8(4, 4, &[128u8; 4 * 4 * 3]).unwrap();
        let cfg = TurbulenceConfig {
            turbulence_strength: 0.0,
            frames_per_video: 1,
            ..config()
        };
        let sim = Simulator::new(&cfg).unwrap();
        let frames = sim.render_video(&gray, &flat_volumes(4, 4, 1)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_rgb8(), vec![128u8; 48]);
    }

    #[test]
    fn zero_noise_keeps_textured_source_exactly() {
        let src = textured(16, 12);
        let sim = Simulator::new(&config()).unwrap();
        for frame in sim.render_video(&src, &flat_volumes(16, 12, 3)).unwrap() {
            assert_eq!(frame, src);
        }
    }

    #[test]
    fn single_blur_level_only_warps() {
        let src = textured(16, 12);
        let cfg = TurbulenceConfig {
            blur_levels: 1,
            ..config()
        };
        let sim = Simulator::new(&cfg).unwrap();
        let mut rng = sim.rng();
        let volumes = sim.volumes.generate(sim.lattice(&src), &mut rng).unwrap();
        let frame = sim.render_frame(&src, &volumes, 1).unwrap();
        let warped = warp_frame(&src, volumes.x.layer(1), volumes.y.layer(1), 3.0).unwrap();
        assert_eq!(frame, warped);
    }

    #[test]
    fn run_writes_every_frame_in_order() {
        let src = textured(16, 12);
        let sim = Simulator::new(&config()).unwrap();
        let mut sink: Vec<(usize, usize, Frame)> = Vec::new();
        let summary = sim.run(&src, &mut sink).unwrap();

        assert_eq!(summary.videos, 2);
        assert_eq!(summary.frames_per_video, 3);
        assert_eq!((summary.width, summary.height), (16, 12));
        let order: Vec<(usize, usize)> = sink.iter().map(|(v, f, _)| (*v, *f)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
        assert!(sink.iter().any(|(_, _, f)| f != &src), "turbulence had no effect");
        assert_ne!(sink[0].2, sink[3].2, "videos must use fresh offsets");
    }

    #[test]
    fn seeded_runs_are_reproducible_in_both_modes() {
        let src = textured(16, 12);
        for mode in [NoiseMode::Fast, NoiseMode::Accurate] {
            for blend in [LevelBlend::Hard, LevelBlend::Linear] {
                let cfg = TurbulenceConfig {
                    mode,
                    blend,
                    ..config()
                };
                let run = || {
                    let mut sink: Vec<(usize, usize, Frame)> = Vec::new();
                    Simulator::new(&cfg).unwrap().run(&src, &mut sink).unwrap();
                    sink
                };
                assert_eq!(run(), run(), "{mode:?}/{blend:?}");
            }
        }
    }

    #[test]
    fn invalid_config_fails_before_generation() {
        let cfg = TurbulenceConfig {
            blur_levels: 0,
            ..config()
        };
        assert!(matches!(
            Simulator::new(&cfg),
            Err(TurbulenceError::Config(_))
        ));
    }

    #[test]
    fn mismatched_volumes_are_rejected() {
        let sim = Simulator::new(&config()).unwrap();
        let err = sim
            .render_frame(&textured(16, 12), &flat_volumes(8, 8, 3), 0)
            .unwrap_err();
        assert!(matches!(err, TurbulenceError::ShapeMismatch { .. }));
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn write_frame(&mut self, _: usize, _: usize, _: &Frame) -> TurbResult<()> {
            Err(TurbulenceError::config("disk full"))
        }
    }

    #[test]
    fn sink_failure_aborts_the_run() {
        let sim = Simulator::new(&config()).unwrap();
        assert!(sim.run(&textured(16, 12), &mut FailingSink).is_err());
    }
}
