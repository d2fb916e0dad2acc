//! Spatially varying blur by per-pixel selection from a blur stack.
//!
//! The stack is built recursively: level `i` is level `i-1` blurred with
//! `σᵢ = √i · max_sigma / num_levels`, so the effective blur of a level is the
//! compounded sum of every pass below it (variances add).  Level 0 is the
//! untouched input.
//!
//! The strength map is min-max normalised per frame and scaled to
//! `[0, num_levels-1]`.  [`LevelBlend::Hard`] truncates that position to pick
//! one level per pixel; [`LevelBlend::Linear`] interpolates between the two
//! neighbouring levels instead.

use rayon::prelude::*;

use crate::{
    error::{TurbResult, TurbulenceError},
    frame::Frame,
};

/// How a fractional level position becomes a pixel value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelBlend {
    /// Truncate to a single level; no feathering between levels.
    #[default]
    Hard,
    /// Linear interpolation between the two adjacent levels.
    Linear,
}

/// Sigma of the pass that produces stack level `level` from `level - 1`.
#[inline]
pub fn level_sigma(level: usize, max_sigma: f64, num_levels: usize) -> f64 {
    (level as f64).sqrt() * max_sigma / num_levels as f64
}

// --- gaussian blur -----------------------------------------------------------

/// Normalised 1-D Gaussian kernel of odd length `2r + 1`.
///
/// The radius follows the usual `round(8σ + 1) | 1` window for float images,
/// i.e. roughly 4σ on each side.
pub fn gaussian_kernel(sigma: f64) -> Vec<f32> {
    if sigma.is_nan() || sigma <= 0.0 {
        return vec![1.0];
    }
    let size = ((sigma * 8.0 + 1.0).round() as usize) | 1;
    let r = (size / 2) as i64;
    let denom = 2.0 * sigma * sigma;
    let weights: Vec<f64> = (-r..=r)
        .map(|i| (-(i * i) as f64 / denom).exp())
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Mirror an out-of-range index back into `[0, n)` without repeating the edge
/// sample (`dcb|abcd|cba`).
#[inline]
fn reflect_101(i: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let m = i.rem_euclid(period);
    (if m >= n { period - m } else { m }) as usize
}

/// Separable Gaussian blur with reflected borders.  `sigma ≤ 0` copies.
pub fn gaussian_blur(frame: &Frame, sigma: f64) -> TurbResult<Frame> {
    let kernel = gaussian_kernel(sigma);
    if kernel.len() == 1 {
        return Ok(frame.clone());
    }
    let mut tmp = frame.blank_like()?;
    let mut out = frame.blank_like()?;
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    horizontal_pass(frame.pixels(), tmp.pixels_mut(), w, &kernel);
    vertical_pass(tmp.pixels(), out.pixels_mut(), w, h, &kernel);
    Ok(out)
}

fn horizontal_pass(src: &[f32], dst: &mut [f32], w: usize, k: &[f32]) {
    let r = (k.len() / 2) as i64;
    let taps: Vec<Vec<usize>> = (0..w as i64)
        .map(|x| (-r..=r).map(|d| reflect_101(x + d, w as i64)).collect())
        .collect();
    dst.par_chunks_mut(w * 3)
        .zip(src.par_chunks(w * 3))
        .for_each(|(out_row, in_row)| {
            for (x, px) in out_row.chunks_exact_mut(3).enumerate() {
                let mut acc = [0.0f32; 3];
                for (&kw, &sx) in k.iter().zip(&taps[x]) {
                    let s = sx * 3;
                    acc[0] += kw * in_row[s];
                    acc[1] += kw * in_row[s + 1];
                    acc[2] += kw * in_row[s + 2];
                }
                px.copy_from_slice(&acc);
            }
        });
}

fn vertical_pass(src: &[f32], dst: &mut [f32], w: usize, h: usize, k: &[f32]) {
    let r = (k.len() / 2) as i64;
    let stride = w * 3;
    dst.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            // Accumulate whole source rows to keep reads contiguous.
            for (ki, &kw) in k.iter().enumerate() {
                let sy = reflect_101(y as i64 + ki as i64 - r, h as i64);
                let in_row = &src[sy * stride..(sy + 1) * stride];
                for (o, &s) in out_row.iter_mut().zip(in_row) {
                    *o += kw * s;
                }
            }
        });
}

// --- blur stack --------------------------------------------------------------

/// Progressively blurred copies of one frame.
pub struct BlurStack {
    levels: Vec<Frame>,
    sigmas: Vec<f64>,
}

impl BlurStack {
    /// Build all `num_levels` levels.
    pub fn build(frame: Frame, max_sigma: f64, num_levels: usize) -> TurbResult<Self> {
        Self::build_to(frame, max_sigma, num_levels, num_levels.saturating_sub(1))
    }

    /// Build levels `0..=top` only; higher levels are never needed when no
    /// pixel selects them.
    pub fn build_to(
        frame: Frame,
        max_sigma: f64,
        num_levels: usize,
        top: usize,
    ) -> TurbResult<Self> {
        if num_levels == 0 {
            return Err(TurbulenceError::config("blur stack needs at least one level"));
        }
        let top = top.min(num_levels - 1);
        let mut levels = Vec::with_capacity(top + 1);
        let mut sigmas = Vec::with_capacity(top + 1);
        levels.push(frame);
        sigmas.push(0.0);
        for i in 1..=top {
            let sigma = level_sigma(i, max_sigma, num_levels);
            let next = gaussian_blur(&levels[i - 1], sigma)?;
            levels.push(next);
            sigmas.push(sigma);
        }
        Ok(Self { levels, sigmas })
    }

    #[inline]
    pub fn level(&self, i: usize) -> &Frame {
        &self.levels[i]
    }

    /// Number of levels actually built.
    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Per-pass sigma of each level; entry 0 is `0.0`.
    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }

    fn into_base(mut self) -> Frame {
        self.levels.swap_remove(0)
    }
}

// --- strength map --------------------------------------------------------------

/// Min-max normalise `map` to `[0, 1]`.
///
/// A flat map (or one with no finite range) normalises to all zeros.
pub fn normalize_strength(map: &[f64]) -> Vec<f64> {
    let (min, max) = map
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; map.len()];
    }
    map.iter().map(|&v| (v - min) / range).collect()
}

/// Stack level chosen per pixel under [`LevelBlend::Hard`].
///
/// Always within `[0, num_levels-1]` whatever the input range.
pub fn level_indices(map: &[f64], num_levels: usize) -> Vec<usize> {
    let top = num_levels.saturating_sub(1);
    normalize_strength(map)
        .into_iter()
        .map(|t| ((t * top as f64) as usize).min(top))
        .collect()
}

// --- compositor --------------------------------------------------------------

/// Per-pixel variable blur driven by a strength map.
#[derive(Clone, Copy, Debug)]
pub struct VariableBlur {
    max_sigma: f64,
    num_levels: usize,
    blend: LevelBlend,
}

impl VariableBlur {
    pub fn new(max_sigma: f64, num_levels: usize, blend: LevelBlend) -> TurbResult<Self> {
        if num_levels == 0 {
            return Err(TurbulenceError::config("blur level count must be ≥ 1"));
        }
        if !max_sigma.is_finite() || max_sigma < 0.0 {
            return Err(TurbulenceError::config(format!(
                "max blur sigma must be finite and ≥ 0 (got {max_sigma})"
            )));
        }
        Ok(Self {
            max_sigma,
            num_levels,
            blend,
        })
    }

    /// Blur `frame` with the per-pixel strength in the row-major map
    /// `strength` (same `H × W` shape).
    pub fn apply(&self, frame: Frame, strength: &[f64]) -> TurbResult<Frame> {
        if strength.len() != frame.len() {
            return Err(TurbulenceError::ShapeMismatch {
                what: "blur strength map",
                expected: frame.len(),
                got: strength.len(),
            });
        }
        if self.num_levels == 1 {
            return Ok(frame);
        }
        match self.blend {
            LevelBlend::Hard => self.apply_hard(frame, strength),
            LevelBlend::Linear => self.apply_linear(frame, strength),
        }
    }

    fn apply_hard(&self, frame: Frame, strength: &[f64]) -> TurbResult<Frame> {
        let indices = level_indices(strength, self.num_levels);
        let top = indices.iter().copied().max().unwrap_or(0);
        let stack = BlurStack::build_to(frame, self.max_sigma, self.num_levels, top)?;
        if stack.len() == 1 {
            return Ok(stack.into_base());
        }

        let mut out = stack.level(0).blank_like()?;
        out.pixels_mut()
            .par_chunks_mut(3)
            .zip(indices.par_iter())
            .enumerate()
            .for_each(|(i, (px, &level))| {
                let s = i * 3;
                px.copy_from_slice(&stack.level(level).pixels()[s..s + 3]);
            });
        Ok(out)
    }

    fn apply_linear(&self, frame: Frame, strength: &[f64]) -> TurbResult<Frame> {
        let top_level = (self.num_levels - 1) as f64;
        let positions: Vec<f64> = normalize_strength(strength)
            .into_iter()
            .map(|t| (t * top_level).clamp(0.0, top_level))
            .collect();
        let top = positions
            .iter()
            .map(|p| p.ceil() as usize)
            .max()
            .unwrap_or(0);
        let stack = BlurStack::build_to(frame, self.max_sigma, self.num_levels, top)?;
        if stack.len() == 1 {
            return Ok(stack.into_base());
        }

        let mut out = stack.level(0).blank_like()?;
        out.pixels_mut()
            .par_chunks_mut(3)
            .zip(positions.par_iter())
            .enumerate()
            .for_each(|(i, (px, &p))| {
                let lo = p.floor() as usize;
                let hi = p.ceil() as usize;
                let t = (p - lo as f64) as f32;
                let s = i * 3;
                let a = &stack.level(lo).pixels()[s..s + 3];
                let b = &stack.level(hi).pixels()[s..s + 3];
                for c in 0..3 {
                    px[c] = a[c] + (b[c] - a[c]) * t;
                }
            });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 9×7 checkerboard-ish frame with plenty of high-frequency detail.
    fn textured() -> Frame {
        let (w, h) = (9u32, 7u32);
        let pixels = (0..h)
            .flat_map(|y| {
                (0..w).flat_map(move |x| {
                    let v = if (x + y) % 2 == 0 { 0.9 } else { 0.1 };
                    [v, 1.0 - v, (x as f32) / 8.0]
                })
            })
            .collect();
        Frame::from_pixels(w, h, pixels).unwrap()
    }

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(1.5);
        assert_eq!(k.len(), 13);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "kernel sum {sum}");
        for i in 0..k.len() / 2 {
            assert_eq!(k[i], k[k.len() - 1 - i]);
        }
        assert_eq!(gaussian_kernel(0.0), vec![1.0]);
    }

    #[test]
    fn reflect_101_mirrors_without_repeating_edge() {
        let got: Vec<usize> = (-3..7).map(|i| reflect_101(i, 4)).collect();
        assert_eq!(got, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        assert_eq!(reflect_101(-5, 1), 0);
    }

    #[test]
    fn blur_of_constant_frame_is_constant() {
        let frame = Frame::filled(6, 5, [0.25, 0.5, 0.75]).unwrap();
        let out = gaussian_blur(&frame, 3.0).unwrap();
        for (a, b) in out.pixels().iter().zip(frame.pixels()) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
    }

    #[test]
    fn blur_spreads_an_impulse() {
        let mut frame = Frame::new(11, 11).unwrap();
        let c = (5 * 11 + 5) * 3;
        frame.pixels_mut()[c] = 1.0;
        let out = gaussian_blur(&frame, 1.2).unwrap();
        let lit = out.pixels().chunks_exact(3).filter(|p| p[0] > 0.0).count();
        assert!(lit > 1);
        assert!(out.pixels()[c] < 1.0);
        let energy: f32 = out.pixels().chunks_exact(3).map(|p| p[0]).sum();
        assert!((energy - 1.0).abs() < 1e-3, "energy {energy}");
    }

    #[test]
    fn stack_level_zero_is_input_and_sigmas_increase() {
        let frame = textured();
        let stack = BlurStack::build(frame.clone(), 12.0, 6).unwrap();
        assert_eq!(stack.len(), 6);
        assert_eq!(stack.level(0), &frame);
        let s = stack.sigmas();
        assert_eq!(s[0], 0.0);
        for pair in s.windows(2) {
            assert!(pair[1] > pair[0], "sigmas not increasing: {s:?}");
        }
        assert!((s[4] - 2.0 * 12.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn stack_levels_compound_recursively() {
        let frame = textured();
        let stack = BlurStack::build(frame.clone(), 8.0, 4).unwrap();
        let once = gaussian_blur(&frame, level_sigma(1, 8.0, 4)).unwrap();
        let twice = gaussian_blur(&once, level_sigma(2, 8.0, 4)).unwrap();
        assert_eq!(stack.level(1), &once);
        assert_eq!(stack.level(2), &twice);

        let direct = gaussian_blur(&frame, level_sigma(2, 8.0, 4)).unwrap();
        assert_ne!(stack.level(2), &direct);
    }

    #[test]
    fn flat_map_selects_level_zero() {
        assert_eq!(normalize_strength(&[0.3; 5]), vec![0.0; 5]);
        let frame = textured();
        for blend in [LevelBlend::Hard, LevelBlend::Linear] {
            let vb = VariableBlur::new(12.0, 20, blend).unwrap();
            let out = vb.apply(frame.clone(), &vec![0.42; frame.len()]).unwrap();
            assert_eq!(out, frame, "{blend:?}");
            assert!(out.pixels().iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn single_level_returns_input_for_any_map() {
        let frame = textured();
        let vb = VariableBlur::new(12.0, 1, LevelBlend::Hard).unwrap();
        let out = vb.apply(frame.clone(), &ramp(frame.len())).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn indices_stay_in_range_for_negative_maps() {
        let map: Vec<f64> = (0..50).map(|i| -3.0 - (i as f64 * 0.37).sin()).collect();
        let idx = level_indices(&map, 20);
        assert!(idx.iter().all(|&i| i < 20));
        assert!(idx.contains(&0));
        assert!(idx.contains(&19));
        assert!(level_indices(&[-1.0, f64::NAN, 1.0], 5).iter().all(|&i| i < 5));
    }

    #[test]
    fn hard_selection_gathers_from_the_chosen_level() {
        let frame = textured();
        let n = frame.len();
        let map = ramp(n);
        let vb = VariableBlur::new(6.0, 5, LevelBlend::Hard).unwrap();
        let out = vb.apply(frame.clone(), &map).unwrap();

        let stack = BlurStack::build(frame.clone(), 6.0, 5).unwrap();
        let idx = level_indices(&map, 5);
        for (i, &level) in idx.iter().enumerate() {
            let (x, y) = (i % 9, i / 9);
            assert_eq!(out.pixel(x, y), stack.level(level).pixel(x, y), "pixel {i}");
        }
        assert_eq!(out.pixel(0, 0), frame.pixel(0, 0));
    }

    #[test]
    fn linear_blend_interpolates_adjacent_levels() {
        let frame = textured();
        let n = frame.len();
        // Two pixels: the minimum and a midpoint between levels 0 and 1.
        let mut map = vec![2.0; n];
        map[0] = 0.0;
        map[1] = 0.5;
        let vb = VariableBlur::new(4.0, 3, LevelBlend::Linear).unwrap();
        let out = vb.apply(frame.clone(), &map).unwrap();

        let stack = BlurStack::build(frame.clone(), 4.0, 3).unwrap();
        assert_eq!(out.pixel(0, 0), frame.pixel(0, 0));
        let (a, b) = (stack.level(0).pixel(1, 0), stack.level(1).pixel(1, 0));
        let got = out.pixel(1, 0);
        for c in 0..3 {
            let expected = a[c] + (b[c] - a[c]) * 0.5;
            assert!((got[c] - expected).abs() < 1e-6);
        }
        assert_eq!(out.pixel(2, 0), stack.level(2).pixel(2, 0));
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(VariableBlur::new(1.0, 0, LevelBlend::Hard).is_err());
        assert!(VariableBlur::new(f64::NAN, 4, LevelBlend::Hard).is_err());
        let vb = VariableBlur::new(1.0, 4, LevelBlend::Hard).unwrap();
        assert!(vb.apply(textured(), &[0.0; 3]).is_err());
    }
}
