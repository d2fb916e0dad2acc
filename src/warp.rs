//! Nearest-neighbour backward warp driven by displacement maps.
//!
//! For every output pixel `(x, y)` the source is sampled at
//!
//!   sx = trunc(clamp(x + dx[y,x] · factor, 0, W-1))
//!   sy = trunc(clamp(y + dy[y,x] · factor, 0, H-1))
//!
//! Clamping happens in floating point before truncation, so the conversion is
//! a floor over the valid range and border pixels are repeated rather than
//! wrapped or reflected.

use rayon::prelude::*;

use crate::{
    error::{TurbResult, TurbulenceError},
    frame::Frame,
};

/// Warp `source` by the row-major `H × W` displacement maps `dx`/`dy`
/// (in pixels, before scaling by `factor`).
///
/// A zero `factor` or all-zero maps reproduce `source` exactly.
pub fn warp_frame(source: &Frame, dx: &[f64], dy: &[f64], factor: f64) -> TurbResult<Frame> {
    let n = source.len();
    for (what, map) in [("x displacement map", dx), ("y displacement map", dy)] {
        if map.len() != n {
            return Err(TurbulenceError::ShapeMismatch {
                what,
                expected: n,
                got: map.len(),
            });
        }
    }

    let w = source.width() as usize;
    let max_x = (source.width() - 1) as f64;
    let max_y = (source.height() - 1) as f64;
    let src = source.pixels();

    let mut out = source.blank_like()?;
    out.pixels_mut()
        .par_chunks_mut(w * 3)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(3).enumerate() {
                let i = y * w + x;
                let sx = source_coord(x, dx[i], factor, max_x);
                let sy = source_coord(y, dy[i], factor, max_y);
                let s = (sy * w + sx) * 3;
                px.copy_from_slice(&src[s..s + 3]);
            }
        });
    Ok(out)
}

#[inline]
fn source_coord(pos: usize, displacement: f64, factor: f64, max: f64) -> usize {
    // NaN falls through `clamp` and saturates to 0 in the cast.
    (pos as f64 + displacement * factor).clamp(0.0, max) as usize
}
