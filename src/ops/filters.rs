// ---------------------------------------------------------------------------
//  Separable Gaussian blur on single-channel coverage buffers (rayon)
// ---------------------------------------------------------------------------
//
// Used for the text drop-shadow: the glyph coverage mask is blurred and then
// tinted, so only one channel needs filtering.

use rayon::prelude::*;

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let mut kernel = vec![0.0f32; len];
    let s2 = 2.0 * sigma * sigma;
    let mut sum = 0.0f32;
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        let v = (-x * x / s2).exp();
        *k = v;
        sum += v;
    }
    let inv = 1.0 / sum;
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Blur a `w × h` coverage buffer with the given sigma. Samples outside the
/// buffer count as zero coverage, so blurred edges fade out instead of
/// smearing the border.
pub fn blur_coverage(src: &[f32], w: usize, h: usize, sigma: f32) -> Vec<f32> {
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.to_vec();
    }
    let kernel = build_gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    // --- Horizontal pass (parallel by row) ---
    let mut tmp = vec![0.0f32; w * h];
    tmp.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        let row_in = &src[y * w..(y + 1) * w];
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = x as isize + ki as isize - radius;
                if sx >= 0 && (sx as usize) < w {
                    acc += row_in[sx as usize] * kv;
                }
            }
            *out = acc;
        }
    });

    // --- Vertical pass (parallel by row) ---
    let mut dst = vec![0.0f32; w * h];
    dst.par_chunks_mut(w).enumerate().for_each(|(y, row_out)| {
        for (x, out) in row_out.iter_mut().enumerate() {
            let mut acc = 0.0f32;
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = y as isize + ki as isize - radius;
                if sy >= 0 && (sy as usize) < h {
                    acc += tmp[sy as usize * w + x] * kv;
                }
            }
            *out = acc;
        }
    });
    dst
}

/// Shift a coverage buffer by whole pixels; vacated cells become zero.
pub fn offset_coverage(src: &[f32], w: usize, h: usize, dx: isize, dy: isize) -> Vec<f32> {
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        let sy = y as isize - dy;
        if sy < 0 || sy as usize >= h {
            continue;
        }
        for x in 0..w {
            let sx = x as isize - dx;
            if sx < 0 || sx as usize >= w {
                continue;
            }
            out[y * w + x] = src[sy as usize * w + sx as usize];
        }
    }
    out
}
