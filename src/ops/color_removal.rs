use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};

use crate::ops::ai::{BackgroundRemover, RemovalConfig, RemovalError};

/// Offline background removal by color key:
///
/// 1. **Key color** — the dominant color along the image border.
/// 2. **Flood fill** (BFS) from every border pixel within `tolerance` of the key
///    → core mask of border-connected background.
/// 3. **Mask dilation** — expand the mask by `softness` pixels (1px rings).
/// 4. **Color-to-Alpha** — core pixels become fully transparent; fringe pixels
///    lose alpha by their max-channel closeness to the key, fading with ring
///    distance, with RGB recovered from the un-mixed color.
///
/// Works well for studio shots on flat backdrops; busy scenes need a model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorKeyRemover {
    /// 0–100, scaled to RGB distance.
    pub tolerance: f32,
    /// Fringe width in pixels.
    pub softness: u32,
}

impl Default for ColorKeyRemover {
    fn default() -> Self {
        Self {
            tolerance: 12.0,
            softness: 2,
        }
    }
}

impl BackgroundRemover for ColorKeyRemover {
    fn name(&self) -> &str {
        "color key"
    }

    fn remove(&self, input: &[u8], config: &RemovalConfig) -> Result<Vec<u8>, RemovalError> {
        let src = image::load_from_memory(input)?.to_rgba8();
        let mut out = self.key_out(&src);
        if config.return_mask {
            alpha_to_mask(&mut out);
        }
        log::info!(
            "Color-key removal on {}x{} (tolerance {}, softness {})",
            src.width(),
            src.height(),
            self.tolerance,
            self.softness
        );
        crate::io::encode_png(&out).map_err(|e| RemovalError::InvalidOutput(e.to_string()))
    }
}

impl ColorKeyRemover {
    /// Return a copy of `pixels` with the border-connected key color removed.
    pub fn key_out(&self, pixels: &RgbaImage) -> RgbaImage {
        let mut out = pixels.clone();
        let (w, h) = pixels.dimensions();
        if w == 0 || h == 0 {
            return out;
        }
        let Some(key) = dominant_border_color(pixels) else {
            return out;
        };
        let tol = self.tolerance.clamp(0.0, 100.0) * 2.55;
        let tol_sq = tol * tol;

        // ====================================================================
        // Step 1: core mask via BFS from the whole border
        // ====================================================================
        let pixel_count = (w * h) as usize;
        let mut core_mask = vec![false; pixel_count];
        let mut queue = VecDeque::with_capacity(1024);

        let seed = |x: u32, y: u32, core_mask: &mut [bool], queue: &mut VecDeque<(u32, u32)>| {
            let idx = (y * w + x) as usize;
            if core_mask[idx] {
                return;
            }
            let p = pixels.get_pixel(x, y);
            if p[3] == 0 || color_dist_sq(p, &key) <= tol_sq {
                core_mask[idx] = true;
                queue.push_back((x, y));
            }
        };
        for x in 0..w {
            seed(x, 0, &mut core_mask, &mut queue);
            seed(x, h - 1, &mut core_mask, &mut queue);
        }
        for y in 0..h {
            seed(0, y, &mut core_mask, &mut queue);
            seed(w - 1, y, &mut core_mask, &mut queue);
        }

        while let Some((px, py)) = queue.pop_front() {
            for (nx, ny) in neighbors(px, py) {
                if nx >= w || ny >= h {
                    continue;
                }
                let idx = (ny * w + nx) as usize;
                if core_mask[idx] {
                    continue;
                }
                let p = pixels.get_pixel(nx, ny);
                if p[3] == 0 || color_dist_sq(p, &key) <= tol_sq {
                    core_mask[idx] = true;
                    queue.push_back((nx, ny));
                }
            }
        }

        // ====================================================================
        // Step 2: dilate by `softness` rings
        // ====================================================================
        // 0 = core, 1..=softness = fringe, u32::MAX = untouched.
        let mut distance: Vec<u32> = core_mask
            .iter()
            .map(|&m| if m { 0 } else { u32::MAX })
            .collect();

        if self.softness > 0 {
            let mut frontier: VecDeque<(u32, u32)> = VecDeque::new();
            for y in 0..h {
                for x in 0..w {
                    if !core_mask[(y * w + x) as usize] {
                        continue;
                    }
                    for (nx, ny) in neighbors(x, y) {
                        if nx >= w || ny >= h {
                            continue;
                        }
                        let nidx = (ny * w + nx) as usize;
                        if distance[nidx] == u32::MAX {
                            distance[nidx] = 1;
                            frontier.push_back((nx, ny));
                        }
                    }
                }
            }

            while let Some((px, py)) = frontier.pop_front() {
                let cur = distance[(py * w + px) as usize];
                if cur >= self.softness {
                    continue;
                }
                for (nx, ny) in neighbors(px, py) {
                    if nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if distance[nidx] == u32::MAX {
                        distance[nidx] = cur + 1;
                        frontier.push_back((nx, ny));
                    }
                }
            }
        }

        // ====================================================================
        // Step 3: color-to-alpha (parallel by row)
        // ====================================================================
        let softness = self.softness;
        let stride = w as usize * 4;
        let raw: &mut [u8] = &mut out;
        raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let dist = distance[y * w as usize + x];
                if dist == u32::MAX || px[3] == 0 {
                    continue;
                }
                if dist == 0 {
                    px.copy_from_slice(&[0, 0, 0, 0]);
                    continue;
                }
                let rgba = [px[0], px[1], px[2], px[3]];
                px.copy_from_slice(&fringe_pixel(rgba, &key, dist, softness));
            }
        });

        out
    }
}

/// Partial removal of a fringe pixel `dist` rings away from the core.
fn fringe_pixel(p: [u8; 4], key: &[f32; 3], dist: u32, softness: u32) -> [u8; 4] {
    let rgb = [p[0] as f32, p[1] as f32, p[2] as f32];
    let max_d = (0..3)
        .map(|c| (rgb[c] - key[c]).abs() / 255.0)
        .fold(0.0f32, f32::max);

    let fade = 1.0 - (dist as f32 / (softness as f32 + 1.0));
    let removal = ((1.0 - max_d) * fade).clamp(0.0, 1.0);
    if removal < 0.004 {
        return p;
    }

    let new_a = ((p[3] as f32 / 255.0) * (1.0 - removal) * 255.0)
        .round()
        .clamp(0.0, 255.0) as u8;
    if new_a == 0 {
        return [0, 0, 0, 0];
    }

    // orig = key * removal + result * kept
    let kept = 1.0 - removal;
    let recover = |orig: f32, key_ch: f32| -> u8 {
        if kept < 0.001 {
            return orig as u8;
        }
        ((orig - key_ch * removal) / kept).round().clamp(0.0, 255.0) as u8
    };
    [
        recover(rgb[0], key[0]),
        recover(rgb[1], key[1]),
        recover(rgb[2], key[2]),
        new_a,
    ]
}

/// Mean color of the most common 16-level bucket among opaque border pixels.
fn dominant_border_color(pixels: &RgbaImage) -> Option<[f32; 3]> {
    let (w, h) = pixels.dimensions();
    let mut buckets: HashMap<[u8; 3], (u32, [u64; 3])> = HashMap::new();
    let mut visit = |x: u32, y: u32| {
        let p = pixels.get_pixel(x, y);
        if p[3] == 0 {
            return;
        }
        let entry = buckets
            .entry([p[0] >> 4, p[1] >> 4, p[2] >> 4])
            .or_insert((0, [0; 3]));
        entry.0 += 1;
        for c in 0..3 {
            entry.1[c] += p[c] as u64;
        }
    };
    for x in 0..w {
        visit(x, 0);
        if h > 1 {
            visit(x, h - 1);
        }
    }
    for y in 1..h.saturating_sub(1) {
        visit(0, y);
        if w > 1 {
            visit(w - 1, y);
        }
    }

    let (count, sums) = buckets
        .into_values()
        .max_by_key(|(count, _)| *count)?;
    let n = count as f32;
    Some([sums[0] as f32 / n, sums[1] as f32 / n, sums[2] as f32 / n])
}

/// Turn the alpha channel into an opaque grayscale mask.
fn alpha_to_mask(img: &mut RgbaImage) {
    for p in img.pixels_mut() {
        let a = p[3];
        *p = Rgba([a, a, a, 255]);
    }
}

#[inline]
fn neighbors(x: u32, y: u32) -> [(u32, u32); 4] {
    [
        (x.wrapping_sub(1), y),
        (x + 1, y),
        (x, y.wrapping_sub(1)),
        (x, y + 1),
    ]
}

/// Squared Euclidean distance in RGB space.
#[inline]
fn color_dist_sq(pixel: &Rgba<u8>, key: &[f32; 3]) -> f32 {
    let dr = pixel[0] as f32 - key[0];
    let dg = pixel[1] as f32 - key[1];
    let db = pixel[2] as f32 - key[2];
    dr * dr + dg * dg + db * db
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 11×11 green backdrop with a 5×5 red subject in the middle.
    fn studio_shot() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(11, 11, Rgba([0, 200, 0, 255]));
        for y in 3..8 {
            for x in 3..8 {
                img.put_pixel(x, y, Rgba([220, 30, 30, 255]));
            }
        }
        img
    }

    #[test]
    fn border_background_becomes_transparent() {
        let remover = ColorKeyRemover { tolerance: 10.0, softness: 0 };
        let out = remover.key_out(&studio_shot());
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(10, 5)[3], 0);
        assert_eq!(out.get_pixel(2, 2)[3], 0);
        assert_eq!(*out.get_pixel(5, 5), Rgba([220, 30, 30, 255]));
    }

    #[test]
    fn enclosed_key_color_is_kept() {
        // a green pixel inside the subject is not border-connected
        let mut img = studio_shot();
        img.put_pixel(5, 5, Rgba([0, 200, 0, 255]));
        let out = ColorKeyRemover { tolerance: 10.0, softness: 0 }.key_out(&img);
        assert_eq!(*out.get_pixel(5, 5), Rgba([0, 200, 0, 255]));
    }

    #[test]
    fn distant_subject_survives_softness() {
        let out = ColorKeyRemover { tolerance: 10.0, softness: 2 }.key_out(&studio_shot());
        // red is far from green on every channel that matters: only a little removal
        let edge = out.get_pixel(3, 5);
        assert!(edge[3] > 100, "edge alpha {}", edge[3]);
        // three rings in: beyond the fringe
        assert_eq!(*out.get_pixel(5, 5), Rgba([220, 30, 30, 255]));
    }

    #[test]
    fn dominant_border_color_picks_majority() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([10, 10, 250, 255]));
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let key = dominant_border_color(&img).unwrap();
        assert_eq!(key, [10.0, 10.0, 250.0]);
    }

    #[test]
    fn remove_returns_png_and_mask_mode() {
        let bytes = crate::io::encode_png(&studio_shot()).unwrap();
        let remover = ColorKeyRemover { tolerance: 10.0, softness: 0 };

        let cut = remover.remove(&bytes, &RemovalConfig::default()).unwrap();
        let cut = image::load_from_memory(&cut).unwrap().to_rgba8();
        assert_eq!(cut.get_pixel(0, 0)[3], 0);

        let cfg = RemovalConfig { return_mask: true, ..Default::default() };
        let mask = remover.remove(&bytes, &cfg).unwrap();
        let mask = image::load_from_memory(&mask).unwrap().to_rgba8();
        assert_eq!(*mask.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*mask.get_pixel(5, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn undecodable_input_is_an_error() {
        let err = ColorKeyRemover::default()
            .remove(b"not an image", &RemovalConfig::default())
            .unwrap_err();
        assert!(matches!(err, RemovalError::Image(_)));
    }
}
