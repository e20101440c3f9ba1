// ============================================================================
// TRANSFORM OPERATIONS — display fitting, photo transform, resampling
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use kurbo::{Affine, Vec2};

use crate::state::PhotoEdits;

/// Default display bounds for the drawing surface.
pub const MAX_DISPLAY_WIDTH: u32 = 800;
pub const MAX_DISPLAY_HEIGHT: u32 = 600;

/// A fitted size. Fractional: the exact aspect ratio is preserved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitSize {
    pub width: f64,
    pub height: f64,
}

impl FitSize {
    /// Whole-pixel size a raster surface takes for this fit (truncated, min 1).
    pub fn to_pixels(self) -> (u32, u32) {
        (
            (self.width.floor() as u32).max(1),
            (self.height.floor() as u32).max(1),
        )
    }
}

/// Shrink `width × height` to fit inside `max_width × max_height`, keeping the
/// aspect ratio. Sizes that already fit are returned unchanged. When both axes
/// overflow, the axis with the larger overflow ratio becomes the constraint.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> FitSize {
    let mut w = width as f64;
    let mut h = height as f64;
    if width == 0 || height == 0 || max_width == 0 || max_height == 0 {
        return FitSize { width: w, height: h };
    }
    let aspect = w / h;

    if width > max_width || height > max_height {
        if w / max_width as f64 > h / max_height as f64 {
            w = max_width as f64;
            h = w / aspect;
        } else {
            h = max_height as f64;
            w = h * aspect;
        }
    }

    FitSize { width: w, height: h }
}

/// Photo transform for a `width × height` surface: rotate and flip about the
/// center, then scale uniformly by `zoom / 100` about the origin.
pub fn photo_transform(width: f64, height: f64, edits: &PhotoEdits) -> Affine {
    let center = Vec2::new(width / 2.0, height / 2.0);
    let flip_x = if edits.flip_h { -1.0 } else { 1.0 };
    let flip_y = if edits.flip_v { -1.0 } else { 1.0 };
    let zoom = edits.zoom as f64 / 100.0;

    // Canvas-style post-multiplication: the last factor touches points first.
    Affine::translate(center)
        * Affine::rotate((edits.rotate as f64).to_radians())
        * Affine::scale_non_uniform(flip_x, flip_y)
        * Affine::translate(-center)
        * Affine::scale(zoom)
}

/// Resample `src` to exactly `width × height` (no-op clone when equal).
pub fn resample(src: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if src.dimensions() == (width, height) {
        return src.clone();
    }
    imageops::resize(src, width, height, imageops::FilterType::Triangle)
}

/// Bilinear sample at pixel-space position (`x`, `y`), where integer
/// coordinates are pixel centers. Coordinates are clamped to the image edge.
pub fn sample_bilinear(img: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Rgba([0, 0, 0, 0]);
    }
    let x = x.clamp(0.0, (w - 1) as f64);
    let y = y.clamp(0.0, (h - 1) as f64);
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let fx = (x - x0 as f64) as f32;
    let fy = (y - y0 as f64) as f32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);

    // Exact hits skip the blend so unscaled draws reproduce source pixels.
    if fx == 0.0 && fy == 0.0 {
        return *img.get_pixel(x0, y0);
    }

    let px = |sx: u32, sy: u32| -> [f32; 4] {
        let p = img.get_pixel(sx, sy);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };
    let tl = px(x0, y0);
    let tr = px(x1, y0);
    let bl = px(x0, y1);
    let br = px(x1, y1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Point;

    fn ratio(w: f64, h: f64) -> f64 {
        w / h
    }

    #[test]
    fn large_landscape_scales_to_bounds() {
        let fit = fit_within(1600, 1200, 800, 600);
        assert_eq!(fit, FitSize { width: 800.0, height: 600.0 });
        assert_eq!(fit.to_pixels(), (800, 600));
    }

    #[test]
    fn fitting_source_is_unchanged() {
        let fit = fit_within(640, 480, 800, 600);
        assert_eq!(fit, FitSize { width: 640.0, height: 480.0 });
        let fit = fit_within(800, 600, 800, 600);
        assert_eq!(fit, FitSize { width: 800.0, height: 600.0 });
    }

    #[test]
    fn larger_overflow_axis_constrains() {
        // width overflow 2.0, height overflow 1.5 -> width wins
        let fit = fit_within(1600, 900, 800, 600);
        assert_eq!(fit.width, 800.0);
        assert_eq!(fit.height, 450.0);
        // tall image: height overflow dominates
        let fit = fit_within(900, 3000, 800, 600);
        assert_eq!(fit.height, 600.0);
        assert!((fit.width - 180.0).abs() < 1e-9);
    }

    #[test]
    fn single_axis_overflow_still_fits() {
        let fit = fit_within(1000, 100, 800, 600);
        assert_eq!(fit.width, 800.0);
        assert!((fit.height - 80.0).abs() < 1e-9);
    }

    #[test]
    fn fit_preserves_ratio_and_bounds_over_a_grid() {
        let sizes = [1u32, 3, 17, 299, 600, 601, 799, 800, 801, 1024, 4000, 9999];
        let bounds = [(800u32, 600u32), (100, 100), (1, 50), (640, 1136)];
        for &w in &sizes {
            for &h in &sizes {
                for &(mw, mh) in &bounds {
                    let fit = fit_within(w, h, mw, mh);
                    let rel = (ratio(fit.width, fit.height) - ratio(w as f64, h as f64)).abs()
                        / ratio(w as f64, h as f64);
                    assert!(rel < 1e-9, "{w}x{h} in {mw}x{mh}: ratio drift {rel}");
                    assert!(fit.width <= mw as f64 + 1e-9, "{w}x{h} in {mw}x{mh}");
                    assert!(fit.height <= mh as f64 + 1e-9, "{w}x{h} in {mw}x{mh}");
                    if w <= mw && h <= mh {
                        assert_eq!(fit, FitSize { width: w as f64, height: h as f64 });
                    }
                }
            }
        }
    }

    #[test]
    fn identity_edits_give_identity_transform() {
        let t = photo_transform(800.0, 600.0, &PhotoEdits::DEFAULT);
        let p = t * Point::new(12.5, 99.5);
        assert!((p.x - 12.5).abs() < 1e-9 && (p.y - 99.5).abs() < 1e-9);
    }

    #[test]
    fn flip_mirrors_about_center() {
        let edits = PhotoEdits { flip_h: true, ..PhotoEdits::DEFAULT };
        let p = photo_transform(800.0, 600.0, &edits) * Point::new(0.5, 10.0);
        assert!((p.x - 799.5).abs() < 1e-9);
        assert!((p.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rotate_turns_about_center() {
        let edits = PhotoEdits { rotate: 180.0, ..PhotoEdits::DEFAULT };
        let p = photo_transform(100.0, 50.0, &edits) * Point::new(0.0, 0.0);
        assert!((p.x - 100.0).abs() < 1e-9);
        assert!((p.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_scales_from_origin() {
        let edits = PhotoEdits { zoom: 200.0, ..PhotoEdits::DEFAULT };
        let p = photo_transform(100.0, 100.0, &edits) * Point::new(10.0, 20.0);
        assert!((p.x - 20.0).abs() < 1e-9);
        assert!((p.y - 40.0).abs() < 1e-9);
    }

    #[test]
    fn bilinear_hits_pixel_centers_exactly() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 255]));
        img.put_pixel(1, 0, Rgba([30, 40, 50, 255]));
        assert_eq!(sample_bilinear(&img, 0.0, 0.0), Rgba([10, 20, 30, 255]));
        assert_eq!(sample_bilinear(&img, 1.0, 0.0), Rgba([30, 40, 50, 255]));
        assert_eq!(sample_bilinear(&img, 0.5, 0.0), Rgba([20, 30, 40, 255]));
        // clamped past the edge
        assert_eq!(sample_bilinear(&img, 7.0, -3.0), Rgba([30, 40, 50, 255]));
    }

    #[test]
    fn resample_keeps_equal_sizes() {
        let img = RgbaImage::from_pixel(3, 2, Rgba([1, 2, 3, 4]));
        assert_eq!(resample(&img, 3, 2), img);
        assert_eq!(resample(&img, 6, 4).dimensions(), (6, 4));
    }
}
