// ============================================================================
// DRAWING SURFACE — RGBA raster plus a 2D context with a save/restore stack
// ============================================================================
//
// `Surface` owns the pixels (straight alpha, row-major). `Context` borrows the
// surface mutably and carries the current draw state: an affine transform
// (user space -> device pixels) and the photo filter chain. `save()` returns a
// guard that restores the previous draw state when it goes out of scope, so a
// push can never outlive the block that made it.
//
// All fills are inverse-mapped: each device pixel center is pulled back into
// user space and tested against the destination rectangle. No anti-aliasing
// on shape edges; sampled images are bilinear.

use std::ops::{Deref, DerefMut};

use image::RgbaImage;
use kurbo::{Affine, Point, Rect, Vec2};
use rayon::prelude::*;

use crate::ops::adjustments::FilterChain;
use crate::ops::transform::sample_bilinear;

/// The raster target the compositor renders into.
#[derive(Clone, Debug)]
pub struct Surface {
    pixels: RgbaImage,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width.max(1), height.max(1)),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Resize to `width × height`. Reallocates (and so clears) only when the
    /// size actually changes; returns whether it did.
    pub fn resize_if_changed(&mut self, width: u32, height: u32) -> bool {
        let (width, height) = (width.max(1), height.max(1));
        if self.pixels.dimensions() == (width, height) {
            return false;
        }
        self.pixels = RgbaImage::new(width, height);
        true
    }

    /// Set every pixel to transparent black.
    pub fn clear(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn context(&mut self) -> Context<'_> {
        Context {
            surface: self,
            current: DrawState::default(),
            stack: Vec::new(),
        }
    }
}

/// Transform and filter in effect for draw calls.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawState {
    pub transform: Affine,
    pub filter: FilterChain,
}

impl Default for DrawState {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            filter: FilterChain::default(),
        }
    }
}

/// A 2D drawing context over a borrowed surface.
pub struct Context<'s> {
    surface: &'s mut Surface,
    current: DrawState,
    stack: Vec<DrawState>,
}

impl<'s> Context<'s> {
    /// Push the current draw state. The returned guard derefs to this context
    /// and pops the state again when dropped.
    pub fn save(&mut self) -> SavedState<'_, 's> {
        self.stack.push(self.current);
        SavedState { ctx: self }
    }

    fn restore(&mut self) {
        if let Some(prev) = self.stack.pop() {
            self.current = prev;
        }
    }

    /// Number of saved states currently pushed.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn state(&self) -> DrawState {
        self.current
    }

    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    pub fn set_filter(&mut self, filter: FilterChain) {
        self.current.filter = filter;
    }

    /// Post-multiply an arbitrary transform (applies before the current one).
    pub fn transform(&mut self, t: Affine) {
        self.current.transform = self.current.transform * t;
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform(Affine::translate(Vec2::new(dx, dy)));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.transform(Affine::scale_non_uniform(sx, sy));
    }

    /// Clear the whole surface, ignoring the transform.
    pub fn clear(&mut self) {
        self.surface.clear();
    }

    /// Fill a user-space rectangle with a flat color.
    pub fn fill_rect(&mut self, rect: Rect, color: [u8; 4]) {
        let color = self.current.filter.apply_pixel(color);
        if color[3] == 0 {
            return;
        }
        self.paint(rect, |_| color);
    }

    /// Draw `img` stretched over the user-space rectangle `dest`.
    pub fn draw_image(&mut self, img: &RgbaImage, dest: Rect) {
        let (iw, ih) = img.dimensions();
        if iw == 0 || ih == 0 || dest.width() <= 0.0 || dest.height() <= 0.0 {
            return;
        }
        let sx = iw as f64 / dest.width();
        let sy = ih as f64 / dest.height();
        let filter = self.current.filter;
        self.paint(dest, |p| {
            let u = (p.x - dest.x0) * sx - 0.5;
            let v = (p.y - dest.y0) * sy - 0.5;
            filter.apply_pixel(sample_bilinear(img, u, v).0)
        });
    }

    /// Inverse-map every device pixel whose center lands inside `dest` and
    /// composite `shade(user_point)` over it.
    fn paint<F>(&mut self, dest: Rect, shade: F)
    where
        F: Fn(Point) -> [u8; 4] + Sync,
    {
        let t = self.current.transform;
        if t.determinant().abs() < 1e-12 {
            return;
        }
        let inv = t.inverse();

        let (w, h) = (self.surface.width(), self.surface.height());
        let corners = [
            t * Point::new(dest.x0, dest.y0),
            t * Point::new(dest.x1, dest.y0),
            t * Point::new(dest.x0, dest.y1),
            t * Point::new(dest.x1, dest.y1),
        ];
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

        let x0 = min_x.floor().max(0.0) as usize;
        let y0 = min_y.floor().max(0.0) as usize;
        let x1 = (max_x.ceil().max(0.0) as usize).min(w as usize);
        let y1 = (max_y.ceil().max(0.0) as usize).min(h as usize);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        let stride = w as usize * 4;
        let raw: &mut [u8] = &mut self.surface.pixels;
        raw.par_chunks_mut(stride)
            .enumerate()
            .skip(y0)
            .take(y1 - y0)
            .for_each(|(y, row)| {
                for x in x0..x1 {
                    let p = inv * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                    if p.x < dest.x0 || p.x >= dest.x1 || p.y < dest.y0 || p.y >= dest.y1 {
                        continue;
                    }
                    let src = shade(p);
                    let i = x * 4;
                    blend_over(&mut row[i..i + 4], src);
                }
            });
    }
}

/// Scoped save/restore: created by `Context::save`, restores on drop.
pub struct SavedState<'c, 's> {
    ctx: &'c mut Context<'s>,
}

impl<'s> Deref for SavedState<'_, 's> {
    type Target = Context<'s>;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl<'s> DerefMut for SavedState<'_, 's> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for SavedState<'_, '_> {
    fn drop(&mut self) {
        self.ctx.restore();
    }
}

/// Source-over for straight-alpha RGBA8.
pub fn blend_over(dst: &mut [u8], src: [u8; 4]) {
    // Fast paths: nothing to draw / fully opaque overwrite
    if src[3] == 0 {
        return;
    }
    if src[3] == 255 || dst[3] == 0 {
        dst.copy_from_slice(&src);
        return;
    }

    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let s = src[c] as f32;
        let d = dst[c] as f32;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        dst[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
