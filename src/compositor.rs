// ============================================================================
// COMPOSITOR — one frame from the edit state and the cached images
// ============================================================================
//
// Layer order, bottom to top, all inside one filtered + transformed context:
//   no cut-out yet          : original, text
//   cut-out, background on  : original, text, cut-out
//   cut-out, background off : flat fill, text, cut-out
// so text always sits behind the subject and in front of the background.

use kurbo::Rect;

use crate::cache::ImageCache;
use crate::canvas::{Context, Surface};
use crate::ops::adjustments::FilterChain;
use crate::ops::text::{FontBook, FontDescriptor, TextSpec, render_text_layer};
use crate::ops::transform::photo_transform;
use crate::state::EditState;

/// Which layering a frame used.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layering {
    Original,
    OriginalBehindCutOut,
    FillBehindCutOut,
}

impl Layering {
    pub fn for_frame(has_cut_out: bool, show_background: bool) -> Self {
        match (has_cut_out, show_background) {
            (false, _) => Layering::Original,
            (true, true) => Layering::OriginalBehindCutOut,
            (true, false) => Layering::FillBehindCutOut,
        }
    }
}

/// Renders frames; owns the font lookups so repeated frames reuse faces.
#[derive(Default)]
pub struct Compositor {
    fonts: FontBook,
}

impl Compositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render one frame into `surface`. Returns the layering used, or `None`
    /// when there is no original image yet (the surface is left untouched).
    pub fn render(
        &mut self,
        state: &EditState,
        cache: &ImageCache,
        surface: &mut Surface,
    ) -> Option<Layering> {
        let original = cache.original()?;
        let (w, h) = original.fit.to_pixels();
        surface.resize_if_changed(w, h);

        let frame = Rect::new(0.0, 0.0, w as f64, h as f64);
        let layering = Layering::for_frame(cache.processed().is_some(), state.show_background);

        let filter = FilterChain::from_edits(&state.photo_edits);
        let mut ctx = surface.context();
        ctx.clear();
        {
            let mut photo = ctx.save();
            photo.set_filter(filter);
            photo.transform(photo_transform(w as f64, h as f64, &state.photo_edits));

            match layering {
                Layering::Original | Layering::OriginalBehindCutOut => {
                    photo.draw_image(&original.display, frame);
                }
                Layering::FillBehindCutOut => {
                    photo.fill_rect(frame, state.background_color.to_rgba());
                }
            }

            draw_text(&mut self.fonts, &mut photo, state, w, h);

            if let Some(cut_out) = cache.processed() {
                photo.draw_image(&cut_out.display, frame);
            }
        }
        debug_assert_eq!(ctx.depth(), 0);

        log::trace!("Rendered {}x{} frame ({:?}, {})", w, h, layering, filter.css());
        Some(layering)
    }
}

fn draw_text(fonts: &mut FontBook, ctx: &mut Context<'_>, state: &EditState, w: u32, h: u32) {
    if state.background_text.is_empty() {
        return;
    }
    // User-space area that can reach the surface under the photo transform
    let t = ctx.state().transform;
    if t.determinant().abs() < 1e-12 {
        return;
    }
    let view = t
        .inverse()
        .transform_rect_bbox(Rect::new(0.0, 0.0, w as f64, h as f64));
    let desc = FontDescriptor::from_state(state);
    let face = fonts.face(&desc).cloned();
    let spec = TextSpec::from_state(state, w as f32, h as f32);
    let Some(layer) = render_text_layer(face.as_ref(), &spec, view) else {
        return;
    };
    let (ox, oy) = (layer.origin.0 as f64, layer.origin.1 as f64);
    let dest = Rect::new(
        ox,
        oy,
        ox + layer.image.width() as f64,
        oy + layer.image.height() as f64,
    );
    ctx.draw_image(&layer.image, dest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedImage;
    use crate::state::{Color, EditAction, StyleFlag};
    use image::{Rgba, RgbaImage};

    fn cache_with(original: RgbaImage, cut_out: Option<RgbaImage>) -> ImageCache {
        let mut cache = ImageCache::new(800, 600);
        let t = cache.begin_original();
        cache.complete(t, CachedImage::build(original, 800, 600));
        if let Some(cut) = cut_out {
            let t = cache.begin_processed();
            cache.complete(t, CachedImage::build(cut, 800, 600));
        }
        cache
    }

    #[test]
    fn no_original_is_a_no_op() {
        let mut surface = Surface::new(2, 2);
        let cache = ImageCache::new(800, 600);
        let out = Compositor::new().render(&EditState::default(), &cache, &mut surface);
        assert!(out.is_none());
        assert_eq!(surface.width(), 2);
    }

    #[test]
    fn surface_takes_the_fitted_size() {
        let cache = cache_with(RgbaImage::from_pixel(1600, 1200, Rgba([1, 1, 1, 255])), None);
        let mut surface = Surface::new(1, 1);
        let layering = Compositor::new().render(&EditState::default(), &cache, &mut surface);
        assert_eq!(layering, Some(Layering::Original));
        assert_eq!((surface.width(), surface.height()), (800, 600));
    }

    #[test]
    fn fill_replaces_background_behind_transparent_cut_out() {
        let cache = cache_with(
            RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255])),
            Some(RgbaImage::new(4, 4)),
        );
        let state = EditState {
            show_background: false,
            background_color: Color::rgb(0x11, 0x22, 0x33),
            ..EditState::default()
        };
        let mut surface = Surface::new(1, 1);
        let layering = Compositor::new().render(&state, &cache, &mut surface);
        assert_eq!(layering, Some(Layering::FillBehindCutOut));
        assert!(surface.pixels().pixels().all(|p| p.0 == [0x11, 0x22, 0x33, 255]));
    }

    #[test]
    fn original_shows_through_when_background_kept() {
        let cache = cache_with(
            RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255])),
            Some(RgbaImage::new(4, 4)),
        );
        let mut surface = Surface::new(1, 1);
        let layering = Compositor::new().render(&EditState::default(), &cache, &mut surface);
        assert_eq!(layering, Some(Layering::OriginalBehindCutOut));
        assert_eq!(surface.pixel(1, 1), [200, 0, 0, 255]);
    }

    #[test]
    fn filters_do_not_leak_into_next_frame() {
        let cache = cache_with(RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255])), None);
        let mut compositor = Compositor::new();
        let mut surface = Surface::new(1, 1);

        let mut dim = EditState::default();
        dim.photo_edits.brightness = 50.0;
        compositor.render(&dim, &cache, &mut surface);
        assert_eq!(surface.pixel(0, 0), [50, 50, 50, 255]);

        compositor.render(&EditState::default(), &cache, &mut surface);
        assert_eq!(surface.pixel(0, 0), [100, 100, 100, 255]);
    }

    #[test]
    fn huge_font_size_still_renders_the_frame() {
        let cache = cache_with(RgbaImage::from_pixel(4, 4, Rgba([200, 0, 0, 255])), None);
        let state = EditState::default()
            .apply(EditAction::SetBackgroundText("HI".into()))
            .apply(EditAction::SetFontSize(1.0e9));
        let mut surface = Surface::new(1, 1);
        let layering = Compositor::new().render(&state, &cache, &mut surface);
        assert_eq!(layering, Some(Layering::Original));
        assert!(surface.pixels().pixels().all(|p| p.0 == [200, 0, 0, 255]));
    }

    /// 80x60 green original; cut-out opaque red on the left half only.
    fn half_cut_out() -> ImageCache {
        let mut cut = RgbaImage::new(80, 60);
        for y in 0..60 {
            for x in 0..40 {
                cut.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        cache_with(RgbaImage::from_pixel(80, 60, Rgba([0, 255, 0, 255])), Some(cut))
    }

    /// Blank text (no glyph outlines in any font) with an underline at
    /// y = 30 + 40/4 = 40, two pixels thick, centered on x = 40.
    fn underlined(show_background: bool) -> EditState {
        EditState::default()
            .apply(EditAction::SetBackgroundText("    ".into()))
            .apply(EditAction::SetFontSize(40.0))
            .apply(EditAction::SetTextColor(Color::BLACK))
            .apply(EditAction::SetStyleFlag(StyleFlag::Underline, true))
            .apply(EditAction::SetBackgroundColor(Color::rgb(0x11, 0x22, 0x33)))
            .apply(EditAction::SetShowBackground(show_background))
    }

    #[test]
    fn text_sits_between_fill_and_cut_out() {
        let mut surface = Surface::new(1, 1);
        let layering = Compositor::new().render(&underlined(false), &half_cut_out(), &mut surface);
        assert_eq!(layering, Some(Layering::FillBehindCutOut));
        assert_eq!(surface.pixel(35, 40), [255, 0, 0, 255]);
        assert_eq!(surface.pixel(45, 40), [0, 0, 0, 255]);
        assert_eq!(surface.pixel(45, 5), [0x11, 0x22, 0x33, 255]);
    }

    #[test]
    fn text_sits_between_original_and_cut_out() {
        let mut surface = Surface::new(1, 1);
        let layering = Compositor::new().render(&underlined(true), &half_cut_out(), &mut surface);
        assert_eq!(layering, Some(Layering::OriginalBehindCutOut));
        assert_eq!(surface.pixel(35, 40), [255, 0, 0, 255]);
        assert_eq!(surface.pixel(45, 40), [0, 0, 0, 255]);
        assert_eq!(surface.pixel(45, 5), [0, 255, 0, 255]);
    }
}
