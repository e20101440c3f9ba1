// ============================================================================
// TEXT OPERATIONS — font lookup, single-line layout, text layer rasterization
// ============================================================================
//
// Text is rasterized into a standalone straight-alpha layer in user space and
// handed to the canvas, which draws it through the photo transform and filter
// like any other image. The layer is centered on the target point on both
// axes (middle baseline) and carries the optional underline and drop-shadow.

use std::collections::HashMap;

use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use image::{Rgba, RgbaImage};
use kurbo::Rect;

use crate::canvas::blend_over;
use crate::ops::filters::{blur_coverage, offset_coverage};
use crate::state::{Color, EditState};

/// Drop-shadow parameters, in user-space pixels.
pub const SHADOW_OFFSET: (isize, isize) = (2, 2);
pub const SHADOW_BLUR: f32 = 4.0;
pub const SHADOW_COLOR: [u8; 4] = [0, 0, 0, 128];

/// Italic shear applied when the matched face has no italic of its own.
const SYNTHETIC_SHEAR: f32 = 0.2;

/// Stand-in metrics (fractions of the font size) when no face is available.
const FALLBACK_ADVANCE: f32 = 0.5;
const FALLBACK_ASCENT: f32 = 0.8;
const FALLBACK_DESCENT: f32 = -0.2;

/// Glyphs taller or wider than this are not rasterized.
const MAX_GLYPH_EXTENT: f32 = 8192.0;
/// Largest text layer allocated, in pixels.
const MAX_LAYER_PIXELS: f64 = 64.0 * 1024.0 * 1024.0;
/// Layer corners must stay well inside `i32`.
const MAX_LAYER_COORD: f64 = (1u32 << 30) as f64;

/// Font request built from the text style: style, weight, size, family.
#[derive(Clone, Debug, PartialEq)]
pub struct FontDescriptor {
    pub family: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl FontDescriptor {
    pub fn from_state(state: &EditState) -> Self {
        Self {
            family: state.font_family.clone(),
            size: state.font_size,
            bold: state.text_style.bold,
            italic: state.text_style.italic,
        }
    }

    pub fn weight(&self) -> u16 {
        if self.bold { 700 } else { 400 }
    }

    /// CSS shorthand, e.g. `italic bold 48px Arial`.
    pub fn css(&self) -> String {
        format!(
            "{} {} {}px {}",
            if self.italic { "italic" } else { "normal" },
            if self.bold { "bold" } else { "normal" },
            self.size,
            self.family
        )
    }
}

/// A loaded face plus whether bold/italic must be synthesized on top of it.
#[derive(Clone)]
pub struct LoadedFace {
    pub font: FontArc,
    pub synthetic_bold: bool,
    pub synthetic_italic: bool,
}

/// Load a font by family name, weight and style from the system, falling back
/// to the platform sans-serif when the family is not installed.
/// `weight` is a CSS-style weight value (400=Regular, 700=Bold).
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Option<LoadedFace> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let source = SystemSource::new();
    let handle = source
        .select_best_match(
            &[FamilyName::Title(family.to_string()), FamilyName::SansSerif],
            &props,
        )
        .ok()?;

    let font_data = handle.load().ok()?;
    let matched = font_data.properties();
    let bytes: Vec<u8> = (*font_data.copy_font_data()?).clone();
    let font = FontArc::try_from_vec(bytes).ok()?;

    Some(LoadedFace {
        font,
        synthetic_bold: weight >= 600 && matched.weight.0 < 600.0,
        synthetic_italic: italic && matched.style == Style::Normal,
    })
}

/// Memoizes system font lookups per (family, bold, italic). Misses are cached
/// too so an absent family is only searched for once.
#[derive(Default)]
pub struct FontBook {
    faces: HashMap<(String, bool, bool), Option<LoadedFace>>,
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn face(&mut self, desc: &FontDescriptor) -> Option<&LoadedFace> {
        let key = (desc.family.clone(), desc.bold, desc.italic);
        self.faces
            .entry(key)
            .or_insert_with(|| {
                let face = load_system_font(&desc.family, desc.weight(), desc.italic);
                if face.is_none() {
                    log::warn!("No system font for '{}', text glyphs skipped", desc.css());
                }
                face
            })
            .as_ref()
    }
}

/// A glyph placed on the run, `x` measured from the left edge of the block.
#[derive(Clone, Copy, Debug)]
pub struct PlacedGlyph {
    pub id: GlyphId,
    pub x: f32,
}

/// One laid-out line of text.
#[derive(Clone, Debug, Default)]
pub struct GlyphRun {
    pub glyphs: Vec<PlacedGlyph>,
    pub width: f32,
    pub ascent: f32,
    /// Negative: distance below the baseline.
    pub descent: f32,
}

/// Lay out a single line. With `letter_spacing > 0` each character advances by
/// its own width plus the spacing (no kerning between spaced letters), and the
/// block width is the sum of advances plus spacing between letters.
pub fn layout_run(font: Option<&FontArc>, text: &str, size: f32, letter_spacing: f32) -> GlyphRun {
    let spacing = letter_spacing.max(0.0);
    let count = text.chars().count();
    let gaps = count.saturating_sub(1) as f32 * spacing;

    let Some(font) = font else {
        return GlyphRun {
            glyphs: Vec::new(),
            width: count as f32 * size * FALLBACK_ADVANCE + gaps,
            ascent: size * FALLBACK_ASCENT,
            descent: size * FALLBACK_DESCENT,
        };
    };

    let scaled = font.as_scaled(size);
    let mut glyphs = Vec::with_capacity(count);
    let mut cursor = 0.0f32;
    let mut last: Option<GlyphId> = None;

    for (i, ch) in text.chars().enumerate() {
        let id = font.glyph_id(ch);
        if spacing == 0.0 {
            if let Some(prev) = last {
                cursor += scaled.kern(prev, id);
            }
        } else if i > 0 {
            cursor += spacing;
        }
        glyphs.push(PlacedGlyph { id, x: cursor });
        cursor += scaled.h_advance(id);
        last = Some(id);
    }

    GlyphRun {
        glyphs,
        width: cursor,
        ascent: scaled.ascent(),
        descent: scaled.descent(),
    }
}

/// Everything needed to rasterize the overlay text, in user-space pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TextSpec {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub color: Color,
    pub underline: bool,
    pub shadow: bool,
    pub letter_spacing: f32,
}

impl TextSpec {
    /// Text settings from `state`, anchored at the percentage position on a
    /// `width × height` surface.
    pub fn from_state(state: &EditState, width: f32, height: f32) -> Self {
        Self {
            text: state.display_text(),
            x: width * state.text_position.x / 100.0,
            y: height * state.text_position.y / 100.0,
            size: state.font_size,
            color: state.text_color,
            underline: state.text_style.underline,
            shadow: state.text_style.shadow,
            letter_spacing: state.text_style.letter_spacing,
        }
    }
}

/// A rasterized text layer and its top-left corner in user space.
#[derive(Clone, Debug)]
pub struct TextLayer {
    pub image: RgbaImage,
    pub origin: (i32, i32),
}

impl TextLayer {
    /// Pixel of the layer at user-space position, if covered.
    pub fn pixel_at(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        let lx = x - self.origin.0;
        let ly = y - self.origin.1;
        if lx < 0 || ly < 0 || lx as u32 >= self.image.width() || ly as u32 >= self.image.height() {
            return None;
        }
        Some(self.image.get_pixel(lx as u32, ly as u32).0)
    }
}

/// Rasterize `spec` with `face`, keeping only the part of the layer that
/// falls inside `clip` (user space). Returns `None` for empty text, which
/// draws neither glyphs nor underline, and when nothing of the text is
/// visible. A missing face skips glyphs but keeps the underline and shadow
/// geometry.
pub fn render_text_layer(face: Option<&LoadedFace>, spec: &TextSpec, clip: Rect) -> Option<TextLayer> {
    if spec.text.is_empty() || !(spec.size > 0.0) {
        return None;
    }
    let size = spec.size;
    let run = layout_run(face.map(|f| &f.font), &spec.text, size, spec.letter_spacing);

    let left = spec.x - run.width / 2.0;
    let baseline = spec.y + (run.ascent + run.descent) / 2.0;
    let underline_y = spec.y + size / 4.0;
    let thickness = size / 20.0;

    // Bounds of everything that may receive coverage
    let shear_pad = if face.is_some_and(|f| f.synthetic_italic) { run.ascent * SYNTHETIC_SHEAR } else { 0.0 };
    let shadow_pad = if spec.shadow {
        SHADOW_OFFSET.0.max(SHADOW_OFFSET.1) as f32 + SHADOW_BLUR * 1.5
    } else {
        0.0
    };
    let pad = 2.0 + shadow_pad;
    let bounds = Rect::new(
        (left - pad - shear_pad) as f64,
        ((baseline - run.ascent).min(spec.y - size / 2.0) - pad) as f64,
        (left + run.width + pad + shear_pad + 1.0) as f64,
        ((baseline - run.descent).max(underline_y + thickness) + pad) as f64,
    );

    // Coverage just outside the view can still cast a shadow into it.
    let margin = shadow_pad as f64 + 1.0;
    let visible = bounds.intersect(clip.inflate(margin, margin));
    if !(visible.width() > 0.0 && visible.height() > 0.0) {
        return None;
    }
    let in_range = |v: f64| v.abs() < MAX_LAYER_COORD;
    if ![visible.x0, visible.y0, visible.x1, visible.y1].into_iter().all(in_range) {
        log::warn!("Text layer lies outside the drawable range, skipped");
        return None;
    }
    let ox = visible.x0.floor();
    let oy = visible.y0.floor();
    let wf = (visible.x1.ceil() - ox).max(1.0);
    let hf = (visible.y1.ceil() - oy).max(1.0);
    if wf * hf > MAX_LAYER_PIXELS {
        log::warn!("Text layer of {}x{} px exceeds the raster limit, skipped", wf, hf);
        return None;
    }
    let (ox, oy) = (ox as i32, oy as i32);
    let (w, h) = (wf as usize, hf as usize);

    let mut coverage = vec![0.0f32; w * h];

    if let Some(face) = face {
        rasterize_glyphs(face, &run, size, left, baseline, (ox, oy), w, h, &mut coverage);
    }
    if spec.underline && run.width > 0.0 {
        fill_band(
            &mut coverage,
            w,
            h,
            (left - ox as f32, left + run.width - ox as f32),
            (underline_y - thickness / 2.0 - oy as f32, underline_y + thickness / 2.0 - oy as f32),
        );
    }

    let mut image = RgbaImage::new(w as u32, h as u32);

    if spec.shadow {
        let blurred = blur_coverage(&coverage, w, h, SHADOW_BLUR / 2.0);
        let shadow = offset_coverage(&blurred, w, h, SHADOW_OFFSET.0, SHADOW_OFFSET.1);
        tint_into(&mut image, &shadow, SHADOW_COLOR);
    }
    tint_into(&mut image, &coverage, spec.color.to_rgba());

    Some(TextLayer { image, origin: (ox, oy) })
}

#[allow(clippy::too_many_arguments)]
fn rasterize_glyphs(
    face: &LoadedFace,
    run: &GlyphRun,
    size: f32,
    left: f32,
    baseline: f32,
    origin: (i32, i32),
    w: usize,
    h: usize,
    coverage: &mut [f32],
) {
    let (ox, oy) = origin;
    for g in &run.glyphs {
        let glyph = g.id.with_scale_and_position(size, point(left + g.x, baseline));
        let Some(outlined) = face.font.outline_glyph(glyph) else {
            continue;
        };
        let b = outlined.px_bounds();
        if b.width() > MAX_GLYPH_EXTENT || b.height() > MAX_GLYPH_EXTENT {
            log::debug!("Glyph {:?} of {}x{} px skipped", g.id, b.width(), b.height());
            continue;
        }
        let layer_x = (ox as f32, ox as f32 + w as f32);
        let layer_y = (oy as f32, oy as f32 + h as f32);
        let shear = if face.synthetic_italic { b.height() * SYNTHETIC_SHEAR } else { 0.0 };
        if b.max.x + shear < layer_x.0 || b.min.x - shear > layer_x.1 || b.max.y < layer_y.0 || b.min.y > layer_y.1 {
            continue;
        }
        outlined.draw(|px, py, cov| {
            let mut cx = b.min.x + px as f32;
            let cy = b.min.y + py as f32;
            if face.synthetic_italic {
                cx += (baseline - cy) * SYNTHETIC_SHEAR;
            }
            let ix = cx.round() as i64 - ox as i64;
            let iy = cy.round() as i64 - oy as i64;
            if ix < 0 || iy < 0 || ix as usize >= w || iy as usize >= h {
                return;
            }
            let idx = iy as usize * w + ix as usize;
            coverage[idx] = coverage[idx].max(cov);
            if face.synthetic_bold && (ix as usize + 1) < w {
                coverage[idx + 1] = coverage[idx + 1].max(cov);
            }
        });
    }
}

/// Fill the rectangle `xs × ys` (buffer coordinates) with area coverage, so
/// fractional edges get partial alpha.
fn fill_band(coverage: &mut [f32], w: usize, h: usize, xs: (f32, f32), ys: (f32, f32)) {
    let overlap = |lo: f32, hi: f32, cell: usize| -> f32 {
        let c0 = cell as f32;
        (hi.min(c0 + 1.0) - lo.max(c0)).clamp(0.0, 1.0)
    };
    let y0 = ys.0.floor().max(0.0) as usize;
    let y1 = (ys.1.ceil().max(0.0) as usize).min(h);
    let x0 = xs.0.floor().max(0.0) as usize;
    let x1 = (xs.1.ceil().max(0.0) as usize).min(w);
    for y in y0..y1 {
        let cy = overlap(ys.0, ys.1, y);
        for x in x0..x1 {
            let cov = cy * overlap(xs.0, xs.1, x);
            let idx = y * w + x;
            coverage[idx] = coverage[idx].max(cov);
        }
    }
}

fn tint_into(image: &mut RgbaImage, coverage: &[f32], color: [u8; 4]) {
    for (px, &cov) in image.pixels_mut().zip(coverage) {
        if cov <= 0.001 {
            continue;
        }
        let a = (color[3] as f32 * cov.min(1.0)).round() as u8;
        let Rgba(dst) = px;
        blend_over(dst, [color[0], color[1], color[2], a]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEW: Rect = Rect::new(0.0, 0.0, 400.0, 200.0);

    fn spec(text: &str) -> TextSpec {
        TextSpec {
            text: text.to_string(),
            x: 200.0,
            y: 100.0,
            size: 48.0,
            color: Color::rgb(10, 20, 30),
            underline: false,
            shadow: false,
            letter_spacing: 0.0,
        }
    }

    fn any_font() -> Option<LoadedFace> {
        ["DejaVu Sans", "Liberation Sans", "Arial"]
            .iter()
            .find_map(|f| load_system_font(f, 400, false))
    }

    #[test]
    fn descriptor_css_orders_style_weight_size_family() {
        let mut state = EditState::default();
        assert_eq!(FontDescriptor::from_state(&state).css(), "normal normal 48px Arial");
        state.text_style.bold = true;
        state.text_style.italic = true;
        state.font_family = "Georgia".into();
        let desc = FontDescriptor::from_state(&state);
        assert_eq!(desc.css(), "italic bold 48px Georgia");
        assert_eq!(desc.weight(), 700);
    }

    #[test]
    fn empty_text_renders_nothing() {
        let mut s = spec("");
        s.underline = true;
        s.shadow = true;
        assert!(render_text_layer(None, &s, VIEW).is_none());
    }

    #[test]
    fn fallback_layout_spacing_adds_gaps_between_letters() {
        let plain = layout_run(None, "ABCD", 40.0, 0.0);
        let spaced = layout_run(None, "ABCD", 40.0, 5.0);
        assert_eq!(plain.width, 80.0);
        assert_eq!(spaced.width, 95.0);
        assert!(plain.glyphs.is_empty());
    }

    #[test]
    fn underline_is_centered_below_the_anchor() {
        let mut s = spec("HI");
        s.underline = true;
        let layer = render_text_layer(None, &s, VIEW).expect("layer");
        // fallback width 2 * 24 = 48, centered on x = 200; line at y + 12, 2.4px thick
        let line_y = 112;
        assert_eq!(layer.pixel_at(200, line_y), Some([10, 20, 30, 255]));
        assert_eq!(layer.pixel_at(178, line_y), Some([10, 20, 30, 255]));
        assert_eq!(layer.pixel_at(174, line_y).map(|p| p[3]).unwrap_or(0), 0);
        assert_eq!(layer.pixel_at(226, line_y).map(|p| p[3]).unwrap_or(0), 0);
        assert_eq!(layer.pixel_at(200, 100).map(|p| p[3]).unwrap_or(0), 0);
    }

    #[test]
    fn underline_spans_the_spaced_run() {
        let mut s = spec("HI");
        s.underline = true;
        s.letter_spacing = 10.0;
        let layer = render_text_layer(None, &s, VIEW).expect("layer");
        // 48 + 10 = 58 wide, from x = 171 to 229
        assert_eq!(layer.pixel_at(173, 112), Some([10, 20, 30, 255]));
        assert_eq!(layer.pixel_at(227, 112), Some([10, 20, 30, 255]));
        assert_eq!(layer.pixel_at(168, 112).map(|p| p[3]).unwrap_or(0), 0);
        assert_eq!(layer.pixel_at(232, 112).map(|p| p[3]).unwrap_or(0), 0);
    }

    #[test]
    fn shadow_darkens_below_right_of_underline() {
        let mut s = spec("HI");
        s.underline = true;
        s.shadow = true;
        s.color = Color::WHITE;
        let layer = render_text_layer(None, &s, VIEW).expect("layer");
        // just below the 2.4px line the shadow shows through as translucent black
        let p = layer.pixel_at(205, 115).expect("covered");
        assert!(p[3] > 0 && p[3] < 128);
        assert_eq!(&p[..3], &[0, 0, 0]);
        // the line itself stays the text color
        assert_eq!(layer.pixel_at(205, 112), Some([255, 255, 255, 255]));
    }

    #[test]
    fn glyphs_land_around_the_anchor() {
        let Some(face) = any_font() else {
            eprintln!("no system font available, skipping");
            return;
        };
        let layer = render_text_layer(Some(&face), &spec("HI"), VIEW).expect("layer");
        let covered: Vec<(i32, i32)> = (0..layer.image.height() as i32)
            .flat_map(|y| (0..layer.image.width() as i32).map(move |x| (x, y)))
            .filter(|&(x, y)| layer.image.get_pixel(x as u32, y as u32)[3] > 128)
            .map(|(x, y)| (x + layer.origin.0, y + layer.origin.1))
            .collect();
        assert!(!covered.is_empty());
        let (sx, sy) = covered.iter().fold((0i64, 0i64), |a, p| (a.0 + p.0 as i64, a.1 + p.1 as i64));
        let cx = sx as f32 / covered.len() as f32;
        let cy = sy as f32 / covered.len() as f32;
        assert!((cx - 200.0).abs() < 12.0, "centroid x {cx}");
        assert!((cy - 100.0).abs() < 16.0, "centroid y {cy}");
    }

    #[test]
    fn letter_spacing_widens_real_runs() {
        let Some(face) = any_font() else {
            eprintln!("no system font available, skipping");
            return;
        };
        let plain = layout_run(Some(&face.font), "WAVE", 48.0, 0.0);
        let spaced = layout_run(Some(&face.font), "WAVE", 48.0, 10.0);
        assert_eq!(spaced.glyphs.len(), 4);
        assert!(spaced.width >= plain.width + 30.0 - 1e-3);
        assert_eq!(spaced.glyphs[0].x, 0.0);
    }

    #[test]
    fn oversized_text_is_cut_to_the_view() {
        let mut s = spec("HI");
        s.size = 1.0e9;
        s.underline = true;
        s.shadow = true;
        let layer = render_text_layer(None, &s, VIEW).expect("layer");
        let margin = (SHADOW_OFFSET.0 as f32 + SHADOW_BLUR * 1.5 + 2.0) as u32;
        assert!(layer.image.width() <= 400 + 2 * margin);
        assert!(layer.image.height() <= 200 + 2 * margin);
    }

    #[test]
    fn text_outside_the_view_is_skipped() {
        let mut s = spec("HI");
        s.x = 5000.0;
        s.underline = true;
        assert!(render_text_layer(None, &s, VIEW).is_none());
    }

    #[test]
    fn huge_glyphs_are_not_rasterized() {
        let Some(face) = any_font() else {
            eprintln!("no system font available, skipping");
            return;
        };
        let mut s = spec("HI");
        s.size = 1.0e9;
        let layer = render_text_layer(Some(&face), &s, VIEW).expect("layer");
        assert!(layer.image.pixels().all(|p| p[3] == 0));
    }
}
