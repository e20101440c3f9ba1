// ============================================================================
// ADJUSTMENT OPERATIONS — the photo filter chain applied to every draw call
// ============================================================================
//
// Each stage follows the CSS filter-function definitions (brightness,
// contrast, saturate, grayscale) on straight (non-premultiplied) sRGB values,
// in that order, clamping to [0, 1] between stages. Alpha passes through.

use crate::state::PhotoEdits;

/// Filter chain percentages. `FilterChain::default()` is the identity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterChain {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub grayscale: f32,
}

impl Default for FilterChain {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            grayscale: 0.0,
        }
    }
}

impl FilterChain {
    pub fn from_edits(edits: &PhotoEdits) -> Self {
        Self {
            brightness: edits.brightness,
            contrast: edits.contrast,
            saturation: edits.saturation,
            grayscale: edits.grayscale,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// CSS-style filter string, for logs and the preview caption.
    pub fn css(&self) -> String {
        format!(
            "brightness({}%) contrast({}%) saturate({}%) grayscale({}%)",
            self.brightness, self.contrast, self.saturation, self.grayscale
        )
    }

    /// Filter one straight-alpha RGBA pixel.
    pub fn apply_pixel(&self, px: [u8; 4]) -> [u8; 4] {
        if self.is_identity() {
            return px;
        }
        let mut c = [
            px[0] as f32 / 255.0,
            px[1] as f32 / 255.0,
            px[2] as f32 / 255.0,
        ];

        let b = self.brightness.max(0.0) / 100.0;
        if b != 1.0 {
            for v in &mut c {
                *v = (*v * b).clamp(0.0, 1.0);
            }
        }

        let k = self.contrast.max(0.0) / 100.0;
        if k != 1.0 {
            for v in &mut c {
                *v = ((*v - 0.5) * k + 0.5).clamp(0.0, 1.0);
            }
        }

        let s = self.saturation.max(0.0) / 100.0;
        if s != 1.0 {
            c = mul3(saturate_matrix(s), c);
        }

        let g = (self.grayscale / 100.0).clamp(0.0, 1.0);
        if g != 0.0 {
            c = mul3(grayscale_matrix(g), c);
        }

        [
            (c[0] * 255.0).round() as u8,
            (c[1] * 255.0).round() as u8,
            (c[2] * 255.0).round() as u8,
            px[3],
        ]
    }
}

fn mul3(m: [[f32; 3]; 3], c: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for (i, row) in m.iter().enumerate() {
        out[i] = (row[0] * c[0] + row[1] * c[1] + row[2] * c[2]).clamp(0.0, 1.0);
    }
    out
}

fn saturate_matrix(s: f32) -> [[f32; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn grayscale_matrix(amount: f32) -> [[f32; 3]; 3] {
    let k = 1.0 - amount;
    [
        [0.2126 + 0.7874 * k, 0.7152 - 0.7152 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 + 0.2848 * k, 0.0722 - 0.0722 * k],
        [0.2126 - 0.2126 * k, 0.7152 - 0.7152 * k, 0.0722 + 0.9278 * k],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_chain_is_identity() {
        let chain = FilterChain::default();
        assert!(chain.is_identity());
        assert_eq!(chain.apply_pixel([12, 200, 77, 40]), [12, 200, 77, 40]);
        assert_eq!(FilterChain::from_edits(&PhotoEdits::DEFAULT), chain);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let dim = FilterChain { brightness: 50.0, ..Default::default() };
        assert_eq!(dim.apply_pixel([200, 100, 0, 255]), [100, 50, 0, 255]);
        let bright = FilterChain { brightness: 200.0, ..Default::default() };
        assert_eq!(bright.apply_pixel([200, 100, 0, 9]), [255, 200, 0, 9]);
    }

    #[test]
    fn zero_contrast_is_mid_gray() {
        let flat = FilterChain { contrast: 0.0, ..Default::default() };
        assert_eq!(flat.apply_pixel([0, 255, 31, 255]), [128, 128, 128, 255]);
    }

    #[test]
    fn full_grayscale_equalizes_channels() {
        let gray = FilterChain { grayscale: 100.0, ..Default::default() };
        let [r, g, b, a] = gray.apply_pixel([255, 0, 0, 200]);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert_eq!(r, 54); // 0.2126 * 255
        assert_eq!(a, 200);
    }

    #[test]
    fn zero_saturation_removes_color() {
        let s = FilterChain { saturation: 0.0, ..Default::default() };
        let [r, g, b, _] = s.apply_pixel([10, 200, 90, 255]);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn css_string_lists_all_stages() {
        let css = FilterChain::default().css();
        assert_eq!(
            css,
            "brightness(100%) contrast(100%) saturate(100%) grayscale(0%)"
        );
    }
}
