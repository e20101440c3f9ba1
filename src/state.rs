// ============================================================================
// EDIT STATE — every user-adjustable parameter, reduced from host events
// ============================================================================
//
// The state is plain data. Hosts never mutate it field-by-field from widget
// callbacks; they build an `EditAction` and fold it in with `apply`, which
// returns the next state value. No clamping happens here: the UI ranges are
// the only bound on values, out-of-range input is stored as given.

use std::fmt;
use std::str::FromStr;

/// An opaque sRGB color, written as `#rrggbb`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn from_array(c: [u8; 3]) -> Self {
        Self::rgb(c[0], c[1], c[2])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid color '{0}': expected #rrggbb or #rgb")]
pub struct ParseColorError(String);

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseColorError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(err());
        }
        let channel = |src: &str| u8::from_str_radix(src, 16).map_err(|_| err());
        match hex.len() {
            6 => Ok(Color::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            // #abc is shorthand for #aabbcc
            3 => {
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Ok(Color::rgb(r * 17, g * 17, b * 17))
            }
            _ => Err(err()),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Text anchor, as percentages of the surface width / height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextPosition {
    pub x: f32,
    pub y: f32,
}

impl Default for TextPosition {
    fn default() -> Self {
        Self { x: 50.0, y: 50.0 }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextStyle {
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub uppercase: bool,
    pub shadow: bool,
    /// Extra pixels between glyphs. 0 draws the string as one run.
    pub letter_spacing: f32,
}

/// Photo adjustments, all percentages except `rotate` (degrees).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhotoEdits {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub grayscale: f32,
    pub rotate: f32,
    pub flip_h: bool,
    pub flip_v: bool,
    pub zoom: f32,
}

impl PhotoEdits {
    pub const DEFAULT: PhotoEdits = PhotoEdits {
        brightness: 100.0,
        contrast: 100.0,
        saturation: 100.0,
        grayscale: 0.0,
        rotate: 0.0,
        flip_h: false,
        flip_v: false,
        zoom: 100.0,
    };
}

impl Default for PhotoEdits {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EditState {
    pub background_color: Color,
    pub background_text: String,
    pub text_color: Color,
    pub font_size: f32,
    pub font_family: String,
    pub text_position: TextPosition,
    pub text_style: TextStyle,
    pub photo_edits: PhotoEdits,
    /// When a cut-out exists: `true` keeps the original photo behind it,
    /// `false` replaces it with `background_color`.
    pub show_background: bool,
}

impl Default for EditState {
    fn default() -> Self {
        Self {
            background_color: Color::WHITE,
            background_text: String::new(),
            text_color: Color::BLACK,
            font_size: 48.0,
            font_family: "Arial".to_string(),
            text_position: TextPosition::default(),
            text_style: TextStyle::default(),
            photo_edits: PhotoEdits::DEFAULT,
            show_background: true,
        }
    }
}

/// Photo adjustment selector for `EditAction::SetPhotoValue`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhotoParam {
    Brightness,
    Contrast,
    Saturation,
    Grayscale,
    Rotate,
    Zoom,
}

impl PhotoParam {
    pub fn all() -> &'static [PhotoParam] {
        &[
            PhotoParam::Brightness,
            PhotoParam::Contrast,
            PhotoParam::Saturation,
            PhotoParam::Grayscale,
            PhotoParam::Rotate,
            PhotoParam::Zoom,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            PhotoParam::Brightness => "Brightness",
            PhotoParam::Contrast => "Contrast",
            PhotoParam::Saturation => "Saturation",
            PhotoParam::Grayscale => "Grayscale",
            PhotoParam::Rotate => "Rotate",
            PhotoParam::Zoom => "Zoom",
        }
    }

    /// Slider range offered by the hosts.
    pub fn range(&self) -> std::ops::RangeInclusive<f32> {
        match self {
            PhotoParam::Brightness | PhotoParam::Contrast | PhotoParam::Saturation => 0.0..=200.0,
            PhotoParam::Grayscale => 0.0..=100.0,
            PhotoParam::Rotate => 0.0..=360.0,
            PhotoParam::Zoom => 50.0..=200.0,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            PhotoParam::Rotate => "°",
            _ => "%",
        }
    }

    pub fn get(&self, edits: &PhotoEdits) -> f32 {
        match self {
            PhotoParam::Brightness => edits.brightness,
            PhotoParam::Contrast => edits.contrast,
            PhotoParam::Saturation => edits.saturation,
            PhotoParam::Grayscale => edits.grayscale,
            PhotoParam::Rotate => edits.rotate,
            PhotoParam::Zoom => edits.zoom,
        }
    }

    fn set(&self, edits: &mut PhotoEdits, value: f32) {
        match self {
            PhotoParam::Brightness => edits.brightness = value,
            PhotoParam::Contrast => edits.contrast = value,
            PhotoParam::Saturation => edits.saturation = value,
            PhotoParam::Grayscale => edits.grayscale = value,
            PhotoParam::Rotate => edits.rotate = value,
            PhotoParam::Zoom => edits.zoom = value,
        }
    }
}

/// Text style flag selector for `EditAction::SetStyleFlag`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StyleFlag {
    Bold,
    Italic,
    Underline,
    Uppercase,
    Shadow,
}

impl StyleFlag {
    pub fn all() -> &'static [StyleFlag] {
        &[
            StyleFlag::Bold,
            StyleFlag::Italic,
            StyleFlag::Underline,
            StyleFlag::Uppercase,
            StyleFlag::Shadow,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            StyleFlag::Bold => "Bold",
            StyleFlag::Italic => "Italic",
            StyleFlag::Underline => "Underline",
            StyleFlag::Uppercase => "Uppercase",
            StyleFlag::Shadow => "Shadow",
        }
    }

    pub fn get(&self, style: &TextStyle) -> bool {
        match self {
            StyleFlag::Bold => style.bold,
            StyleFlag::Italic => style.italic,
            StyleFlag::Underline => style.underline,
            StyleFlag::Uppercase => style.uppercase,
            StyleFlag::Shadow => style.shadow,
        }
    }

    fn set(&self, style: &mut TextStyle, on: bool) {
        match self {
            StyleFlag::Bold => style.bold = on,
            StyleFlag::Italic => style.italic = on,
            StyleFlag::Underline => style.underline = on,
            StyleFlag::Uppercase => style.uppercase = on,
            StyleFlag::Shadow => style.shadow = on,
        }
    }
}

/// One user edit. Produced by the hosts, consumed by `EditState::apply`.
#[derive(Clone, Debug, PartialEq)]
pub enum EditAction {
    SetBackgroundColor(Color),
    SetBackgroundText(String),
    SetTextColor(Color),
    SetFontSize(f32),
    SetFontFamily(String),
    SetTextPosition(TextPosition),
    SetStyleFlag(StyleFlag, bool),
    SetLetterSpacing(f32),
    SetPhotoValue(PhotoParam, f32),
    SetFlipHorizontal(bool),
    SetFlipVertical(bool),
    SetShowBackground(bool),
    ResetPhotoEdits,
    /// A new source image was chosen: text and its style start over.
    NewUpload,
}

impl EditState {
    /// Fold one action into the state, returning the next state.
    #[must_use]
    pub fn apply(mut self, action: EditAction) -> Self {
        match action {
            EditAction::SetBackgroundColor(c) => self.background_color = c,
            EditAction::SetBackgroundText(t) => self.background_text = t,
            EditAction::SetTextColor(c) => self.text_color = c,
            EditAction::SetFontSize(s) => self.font_size = s,
            EditAction::SetFontFamily(f) => self.font_family = f,
            EditAction::SetTextPosition(p) => self.text_position = p,
            EditAction::SetStyleFlag(flag, on) => flag.set(&mut self.text_style, on),
            EditAction::SetLetterSpacing(s) => self.text_style.letter_spacing = s,
            EditAction::SetPhotoValue(param, v) => param.set(&mut self.photo_edits, v),
            EditAction::SetFlipHorizontal(on) => self.photo_edits.flip_h = on,
            EditAction::SetFlipVertical(on) => self.photo_edits.flip_v = on,
            EditAction::SetShowBackground(on) => self.show_background = on,
            EditAction::ResetPhotoEdits => self.reset_photo_edits(),
            EditAction::NewUpload => {
                self.background_text.clear();
                self.text_style = TextStyle::default();
            }
        }
        self
    }

    pub fn reset_photo_edits(&mut self) {
        self.photo_edits = PhotoEdits::DEFAULT;
    }

    /// Text as it will be drawn (uppercase transform applied).
    pub fn display_text(&self) -> String {
        if self.text_style.uppercase {
            self.background_text.to_uppercase()
        } else {
            self.background_text.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_long_and_short_hex() {
        assert_eq!("#112233".parse::<Color>(), Ok(Color::rgb(0x11, 0x22, 0x33)));
        assert_eq!("#fff".parse::<Color>(), Ok(Color::WHITE));
        assert_eq!(" #A0b1C2 ".parse::<Color>(), Ok(Color::rgb(0xa0, 0xb1, 0xc2)));
        assert!("112233".parse::<Color>().is_err());
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gg0000".parse::<Color>().is_err());
        assert!("#+1+2+3".parse::<Color>().is_err());
    }

    #[test]
    fn color_display_is_lowercase_hex() {
        assert_eq!(Color::rgb(0x11, 0xAB, 0x03).to_string(), "#11ab03");
    }

    #[test]
    fn reset_restores_default_tuple_after_any_mutation() {
        let mut state = EditState::default();
        for &param in PhotoParam::all() {
            state = state.apply(EditAction::SetPhotoValue(param, 777.0));
        }
        state = state
            .apply(EditAction::SetFlipHorizontal(true))
            .apply(EditAction::SetFlipVertical(true))
            .apply(EditAction::ResetPhotoEdits);
        assert_eq!(state.photo_edits, PhotoEdits::DEFAULT);
        assert_eq!(state.photo_edits.brightness, 100.0);
        assert_eq!(state.photo_edits.zoom, 100.0);
        assert!(!state.photo_edits.flip_h && !state.photo_edits.flip_v);
    }

    #[test]
    fn reset_leaves_text_settings_alone() {
        let state = EditState::default()
            .apply(EditAction::SetBackgroundText("HI".into()))
            .apply(EditAction::SetPhotoValue(PhotoParam::Rotate, 90.0))
            .apply(EditAction::ResetPhotoEdits);
        assert_eq!(state.background_text, "HI");
        assert_eq!(state.photo_edits.rotate, 0.0);
    }

    #[test]
    fn out_of_range_values_are_kept() {
        let state = EditState::default()
            .apply(EditAction::SetPhotoValue(PhotoParam::Brightness, 950.0))
            .apply(EditAction::SetFontSize(-3.0));
        assert_eq!(state.photo_edits.brightness, 950.0);
        assert_eq!(state.font_size, -3.0);
    }

    #[test]
    fn new_upload_clears_text_and_style_only() {
        let state = EditState::default()
            .apply(EditAction::SetBackgroundText("HELLO".into()))
            .apply(EditAction::SetStyleFlag(StyleFlag::Bold, true))
            .apply(EditAction::SetLetterSpacing(4.0))
            .apply(EditAction::SetBackgroundColor(Color::rgb(1, 2, 3)))
            .apply(EditAction::NewUpload);
        assert!(state.background_text.is_empty());
        assert_eq!(state.text_style, TextStyle::default());
        assert_eq!(state.background_color, Color::rgb(1, 2, 3));
    }

    #[test]
    fn style_flags_round_trip_through_actions() {
        let mut state = EditState::default();
        for &flag in StyleFlag::all() {
            state = state.apply(EditAction::SetStyleFlag(flag, true));
            assert!(flag.get(&state.text_style), "{} not set", flag.label());
        }
        let state = state.apply(EditAction::SetStyleFlag(StyleFlag::Shadow, false));
        assert!(!state.text_style.shadow);
        assert!(state.text_style.bold);
    }

    #[test]
    fn display_text_applies_uppercase() {
        let state = EditState::default()
            .apply(EditAction::SetBackgroundText("hi there".into()))
            .apply(EditAction::SetStyleFlag(StyleFlag::Uppercase, true));
        assert_eq!(state.display_text(), "HI THERE");
        assert_eq!(state.background_text, "hi there");
    }
}
