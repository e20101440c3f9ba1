// ============================================================================
// BackdropFE CLI — headless edit-and-export via command-line arguments
// ============================================================================
//
// Usage examples:
//   backdropfe --input portrait.jpg --output card.png --text "HELLO" --bold
//   backdropfe -i studio.png --remove-bg --show-background false \
//              --bg-color "#112233" --text HI --shadow
//   backdropfe -i photo.jpg --grayscale 100 --rotate 90 --flip-h
//
// No GUI is opened in CLI mode. Decodes and the removal still run on the
// worker pool; the CLI simply waits for them before rendering.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::{ArgAction, Parser};
use thiserror::Error;

use crate::assets::AppSettings;
use crate::io::{DecodeError, ExportError, default_export_path};
use crate::logger;
use crate::ops::ai::{BackgroundRemover, CommandRemover, RemovalError};
use crate::ops::color_removal::ColorKeyRemover;
use crate::project::{Project, ProjectEvent};
use crate::state::{Color, EditAction, PhotoParam, StyleFlag, TextPosition};

/// Remover name selecting the built-in color key.
pub const COLOR_KEY_REMOVER: &str = "color-key";

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// BackdropFE headless photo editor.
#[derive(Parser, Debug)]
#[command(
    name = "backdropfe",
    about = "BackdropFE headless photo editor",
    long_about = "Open an image, optionally cut out its subject, composite a color or\n\
                  text background behind it, adjust the photo and export a PNG without\n\
                  opening the GUI.\n\n\
                  Example:\n  \
                  backdropfe -i shot.jpg --remove-bg --show-background false --bg-color \"#112233\" --text HI"
)]
pub struct CliArgs {
    /// Input image (PNG, JPEG, WEBP, BMP, TGA, TIFF).
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output PNG path (default: ./edited-image.png).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Cut the subject out before compositing.
    #[arg(long)]
    pub remove_bg: bool,

    /// Keep the original background behind the text (false = flat fill).
    #[arg(long, value_name = "BOOL", default_value_t = true, action = ArgAction::Set)]
    pub show_background: bool,

    /// Fill color used when the background is hidden.
    #[arg(long, value_name = "#RRGGBB")]
    pub bg_color: Option<Color>,

    /// Text placed behind the subject.
    #[arg(long)]
    pub text: Option<String>,

    #[arg(long, value_name = "#RRGGBB")]
    pub text_color: Option<Color>,

    /// Font size in pixels.
    #[arg(long)]
    pub font_size: Option<f32>,

    /// Font family name.
    #[arg(long)]
    pub font: Option<String>,

    /// Horizontal text position, percent of width.
    #[arg(long, value_name = "0-100")]
    pub text_x: Option<f32>,

    /// Vertical text position, percent of height.
    #[arg(long, value_name = "0-100")]
    pub text_y: Option<f32>,

    #[arg(long)]
    pub bold: bool,
    #[arg(long)]
    pub italic: bool,
    #[arg(long)]
    pub underline: bool,
    #[arg(long)]
    pub uppercase: bool,
    #[arg(long)]
    pub shadow: bool,

    #[arg(long, value_name = "PX")]
    pub letter_spacing: Option<f32>,

    #[arg(long, value_name = "0-200")]
    pub brightness: Option<f32>,
    #[arg(long, value_name = "0-200")]
    pub contrast: Option<f32>,
    #[arg(long, value_name = "0-200")]
    pub saturation: Option<f32>,
    #[arg(long, value_name = "0-100")]
    pub grayscale: Option<f32>,
    #[arg(long, value_name = "DEGREES")]
    pub rotate: Option<f32>,
    #[arg(long, value_name = "50-200")]
    pub zoom: Option<f32>,
    #[arg(long)]
    pub flip_h: bool,
    #[arg(long)]
    pub flip_v: bool,

    /// Display bounds the image is fitted into (default from settings, 800×600).
    #[arg(long)]
    pub max_width: Option<u32>,
    #[arg(long)]
    pub max_height: Option<u32>,

    /// Removal program to run, or "color-key" for the built-in remover.
    /// Defaults to the remover configured in settings.
    #[arg(long, value_name = "PROGRAM")]
    pub remover: Option<String>,

    /// Echo the session log to stderr and print timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when the CLI input flag is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i" || a.starts_with("--input="))
    }

    /// The edits requested on the command line, in application order.
    pub fn edit_actions(&self) -> Vec<EditAction> {
        let mut actions = vec![EditAction::SetShowBackground(self.show_background)];
        if let Some(c) = self.bg_color {
            actions.push(EditAction::SetBackgroundColor(c));
        }
        if let Some(t) = &self.text {
            actions.push(EditAction::SetBackgroundText(t.clone()));
        }
        if let Some(c) = self.text_color {
            actions.push(EditAction::SetTextColor(c));
        }
        if let Some(s) = self.font_size {
            actions.push(EditAction::SetFontSize(s));
        }
        if let Some(f) = &self.font {
            actions.push(EditAction::SetFontFamily(f.clone()));
        }
        if self.text_x.is_some() || self.text_y.is_some() {
            let default = TextPosition::default();
            actions.push(EditAction::SetTextPosition(TextPosition {
                x: self.text_x.unwrap_or(default.x),
                y: self.text_y.unwrap_or(default.y),
            }));
        }
        let flags = [
            (StyleFlag::Bold, self.bold),
            (StyleFlag::Italic, self.italic),
            (StyleFlag::Underline, self.underline),
            (StyleFlag::Uppercase, self.uppercase),
            (StyleFlag::Shadow, self.shadow),
        ];
        for (flag, on) in flags {
            if on {
                actions.push(EditAction::SetStyleFlag(flag, true));
            }
        }
        if let Some(s) = self.letter_spacing {
            actions.push(EditAction::SetLetterSpacing(s));
        }
        let params = [
            (PhotoParam::Brightness, self.brightness),
            (PhotoParam::Contrast, self.contrast),
            (PhotoParam::Saturation, self.saturation),
            (PhotoParam::Grayscale, self.grayscale),
            (PhotoParam::Rotate, self.rotate),
            (PhotoParam::Zoom, self.zoom),
        ];
        for (param, value) in params {
            if let Some(v) = value {
                actions.push(EditAction::SetPhotoValue(param, v));
            }
        }
        if self.flip_h {
            actions.push(EditAction::SetFlipHorizontal(true));
        }
        if self.flip_v {
            actions.push(EditAction::SetFlipVertical(true));
        }
        actions
    }

    fn remover(&self, settings: &AppSettings) -> Arc<dyn BackgroundRemover> {
        match self.remover.as_deref() {
            Some(COLOR_KEY_REMOVER) => Arc::new(ColorKeyRemover {
                tolerance: settings.color_key_tolerance,
                softness: settings.color_key_softness,
            }),
            Some(program) => Arc::new(CommandRemover::new(program, settings.remover_args.clone())),
            None => settings.remover(),
        }
    }
}

// ============================================================================
// Public entry point
// ============================================================================

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Read(#[from] DecodeError),
    #[error("could not decode '{path}': {message}")]
    Undecodable { path: PathBuf, message: String },
    #[error(transparent)]
    RemovalStart(#[from] RemovalError),
    #[error("background removal failed: {0}")]
    RemovalFailed(String),
    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Run the edit and return an OS exit code.
/// `0` = exported, `1` = load, removal or export failed.
pub fn run(args: CliArgs) -> ExitCode {
    match execute(&args) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("CLI run failed: {}", e);
            eprintln!("error: {}", e);
            if let Some(path) = logger::log_path() {
                eprintln!("see {}", path.display());
            }
            ExitCode::FAILURE
        }
    }
}

/// Open, edit and export. Returns the path written.
pub fn execute(args: &CliArgs) -> Result<PathBuf, CliError> {
    let start = Instant::now();
    let settings = AppSettings::load();
    let max_w = args.max_width.unwrap_or(settings.max_width);
    let max_h = args.max_height.unwrap_or(settings.max_height);

    let mut project = Project::new(max_w, max_h);
    project.set_removal_config(settings.removal_config());

    project.open_file(&args.input)?;
    if let Some(message) = first_failure(&project.wait_idle()) {
        return Err(CliError::Undecodable {
            path: args.input.clone(),
            message,
        });
    }

    if args.remove_bg {
        let remover = args.remover(&settings);
        if args.verbose {
            println!("Removing background with {}", remover.name());
        }
        project.remove_background(remover)?;
        if let Some(message) = first_failure(&project.wait_idle()) {
            return Err(CliError::RemovalFailed(message));
        }
    }

    for action in args.edit_actions() {
        project.apply(action);
    }

    let output = args.output.clone().unwrap_or_else(|| default_export_path(None));
    project.export_png(&output)?;
    if args.verbose {
        println!(
            "  -> {}  ({:.1} ms)",
            output.display(),
            start.elapsed().as_secs_f64() * 1000.0
        );
    }
    Ok(output)
}

fn first_failure(events: &[ProjectEvent]) -> Option<String> {
    events.iter().find_map(|e| match e {
        ProjectEvent::DecodeFailed(_, msg) | ProjectEvent::RemovalFailed(msg) => Some(msg.clone()),
        _ => None,
    })
}
