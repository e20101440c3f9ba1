// ============================================================================
// BACKDROPFE APP — egui host around a single `Project`
// ============================================================================
//
// Every widget change becomes an `EditAction`; actions are collected during
// the frame and folded into the project afterwards, so the UI never holds a
// borrow of the state while it is being replaced.

use std::path::Path;
use std::time::Duration;

use eframe::egui;

use backdropfe::assets::{AppSettings, FONT_FAMILIES};
use backdropfe::io::{self, IMAGE_EXTENSIONS};
use backdropfe::project::{Project, ProjectEvent};
use backdropfe::state::{Color, EditAction, EditState, PhotoParam, StyleFlag};

/// Repaint cadence while a decode or removal is in flight.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct BackdropApp {
    project: Project,
    settings: AppSettings,
    /// Preview of the last rendered frame. Replaced (old handle dropped) on
    /// every re-render.
    preview: Option<egui::TextureHandle>,
    status: String,
    last_title: String,
}

impl BackdropApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: AppSettings) -> Self {
        let mut project = Project::new(settings.max_width, settings.max_height);
        project.set_removal_config(settings.removal_config());
        Self {
            project,
            settings,
            preview: None,
            status: "Upload a photo to get started".to_string(),
            last_title: String::new(),
        }
    }

    fn open_path(&mut self, path: &Path) {
        match self.project.open_file(path) {
            Ok(()) => {
                self.preview = None;
                self.status = format!("Loading {}…", self.project.name);
                if let Some(dir) = path.parent() {
                    self.settings.last_open_dir = Some(dir.to_path_buf());
                    self.settings.save();
                }
            }
            Err(e) => {
                log::error!("Opening {} failed: {}", path.display(), e);
                self.status = format!("Could not open file: {}", e);
            }
        }
    }

    fn open_dialog(&mut self) {
        if let Some(path) = io::pick_image_path(self.settings.last_open_dir.as_deref()) {
            self.open_path(&path);
        }
    }

    fn remove_background(&mut self) {
        let remover = self.settings.remover();
        match self.project.remove_background(remover) {
            Ok(()) => self.status = "Removing background…".to_string(),
            Err(e) => self.status = format!("Background removal failed: {}", e),
        }
    }

    fn export(&mut self) {
        let Some(path) = io::pick_export_path(self.settings.last_export_dir.as_deref()) else {
            return;
        };
        match self.project.export_png(&path) {
            Ok(()) => {
                log::info!("Exported {}", path.display());
                self.status = format!("Saved {}", path.display());
                if let Some(dir) = path.parent() {
                    self.settings.last_export_dir = Some(dir.to_path_buf());
                    self.settings.save();
                }
            }
            Err(e) => {
                log::error!("Export failed: {}", e);
                self.status = format!("Export failed: {}", e);
            }
        }
    }

    fn handle_events(&mut self, events: Vec<ProjectEvent>) {
        for event in events {
            self.status = match event {
                ProjectEvent::Decoded(_) => format!("{} ready", self.project.name),
                ProjectEvent::DecodeFailed(_, msg) => format!("Could not decode image: {}", msg),
                ProjectEvent::CutOutReady => "Background removed".to_string(),
                ProjectEvent::RemovalFailed(msg) => format!("Background removal failed: {}", msg),
            };
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        // Only the first image counts; one project at a time.
        for file in dropped {
            if let Some(path) = file.path {
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase())
                    .unwrap_or_default();
                if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                    self.open_path(&path);
                    break;
                }
            } else if let Some(bytes) = file.bytes {
                self.preview = None;
                self.project.upload(bytes.to_vec(), file.name);
                break;
            }
        }
    }

    fn refresh_preview(&mut self, ctx: &egui::Context) {
        if !self.project.render_if_dirty() {
            return;
        }
        let Some(surface) = self.project.surface() else { return };
        let image = egui::ColorImage::from_rgba_unmultiplied(
            [surface.width() as usize, surface.height() as usize],
            surface.pixels().as_raw(),
        );
        self.preview = Some(ctx.load_texture("backdrop_preview", image, egui::TextureOptions::LINEAR));
    }

    fn update_title(&mut self, ctx: &egui::Context) {
        let title = if self.project.has_image() {
            format!("BackdropFE - {}", self.project.name)
        } else {
            "BackdropFE".to_string()
        };
        if title != self.last_title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.last_title = title;
        }
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("Upload Image").clicked() {
                self.open_dialog();
            }
            let can_remove = self.project.has_image() && !self.project.is_removing();
            let label = if self.project.is_removing() {
                "Removing…"
            } else {
                "Remove Background"
            };
            if ui.add_enabled(can_remove, egui::Button::new(label)).clicked() {
                self.remove_background();
            }
            if ui
                .add_enabled(self.project.has_image(), egui::Button::new("Download"))
                .clicked()
            {
                self.export();
            }
            if self.project.is_loading() || self.project.is_removing() {
                ui.spinner();
            }
        });
    }
}

impl eframe::App for BackdropApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let events = self.project.poll();
        self.handle_events(events);
        self.handle_dropped_files(ctx);

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.label(self.status.as_str());
        });

        let mut actions = Vec::new();
        let has_cut_out = self.project.has_cut_out();
        egui::SidePanel::left("controls")
            .default_width(300.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    controls_panel(ui, self.project.state(), has_cut_out, &mut actions);
                });
            });

        for action in actions {
            self.project.apply(action);
        }
        self.refresh_preview(ctx);
        self.update_title(ctx);

        egui::CentralPanel::default()
            .frame(egui::Frame {
                fill: egui::Color32::from_gray(32),
                ..Default::default()
            })
            .show(ctx, |ui| match &self.preview {
                Some(texture) if self.project.has_image() => {
                    let available = ui.available_size();
                    let tex_size = texture.size_vec2();
                    let scale = (available.x / tex_size.x).min(available.y / tex_size.y).min(1.0);
                    ui.centered_and_justified(|ui| {
                        ui.image((texture.id(), tex_size * scale));
                    });
                }
                _ => {
                    ui.centered_and_justified(|ui| {
                        let hint = if self.project.is_loading() {
                            "Loading…"
                        } else {
                            "Drop an image here or click Upload Image"
                        };
                        ui.label(egui::RichText::new(hint).color(egui::Color32::GRAY));
                    });
                }
            });

        if self.project.is_loading() || self.project.is_removing() {
            ctx.request_repaint_after(POLL_INTERVAL);
        }
    }
}

fn color_row(
    ui: &mut egui::Ui,
    label: &str,
    color: Color,
    on_change: impl FnOnce(Color) -> EditAction,
    actions: &mut Vec<EditAction>,
) {
    ui.horizontal(|ui| {
        let mut rgb = color.to_array();
        if ui.color_edit_button_srgb(&mut rgb).changed() {
            actions.push(on_change(Color::from_array(rgb)));
        }
        ui.label(label);
    });
}

fn controls_panel(ui: &mut egui::Ui, state: &EditState, has_cut_out: bool, actions: &mut Vec<EditAction>) {
    ui.heading("Background");
    ui.add_enabled_ui(has_cut_out, |ui| {
        let mut show = state.show_background;
        if ui.checkbox(&mut show, "Show original background").changed() {
            actions.push(EditAction::SetShowBackground(show));
        }
    });
    color_row(ui, "Background color", state.background_color, EditAction::SetBackgroundColor, actions);

    ui.separator();
    ui.heading("Text");
    let mut text = state.background_text.clone();
    if ui
        .add(egui::TextEdit::singleline(&mut text).hint_text("Text behind the subject"))
        .changed()
    {
        actions.push(EditAction::SetBackgroundText(text));
    }
    color_row(ui, "Text color", state.text_color, EditAction::SetTextColor, actions);

    egui::ComboBox::from_id_source("font_family")
        .selected_text(state.font_family.as_str())
        .width(200.0)
        .show_ui(ui, |ui| {
            for family in FONT_FAMILIES {
                if ui
                    .selectable_label(state.font_family == *family, *family)
                    .clicked()
                {
                    actions.push(EditAction::SetFontFamily(family.to_string()));
                }
            }
        });

    let mut size = state.font_size;
    if ui
        .add(egui::Slider::new(&mut size, 24.0..=200.0).step_by(2.0).text("Size (px)"))
        .changed()
    {
        actions.push(EditAction::SetFontSize(size));
    }

    let mut spacing = state.text_style.letter_spacing;
    if ui
        .add(egui::Slider::new(&mut spacing, 0.0..=20.0).step_by(0.5).text("Letter spacing"))
        .changed()
    {
        actions.push(EditAction::SetLetterSpacing(spacing));
    }

    ui.horizontal_wrapped(|ui| {
        for flag in StyleFlag::all() {
            let on = flag.get(&state.text_style);
            if ui.selectable_label(on, flag.label()).clicked() {
                actions.push(EditAction::SetStyleFlag(*flag, !on));
            }
        }
    });

    let mut pos = state.text_position;
    let x_changed = ui
        .add(egui::Slider::new(&mut pos.x, 0.0..=100.0).text("Horizontal (%)"))
        .changed();
    let y_changed = ui
        .add(egui::Slider::new(&mut pos.y, 0.0..=100.0).text("Vertical (%)"))
        .changed();
    if x_changed || y_changed {
        actions.push(EditAction::SetTextPosition(pos));
    }

    ui.separator();
    ui.heading("Photo");
    for param in PhotoParam::all() {
        let mut value = param.get(&state.photo_edits);
        let slider = egui::Slider::new(&mut value, param.range())
            .text(param.label())
            .suffix(param.unit());
        if ui.add(slider).changed() {
            actions.push(EditAction::SetPhotoValue(*param, value));
        }
    }
    ui.horizontal(|ui| {
        let mut flip_h = state.photo_edits.flip_h;
        if ui.checkbox(&mut flip_h, "Flip horizontal").changed() {
            actions.push(EditAction::SetFlipHorizontal(flip_h));
        }
        let mut flip_v = state.photo_edits.flip_v;
        if ui.checkbox(&mut flip_v, "Flip vertical").changed() {
            actions.push(EditAction::SetFlipVertical(flip_v));
        }
    });
    if ui.button("Reset photo edits").clicked() {
        actions.push(EditAction::ResetPhotoEdits);
    }
}
