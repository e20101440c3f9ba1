use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{DecodeOutcome, ImageCache, ImageLoader, Slot};
use crate::canvas::Surface;
use crate::compositor::{Compositor, Layering};
use crate::io::{self, DecodeError, ExportError};
use crate::ops::ai::{BackgroundRemover, RemovalConfig, RemovalError, RemovalJob, RemovalOutcome};
use crate::state::{EditAction, EditState};

/// Something that finished in the background since the last poll.
#[derive(Clone, Debug, PartialEq)]
pub enum ProjectEvent {
    Decoded(Slot),
    DecodeFailed(Slot, String),
    CutOutReady,
    RemovalFailed(String),
}

/// Single open document: the edit state, its images, the background jobs
/// working on them and the rendered frame.
pub struct Project {
    /// Display name (file name of the upload, or "Untitled")
    pub name: String,
    /// `None` until an image has been opened from disk.
    pub path: Option<PathBuf>,

    state: EditState,
    cache: ImageCache,
    loader: ImageLoader,
    removal: RemovalJob,
    removal_config: RemovalConfig,
    compositor: Compositor,
    surface: Option<Surface>,

    /// Encoded bytes of the current upload, handed to the remover.
    source: Option<Arc<Vec<u8>>>,
    /// Bumped on every upload; removal results for older uploads are dropped.
    generation: u64,
    needs_render: bool,
}

impl Project {
    pub fn new(max_width: u32, max_height: u32) -> Self {
        Self {
            name: "Untitled".to_string(),
            path: None,
            state: EditState::default(),
            cache: ImageCache::new(max_width, max_height),
            loader: ImageLoader::new(),
            removal: RemovalJob::new(),
            removal_config: RemovalConfig::default(),
            compositor: Compositor::new(),
            surface: None,
            source: None,
            generation: 0,
            needs_render: false,
        }
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn cache(&self) -> &ImageCache {
        &self.cache
    }

    pub fn set_removal_config(&mut self, config: RemovalConfig) {
        self.removal_config = config;
    }

    /// Fold a host event into the edit state and schedule a re-render.
    pub fn apply(&mut self, action: EditAction) {
        log::trace!("Edit: {:?}", action);
        self.state = std::mem::take(&mut self.state).apply(action);
        self.needs_render = true;
    }

    /// Start over with new image bytes. The cache is emptied, the text and its
    /// style reset, and the decode runs in the background.
    pub fn upload(&mut self, bytes: Vec<u8>, name: impl Into<String>) {
        self.generation += 1;
        self.name = name.into();
        self.apply(EditAction::NewUpload);
        self.surface = None;

        let bytes = Arc::new(bytes);
        let ticket = self.cache.begin_original();
        log::info!(
            "Upload #{} '{}' ({} bytes)",
            self.generation,
            self.name,
            bytes.len()
        );
        self.loader.spawn(ticket, bytes.clone(), self.cache.bounds());
        self.source = Some(bytes);
    }

    /// Read `path` fully and upload it.
    pub fn open_file(&mut self, path: &Path) -> Result<(), DecodeError> {
        let bytes = io::read_image_bytes(path)?;
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        self.upload(bytes, name);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    /// Kick off background removal for the current upload.
    pub fn remove_background(&mut self, remover: Arc<dyn BackgroundRemover>) -> Result<(), RemovalError> {
        let source = self.source.clone().ok_or(RemovalError::NoSource)?;
        self.removal
            .start(remover.clone(), source, self.removal_config, self.generation)?;
        log::info!("Background removal started with '{}'", remover.name());
        Ok(())
    }

    pub fn is_removing(&self) -> bool {
        self.removal.is_busy()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.in_flight() > 0
    }

    pub fn has_image(&self) -> bool {
        self.cache.original().is_some()
    }

    pub fn has_cut_out(&self) -> bool {
        self.cache.processed().is_some()
    }

    /// Drain finished background work. Call once per frame.
    pub fn poll(&mut self) -> Vec<ProjectEvent> {
        let mut events = Vec::new();
        while let Some(outcome) = self.removal.poll() {
            self.handle_removal(outcome, &mut events);
        }
        while let Some(outcome) = self.loader.poll() {
            self.handle_decode(outcome, &mut events);
        }
        events
    }

    /// Block until every decode and removal has reported.
    pub fn wait_idle(&mut self) -> Vec<ProjectEvent> {
        let mut events = Vec::new();
        loop {
            if let Some(outcome) = self.removal.wait() {
                self.handle_removal(outcome, &mut events);
            } else if let Some(outcome) = self.loader.wait() {
                self.handle_decode(outcome, &mut events);
            } else {
                break;
            }
        }
        events
    }

    fn handle_decode(&mut self, outcome: DecodeOutcome, events: &mut Vec<ProjectEvent>) {
        let slot = outcome.ticket.slot;
        match outcome.result {
            Ok(image) => {
                if self.cache.complete(outcome.ticket, image) {
                    self.needs_render = true;
                    events.push(ProjectEvent::Decoded(slot));
                }
            }
            Err(e) => {
                if self.cache.fail(outcome.ticket) {
                    self.needs_render = true;
                    log::error!("Decoding {:?} image failed: {}", slot, e);
                    events.push(ProjectEvent::DecodeFailed(slot, e.to_string()));
                }
            }
        }
    }

    fn handle_removal(&mut self, outcome: RemovalOutcome, events: &mut Vec<ProjectEvent>) {
        if outcome.generation != self.generation {
            log::debug!("Dropping removal result for superseded upload #{}", outcome.generation);
            return;
        }
        match outcome.result {
            Ok(bytes) => {
                log::info!("Background removal returned {} bytes", bytes.len());
                // The old cut-out is gone until the new one decodes.
                let ticket = self.cache.begin_processed();
                self.needs_render = true;
                self.loader.spawn(ticket, Arc::new(bytes), self.cache.bounds());
                events.push(ProjectEvent::CutOutReady);
            }
            Err(e) => {
                log::error!("Background removal failed: {}", e);
                events.push(ProjectEvent::RemovalFailed(e.to_string()));
            }
        }
    }

    /// Re-render when the state or the images changed. Returns whether a new
    /// frame was produced.
    pub fn render_if_dirty(&mut self) -> bool {
        if !self.needs_render || !self.has_image() {
            return false;
        }
        let surface = self.surface.get_or_insert_with(|| Surface::new(1, 1));
        let layering: Option<Layering> = self.compositor.render(&self.state, &self.cache, surface);
        self.needs_render = false;
        layering.is_some()
    }

    pub fn surface(&self) -> Option<&Surface> {
        self.surface.as_ref()
    }

    /// Render if needed, then write the frame as PNG to `path`.
    pub fn export_png(&mut self, path: &Path) -> Result<(), ExportError> {
        self.render_if_dirty();
        io::export_png(self.surface.as_ref(), path)
    }

    /// Render if needed and return the frame as PNG bytes.
    pub fn export_bytes(&mut self) -> Result<Vec<u8>, ExportError> {
        self.render_if_dirty();
        let surface = self.surface.as_ref().ok_or(ExportError::NoImage)?;
        io::encode_png(surface.pixels())
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        if self.removal.is_busy() {
            log::info!("Closing '{}' with a removal still running; its result is dropped", self.name);
        }
        self.cache.invalidate();
        self.source = None;
        self.surface = None;
    }
}
