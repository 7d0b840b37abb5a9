//! Signing session
//!
//! Owns the loaded document, its render scheduler and geometry tracker, the
//! annotation layer and the interaction state, and routes container-space
//! input to the component that handles it.

use crate::annotation::{AnnotationId, AnnotationLayer, Position, Size};
use crate::capture::{CaptureResults, CaptureSession, CaptureSettings, CaptureTarget};
use crate::config::SignerConfig;
use crate::error::{CaptureError, InputError, SessionError};
use crate::export::{export_document, ExportReport};
use crate::widget::{GesturePreview, InteractionController, KeyInput};
use pdf_signer_cache::RenderCache;
use pdf_signer_engine::{decode, DocumentId};
use pdf_signer_scheduler::{GeometryTracker, PublishedPage, RenderOutcome, RenderScheduler};
use std::collections::HashMap;
use std::sync::Arc;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// A file handed to the session by the host
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    /// Declared media type, e.g. `application/pdf`
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), media_type: media_type.into(), bytes }
    }

    pub fn pdf(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(name, PDF_MEDIA_TYPE, bytes)
    }
}

/// Check an input file before anything is decoded
pub fn validate_input(file: &InputFile, max_bytes: u64) -> Result<(), InputError> {
    let essence = file.media_type.split(';').next().unwrap_or_default().trim();
    if !essence.eq_ignore_ascii_case(PDF_MEDIA_TYPE) {
        return Err(InputError::UnsupportedType { media_type: file.media_type.clone() });
    }
    if file.bytes.is_empty() {
        return Err(InputError::Empty { name: file.name.clone() });
    }
    let size = file.bytes.len() as u64;
    if size > max_bytes {
        return Err(InputError::TooLarge { name: file.name.clone(), size, limit: max_bytes });
    }
    Ok(())
}

struct OpenDocument {
    id: DocumentId,
    name: String,
    source: Arc<Vec<u8>>,
    tracker: Arc<GeometryTracker>,
    scheduler: Arc<RenderScheduler>,
    layer: AnnotationLayer,
    /// Last published extent seen per page, to detect size changes
    extents: HashMap<u32, Size>,
    /// Tracker version the extents were taken at
    synced_version: Option<u64>,
}

/// One document being signed
pub struct SigningSession {
    config: SignerConfig,
    capture_settings: CaptureSettings,
    document: Option<OpenDocument>,
    scale: f32,
    scroll_top: f32,
    viewport_height: f32,
    capture: Option<CaptureSession>,
    controller: InteractionController,
    text_mode: bool,
}

impl SigningSession {
    pub fn new(config: SignerConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let capture_settings = config.capture.settings()?;
        Ok(Self {
            scale: config.viewer.initial_scale,
            config,
            capture_settings,
            document: None,
            scroll_top: 0.0,
            viewport_height: 0.0,
            capture: None,
            controller: InteractionController::new(),
            text_mode: false,
        })
    }

    pub fn config(&self) -> &SignerConfig {
        &self.config
    }

    /// Load a document, replacing the current one.
    ///
    /// Nothing changes when the file is rejected or fails to decode.
    pub fn open(&mut self, file: InputFile) -> Result<(), SessionError> {
        validate_input(&file, self.config.max_input_bytes)?;
        let loaded = decode(&file.bytes).map_err(SessionError::Decode)?;
        let sizes = loaded.page_sizes().map_err(SessionError::Decode)?;

        if let Some(previous) = self.document.take() {
            let cancelled = previous.scheduler.cancel_all();
            log::debug!("closed {}, cancelled {cancelled} render(s)", previous.name);
        }

        let metrics = self.config.layout.metrics();
        let tracker = Arc::new(
            GeometryTracker::new(sizes, metrics, self.scale)
                .with_visibility_margin(self.config.render.visibility_margin),
        );
        let mut scheduler = RenderScheduler::new(
            loaded.clone(),
            tracker.clone(),
            self.config.render.scheduler_config(),
        );
        if self.config.render.cache_enabled {
            scheduler = scheduler.with_cache(RenderCache::new(self.config.render.cache_config()));
        }
        let layer = AnnotationLayer::new(tracker.clone()).with_text_style(self.config.text.style()?);

        log::info!("opened {} ({} pages)", file.name, loaded.page_count());
        self.document = Some(OpenDocument {
            id: loaded.id(),
            name: file.name,
            source: Arc::new(file.bytes),
            tracker,
            scheduler: Arc::new(scheduler),
            layer,
            extents: HashMap::new(),
            synced_version: None,
        });
        self.capture = None;
        self.controller.cancel();
        self.text_mode = false;
        Ok(())
    }

    fn open_document(&self) -> Result<&OpenDocument, SessionError> {
        self.document.as_ref().ok_or(SessionError::NoDocument)
    }

    fn open_document_mut(&mut self) -> Result<&mut OpenDocument, SessionError> {
        self.document.as_mut().ok_or(SessionError::NoDocument)
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn document_id(&self) -> Option<DocumentId> {
        self.document.as_ref().map(|document| document.id)
    }

    pub fn document_name(&self) -> Option<&str> {
        self.document.as_ref().map(|document| document.name.as_str())
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |document| document.tracker.page_count())
    }

    pub fn tracker(&self) -> Option<&Arc<GeometryTracker>> {
        self.document.as_ref().map(|document| &document.tracker)
    }

    /// Scheduler of the open document, for driving it from a worker pool.
    ///
    /// Rectangles published by workers are picked up by the next session
    /// call that reads or places annotations.
    pub fn scheduler(&self) -> Option<&Arc<RenderScheduler>> {
        self.document.as_ref().map(|document| &document.scheduler)
    }

    pub fn layer(&self) -> Option<&AnnotationLayer> {
        self.document.as_ref().map(|document| &document.layer)
    }

    pub fn layer_mut(&mut self) -> Option<&mut AnnotationLayer> {
        self.sync_geometry();
        self.document.as_mut().map(|document| &mut document.layer)
    }

    // Zoom

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn zoom_percent(&self) -> u32 {
        (self.scale * 100.0).round() as u32
    }

    /// Change the render scale. Renders in flight are cancelled; visible
    /// pages must be requested again.
    pub fn set_scale(&mut self, scale: f32) -> f32 {
        let scale = self.config.viewer.clamp_scale(scale);
        if (scale - self.scale).abs() < f32::EPSILON {
            return self.scale;
        }

        self.scale = scale;
        if let Some(document) = &self.document {
            document.scheduler.cancel_all();
            document.tracker.set_scale(scale);
        }
        log::debug!("scale set to {scale}");
        scale
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_scale(self.scale + self.config.viewer.zoom_step)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_scale(self.scale - self.config.viewer.zoom_step)
    }

    pub fn can_zoom_in(&self) -> bool {
        self.scale < self.config.viewer.max_scale
    }

    pub fn can_zoom_out(&self) -> bool {
        self.scale > self.config.viewer.min_scale
    }

    // Rendering

    pub fn set_viewport(&mut self, scroll_top: f32, height: f32) {
        self.scroll_top = scroll_top;
        self.viewport_height = height;
    }

    /// Relayout for a new container width. Published rectangles change
    /// right away, so annotations and capture surfaces follow immediately.
    pub fn set_container_width(&mut self, width: f32) {
        if let Some(document) = &self.document {
            document.tracker.set_container_width(width);
        }
        self.config.layout.container_width = width;
        self.sync_geometry();
    }

    /// Total scrollable height of the page column
    pub fn scroll_height(&self) -> f32 {
        self.document.as_ref().map_or(0.0, |document| document.tracker.content_height())
    }

    /// Scroll offset that brings `page` to the top of the viewport
    pub fn page_offset(&self, page: u32) -> Option<f32> {
        Some(self.document.as_ref()?.tracker.layout_rect(page)?.top)
    }

    /// Latest raster of `page` with the rectangle it is displayed in
    pub fn page_raster(&self, page: u32) -> Option<PublishedPage> {
        self.document.as_ref()?.tracker.published(page)
    }

    /// Request renders for the pages in or near the viewport
    pub fn render_visible(&mut self) -> Result<Vec<u32>, SessionError> {
        let document = self.open_document()?;
        let pages = document.tracker.visible_pages(self.scroll_top, self.viewport_height);
        document.scheduler.request_pages(&pages, self.scale)?;
        Ok(pages)
    }

    /// Run queued renders on this thread, then follow any geometry change
    pub fn run_renders(&mut self) -> Vec<RenderOutcome> {
        let Some(document) = &self.document else {
            return Vec::new();
        };
        let outcomes = document.scheduler.run_pending();
        self.sync_geometry();
        outcomes
    }

    /// Bring annotations and capture surfaces in line with the published
    /// rectangles. Annotations of a page whose rectangle changed size since
    /// the last call are rescaled. Returns the number of pages that changed.
    pub fn sync_geometry(&mut self) -> usize {
        let Some(document) = self.document.as_mut() else {
            return 0;
        };
        let version = document.tracker.version();
        if document.synced_version == Some(version) {
            return 0;
        }

        let mut rescaled = 0;
        for (index, rect) in document.tracker.rects().into_iter().enumerate() {
            let Some(rect) = rect else {
                continue;
            };
            let page = index as u32 + 1;
            let extent = Size::new(rect.width, rect.height);

            if let Some(capture) = self.capture.as_mut() {
                capture.resize_page(page, extent);
            }

            if let Some(previous) = document.extents.insert(page, extent) {
                if previous != extent && previous.width > 0.0 && previous.height > 0.0 {
                    let moved = document.layer.rescale_page(
                        page,
                        extent.width / previous.width,
                        extent.height / previous.height,
                    );
                    if moved > 0 {
                        log::debug!("page {page} resized, rescaled {moved} annotation(s)");
                    }
                    rescaled += 1;
                }
            }
        }

        document.synced_version = Some(version);
        rescaled
    }

    /// Whether zoom controls should be disabled
    pub fn is_rendering(&self) -> bool {
        self.document.as_ref().is_some_and(|document| document.scheduler.is_rendering())
    }

    pub fn page_label(&self, page: u32) -> String {
        format!("Page {} of {}", page, self.page_count())
    }

    /// Page with the largest share of the viewport
    pub fn current_page(&self) -> Option<u32> {
        self.document
            .as_ref()?
            .tracker
            .most_visible_page(self.scroll_top, self.viewport_height)
    }

    pub fn page_error(&self, page: u32) -> Option<String> {
        self.document.as_ref()?.tracker.error(page)
    }

    // Freehand capture

    /// Open capture surfaces over the targeted, already rendered pages
    pub fn begin_capture(&mut self, target: CaptureTarget) -> Result<(), SessionError> {
        self.sync_geometry();
        let document = self.open_document()?;
        let extents: Vec<(u32, Size)> = (1..=document.tracker.page_count())
            .filter_map(|page| {
                let rect = document.tracker.rect(page)?;
                Some((page, Size::new(rect.width, rect.height)))
            })
            .collect();

        let session = CaptureSession::begin(target, extents, self.capture_settings);
        if session.pages().is_empty() {
            let page = match target {
                CaptureTarget::Page(page) => page,
                CaptureTarget::AllPages => 1,
            };
            return Err(CaptureError::PageNotReady(page).into());
        }

        self.text_mode = false;
        self.controller.cancel();
        self.capture = Some(session);
        Ok(())
    }

    pub fn capture(&self) -> Option<&CaptureSession> {
        self.capture.as_ref()
    }

    /// Surfaces to draw on, sized to the latest published rectangles
    pub fn capture_mut(&mut self) -> Option<&mut CaptureSession> {
        self.sync_geometry();
        self.capture.as_mut()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(CaptureSession::is_active)
    }

    /// Complete every surface and place the resulting signatures.
    ///
    /// Capture ends once at least one signature was placed and no surface
    /// failed; with no ink anywhere it keeps going. Surfaces that failed keep
    /// their ink, and the first failure is returned when nothing was placed.
    pub fn finish_capture(&mut self) -> Result<Vec<AnnotationId>, SessionError> {
        self.sync_geometry();
        let Some(capture) = self.capture.as_mut() else {
            return Err(CaptureError::NotCapturing.into());
        };
        let CaptureResults { signatures, mut failures } = capture.complete_all();

        let document = self.open_document_mut()?;
        let mut placed = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let id = document.layer.add_signature(
                signature.image,
                signature.position,
                signature.size,
                signature.page,
            )?;
            placed.push(id);
        }

        if placed.is_empty() && !failures.is_empty() {
            return Err(failures.swap_remove(0).into());
        }
        if !placed.is_empty() && failures.is_empty() {
            if let Some(mut capture) = self.capture.take() {
                capture.cancel_all();
            }
        }
        Ok(placed)
    }

    pub fn cancel_capture(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.cancel_all();
        }
    }

    // Text placement and pointer input

    /// The next click over a page places a text label
    pub fn enter_text_mode(&mut self) {
        self.cancel_capture();
        self.text_mode = true;
    }

    pub fn exit_text_mode(&mut self) {
        self.text_mode = false;
    }

    pub fn is_text_mode(&self) -> bool {
        self.text_mode
    }

    /// Click at a container point. In text mode this places a text label at
    /// the point and leaves text mode.
    pub fn click(&mut self, x: f32, y: f32) -> Result<Option<AnnotationId>, SessionError> {
        if !self.text_mode {
            return Ok(None);
        }
        self.sync_geometry();
        let size = self.config.text.label_size();
        let document = self.open_document_mut()?;
        let Some(hit) = document.tracker.page_at(x, y) else {
            return Ok(None);
        };

        let id = document.layer.add_text_label(
            Position::new(hit.x, hit.y),
            size,
            hit.page,
        )?;
        self.text_mode = false;
        Ok(Some(id))
    }

    pub fn pointer_down(&mut self, x: f32, y: f32) -> Option<AnnotationId> {
        self.sync_geometry();
        let document = self.document.as_mut()?;
        match document.tracker.page_at(x, y) {
            Some(hit) => self.controller.pointer_down(&mut document.layer, hit.page, hit.x, hit.y),
            None => {
                document.layer.end_edit();
                None
            }
        }
    }

    /// A gesture whose page changed size under it is dropped.
    pub fn pointer_move(&mut self, x: f32, y: f32) -> Option<GesturePreview> {
        if self.sync_geometry() > 0 {
            self.controller.cancel();
            return None;
        }
        let document = self.document.as_ref()?;
        let rect = document.tracker.rect(self.controller.page()?)?;
        self.controller.pointer_move(&document.layer, x - rect.left, y - rect.top)
    }

    pub fn pointer_up(&mut self) -> Option<GesturePreview> {
        if self.sync_geometry() > 0 {
            self.controller.cancel();
            return None;
        }
        let document = self.document.as_mut()?;
        self.controller.pointer_up(&mut document.layer)
    }

    pub fn double_click(&mut self, x: f32, y: f32) -> bool {
        self.sync_geometry();
        let Some(document) = self.document.as_mut() else {
            return false;
        };
        match document.tracker.page_at(x, y) {
            Some(hit) => self.controller.double_click(&mut document.layer, hit.page, hit.x, hit.y),
            None => false,
        }
    }

    pub fn key_input(&mut self, key: KeyInput) -> bool {
        match self.document.as_mut() {
            Some(document) => self.controller.key_input(&mut document.layer, key),
            None => false,
        }
    }

    pub fn blur(&mut self) -> Option<AnnotationId> {
        let document = self.document.as_mut()?;
        self.controller.blur(&mut document.layer)
    }

    pub fn delete_annotation(&mut self, id: AnnotationId) -> bool {
        self.document.as_mut().is_some_and(|document| document.layer.delete(id).is_some())
    }

    // Export

    /// Write every annotation into a copy of the loaded document
    pub fn export(&mut self) -> Result<ExportReport, SessionError> {
        self.sync_geometry();
        let document = self.open_document()?;
        let report = export_document(
            &document.source,
            document.layer.annotations(),
            document.tracker.as_ref(),
        )?;
        Ok(report)
    }
}

impl Drop for SigningSession {
    fn drop(&mut self) {
        if let Some(document) = &self.document {
            document.scheduler.cancel_all();
        }
    }
}
