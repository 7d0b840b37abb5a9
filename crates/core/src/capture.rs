//! Freehand signature capture
//!
//! A [`CaptureSurface`] overlays one page's displayed rectangle and records
//! pointer strokes in that rectangle's coordinates. Completing a surface
//! crops the ink to its padded bounding box and yields a signature ready to
//! be placed at the same spot.

use crate::annotation::{Color, Position, Size, SignatureImage};
use crate::error::CaptureError;
use image::Rgba;
use imageproc::drawing::draw_filled_circle_mut;
use pdf_signer_engine::RgbaImage;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureSettings {
    /// Margin added around the ink bounding box
    pub padding: f32,
    /// Smallest width and height of a captured signature
    pub min_size: f32,
    pub pen_width: f32,
    pub pen_color: Color,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self { padding: 8.0, min_size: 20.0, pen_width: 2.0, pen_color: Color::BLACK }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureState {
    #[default]
    Inactive,
    Capturing,
}

/// Signature produced by completing a surface
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSignature {
    pub page: u32,
    pub position: Position,
    pub size: Size,
    pub image: SignatureImage,
}

/// Padded, clamped bounding box of the ink, in overlay pixels
#[derive(Debug, Clone, Copy, PartialEq)]
struct CropBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

fn crop_axis(min: f32, max: f32, extent: f32, settings: &CaptureSettings) -> (f32, f32) {
    let start = (min - settings.padding).max(0.0);
    let end = (max + settings.padding).min(extent);
    let length = (end - start).min(extent - start).max(settings.min_size).min(extent);
    // The floor can push the box past the far edge; slide it back inside.
    let start = start.min(extent - length).max(0.0);
    (start, length)
}

/// Freehand drawing overlay for one page
pub struct CaptureSurface {
    page: u32,
    width: f32,
    height: f32,
    settings: CaptureSettings,
    state: CaptureState,
    strokes: Vec<Vec<Point>>,
    active: Option<Vec<Point>>,
}

impl CaptureSurface {
    /// Overlay for `page` sized to its displayed rectangle
    pub fn new(page: u32, extent: Size, settings: CaptureSettings) -> Self {
        Self {
            page,
            width: extent.width.max(1.0),
            height: extent.height.max(1.0),
            settings,
            state: CaptureState::Inactive,
            strokes: Vec::new(),
            active: None,
        }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn extent(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Completed strokes, oldest first
    pub fn strokes(&self) -> &[Vec<Point>] {
        &self.strokes
    }

    /// Follow a change of the page's displayed rectangle. Recorded ink is
    /// scaled with it so it stays over the same spot of the page.
    ///
    /// Returns `false` when the extent did not change.
    pub fn resize(&mut self, extent: Size) -> bool {
        let width = extent.width.max(1.0);
        let height = extent.height.max(1.0);
        if width == self.width && height == self.height {
            return false;
        }

        let sx = width / self.width;
        let sy = height / self.height;
        let scale = |point: &mut Point| {
            point.x *= sx;
            point.y *= sy;
        };
        self.strokes.iter_mut().flatten().for_each(scale);
        self.active.iter_mut().flatten().for_each(scale);

        log::debug!(
            "capture surface on page {} resized to {width}x{height}",
            self.page
        );
        self.width = width;
        self.height = height;
        true
    }

    pub fn has_ink(&self) -> bool {
        self.strokes.iter().any(|stroke| !stroke.is_empty())
            || self.active.as_ref().is_some_and(|stroke| !stroke.is_empty())
    }

    pub fn begin(&mut self) {
        self.strokes.clear();
        self.active = None;
        self.state = CaptureState::Capturing;
    }

    pub fn pointer_down(&mut self, point: Point) {
        if !self.is_capturing() {
            return;
        }
        self.commit_active();
        self.active = Some(vec![point]);
    }

    pub fn pointer_move(&mut self, point: Point) {
        if let Some(stroke) = self.active.as_mut() {
            stroke.push(point);
        }
    }

    pub fn pointer_up(&mut self) {
        self.commit_active();
    }

    fn commit_active(&mut self) {
        if let Some(stroke) = self.active.take() {
            if !stroke.is_empty() {
                self.strokes.push(stroke);
            }
        }
    }

    /// Discard all ink and keep capturing
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.active = None;
    }

    /// Remove the most recently completed stroke. Returns `false` when there
    /// is none.
    pub fn undo(&mut self) -> bool {
        self.strokes.pop().is_some()
    }

    /// Crop the ink into a signature and go back to inactive.
    ///
    /// Without ink nothing is emitted and the surface keeps capturing.
    pub fn complete(&mut self) -> Result<Option<CapturedSignature>, CaptureError> {
        if !self.is_capturing() {
            return Err(CaptureError::NotCapturing);
        }
        self.commit_active();

        let Some(crop) = self.crop_box() else {
            return Ok(None);
        };

        let raster = self.rasterize();
        let x = crop.x.floor() as u32;
        let y = crop.y.floor() as u32;
        let width = (crop.width.round() as u32).clamp(1, raster.width().saturating_sub(x).max(1));
        let height = (crop.height.round() as u32).clamp(1, raster.height().saturating_sub(y).max(1));
        let cropped = image::imageops::crop_imm(&raster, x, y, width, height).to_image();
        let image = SignatureImage::from_rgba(&cropped)
            .map_err(|source| CaptureError::Encode { page: self.page, source })?;

        let signature = CapturedSignature {
            page: self.page,
            position: Position::new(crop.x, crop.y),
            size: Size::new(crop.width, crop.height),
            image,
        };
        log::info!(
            "captured signature on page {} at ({}, {}) size {}x{}",
            self.page,
            crop.x,
            crop.y,
            crop.width,
            crop.height
        );

        self.strokes.clear();
        self.state = CaptureState::Inactive;
        Ok(Some(signature))
    }

    /// Discard all ink and go inactive without emitting
    pub fn cancel(&mut self) {
        self.strokes.clear();
        self.active = None;
        self.state = CaptureState::Inactive;
    }

    fn crop_box(&self) -> Option<CropBox> {
        let mut points = self.strokes.iter().flatten().peekable();
        points.peek()?;

        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);
        for point in points {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
        }

        let (x, width) = crop_axis(min_x, max_x, self.width, &self.settings);
        let (y, height) = crop_axis(min_y, max_y, self.height, &self.settings);
        Some(CropBox { x, y, width, height })
    }

    /// Ink on a transparent overlay-sized canvas
    fn rasterize(&self) -> RgbaImage {
        let mut canvas = RgbaImage::new(self.width.ceil() as u32, self.height.ceil() as u32);
        let Color { r, g, b } = self.settings.pen_color;
        let ink = Rgba([r, g, b, 255]);
        let radius = ((self.settings.pen_width / 2.0).round() as i32).max(1);

        for stroke in &self.strokes {
            let mut previous: Option<Point> = None;
            for &point in stroke {
                match previous {
                    Some(from) => stamp_segment(&mut canvas, from, point, radius, ink),
                    None => draw_filled_circle_mut(&mut canvas, to_pixel(point), radius, ink),
                }
                previous = Some(point);
            }
        }
        canvas
    }
}

fn to_pixel(point: Point) -> (i32, i32) {
    (point.x.round() as i32, point.y.round() as i32)
}

fn stamp_segment(canvas: &mut RgbaImage, from: Point, to: Point, radius: i32, ink: Rgba<u8>) {
    let length = (to.x - from.x).hypot(to.y - from.y);
    let steps = length.ceil().max(1.0) as u32;
    for step in 0..=steps {
        let t = step as f32 / steps as f32;
        let point = Point::new(from.x + (to.x - from.x) * t, from.y + (to.y - from.y) * t);
        draw_filled_circle_mut(canvas, to_pixel(point), radius, ink);
    }
}

/// Result of completing every surface of a [`CaptureSession`]
#[derive(Debug, Default)]
pub struct CaptureResults {
    pub signatures: Vec<CapturedSignature>,
    /// Surfaces that failed keep their ink and stay capturing
    pub failures: Vec<CaptureError>,
}

/// Which pages get a capture surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureTarget {
    AllPages,
    Page(u32),
}

/// One capture surface per targeted page, driven by a shared toolbar
///
/// Toolbar commands fan out to every surface and each one decides
/// independently whether it has anything to act on.
pub struct CaptureSession {
    target: CaptureTarget,
    surfaces: BTreeMap<u32, CaptureSurface>,
}

impl CaptureSession {
    /// Start capturing on the given `(page, displayed extent)` pairs
    pub fn begin(
        target: CaptureTarget,
        extents: impl IntoIterator<Item = (u32, Size)>,
        settings: CaptureSettings,
    ) -> Self {
        let surfaces = extents
            .into_iter()
            .filter(|(page, _)| match target {
                CaptureTarget::AllPages => true,
                CaptureTarget::Page(wanted) => *page == wanted,
            })
            .map(|(page, extent)| {
                let mut surface = CaptureSurface::new(page, extent, settings);
                surface.begin();
                (page, surface)
            })
            .collect::<BTreeMap<_, _>>();

        log::debug!("capture started on {} page(s)", surfaces.len());
        Self { target, surfaces }
    }

    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    pub fn pages(&self) -> Vec<u32> {
        self.surfaces.keys().copied().collect()
    }

    pub fn surface(&self, page: u32) -> Option<&CaptureSurface> {
        self.surfaces.get(&page)
    }

    pub fn surface_mut(&mut self, page: u32) -> Option<&mut CaptureSurface> {
        self.surfaces.get_mut(&page)
    }

    pub fn is_active(&self) -> bool {
        self.surfaces.values().any(CaptureSurface::is_capturing)
    }

    pub fn clear_all(&mut self) {
        self.surfaces.values_mut().for_each(CaptureSurface::clear);
    }

    /// Undo on every surface. Returns how many surfaces removed a stroke.
    pub fn undo_all(&mut self) -> usize {
        self.surfaces.values_mut().map(CaptureSurface::undo).filter(|&undone| undone).count()
    }

    /// Complete every capturing surface that has ink.
    ///
    /// A failing surface does not stop the others.
    pub fn complete_all(&mut self) -> CaptureResults {
        let mut results = CaptureResults::default();
        for surface in self.surfaces.values_mut().filter(|s| s.is_capturing()) {
            match surface.complete() {
                Ok(Some(signature)) => results.signatures.push(signature),
                Ok(None) => {}
                Err(err) => {
                    log::warn!("capture on page {} failed: {err}", surface.page());
                    results.failures.push(err);
                }
            }
        }
        results
    }

    /// Resize the surface of `page` to its new displayed extent
    pub fn resize_page(&mut self, page: u32, extent: Size) -> bool {
        self.surfaces.get_mut(&page).is_some_and(|surface| surface.resize(extent))
    }

    pub fn cancel_all(&mut self) {
        self.surfaces.values_mut().for_each(CaptureSurface::cancel);
    }
}
