//! Page geometry for the scrollable document view
//!
//! Pages are stacked vertically inside a padded container, separated by a
//! fixed gap and centred horizontally. A page is displayed at its raster
//! size unless that is wider than the available width, in which case it is
//! scaled down keeping its aspect ratio.
//!
//! A page only has a published rectangle once a render of it completed.
//! The raster and the rectangle derived from it are stored under the same
//! lock, so readers never see one without the other. Pages that were never
//! rendered get an estimate from their native size, used only for scroll
//! math.

use crate::scheduler::RenderSink;
use pdf_signer_engine::{PageSize, PdfEngineError, RgbaImage};
use std::sync::{Arc, Mutex};

/// Container layout around the page column, in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutMetrics {
    pub container_width: f32,
    pub padding: f32,
    pub page_gap: f32,
    pub max_page_width: f32,
}

impl Default for LayoutMetrics {
    fn default() -> Self {
        Self { container_width: 1024.0, padding: 16.0, page_gap: 32.0, max_page_width: 900.0 }
    }
}

impl LayoutMetrics {
    /// Widest a page may be displayed
    pub fn available_width(&self) -> f32 {
        (self.container_width - 2.0 * self.padding).min(self.max_page_width).max(1.0)
    }

    fn content_width(&self) -> f32 {
        (self.container_width - 2.0 * self.padding).max(0.0)
    }

    /// Displayed size of a raster of `width` x `height` pixels
    pub fn display_size(&self, width: f32, height: f32) -> (f32, f32) {
        if width <= 0.0 || height <= 0.0 {
            return (0.0, 0.0);
        }
        let display_width = width.min(self.available_width());
        (display_width, height * display_width / width)
    }
}

/// On-screen rectangle of a page relative to the scroll content origin
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ViewportRect {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// Height of the overlap with the band `[top, bottom)`
    pub fn vertical_overlap(&self, top: f32, bottom: f32) -> f32 {
        (self.bottom().min(bottom) - self.top.max(top)).max(0.0)
    }
}

/// The latest completed render of a page
#[derive(Debug, Clone)]
pub struct PublishedPage {
    pub raster: Arc<RgbaImage>,
    pub scale: f32,
    pub rect: ViewportRect,
}

/// Hit-test result of [`GeometryTracker::page_at`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageHit {
    pub page: u32,
    /// Point relative to the page's top-left corner
    pub x: f32,
    pub y: f32,
}

struct TrackerState {
    metrics: LayoutMetrics,
    scale: f32,
    visibility_margin: f32,
    native_sizes: Vec<PageSize>,
    published: Vec<Option<PublishedPage>>,
    /// Published or estimated rectangle of every page
    layout: Vec<ViewportRect>,
    errors: Vec<Option<String>>,
    version: u64,
}

impl TrackerState {
    fn relayout(&mut self) {
        let metrics = self.metrics;
        let mut top = metrics.padding;

        for index in 0..self.native_sizes.len() {
            let (raster_width, raster_height) = match &self.published[index] {
                Some(page) => (page.raster.width() as f32, page.raster.height() as f32),
                None => {
                    let size = self.native_sizes[index];
                    (size.width_pt * self.scale, size.height_pt * self.scale)
                }
            };

            let (width, height) = metrics.display_size(raster_width, raster_height);
            let left = metrics.padding + ((metrics.content_width() - width) / 2.0).max(0.0);
            let rect = ViewportRect::new(left, top, width, height);

            self.layout[index] = rect;
            if let Some(page) = self.published[index].as_mut() {
                page.rect = rect;
            }

            top += height + metrics.page_gap;
        }

        self.version += 1;
    }

    fn index(&self, page: u32) -> Option<usize> {
        let index = page.checked_sub(1)? as usize;
        (index < self.native_sizes.len()).then_some(index)
    }
}

/// Tracks where every page sits on screen
pub struct GeometryTracker {
    state: Mutex<TrackerState>,
}

impl GeometryTracker {
    pub fn new(native_sizes: Vec<PageSize>, metrics: LayoutMetrics, scale: f32) -> Self {
        let count = native_sizes.len();
        let mut state = TrackerState {
            metrics,
            scale,
            visibility_margin: 100.0,
            native_sizes,
            published: vec![None; count],
            layout: vec![ViewportRect::default(); count],
            errors: vec![None; count],
            version: 0,
        };
        state.relayout();
        Self { state: Mutex::new(state) }
    }

    pub fn with_visibility_margin(self, margin: f32) -> Self {
        self.state.lock().unwrap().visibility_margin = margin;
        self
    }

    pub fn page_count(&self) -> u32 {
        self.state.lock().unwrap().native_sizes.len() as u32
    }

    pub fn native_size(&self, page: u32) -> Option<PageSize> {
        let state = self.state.lock().unwrap();
        state.index(page).map(|index| state.native_sizes[index])
    }

    /// Bumped on every geometry change
    pub fn version(&self) -> u64 {
        self.state.lock().unwrap().version
    }

    pub fn metrics(&self) -> LayoutMetrics {
        self.state.lock().unwrap().metrics
    }

    pub fn scale(&self) -> f32 {
        self.state.lock().unwrap().scale
    }

    /// Scale used for estimating pages that have no raster at that scale yet
    pub fn set_scale(&self, scale: f32) {
        let mut state = self.state.lock().unwrap();
        state.scale = scale;
        state.relayout();
    }

    pub fn set_container_width(&self, width: f32) {
        let mut state = self.state.lock().unwrap();
        if (state.metrics.container_width - width).abs() > f32::EPSILON {
            state.metrics.container_width = width;
            state.relayout();
        }
    }

    /// Published rectangle of `page`; `None` until a render completed
    pub fn rect(&self, page: u32) -> Option<ViewportRect> {
        let state = self.state.lock().unwrap();
        let index = state.index(page)?;
        state.published[index].as_ref().map(|published| published.rect)
    }

    /// Published rectangles of every page, in page order
    pub fn rects(&self) -> Vec<Option<ViewportRect>> {
        let state = self.state.lock().unwrap();
        state.published.iter().map(|page| page.as_ref().map(|p| p.rect)).collect()
    }

    /// Published or estimated rectangle, for scrolling only
    pub fn layout_rect(&self, page: u32) -> Option<ViewportRect> {
        let state = self.state.lock().unwrap();
        state.index(page).map(|index| state.layout[index])
    }

    pub fn published(&self, page: u32) -> Option<PublishedPage> {
        let state = self.state.lock().unwrap();
        let index = state.index(page)?;
        state.published[index].clone()
    }

    pub fn error(&self, page: u32) -> Option<String> {
        let state = self.state.lock().unwrap();
        let index = state.index(page)?;
        state.errors[index].clone()
    }

    /// Total scrollable height of the page column
    pub fn content_height(&self) -> f32 {
        let state = self.state.lock().unwrap();
        match state.layout.last() {
            Some(rect) => rect.bottom() + state.metrics.padding,
            None => 2.0 * state.metrics.padding,
        }
    }

    /// Pages intersecting the scrolled band, widened by the visibility margin
    pub fn visible_pages(&self, scroll_top: f32, viewport_height: f32) -> Vec<u32> {
        let state = self.state.lock().unwrap();
        let top = scroll_top - state.visibility_margin;
        let bottom = scroll_top + viewport_height + state.visibility_margin;

        state
            .layout
            .iter()
            .enumerate()
            .filter(|(_, rect)| rect.bottom() > top && rect.top < bottom)
            .map(|(index, _)| index as u32 + 1)
            .collect()
    }

    /// Page with the largest on-screen share; ties go to the earlier page
    pub fn most_visible_page(&self, scroll_top: f32, viewport_height: f32) -> Option<u32> {
        let state = self.state.lock().unwrap();
        let bottom = scroll_top + viewport_height;

        let mut best: Option<(u32, f32)> = None;
        for (index, rect) in state.layout.iter().enumerate() {
            let overlap = rect.vertical_overlap(scroll_top, bottom);
            if overlap > 0.0 && best.map_or(true, |(_, current)| overlap > current) {
                best = Some((index as u32 + 1, overlap));
            }
        }
        best.map(|(page, _)| page)
    }

    /// Page under a container point, with the point in page-local coordinates
    pub fn page_at(&self, x: f32, y: f32) -> Option<PageHit> {
        let state = self.state.lock().unwrap();
        state.published.iter().enumerate().find_map(|(index, page)| {
            let rect = page.as_ref()?.rect;
            rect.contains(x, y).then(|| PageHit {
                page: index as u32 + 1,
                x: x - rect.left,
                y: y - rect.top,
            })
        })
    }
}

impl RenderSink for GeometryTracker {
    fn publish(&self, page: u32, scale: f32, raster: Arc<RgbaImage>) {
        let mut state = self.state.lock().unwrap();
        let Some(index) = state.index(page) else {
            log::warn!("publish for unknown page {page} ignored");
            return;
        };

        state.published[index] =
            Some(PublishedPage { raster, scale, rect: ViewportRect::default() });
        state.errors[index] = None;
        state.relayout();

        if let Some(published) = &state.published[index] {
            log::debug!(
                "page {page} published at scale {scale}: {:.1}x{:.1} at ({:.1}, {:.1})",
                published.rect.width,
                published.rect.height,
                published.rect.left,
                published.rect.top
            );
        }
    }

    fn record_error(&self, page: u32, error: &PdfEngineError) {
        let mut state = self.state.lock().unwrap();
        if let Some(index) = state.index(page) {
            state.errors[index] = Some(error.to_string());
            state.version += 1;
        }
    }
}
