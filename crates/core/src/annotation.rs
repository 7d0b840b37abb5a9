//! Annotation data model and the annotation layer
//!
//! Positions and sizes are stored in the CSS-pixel space of the page's
//! displayed rectangle, origin at the page's top-left corner, Y growing
//! downward. They are only converted into document space at export.

use crate::error::LayerError;
use base64::Engine as _;
use pdf_signer_engine::RgbaImage;
use pdf_signer_scheduler::GeometryTracker;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// Unique identifier for an annotation, UUID v4
pub type AnnotationId = uuid::Uuid;

pub const SIGNATURE_MIN_SIZE: Size = Size { width: 20.0, height: 20.0 };
pub const TEXT_MIN_SIZE: Size = Size { width: 40.0, height: 24.0 };

/// Top-left corner of an annotation within its page
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Opaque RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    /// `#222`, the default text color
    pub const INK: Color = Color { r: 0x22, g: 0x22, b: 0x22 };

    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rgb` or `#rrggbb`
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.trim().strip_prefix('#')?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }

        match digits.len() {
            3 => {
                let mut channels = digits.chars().map(|c| {
                    let value = c.to_digit(16).unwrap_or(0) as u8;
                    value * 16 + value
                });
                Some(Self {
                    r: channels.next()?,
                    g: channels.next()?,
                    b: channels.next()?,
                })
            }
            6 => Some(Self {
                r: u8::from_str_radix(&digits[0..2], 16).ok()?,
                g: u8::from_str_radix(&digits[2..4], 16).ok()?,
                b: u8::from_str_radix(&digits[4..6], 16).ok()?,
            }),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Convert to normalized RGB values (0.0 to 1.0)
    pub fn to_normalized(&self) -> [f32; 3] {
        [self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0]
    }
}

/// CSS-style font shorthand reduced to size and family, e.g. `16px Arial`
#[derive(Debug, Clone, PartialEq)]
pub struct FontDescriptor {
    pub size_px: f32,
    pub family: String,
}

impl FontDescriptor {
    pub fn new(size_px: f32, family: impl Into<String>) -> Self {
        Self { size_px, family: family.into() }
    }

    /// Parse a shorthand such as `16px Arial` or `italic 12px "Times New Roman"`.
    /// Tokens before the size are ignored.
    pub fn parse(css: &str) -> Option<Self> {
        let mut tokens = css.split_whitespace();
        let size_px = tokens.by_ref().find_map(|token| {
            token.strip_suffix("px").and_then(|size| size.parse::<f32>().ok())
        })?;

        let family = tokens.collect::<Vec<_>>().join(" ");
        let family = family.trim_matches(|c| c == '"' || c == '\'').to_string();
        if family.is_empty() || size_px <= 0.0 {
            return None;
        }

        Some(Self { size_px, family })
    }
}

impl Default for FontDescriptor {
    fn default() -> Self {
        Self::new(16.0, "Arial")
    }
}

impl fmt::Display for FontDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}px {}", self.size_px, self.family)
    }
}

/// Self-contained PNG raster of a signature
#[derive(Clone, PartialEq)]
pub struct SignatureImage {
    png: Arc<Vec<u8>>,
    width: u32,
    height: u32,
}

impl fmt::Debug for SignatureImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("png_bytes", &self.png.len())
            .finish()
    }
}

impl SignatureImage {
    const DATA_URL_PREFIX: &'static str = "data:image/png;base64,";

    pub fn from_rgba(image: &RgbaImage) -> Result<Self, image::ImageError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
        Ok(Self { png: Arc::new(png), width: image.width(), height: image.height() })
    }

    pub fn from_png(png: Vec<u8>) -> Result<Self, image::ImageError> {
        let decoded = image::load_from_memory_with_format(&png, image::ImageFormat::Png)?;
        Ok(Self { width: decoded.width(), height: decoded.height(), png: Arc::new(png) })
    }

    /// Parse a `data:image/png;base64,` URL
    pub fn from_data_url(url: &str) -> Option<Self> {
        let payload = url.strip_prefix(Self::DATA_URL_PREFIX)?;
        let png = base64::engine::general_purpose::STANDARD.decode(payload).ok()?;
        Self::from_png(png).ok()
    }

    pub fn to_data_url(&self) -> String {
        let mut url = String::from(Self::DATA_URL_PREFIX);
        base64::engine::general_purpose::STANDARD.encode_string(self.png.as_slice(), &mut url);
        url
    }

    pub fn decode(&self) -> Result<RgbaImage, image::ImageError> {
        Ok(image::load_from_memory_with_format(&self.png, image::ImageFormat::Png)?.to_rgba8())
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Type-specific annotation payload
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    Signature { image: SignatureImage },
    Text { text: String, font: FontDescriptor, color: Color },
}

impl AnnotationKind {
    pub fn min_size(&self) -> Size {
        match self {
            AnnotationKind::Signature { .. } => SIGNATURE_MIN_SIZE,
            AnnotationKind::Text { .. } => TEXT_MIN_SIZE,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AnnotationKind::Signature { .. } => "signature",
            AnnotationKind::Text { .. } => "text",
        }
    }
}

/// A signature or text label placed on a page
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    id: AnnotationId,
    /// 1-based page number
    page: u32,
    position: Position,
    size: Size,
    kind: AnnotationKind,
}

impl Annotation {
    pub fn id(&self) -> AnnotationId {
        self.id
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn kind(&self) -> &AnnotationKind {
        &self.kind
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, AnnotationKind::Text { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            AnnotationKind::Text { text, .. } => Some(text),
            AnnotationKind::Signature { .. } => None,
        }
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.position.x
            && x < self.position.x + self.size.width
            && y >= self.position.y
            && y < self.position.y + self.size.height
    }
}

/// Displayed extent of each page, used to keep annotations on their page
pub trait PageBounds: Send + Sync {
    fn page_count(&self) -> u32;

    /// Size of the page's published rectangle, `None` before its first render
    fn page_extent(&self, page: u32) -> Option<Size>;
}

impl PageBounds for GeometryTracker {
    fn page_count(&self) -> u32 {
        GeometryTracker::page_count(self)
    }

    fn page_extent(&self, page: u32) -> Option<Size> {
        self.rect(page).map(|rect| Size::new(rect.width, rect.height))
    }
}

/// Style given to new text labels
#[derive(Debug, Clone, PartialEq)]
pub struct TextStyle {
    pub font: FontDescriptor,
    pub color: Color,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { font: FontDescriptor::default(), color: Color::INK }
    }
}

/// Keep a box of `size` inside `extent`.
pub fn clamp_position(position: Position, size: Size, extent: Size) -> Position {
    Position {
        x: position.x.min(extent.width - size.width).max(0.0),
        y: position.y.min(extent.height - size.height).max(0.0),
    }
}

/// Floor at `min`, then stop at the extent edge measured from `position`.
/// The minimum wins when the two disagree.
pub fn clamp_size(size: Size, min: Size, position: Position, extent: Size) -> Size {
    Size {
        width: size.width.min(extent.width - position.x).max(min.width),
        height: size.height.min(extent.height - position.y).max(min.height),
    }
}

/// Owner of every annotation in a document
///
/// Later annotations are drawn above earlier ones.
///
/// # Example
///
/// ```
/// use pdf_signer_core::{AnnotationLayer, PageBounds, Position, Size};
/// use std::sync::Arc;
///
/// struct TwoPages;
/// impl PageBounds for TwoPages {
///     fn page_count(&self) -> u32 { 2 }
///     fn page_extent(&self, _page: u32) -> Option<Size> { Some(Size::new(600.0, 800.0)) }
/// }
///
/// let mut layer = AnnotationLayer::new(Arc::new(TwoPages));
/// let id = layer.add_text_label(Position::new(10.0, 10.0), Size::new(120.0, 32.0), 2).unwrap();
///
/// layer.update_position(id, Position::new(590.0, 10.0));
/// assert_eq!(layer.get(id).unwrap().position(), Position::new(480.0, 10.0));
/// ```
pub struct AnnotationLayer {
    annotations: Vec<Annotation>,
    bounds: Arc<dyn PageBounds>,
    text_style: TextStyle,
    editing: Option<AnnotationId>,
}

impl AnnotationLayer {
    pub fn new(bounds: Arc<dyn PageBounds>) -> Self {
        Self { annotations: Vec::new(), bounds, text_style: TextStyle::default(), editing: None }
    }

    pub fn with_text_style(mut self, style: TextStyle) -> Self {
        self.text_style = style;
        self
    }

    pub fn text_style(&self) -> &TextStyle {
        &self.text_style
    }

    pub fn page_count(&self) -> u32 {
        self.bounds.page_count()
    }

    pub fn page_extent(&self, page: u32) -> Option<Size> {
        self.bounds.page_extent(page)
    }

    fn check_page(&self, page: u32) -> Result<(), LayerError> {
        let page_count = self.bounds.page_count();
        if page == 0 || page > page_count {
            return Err(LayerError::PageOutOfRange { page, page_count });
        }
        Ok(())
    }

    fn insert(
        &mut self,
        page: u32,
        position: Position,
        size: Size,
        kind: AnnotationKind,
    ) -> Result<AnnotationId, LayerError> {
        self.check_page(page)?;

        let min = kind.min_size();
        let (position, size) = match self.bounds.page_extent(page) {
            Some(extent) => {
                let floored = Size::new(size.width.max(min.width), size.height.max(min.height));
                let position = clamp_position(position, floored, extent);
                (position, clamp_size(floored, min, position, extent))
            }
            None => (position, Size::new(size.width.max(min.width), size.height.max(min.height))),
        };

        let id = AnnotationId::new_v4();
        log::debug!("added {} {id} on page {page} at ({}, {})", kind.label(), position.x, position.y);
        self.annotations.push(Annotation { id, page, position, size, kind });
        Ok(id)
    }

    pub fn add_signature(
        &mut self,
        image: SignatureImage,
        position: Position,
        size: Size,
        page: u32,
    ) -> Result<AnnotationId, LayerError> {
        self.insert(page, position, size, AnnotationKind::Signature { image })
    }

    /// Add an empty text label and start editing it.
    pub fn add_text_label(
        &mut self,
        position: Position,
        size: Size,
        page: u32,
    ) -> Result<AnnotationId, LayerError> {
        let kind = AnnotationKind::Text {
            text: String::new(),
            font: self.text_style.font.clone(),
            color: self.text_style.color,
        };
        let id = self.insert(page, position, size, kind)?;
        self.editing = Some(id);
        Ok(id)
    }

    fn find_mut(&mut self, id: AnnotationId, operation: &str) -> Option<&mut Annotation> {
        let found = self.annotations.iter_mut().find(|annotation| annotation.id == id);
        if found.is_none() {
            log::warn!("{operation}: unknown annotation {id}");
        }
        found
    }

    /// Clamped position `id` would take if moved to `position`
    pub fn clamped_position(&self, id: AnnotationId, position: Position) -> Option<Position> {
        let annotation = self.get(id)?;
        Some(match self.bounds.page_extent(annotation.page) {
            Some(extent) => clamp_position(position, annotation.size, extent),
            None => position,
        })
    }

    /// Clamped size `id` would take if resized to `size`
    pub fn clamped_size(&self, id: AnnotationId, size: Size) -> Option<Size> {
        let annotation = self.get(id)?;
        let min = annotation.kind.min_size();
        Some(match self.bounds.page_extent(annotation.page) {
            Some(extent) => clamp_size(size, min, annotation.position, extent),
            None => Size::new(size.width.max(min.width), size.height.max(min.height)),
        })
    }

    /// Move an annotation. Returns the position actually applied.
    pub fn update_position(&mut self, id: AnnotationId, position: Position) -> Option<Position> {
        let clamped = self.clamped_position(id, position);
        let annotation = self.find_mut(id, "update_position")?;
        let clamped = clamped?;
        annotation.position = clamped;
        Some(clamped)
    }

    /// Resize an annotation. Returns the size actually applied.
    pub fn update_size(&mut self, id: AnnotationId, size: Size) -> Option<Size> {
        let clamped = self.clamped_size(id, size);
        let annotation = self.find_mut(id, "update_size")?;
        let clamped = clamped?;
        annotation.size = clamped;
        Some(clamped)
    }

    /// Replace the text of a text label. Signatures are left untouched.
    pub fn update_text(&mut self, id: AnnotationId, new_text: impl Into<String>) -> bool {
        let Some(annotation) = self.find_mut(id, "update_text") else {
            return false;
        };

        match &mut annotation.kind {
            AnnotationKind::Text { text, .. } => {
                *text = new_text.into();
                true
            }
            AnnotationKind::Signature { .. } => {
                log::warn!("update_text: annotation {id} is a signature");
                false
            }
        }
    }

    /// Remove an annotation. Deleting an absent id does nothing.
    pub fn delete(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|annotation| annotation.id == id)?;
        if self.editing == Some(id) {
            self.editing = None;
        }
        log::debug!("deleted annotation {id}");
        Some(self.annotations.remove(index))
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    /// All annotations, bottom to top
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// Annotations of one page, bottom to top
    pub fn on_page(&self, page: u32) -> Vec<&Annotation> {
        self.annotations.iter().filter(|annotation| annotation.page == page).collect()
    }

    /// Topmost annotation of `page` containing the page-local point
    pub fn hit_test(&self, page: u32, x: f32, y: f32) -> Option<&Annotation> {
        self.annotations
            .iter()
            .rev()
            .find(|annotation| annotation.page == page && annotation.contains(x, y))
    }

    /// Scale the boxes of one page after its displayed rectangle changed size.
    ///
    /// Boxes floored back to their minimum are pulled inside the new extent.
    pub fn rescale_page(&mut self, page: u32, sx: f32, sy: f32) -> usize {
        let extent = self.bounds.page_extent(page);
        let mut count = 0;
        for annotation in self.annotations.iter_mut().filter(|a| a.page == page) {
            let min = annotation.kind.min_size();
            let position = Position::new(annotation.position.x * sx, annotation.position.y * sy);
            let size = Size::new(
                (annotation.size.width * sx).max(min.width),
                (annotation.size.height * sy).max(min.height),
            );

            (annotation.position, annotation.size) = match extent {
                Some(extent) => {
                    let position = clamp_position(position, size, extent);
                    (position, clamp_size(size, min, position, extent))
                }
                None => (position, size),
            };
            count += 1;
        }
        count
    }

    /// Put a text label into edit mode
    pub fn begin_edit(&mut self, id: AnnotationId) -> bool {
        match self.get(id) {
            Some(annotation) if annotation.is_text() => {
                self.editing = Some(id);
                true
            }
            Some(_) => false,
            None => {
                log::warn!("begin_edit: unknown annotation {id}");
                false
            }
        }
    }

    pub fn end_edit(&mut self) -> Option<AnnotationId> {
        self.editing.take()
    }

    pub fn editing(&self) -> Option<AnnotationId> {
        self.editing
    }

    pub fn is_editing(&self, id: AnnotationId) -> bool {
        self.editing == Some(id)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn clear(&mut self) {
        self.annotations.clear();
        self.editing = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Page bounds with settable extents
    #[derive(Default)]
    struct TestBounds {
        page_count: u32,
        extents: Mutex<HashMap<u32, Size>>,
    }

    impl TestBounds {
        fn with_pages(page_count: u32, extent: Size) -> Arc<Self> {
            let extents = (1..=page_count).map(|page| (page, extent)).collect();
            Arc::new(Self { page_count, extents: Mutex::new(extents) })
        }
    }

    impl PageBounds for TestBounds {
        fn page_count(&self) -> u32 {
            self.page_count
        }

        fn page_extent(&self, page: u32) -> Option<Size> {
            self.extents.lock().unwrap().get(&page).copied()
        }
    }

    fn layer() -> AnnotationLayer {
        AnnotationLayer::new(TestBounds::with_pages(3, Size::new(600.0, 800.0)))
    }

    fn signature() -> SignatureImage {
        SignatureImage::from_rgba(&RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 255])))
            .unwrap()
    }

    #[test]
    fn test_color_from_hex() {
        assert_eq!(Color::from_hex("#222"), Some(Color::rgb(0x22, 0x22, 0x22)));
        assert_eq!(Color::from_hex("#1a2B3c"), Some(Color::rgb(0x1a, 0x2b, 0x3c)));
        assert_eq!(Color::from_hex("222"), None);
        assert_eq!(Color::from_hex("#12345"), None);
        assert_eq!(Color::from_hex("#zzz"), None);
        assert_eq!(Color::INK.to_hex(), "#222222");
    }

    #[test]
    fn test_font_descriptor_parse() {
        assert_eq!(FontDescriptor::parse("16px Arial"), Some(FontDescriptor::new(16.0, "Arial")));
        assert_eq!(
            FontDescriptor::parse("italic 12.5px \"Times New Roman\""),
            Some(FontDescriptor::new(12.5, "Times New Roman"))
        );
        assert_eq!(FontDescriptor::parse("Arial"), None);
        assert_eq!(FontDescriptor::parse("16px"), None);
        assert_eq!(FontDescriptor::default().to_string(), "16px Arial");
    }

    #[test]
    fn test_signature_image_data_url() {
        let image = signature();
        let url = image.to_data_url();
        assert!(url.starts_with("data:image/png;base64,"));

        let parsed = SignatureImage::from_data_url(&url).expect("valid data url");
        assert_eq!(parsed.width(), 4);
        assert_eq!(parsed.decode().unwrap().get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert!(SignatureImage::from_data_url("data:text/plain;base64,AAAA").is_none());
    }

    #[test]
    fn test_add_signature_assigns_unique_ids() {
        let mut layer = layer();

        let a = layer.add_signature(signature(), Position::new(10.0, 10.0), Size::new(50.0, 30.0), 1);
        let b = layer.add_signature(signature(), Position::new(10.0, 10.0), Size::new(50.0, 30.0), 1);

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a, b);
        assert_eq!(layer.len(), 2);
        assert_eq!(a.get_version_num(), 4);
    }

    #[test]
    fn test_out_of_range_page_is_rejected() {
        let mut layer = layer();

        let zero = layer.add_signature(signature(), Position::default(), Size::new(30.0, 30.0), 0);
        let past = layer.add_text_label(Position::default(), Size::new(120.0, 32.0), 4);

        assert_eq!(zero, Err(LayerError::PageOutOfRange { page: 0, page_count: 3 }));
        assert_eq!(past, Err(LayerError::PageOutOfRange { page: 4, page_count: 3 }));
        assert!(layer.is_empty());
        assert_eq!(layer.editing(), None);
    }

    #[test]
    fn test_text_label_starts_empty_and_editing() {
        let mut layer = layer();
        let id = layer.add_text_label(Position::new(5.0, 5.0), Size::new(120.0, 32.0), 2).unwrap();

        let label = layer.get(id).unwrap();
        assert_eq!(label.text(), Some(""));
        assert_eq!(label.page(), 2);
        assert!(layer.is_editing(id));
        match label.kind() {
            AnnotationKind::Text { font, color, .. } => {
                assert_eq!(font.to_string(), "16px Arial");
                assert_eq!(*color, Color::INK);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_sizes_are_floored_at_type_minimum() {
        let mut layer = layer();

        let sig = layer.add_signature(signature(), Position::default(), Size::new(5.0, 5.0), 1).unwrap();
        let text = layer.add_text_label(Position::default(), Size::new(5.0, 5.0), 1).unwrap();

        assert_eq!(layer.get(sig).unwrap().size(), SIGNATURE_MIN_SIZE);
        assert_eq!(layer.get(text).unwrap().size(), TEXT_MIN_SIZE);

        assert_eq!(layer.update_size(text, Size::new(1.0, 1.0)), Some(TEXT_MIN_SIZE));
    }

    #[test]
    fn test_update_position_clamps_to_page() {
        let mut layer = layer();
        let id = layer
            .add_signature(signature(), Position::new(10.0, 10.0), Size::new(100.0, 50.0), 1)
            .unwrap();

        assert_eq!(layer.update_position(id, Position::new(-20.0, -5.0)), Some(Position::new(0.0, 0.0)));
        assert_eq!(
            layer.update_position(id, Position::new(580.0, 790.0)),
            Some(Position::new(500.0, 750.0))
        );
        assert_eq!(layer.get(id).unwrap().position(), Position::new(500.0, 750.0));
    }

    #[test]
    fn test_resize_past_right_edge_stops_at_boundary() {
        let mut layer = layer();
        let id = layer
            .add_signature(signature(), Position::new(450.0, 100.0), Size::new(100.0, 50.0), 1)
            .unwrap();

        let applied = layer.update_size(id, Size::new(400.0, 60.0)).unwrap();

        let annotation = layer.get(id).unwrap();
        assert_eq!(applied.width, 150.0);
        assert_eq!(annotation.position().x + annotation.size().width, 600.0);
        assert_eq!(applied.height, 60.0);
    }

    #[test]
    fn test_no_clamping_without_geometry() {
        let bounds = Arc::new(TestBounds { page_count: 1, ..Default::default() });
        let mut layer = AnnotationLayer::new(bounds);
        let id = layer
            .add_signature(signature(), Position::new(5000.0, 5000.0), Size::new(30.0, 30.0), 1)
            .unwrap();

        assert_eq!(layer.update_position(id, Position::new(-10.0, 9000.0)), Some(Position::new(-10.0, 9000.0)));
    }

    #[test]
    fn test_unknown_ids_are_no_ops() {
        let mut layer = layer();
        let stranger = AnnotationId::new_v4();

        assert_eq!(layer.update_position(stranger, Position::default()), None);
        assert_eq!(layer.update_size(stranger, Size::new(50.0, 50.0)), None);
        assert!(!layer.update_text(stranger, "hello"));
        assert!(!layer.begin_edit(stranger));
    }

    #[test]
    fn test_update_text_only_applies_to_labels() {
        let mut layer = layer();
        let sig = layer.add_signature(signature(), Position::default(), Size::new(30.0, 30.0), 1).unwrap();
        let text = layer.add_text_label(Position::default(), Size::new(120.0, 32.0), 1).unwrap();

        assert!(layer.update_text(text, "Approved"));
        assert!(!layer.update_text(sig, "nope"));
        assert_eq!(layer.get(text).unwrap().text(), Some("Approved"));
        assert_eq!(layer.get(sig).unwrap().text(), None);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut layer = layer();
        let keep = layer.add_text_label(Position::default(), Size::new(120.0, 32.0), 1).unwrap();
        let id = layer.add_text_label(Position::default(), Size::new(120.0, 32.0), 1).unwrap();

        assert!(layer.delete(id).is_some());
        let after_once: Vec<AnnotationId> = layer.annotations().iter().map(Annotation::id).collect();
        assert!(layer.delete(id).is_none());
        let after_twice: Vec<AnnotationId> = layer.annotations().iter().map(Annotation::id).collect();

        assert_eq!(after_once, after_twice);
        assert_eq!(after_once, vec![keep]);
        assert_eq!(layer.editing(), None);
    }

    #[test]
    fn test_hit_test_returns_topmost() {
        let mut layer = layer();
        let bottom = layer
            .add_signature(signature(), Position::new(0.0, 0.0), Size::new(100.0, 100.0), 1)
            .unwrap();
        let top = layer
            .add_signature(signature(), Position::new(50.0, 50.0), Size::new(100.0, 100.0), 1)
            .unwrap();

        assert_eq!(layer.hit_test(1, 75.0, 75.0).map(Annotation::id), Some(top));
        assert_eq!(layer.hit_test(1, 10.0, 10.0).map(Annotation::id), Some(bottom));
        assert!(layer.hit_test(2, 75.0, 75.0).is_none());
    }

    #[test]
    fn test_rescale_page_only_touches_that_page() {
        let mut layer = layer();
        let first = layer
            .add_signature(signature(), Position::new(100.0, 200.0), Size::new(60.0, 40.0), 1)
            .unwrap();
        let second = layer
            .add_signature(signature(), Position::new(100.0, 200.0), Size::new(60.0, 40.0), 2)
            .unwrap();

        assert_eq!(layer.rescale_page(1, 0.5, 0.5), 1);

        let scaled = layer.get(first).unwrap();
        assert_eq!(scaled.position(), Position::new(50.0, 100.0));
        assert_eq!(scaled.size(), Size::new(30.0, 20.0));
        assert_eq!(layer.get(second).unwrap().position(), Position::new(100.0, 200.0));
    }

    #[test]
    fn test_rescale_keeps_floored_box_on_page() {
        let bounds = TestBounds::with_pages(1, Size::new(900.0, 1164.0));
        let mut layer = AnnotationLayer::new(bounds.clone());
        let id = layer.add_text_label(Position::new(780.0, 1100.0), Size::new(120.0, 32.0), 1).unwrap();

        let shrunk = Size::new(100.0, 129.0);
        bounds.extents.lock().unwrap().insert(1, shrunk);
        layer.rescale_page(1, 100.0 / 900.0, 129.0 / 1164.0);

        let label = layer.get(id).unwrap();
        assert_eq!(label.size(), Size::new(40.0, 24.0));
        assert!(label.position().x >= 0.0 && label.position().y >= 0.0);
        assert!(label.position().x + label.size().width <= shrunk.width);
        assert!(label.position().y + label.size().height <= shrunk.height);
        assert_eq!(label.position(), Position::new(60.0, 105.0));
    }

    #[test]
    fn test_edit_state() {
        let mut layer = layer();
        let sig = layer.add_signature(signature(), Position::default(), Size::new(30.0, 30.0), 1).unwrap();
        let text = layer.add_text_label(Position::default(), Size::new(120.0, 32.0), 1).unwrap();

        assert_eq!(layer.end_edit(), Some(text));
        assert!(!layer.begin_edit(sig));
        assert!(layer.begin_edit(text));
        assert!(layer.is_editing(text));

        layer.clear();
        assert!(layer.is_empty());
        assert_eq!(layer.editing(), None);
    }
}
