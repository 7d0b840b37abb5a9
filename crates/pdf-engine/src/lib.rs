//! PDF Signer Engine
//!
//! The two library boundaries of the signer: decoding a document into page
//! handles that can be rasterized at any scale, and writing images and text
//! onto the pages of a document.

#[cfg(feature = "pdfium")]
mod pdfium;
mod writer;

#[cfg(feature = "pdfium")]
pub use pdfium::{bind_pdfium, PdfiumBackend};
pub use writer::{ImagePlacement, StandardFont, TextPlacement, WritableDocument, WritablePage};

use image::{ImageBuffer, Rgba};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Largest raster edge the bundled backend will allocate.
pub const MAX_RENDER_EDGE_PX: u32 = 8192;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);

static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        Self(NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Native page size in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl PageSize {
    pub const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };

    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self { width_pt, height_pt }
    }

    /// Raster dimensions in device pixels at the given scale.
    pub fn scaled_px(&self, scale: f32) -> (u32, u32) {
        let width = (self.width_pt * scale).round().max(1.0) as u32;
        let height = (self.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
    #[error("invalid render scale {0}")]
    InvalidScale(f32),
    #[error("raster of {width}x{height} px exceeds the {max} px edge limit")]
    RasterTooLarge { width: u32, height: u32, max: u32 },
    #[error("render aborted")]
    Aborted,
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("backend error: {0}")]
    Backend(String),
}

/// Rasterization backend behind a decoded document.
///
/// `render_page` receives a `should_abort` callback. Backends that can stop
/// early return [`PdfEngineError::Aborted`]; backends that cannot simply
/// finish and let the caller discard the result.
pub trait PdfBackend: Send + Sync {
    fn page_count(&self) -> u32;

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError>;

    fn render_page(
        &self,
        request: RenderRequest,
        should_abort: &dyn Fn() -> bool,
    ) -> Result<RgbaImage, PdfEngineError>;
}

/// Handle to a decoded document.
///
/// Cheap to clone; every clone shares the same backend.
#[derive(Clone)]
pub struct LoadedDocument {
    id: DocumentId,
    backend: Arc<dyn PdfBackend>,
}

impl std::fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("id", &self.id)
            .field("page_count", &self.page_count())
            .finish()
    }
}

impl LoadedDocument {
    pub fn from_backend(backend: Arc<dyn PdfBackend>) -> Self {
        Self { id: DocumentId::next(), backend }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn page_count(&self) -> u32 {
        self.backend.page_count()
    }

    /// Page handle for a 1-based page number.
    pub fn page(&self, page_number: u32) -> Result<PageHandle, PdfEngineError> {
        let page_count = self.page_count();
        if page_number == 0 || page_number > page_count {
            return Err(PdfEngineError::PageOutOfRange { page: page_number, page_count });
        }

        let page_index = page_number - 1;
        let size = self.backend.page_size(page_index)?;
        Ok(PageHandle { backend: self.backend.clone(), page_index, size })
    }

    /// Native sizes of every page, in page order.
    pub fn page_sizes(&self) -> Result<Vec<PageSize>, PdfEngineError> {
        (0..self.page_count()).map(|index| self.backend.page_size(index)).collect()
    }
}

/// One page of a [`LoadedDocument`].
#[derive(Clone)]
pub struct PageHandle {
    backend: Arc<dyn PdfBackend>,
    page_index: u32,
    size: PageSize,
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("page_number", &self.page_number())
            .field("size", &self.size)
            .finish()
    }
}

impl PageHandle {
    pub fn page_number(&self) -> u32 {
        self.page_index + 1
    }

    pub fn size(&self) -> PageSize {
        self.size
    }

    pub fn render(
        &self,
        scale: f32,
        should_abort: &dyn Fn() -> bool,
    ) -> Result<RgbaImage, PdfEngineError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PdfEngineError::InvalidScale(scale));
        }

        self.backend.render_page(RenderRequest { page_index: self.page_index, scale }, should_abort)
    }
}

/// Decode a PDF byte stream.
///
/// With the `pdfium` feature, pages are painted by PDFium when its library
/// can be bound; otherwise the lopdf backend is used.
pub fn decode(bytes: &[u8]) -> Result<LoadedDocument, PdfEngineError> {
    let backend = default_backend(bytes)?;
    log::debug!("decoded document with {} page(s)", backend.page_count());
    Ok(LoadedDocument::from_backend(backend))
}

#[cfg(feature = "pdfium")]
fn default_backend(bytes: &[u8]) -> Result<Arc<dyn PdfBackend>, PdfEngineError> {
    match PdfiumBackend::from_bytes(bytes) {
        Ok(backend) => Ok(Arc::new(backend)),
        Err(PdfEngineError::Backend(reason)) => {
            log::warn!("pdfium unavailable, falling back to lopdf: {reason}");
            Ok(Arc::new(LopdfBackend::from_bytes(bytes)?))
        }
        Err(err) => Err(err),
    }
}

#[cfg(not(feature = "pdfium"))]
fn default_backend(bytes: &[u8]) -> Result<Arc<dyn PdfBackend>, PdfEngineError> {
    Ok(Arc::new(LopdfBackend::from_bytes(bytes)?))
}

pub(crate) fn check_raster_size(width: u32, height: u32) -> Result<(), PdfEngineError> {
    if width > MAX_RENDER_EDGE_PX || height > MAX_RENDER_EDGE_PX {
        return Err(PdfEngineError::RasterTooLarge { width, height, max: MAX_RENDER_EDGE_PX });
    }
    Ok(())
}

/// Backend that reads the page tree with lopdf.
///
/// It has no content interpreter: rasters are blank paper of the page's
/// size. Build with the `pdfium` feature to see page content.
#[derive(Debug, Clone)]
pub struct LopdfBackend {
    page_sizes: Vec<PageSize>,
}

impl LopdfBackend {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        Ok(Self { page_sizes: Self::parse_sizes(bytes)? })
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, PdfEngineError> {
        if bytes.windows("/Encrypt".len()).any(|window| window == b"/Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let doc = Document::load_mem(bytes)?;
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            sizes.push(media_box_size(&doc, object_id).unwrap_or(PageSize::LETTER));
        }

        if sizes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(sizes)
    }
}

impl PdfBackend for LopdfBackend {
    fn page_count(&self) -> u32 {
        self.page_sizes.len() as u32
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.page_sizes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index + 1,
            page_count: self.page_sizes.len() as u32,
        })
    }

    fn render_page(
        &self,
        request: RenderRequest,
        should_abort: &dyn Fn() -> bool,
    ) -> Result<RgbaImage, PdfEngineError> {
        let page_size = self.page_size(request.page_index)?;
        let (width, height) = page_size.scaled_px(request.scale);
        check_raster_size(width, height)?;

        if should_abort() {
            return Err(PdfEngineError::Aborted);
        }

        Ok(RgbaImage::from_pixel(width, height, PAPER))
    }
}

/// MediaBox of a page, walking up the page tree for inherited boxes.
pub(crate) fn media_box_size(doc: &Document, page_id: lopdf::ObjectId) -> Option<PageSize> {
    let mut current = page_id;

    for _ in 0..16 {
        let dict = doc.get_dictionary(current).ok()?;

        if let Ok(media_box) = dict.get(b"MediaBox") {
            let array = match media_box {
                Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
                other => other.as_array().ok()?,
            };
            if array.len() != 4 {
                return None;
            }
            let x0 = object_as_f32(&array[0])?;
            let y0 = object_as_f32(&array[1])?;
            let x1 = object_as_f32(&array[2])?;
            let y1 = object_as_f32(&array[3])?;
            return Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() });
        }

        current = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }

    None
}

fn object_as_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value),
        _ => None,
    }
}

/// Build an empty document with one blank page per entry in `page_sizes`.
pub fn blank_document(page_sizes: &[PageSize]) -> Result<Vec<u8>, PdfEngineError> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(page_sizes.len());
    for size in page_sizes {
        let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), size.width_pt.into(), size.height_pt.into()],
            "Contents" => content_id,
            "Resources" => Dictionary::new(),
        });
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut output = Vec::new();
    doc.save_to(&mut output)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pdf_bytes(pages: usize) -> Vec<u8> {
        blank_document(&vec![PageSize::LETTER; pages]).expect("blank document should build")
    }

    #[test]
    fn decodes_pdf_and_reads_page_count() {
        let doc = decode(&sample_pdf_bytes(3)).expect("decode should succeed");
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn page_handles_are_one_based() {
        let doc = decode(&sample_pdf_bytes(2)).expect("decode should succeed");

        let page = doc.page(2).expect("page 2 exists");
        assert_eq!(page.page_number(), 2);
        assert_eq!(page.size(), PageSize::LETTER);

        assert!(matches!(
            doc.page(0),
            Err(PdfEngineError::PageOutOfRange { page: 0, page_count: 2 })
        ));
        assert!(matches!(
            doc.page(3),
            Err(PdfEngineError::PageOutOfRange { page: 3, page_count: 2 })
        ));
    }

    #[test]
    fn render_scales_raster_dimensions() {
        let doc = decode(&sample_pdf_bytes(1)).expect("decode should succeed");
        let page = doc.page(1).expect("page exists");

        let raster = page.render(1.5, &|| false).expect("render should succeed");
        assert_eq!(raster.width(), 918);
        assert_eq!(raster.height(), 1188);
    }

    #[test]
    fn render_rejects_non_positive_scale() {
        let doc = decode(&sample_pdf_bytes(1)).expect("decode should succeed");
        let page = doc.page(1).expect("page exists");

        assert!(matches!(page.render(0.0, &|| false), Err(PdfEngineError::InvalidScale(_))));
        assert!(matches!(page.render(f32::NAN, &|| false), Err(PdfEngineError::InvalidScale(_))));
    }

    #[test]
    fn render_honours_abort_callback() {
        let doc = decode(&sample_pdf_bytes(1)).expect("decode should succeed");
        let page = doc.page(1).expect("page exists");

        assert!(matches!(page.render(1.0, &|| true), Err(PdfEngineError::Aborted)));
    }

    #[test]
    fn oversized_raster_is_refused() {
        let doc = decode(&sample_pdf_bytes(1)).expect("decode should succeed");
        let page = doc.page(1).expect("page exists");

        assert!(matches!(
            page.render(20.0, &|| false),
            Err(PdfEngineError::RasterTooLarge { .. })
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = decode(b"this is not a pdf").expect_err("decode should fail");
        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn encrypted_documents_are_rejected() {
        let mut bytes = sample_pdf_bytes(1);
        bytes.extend_from_slice(b"\n% /Encrypt\n");

        let err = decode(&bytes).expect_err("decode should fail");
        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn media_box_is_read_per_page() {
        let bytes =
            blank_document(&[PageSize::new(300.0, 400.0), PageSize::LETTER]).expect("builds");
        let doc = decode(&bytes).expect("decode should succeed");

        let sizes = doc.page_sizes().expect("sizes");
        assert_eq!(sizes, vec![PageSize::new(300.0, 400.0), PageSize::LETTER]);
    }
}
