//! Page rasterization through PDFium
//!
//! Page sizes and structural checks still come from lopdf so both backends
//! agree on geometry; PDFium only paints pixels.

use crate::{
    check_raster_size, LopdfBackend, PageSize, PdfBackend, PdfEngineError, RenderRequest,
    RgbaImage,
};
use pdfium_render::prelude::*;
use std::sync::Mutex;

/// Backend that draws page content with PDFium
pub struct PdfiumBackend {
    /// PDFium is not reentrant; every call goes through this lock.
    pdfium: Mutex<Pdfium>,
    bytes: Vec<u8>,
    layout: LopdfBackend,
}

impl PdfiumBackend {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let layout = LopdfBackend::from_bytes(bytes)?;
        let pdfium = bind_pdfium()?;

        // Fail at decode time rather than on the first render.
        pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|err| PdfEngineError::Backend(format!("pdfium failed to load document: {err}")))?;

        Ok(Self { pdfium: Mutex::new(pdfium), bytes: bytes.to_vec(), layout })
    }
}

/// Bind the PDFium library next to the executable, in the working
/// directory, or from the system library path.
pub fn bind_pdfium() -> Result<Pdfium, PdfEngineError> {
    let exe_dir = std::env::current_exe().ok().and_then(|path| path.parent().map(|p| p.to_path_buf()));

    if let Some(dir) = &exe_dir {
        if let Ok(bindings) = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)) {
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|err| PdfEngineError::Backend(format!("failed to bind pdfium library: {err}")))?;
    Ok(Pdfium::new(bindings))
}

impl PdfBackend for PdfiumBackend {
    fn page_count(&self) -> u32 {
        self.layout.page_count()
    }

    fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.layout.page_size(page_index)
    }

    fn render_page(
        &self,
        request: RenderRequest,
        should_abort: &dyn Fn() -> bool,
    ) -> Result<RgbaImage, PdfEngineError> {
        let (width, height) = self.page_size(request.page_index)?.scaled_px(request.scale);
        check_raster_size(width, height)?;

        if should_abort() {
            return Err(PdfEngineError::Aborted);
        }

        let index = u16::try_from(request.page_index).map_err(|_| PdfEngineError::PageOutOfRange {
            page: request.page_index + 1,
            page_count: self.page_count(),
        })?;

        let pdfium = self.pdfium.lock().unwrap();
        let document = pdfium
            .load_pdf_from_byte_slice(&self.bytes, None)
            .map_err(|err| PdfEngineError::Backend(format!("pdfium failed to load document: {err}")))?;
        let page = document.pages().get(index).map_err(|err| {
            PdfEngineError::Backend(format!("pdfium has no page {}: {err}", request.page_index + 1))
        })?;

        if should_abort() {
            return Err(PdfEngineError::Aborted);
        }

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| PdfEngineError::Backend(format!("pdfium render failed: {err}")))?;

        let (bitmap_width, bitmap_height) = (bitmap.width() as u32, bitmap.height() as u32);
        RgbaImage::from_raw(bitmap_width, bitmap_height, bitmap.as_rgba_bytes()).ok_or_else(|| {
            PdfEngineError::Backend(format!(
                "pdfium returned a short buffer for a {bitmap_width}x{bitmap_height} page"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blank_document;

    #[test]
    fn renders_blank_page_white_when_library_is_present() {
        let bytes = blank_document(&[PageSize::LETTER]).expect("blank document should build");
        let backend = match PdfiumBackend::from_bytes(&bytes) {
            Ok(backend) => backend,
            // No PDFium shared library on this machine
            Err(PdfEngineError::Backend(_)) => return,
            Err(other) => panic!("unexpected error: {other}"),
        };

        let raster = backend
            .render_page(RenderRequest { page_index: 0, scale: 1.0 }, &|| false)
            .expect("render should succeed");
        assert_eq!((raster.width(), raster.height()), (612, 792));
        assert_eq!(raster.get_pixel(306, 396).0, [255, 255, 255, 255]);
    }
}
