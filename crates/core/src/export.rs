//! Writing annotations into the source PDF
//!
//! Annotations live in the screen space of each page's displayed rectangle
//! (origin top-left, Y down). The mapper converts them into PDF user space
//! (origin bottom-left, Y up) using the page's native size.

use crate::annotation::{Annotation, AnnotationKind, Color, FontDescriptor, PageBounds, Position, Size};
use crate::error::ExportError;
use pdf_signer_engine::{ImagePlacement, PageSize, StandardFont, TextPlacement, WritableDocument};
use std::fs;
use std::path::{Path, PathBuf};

pub const EXPORT_FILE_NAME: &str = "signed.pdf";

/// Inset between a text label's box and its text, in screen pixels
pub const TEXT_PADDING: f32 = 4.0;

/// Screen to document coordinate conversion for one page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportCoordinateMapper {
    scale_x: f32,
    scale_y: f32,
    page_height: f32,
}

impl ExportCoordinateMapper {
    /// `extent` is the displayed page rectangle, `native` the page size in points
    pub fn new(extent: Size, native: PageSize) -> Self {
        Self {
            scale_x: native.width_pt / extent.width,
            scale_y: native.height_pt / extent.height,
            page_height: native.height_pt,
        }
    }

    pub fn scale_x(&self) -> f32 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f32 {
        self.scale_y
    }

    /// Box in document units with a bottom-left origin
    pub fn map(&self, position: Position, size: Size) -> ImagePlacement {
        let width = size.width * self.scale_x;
        let height = size.height * self.scale_y;
        ImagePlacement {
            x: position.x * self.scale_x,
            y: self.page_height - position.y * self.scale_y - height,
            width,
            height,
        }
    }

    /// Text run for a label occupying `mapped`
    pub fn text_placement(
        &self,
        mapped: ImagePlacement,
        font: &FontDescriptor,
        color: Color,
    ) -> TextPlacement {
        let size = font.size_px * self.scale_y;
        let inset_x = TEXT_PADDING * self.scale_x;
        TextPlacement {
            x: mapped.x + inset_x,
            y: mapped.y + mapped.height - TEXT_PADDING * self.scale_y - size,
            size,
            font: StandardFont::from_css_family(&font.family),
            color: color.to_normalized(),
            max_width: Some((mapped.width - inset_x).max(0.0)),
        }
    }
}

/// Output of a successful export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportedDocument {
    /// Write into `dir` under [`file_name`](Self::file_name)
    pub fn save_to_dir<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, ExportError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        log::info!("wrote {} ({} bytes)", path.display(), self.bytes.len());
        Ok(path)
    }
}

/// Result of an export
///
/// Per-annotation failures are collected here and do not stop the export.
#[derive(Debug)]
pub struct ExportReport {
    pub document: ExportedDocument,
    /// Annotations written into the document
    pub written: usize,
    /// Empty text labels left out
    pub skipped: usize,
    pub failures: Vec<ExportError>,
}

impl ExportReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Draw every annotation into a copy of `source`.
///
/// Failing to load or save the document aborts the export. Anything that
/// goes wrong with a single annotation is recorded in the report.
pub fn export_document(
    source: &[u8],
    annotations: &[Annotation],
    bounds: &dyn PageBounds,
) -> Result<ExportReport, ExportError> {
    let mut document = WritableDocument::load(source).map_err(ExportError::Load)?;
    let mut written = 0;
    let mut skipped = 0;
    let mut failures = Vec::new();

    for annotation in annotations {
        if annotation.text().is_some_and(str::is_empty) {
            skipped += 1;
            continue;
        }

        match draw_annotation(&mut document, annotation, bounds) {
            Ok(()) => written += 1,
            Err(error) => {
                log::warn!("export: {error}");
                failures.push(error);
            }
        }
    }

    let bytes = document.save().map_err(ExportError::Save)?;
    log::info!(
        "exported {written} annotation(s), skipped {skipped}, {} failure(s)",
        failures.len()
    );

    Ok(ExportReport {
        document: ExportedDocument { file_name: EXPORT_FILE_NAME.to_string(), bytes },
        written,
        skipped,
        failures,
    })
}

fn draw_annotation(
    document: &mut WritableDocument,
    annotation: &Annotation,
    bounds: &dyn PageBounds,
) -> Result<(), ExportError> {
    let id = annotation.id();
    let page_number = annotation.page();
    let page_count = document.page_count();
    if page_number == 0 || page_number > page_count {
        return Err(ExportError::PageOutOfRange { id, page: page_number, page_count });
    }

    let extent = bounds
        .page_extent(page_number)
        .filter(|extent| extent.width > 0.0 && extent.height > 0.0)
        .ok_or(ExportError::MissingGeometry { id, page: page_number })?;

    let mut page = document
        .page(page_number)
        .map_err(|source| ExportError::Draw { id, source })?;
    let mapper = ExportCoordinateMapper::new(extent, page.size());
    let mapped = mapper.map(annotation.position(), annotation.size());

    let drawn = match annotation.kind() {
        AnnotationKind::Signature { image } => {
            let raster = image.decode().map_err(|source| ExportError::Image { id, source })?;
            page.draw_image(&raster, mapped)
        }
        AnnotationKind::Text { text, font, color } => {
            page.draw_text(text, mapper.text_placement(mapped, font, *color))
        }
    };
    drawn.map_err(|source| ExportError::Draw { id, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{AnnotationLayer, SignatureImage};
    use pdf_signer_engine::{blank_document, RgbaImage};
    use std::collections::HashMap;
    use std::sync::Arc;

    struct Extents(HashMap<u32, Size>, u32);

    impl PageBounds for Extents {
        fn page_count(&self) -> u32 {
            self.1
        }

        fn page_extent(&self, page: u32) -> Option<Size> {
            self.0.get(&page).copied()
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_map_flips_y() {
        let mapper = ExportCoordinateMapper::new(Size::new(918.0, 1188.0), PageSize::LETTER);
        assert!(approx(mapper.scale_x(), 612.0 / 918.0));

        let mapped = mapper.map(Position::new(90.0, 150.0), Size::new(180.0, 60.0));
        assert!(approx(mapped.x, 60.0));
        assert!(approx(mapped.width, 120.0));
        assert!(approx(mapped.height, 40.0));
        assert!(approx(mapped.y, 792.0 - 100.0 - 40.0));
    }

    #[test]
    fn test_map_top_left_and_bottom_right() {
        let mapper = ExportCoordinateMapper::new(Size::new(612.0, 792.0), PageSize::LETTER);

        let top_left = mapper.map(Position::new(0.0, 0.0), Size::new(100.0, 50.0));
        assert!(approx(top_left.y + top_left.height, 792.0));

        let bottom_right = mapper.map(Position::new(512.0, 742.0), Size::new(100.0, 50.0));
        assert!(approx(bottom_right.x + bottom_right.width, 612.0));
        assert!(approx(bottom_right.y, 0.0));
    }

    #[test]
    fn test_text_placement() {
        let mapper = ExportCoordinateMapper::new(Size::new(1224.0, 1584.0), PageSize::LETTER);
        let mapped = mapper.map(Position::new(100.0, 100.0), Size::new(120.0, 32.0));

        let text = mapper.text_placement(mapped, &FontDescriptor::default(), Color::INK);

        assert!(approx(text.size, 8.0));
        assert!(approx(text.x, 50.0 + 2.0));
        assert!(approx(text.y, mapped.y + 16.0 - 2.0 - 8.0));
        assert!(approx(text.max_width.unwrap(), 58.0));
        assert_eq!(text.font, StandardFont::Helvetica);
    }

    #[test]
    fn test_failures_are_collected() {
        let source = blank_document(&[PageSize::LETTER, PageSize::LETTER]).unwrap();
        let extents = Extents(HashMap::from([(1, Size::new(612.0, 792.0))]), 2);
        let mut layer = AnnotationLayer::new(Arc::new(Extents(extents.0.clone(), 2)));

        let image = SignatureImage::from_rgba(&RgbaImage::from_pixel(8, 4, image::Rgba([0, 0, 0, 255]))).unwrap();
        layer.add_signature(image.clone(), Position::new(10.0, 10.0), Size::new(80.0, 40.0), 1).unwrap();
        let orphan = layer.add_signature(image, Position::new(10.0, 10.0), Size::new(80.0, 40.0), 2).unwrap();
        let label = layer.add_text_label(Position::new(10.0, 100.0), Size::new(120.0, 32.0), 1).unwrap();
        layer.add_text_label(Position::new(10.0, 200.0), Size::new(120.0, 32.0), 1).unwrap();
        layer.update_text(label, "Signed");

        let before = layer.annotations().to_vec();
        let report = export_document(&source, layer.annotations(), &extents).unwrap();

        assert_eq!(report.document.file_name, "signed.pdf");
        assert_eq!(report.written, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            ExportError::MissingGeometry { id, page: 2 } if id == orphan
        ));
        assert!(!report.is_complete());
        assert_eq!(layer.annotations(), before.as_slice());
        assert!(WritableDocument::load(&report.document.bytes).is_ok());
    }

    #[test]
    fn test_unreadable_source_is_terminal() {
        let extents = Extents(HashMap::new(), 0);
        let result = export_document(b"definitely not a pdf", &[], &extents);
        assert!(matches!(result, Err(ExportError::Load(_))));
    }

    #[test]
    fn test_save_to_dir() {
        let dir = tempfile::tempdir().unwrap();
        let exported = ExportedDocument { file_name: EXPORT_FILE_NAME.to_string(), bytes: b"%PDF-1.5".to_vec() };

        let path = exported.save_to_dir(dir.path().join("out")).unwrap();

        assert_eq!(path.file_name().unwrap(), "signed.pdf");
        assert_eq!(fs::read(path).unwrap(), b"%PDF-1.5");
    }
}
