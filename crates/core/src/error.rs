//! Error types for the signing workflow.

use crate::annotation::AnnotationId;
use crate::config::ConfigError;
use pdf_signer_engine::PdfEngineError;

/// Rejected input file. Raised before any session state changes.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("unsupported file type '{media_type}', expected application/pdf")]
    UnsupportedType { media_type: String },
    #[error("file '{name}' is empty")]
    Empty { name: String },
    #[error("file '{name}' is {size} bytes, the limit is {limit}")]
    TooLarge { name: String, size: u64, limit: u64 },
}

/// Misuse of the annotation layer that callers must handle.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LayerError {
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture surface is not active")]
    NotCapturing,
    #[error("page {0} has no rendered geometry to capture on")]
    PageNotReady(u32),
    #[error("failed to encode signature on page {page}: {source}")]
    Encode {
        page: u32,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to load source document: {0}")]
    Load(#[source] PdfEngineError),
    #[error("failed to save document: {0}")]
    Save(#[source] PdfEngineError),
    #[error("annotation {id} on page {page}: page out of range (page_count={page_count})")]
    PageOutOfRange { id: AnnotationId, page: u32, page_count: u32 },
    #[error("annotation {id} on page {page}: page has no rendered geometry")]
    MissingGeometry { id: AnnotationId, page: u32 },
    #[error("annotation {id}: {source}")]
    Draw {
        id: AnnotationId,
        #[source]
        source: PdfEngineError,
    },
    #[error("annotation {id}: signature image is unreadable: {source}")]
    Image {
        id: AnnotationId,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by [`SigningSession`](crate::SigningSession)
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("failed to decode document: {0}")]
    Decode(#[source] PdfEngineError),
    #[error("no document loaded")]
    NoDocument,
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] pdf_signer_scheduler::SchedulerError),
}
