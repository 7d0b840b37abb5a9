//! PDF Signer Core Library
//!
//! Annotation model, freehand signature capture, drag/resize interaction,
//! export into the source PDF, configuration, and the session that ties
//! them to the render scheduler.

pub mod annotation;
pub mod capture;
pub mod config;
pub mod error;
pub mod export;
pub mod session;
pub mod widget;

pub use annotation::{
    Annotation, AnnotationId, AnnotationKind, AnnotationLayer, Color, FontDescriptor, PageBounds,
    Position, SignatureImage, Size, TextStyle,
};
pub use capture::{
    CaptureResults, CaptureSession, CaptureSettings, CaptureState, CaptureSurface, CaptureTarget,
    CapturedSignature, Point,
};
pub use config::{ConfigError, SignerConfig};
pub use error::{CaptureError, ExportError, InputError, LayerError, SessionError};
pub use export::{export_document, ExportCoordinateMapper, ExportReport, ExportedDocument};
pub use session::{validate_input, InputFile, SigningSession};
pub use widget::{GesturePreview, InteractionController, KeyInput};
