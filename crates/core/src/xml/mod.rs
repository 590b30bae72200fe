//! Deterministic XML projection of a declaration into form 270.00.

pub mod projector;

pub use projector::{
    content_hash, DeclarationView, FieldMapRow, ProjectionError, XmlDocument, XmlProjector,
};
