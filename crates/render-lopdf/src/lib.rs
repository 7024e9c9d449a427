//! PDF rendering of quire document trees.
//!
//! Rendering is split in two: [`paginate`] turns a [`DocumentTree`] into
//! positioned elements per page, and [`PdfRenderer`] serializes those pages
//! with a writer that emits objects in a fixed order. Equal trees produce
//! byte-identical files.
//!
//! [`DocumentTree`]: quire_model::DocumentTree

pub mod error;
pub mod fonts;
pub mod layout;
mod metrics;
mod raster;
pub mod renderer;
pub mod text;
mod winansi;
mod writer;

pub use error::RenderError;
pub use fonts::{FontFace, FontId, FontLibrary, StandardFont};
pub use layout::{PageLayout, PositionedElement, TextElement, paginate};
pub use renderer::PdfRenderer;
pub use text::{PLACEHOLDER_CHAR, Segment};
