//! The abstract document model shared by both rendering paths.
//!
//! A [`DocumentTree`] is built once by the composer and then only read. The
//! PDF renderer and the office writer both consume it, so everything needed
//! to lay out a report (page geometry, styled text, table structure, layout
//! hints) lives here. The crate has no I/O and no side effects.

pub mod color;
pub mod geometry;
pub mod node;
pub mod style;
pub mod validate;

pub use color::Color;
pub use geometry::{Margins, NamedSize, PageSize, PageSpec, Rect};
pub use node::{
    Cell, Column, ColumnWidth, DocumentMeta, DocumentTree, GridLine, Image, Node, Paragraph,
    Row, Section, Spacer, Table, TableStyle, TextRun,
};
pub use style::{FontSpec, FontWeight, LayoutHints, PageBreak, TextAlign, TextStyle};
pub use validate::StructureError;
