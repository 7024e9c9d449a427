//! Office-document output for quire document trees.
//!
//! [`OdtWriter`] serializes a tree into an OpenDocument Text package, the
//! intermediate format handed to the conversion engine. [`export_tables_csv`]
//! exports the tree's tables for spreadsheet use.

mod csv_export;
pub mod error;
mod odt;
mod styles;
mod xml;

pub use csv_export::{TableCsv, export_tables_csv, write_table_csv};
pub use error::SerializationError;
pub use odt::OdtWriter;
pub use tempfile::TempPath;
