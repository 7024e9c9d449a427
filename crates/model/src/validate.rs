//! Structural validation of a [`DocumentTree`].
//!
//! Validation is the only behaviour this crate has. Both renderers re-run it
//! before consuming a tree, so a tree built by hand gets the same checks as
//! one produced by the composer.

use crate::node::{ColumnWidth, DocumentTree, Image, Node, Paragraph, Row, Table, TextRun};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StructureError {
    #[error("page content area is empty ({width:.1}pt x {height:.1}pt after margins)")]
    EmptyContentArea { width: f32, height: f32 },

    #[error("{path}: table declares no columns")]
    NoColumns { path: String },

    #[error("{path}: row has {found} cells but the table declares {expected} columns")]
    ColumnMismatch { path: String, expected: usize, found: usize },

    #[error("{path}: invalid font size {size}")]
    InvalidFontSize { path: String, size: f32 },

    #[error("{path}: invalid {what} {value}")]
    InvalidDimension { path: String, what: &'static str, value: f32 },

    #[error("{path}: column widths total {total:.1}pt, wider than the {available:.1}pt content area")]
    ColumnsTooWide { path: String, total: f32, available: f32 },

    #[error("{path}: image has an empty resource key")]
    EmptyResource { path: String },
}

impl DocumentTree {
    /// Checks the tree for structural problems, reporting the first one found.
    pub fn validate(&self) -> Result<(), StructureError> {
        let width = self.page.content_width();
        let height = self.page.content_height();
        if !(width > 0.0 && height > 0.0) || !width.is_finite() || !height.is_finite() {
            return Err(StructureError::EmptyContentArea { width, height });
        }
        validate_nodes(&self.body, "body", width)
    }
}

fn validate_nodes(nodes: &[Node], base: &str, content_width: f32) -> Result<(), StructureError> {
    for (i, node) in nodes.iter().enumerate() {
        let path = format!("{}[{}]", base, i);
        match node {
            Node::Section(section) => {
                if let Some(title) = &section.title {
                    validate_paragraph(title, &format!("{}.title", path))?;
                }
                validate_nodes(&section.children, &format!("{}.children", path), content_width)?;
            }
            Node::Paragraph(paragraph) => validate_paragraph(paragraph, &path)?,
            Node::Table(table) => validate_table(table, &path, content_width)?,
            Node::Image(image) => validate_image(image, &path)?,
            Node::Spacer(spacer) => {
                if !spacer.height.is_finite() || spacer.height < 0.0 {
                    return Err(StructureError::InvalidDimension {
                        path,
                        what: "spacer height",
                        value: spacer.height,
                    });
                }
            }
        }
    }
    Ok(())
}

fn validate_runs(runs: &[TextRun], path: &str) -> Result<(), StructureError> {
    for (i, run) in runs.iter().enumerate() {
        let size = run.style.font.size;
        if !size.is_finite() || size <= 0.0 {
            return Err(StructureError::InvalidFontSize {
                path: format!("{}.runs[{}]", path, i),
                size,
            });
        }
    }
    Ok(())
}

fn validate_paragraph(paragraph: &Paragraph, path: &str) -> Result<(), StructureError> {
    if !paragraph.space_after.is_finite() || paragraph.space_after < 0.0 {
        return Err(StructureError::InvalidDimension {
            path: path.to_string(),
            what: "space after",
            value: paragraph.space_after,
        });
    }
    validate_runs(&paragraph.runs, path)
}

fn validate_row(row: &Row, expected: usize, path: &str) -> Result<(), StructureError> {
    if row.cells.len() != expected {
        return Err(StructureError::ColumnMismatch {
            path: path.to_string(),
            expected,
            found: row.cells.len(),
        });
    }
    for (i, cell) in row.cells.iter().enumerate() {
        validate_runs(&cell.runs, &format!("{}.cells[{}]", path, i))?;
    }
    Ok(())
}

fn validate_table(table: &Table, path: &str, content_width: f32) -> Result<(), StructureError> {
    if table.columns.is_empty() {
        return Err(StructureError::NoColumns { path: path.to_string() });
    }

    let mut claimed = 0.0;
    for (i, column) in table.columns.iter().enumerate() {
        let (what, value) = match column.width {
            ColumnWidth::Auto => continue,
            ColumnWidth::Fixed(w) => ("column width", w),
            ColumnWidth::Percent(p) => ("column percent", p),
        };
        if !value.is_finite() || value <= 0.0 {
            return Err(StructureError::InvalidDimension {
                path: format!("{}.columns[{}]", path, i),
                what,
                value,
            });
        }
        claimed += match column.width {
            ColumnWidth::Percent(p) => content_width * p / 100.0,
            _ => value,
        };
    }
    // Small tolerance so widths copied from a layout that exactly fills the page pass.
    if claimed > content_width + 0.01 {
        return Err(StructureError::ColumnsTooWide {
            path: path.to_string(),
            total: claimed,
            available: content_width,
        });
    }

    let padding = table.style.cell_padding;
    if !padding.is_finite() || padding < 0.0 {
        return Err(StructureError::InvalidDimension {
            path: path.to_string(),
            what: "cell padding",
            value: padding,
        });
    }

    let expected = table.columns.len();
    if let Some(header) = &table.header {
        validate_row(header, expected, &format!("{}.header", path))?;
    }
    for (i, row) in table.rows.iter().enumerate() {
        validate_row(row, expected, &format!("{}.rows[{}]", path, i))?;
    }
    Ok(())
}

fn validate_image(image: &Image, path: &str) -> Result<(), StructureError> {
    if image.resource.trim().is_empty() {
        return Err(StructureError::EmptyResource { path: path.to_string() });
    }
    for (what, value) in [("image width", image.width), ("image height", image.height)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(StructureError::InvalidDimension { path: path.to_string(), what, value });
        }
    }
    Ok(())
}
