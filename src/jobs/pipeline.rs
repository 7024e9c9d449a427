//! The CPU-bound stages of a job: compose, then render or serialize.
//!
//! Everything here is synchronous and meant to run on the blocking pool.

use crate::error::FailureReason;
use log::error;
use quire_compose::{Composer, TemplateSource};
use quire_model::DocumentTree;
use quire_office::{OdtWriter, SerializationError, TableCsv, TempPath, export_tables_csv};
use quire_render_lopdf::{PdfRenderer, RenderError};
use serde_json::Value;
use std::sync::Arc;

/// A rendered PDF plus the document title used to name the download.
#[derive(Debug)]
pub struct RenderedPdf {
    pub bytes: Vec<u8>,
    pub title: String,
}

/// An intermediate office document waiting for conversion.
#[derive(Debug)]
pub struct OfficeDocument {
    pub file: TempPath,
    pub title: String,
}

pub struct RenderPipeline {
    composer: Composer,
    renderer: PdfRenderer,
    writer: OdtWriter,
}

impl RenderPipeline {
    pub fn new(composer: Composer, renderer: PdfRenderer, writer: OdtWriter) -> Self {
        Self { composer, renderer, writer }
    }

    pub fn templates(&self) -> &Arc<dyn TemplateSource> {
        self.composer.source()
    }

    pub fn renderer(&self) -> &PdfRenderer {
        &self.renderer
    }

    pub fn compose(&self, template_id: &str, data: &Value) -> Result<DocumentTree, FailureReason> {
        self.composer.compose(template_id, data).map_err(FailureReason::from)
    }

    pub fn render_native(&self, template_id: &str, data: &Value) -> Result<RenderedPdf, FailureReason> {
        let tree = self.compose(template_id, data)?;
        let bytes = self.renderer.render(&tree).map_err(|e| unexpected_render(template_id, e))?;
        Ok(RenderedPdf { bytes, title: tree.meta.title })
    }

    pub fn serialize_office(&self, template_id: &str, data: &Value) -> Result<OfficeDocument, FailureReason> {
        let tree = self.compose(template_id, data)?;
        let file = self.writer.serialize(&tree).map_err(|e| unexpected_serialization(template_id, e))?;
        Ok(OfficeDocument { file, title: tree.meta.title })
    }

    /// Every table of the composed document as CSV.
    pub fn export_csv(&self, template_id: &str, data: &Value) -> crate::error::Result<Vec<TableCsv>> {
        let tree = self.composer.compose(template_id, data)?;
        Ok(export_tables_csv(&tree)?)
    }
}

fn unexpected_render(template_id: &str, err: RenderError) -> FailureReason {
    error!("Rendering '{}' failed: {}", template_id, err);
    err.into()
}

fn unexpected_serialization(template_id: &str, err: SerializationError) -> FailureReason {
    error!("Serializing '{}' failed: {}", template_id, err);
    err.into()
}
