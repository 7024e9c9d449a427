//! OpenDocument Text serialization of document trees.

use crate::error::{Result, SerializationError};
use crate::styles::{CellKey, ParagraphKey, StyleRegistry, pt};
use crate::xml::XmlBuilder;
use image::ImageFormat;
use log::debug;
use quire_model::{
    ColumnWidth, DocumentTree, FontWeight, Image, Node, PageBreak, Paragraph, Row, Section, Table, TextAlign, TextRun,
};
use quire_traits::ResourceProvider;
use std::io::{Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempPath;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const MIMETYPE: &str = "application/vnd.oasis.opendocument.text";
const ODF_VERSION: &str = "1.3";

const NS_OFFICE: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";
const NS_STYLE: &str = "urn:oasis:names:tc:opendocument:xmlns:style:1.0";
const NS_TEXT: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";
const NS_TABLE: &str = "urn:oasis:names:tc:opendocument:xmlns:table:1.0";
const NS_DRAW: &str = "urn:oasis:names:tc:opendocument:xmlns:drawing:1.0";
const NS_FO: &str = "urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0";
const NS_SVG: &str = "urn:oasis:names:tc:opendocument:xmlns:svg-compatible:1.0";
const NS_XLINK: &str = "http://www.w3.org/1999/xlink";
const NS_META: &str = "urn:oasis:names:tc:opendocument:xmlns:meta:1.0";
const NS_DC: &str = "http://purl.org/dc/elements/1.1/";
const NS_MANIFEST: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";

/// A picture stored in the package.
struct Picture {
    resource: String,
    path: String,
    media_type: &'static str,
    data: Arc<Vec<u8>>,
}

/// Serializes document trees into `.odt` packages.
#[derive(Debug, Clone, Default)]
pub struct OdtWriter {
    resources: Option<Arc<dyn ResourceProvider>>,
    temp_dir: Option<PathBuf>,
}

impl OdtWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Directory for the intermediate files; the system temp dir otherwise.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Writes the package to a fresh temporary file.
    ///
    /// The returned path deletes the file when dropped.
    pub fn serialize(&self, tree: &DocumentTree) -> Result<TempPath> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("quire-").suffix(".odt");
        let file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = file.into_parts();
        self.write_to(tree, file)?;
        debug!("Serialized '{}' to {}", tree.meta.title, path.display());
        Ok(path)
    }

    pub fn write_to<W: Write + Seek>(&self, tree: &DocumentTree, writer: W) -> Result<W> {
        tree.validate()?;

        let mut body = BodyWriter::new(tree, self.resources.as_deref());
        for (index, node) in tree.body.iter().enumerate() {
            body.node(node, &format!("body[{}]", index), 1)?;
        }
        let BodyWriter { xml: body_xml, styles, pictures, .. } = body;

        let content = content_xml(&styles, &body_xml.into_bytes())?;
        let styles_xml = styles_xml(tree)?;
        let meta = meta_xml(tree)?;
        let manifest = manifest_xml(&pictures)?;

        let mut zip = ZipWriter::new(writer);
        let stored = entry_options(zip::CompressionMethod::Stored);
        let deflated = entry_options(zip::CompressionMethod::Deflated);

        // The mimetype entry must come first and stay uncompressed.
        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE.as_bytes())?;
        zip.start_file("content.xml", deflated)?;
        zip.write_all(&content)?;
        zip.start_file("styles.xml", deflated)?;
        zip.write_all(&styles_xml)?;
        zip.start_file("meta.xml", deflated)?;
        zip.write_all(&meta)?;
        for picture in &pictures {
            zip.start_file(picture.path.as_str(), stored)?;
            zip.write_all(&picture.data)?;
        }
        zip.start_file("META-INF/manifest.xml", deflated)?;
        zip.write_all(&manifest)?;
        Ok(zip.finish()?)
    }
}

/// Fixed timestamps keep packages byte-identical across runs.
fn entry_options(method: zip::CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(method)
        .last_modified_time(zip::DateTime::default())
}

/// Writes `office:text` content and records the styles and pictures it uses.
struct BodyWriter<'a> {
    tree: &'a DocumentTree,
    resources: Option<&'a dyn ResourceProvider>,
    xml: XmlBuilder,
    styles: StyleRegistry,
    pictures: Vec<Picture>,
    sections: usize,
    tables: usize,
    frames: usize,
}

impl<'a> BodyWriter<'a> {
    fn new(tree: &'a DocumentTree, resources: Option<&'a dyn ResourceProvider>) -> Self {
        Self {
            tree,
            resources,
            xml: XmlBuilder::fragment(),
            styles: StyleRegistry::default(),
            pictures: Vec::new(),
            sections: 0,
            tables: 0,
            frames: 0,
        }
    }

    fn node(&mut self, node: &Node, path: &str, level: usize) -> Result<()> {
        match node {
            Node::Section(section) => self.section(section, path, level),
            Node::Paragraph(paragraph) => self.paragraph(paragraph),
            Node::Table(table) => self.table(table),
            Node::Image(image) => self.image(image, path),
            Node::Spacer(spacer) => {
                let style = self.styles.paragraph(ParagraphKey {
                    line_height: Some(spacer.height),
                    ..ParagraphKey::aligned(TextAlign::Left)
                });
                self.xml.empty("text:p", &[("text:style-name", style.as_str())])
            }
        }
    }

    fn runs(&mut self, runs: &[TextRun]) -> Result<()> {
        for run in runs {
            let style = self.styles.text(&run.style);
            self.xml.start("text:span", &[("text:style-name", style.as_str())])?;
            // Line breaks inside a run become explicit ODF breaks.
            for (index, line) in run.text.split('\n').enumerate() {
                if index > 0 {
                    self.xml.empty("text:line-break", &[])?;
                }
                if !line.is_empty() {
                    self.xml.text(line)?;
                }
            }
            self.xml.end("text:span")?;
        }
        Ok(())
    }

    fn paragraph(&mut self, paragraph: &Paragraph) -> Result<()> {
        let style = self.styles.paragraph(ParagraphKey {
            align: paragraph.align,
            space_after: paragraph.space_after,
            page_break: paragraph.hints.page_break,
            line_height: None,
        });
        self.xml.start("text:p", &[("text:style-name", style.as_str())])?;
        self.runs(&paragraph.runs)?;
        self.xml.end("text:p")
    }

    fn section(&mut self, section: &Section, path: &str, level: usize) -> Result<()> {
        self.sections += 1;
        let name = format!("Section{}", self.sections);
        self.xml.start("text:section", &[("text:name", name.as_str())])?;
        if let Some(title) = &section.title {
            let page_break = match section.hints.page_break {
                PageBreak::Auto => title.hints.page_break,
                policy => policy,
            };
            let style = self.styles.paragraph(ParagraphKey {
                align: title.align,
                space_after: title.space_after,
                page_break,
                line_height: None,
            });
            let outline = level.to_string();
            self.xml.start(
                "text:h",
                &[("text:style-name", style.as_str()), ("text:outline-level", outline.as_str())],
            )?;
            self.runs(&title.runs)?;
            self.xml.end("text:h")?;
        }
        for (index, child) in section.children.iter().enumerate() {
            self.node(child, &format!("{}.children[{}]", path, index), level + 1)?;
        }
        self.xml.end("text:section")
    }

    fn column_widths(&self, table: &Table) -> Vec<f32> {
        table.column_widths(self.tree.page.content_width())
    }

    fn table(&mut self, table: &Table) -> Result<()> {
        self.tables += 1;
        let name = format!("Table{}", self.tables);
        let widths = self.column_widths(table);
        let style = self.styles.table(widths.iter().sum(), table.hints.page_break);
        self.xml.start("table:table", &[("table:name", name.as_str()), ("table:style-name", style.as_str())])?;
        for width in &widths {
            let column = self.styles.column(*width);
            self.xml.empty("table:table-column", &[("table:style-name", column.as_str())])?;
        }

        let border = table.style.grid.map(|g| (g.width, g.color));
        if let Some(header) = &table.header {
            let cell = self.styles.cell(CellKey {
                padding: table.style.cell_padding,
                fill: table.style.header_fill,
                border,
            });
            // Only header rows are repeated by office suites.
            if table.hints.repeat_header {
                self.xml.start("table:table-header-rows", &[])?;
            }
            self.row(table, &header_row(table, header), &cell)?;
            if table.hints.repeat_header {
                self.xml.end("table:table-header-rows")?;
            }
        }
        for (index, row) in table.rows.iter().enumerate() {
            let fill = match table.style.stripes.len() {
                0 => None,
                n => Some(table.style.stripes[index % n]),
            };
            let cell = self.styles.cell(CellKey { padding: table.style.cell_padding, fill, border });
            self.row(table, row, &cell)?;
        }
        self.xml.end("table:table")
    }

    fn row(&mut self, table: &Table, row: &Row, cell_style: &str) -> Result<()> {
        self.xml.start("table:table-row", &[])?;
        for (cell, column) in row.cells.iter().zip(&table.columns) {
            self.xml.start(
                "table:table-cell",
                &[("table:style-name", cell_style), ("office:value-type", "string")],
            )?;
            let paragraph = self.styles.paragraph(ParagraphKey::aligned(column.align));
            self.xml.start("text:p", &[("text:style-name", paragraph.as_str())])?;
            self.runs(&cell.runs)?;
            self.xml.end("text:p")?;
            self.xml.end("table:table-cell")?;
        }
        self.xml.end("table:table-row")
    }

    fn picture(&mut self, image: &Image, path: &str) -> Result<String> {
        if let Some(existing) = self.pictures.iter().find(|p| p.resource == image.resource) {
            return Ok(existing.path.clone());
        }
        let provider = self
            .resources
            .ok_or_else(|| SerializationError::unsupported(path, "no resource provider for images"))?;
        let data = provider
            .load(&image.resource)
            .map_err(|e| SerializationError::unsupported(path, e.to_string()))?;
        let (extension, media_type) = match image::guess_format(&data) {
            Ok(ImageFormat::Png) => ("png", "image/png"),
            Ok(ImageFormat::Jpeg) => ("jpg", "image/jpeg"),
            Ok(ImageFormat::Gif) => ("gif", "image/gif"),
            _ => {
                return Err(SerializationError::unsupported(
                    path,
                    format!("image '{}' is not PNG, JPEG or GIF", image.resource),
                ));
            }
        };
        let package_path = format!("Pictures/image{}.{}", self.pictures.len() + 1, extension);
        self.pictures.push(Picture {
            resource: image.resource.clone(),
            path: package_path.clone(),
            media_type,
            data,
        });
        Ok(package_path)
    }

    fn image(&mut self, image: &Image, path: &str) -> Result<()> {
        let href = self.picture(image, path)?;
        self.frames += 1;
        let name = format!("Image{}", self.frames);
        let paragraph = self.styles.paragraph(ParagraphKey {
            page_break: image.hints.page_break,
            ..ParagraphKey::aligned(image.align)
        });
        let graphic = self.styles.graphic();
        let (width, height) = (pt(image.width), pt(image.height));

        self.xml.start("text:p", &[("text:style-name", paragraph.as_str())])?;
        self.xml.start(
            "draw:frame",
            &[
                ("draw:style-name", graphic.as_str()),
                ("draw:name", name.as_str()),
                ("text:anchor-type", "as-char"),
                ("svg:width", width.as_str()),
                ("svg:height", height.as_str()),
            ],
        )?;
        self.xml.empty(
            "draw:image",
            &[
                ("xlink:href", href.as_str()),
                ("xlink:type", "simple"),
                ("xlink:show", "embed"),
                ("xlink:actuate", "onLoad"),
            ],
        )?;
        self.xml.end("draw:frame")?;
        self.xml.end("text:p")
    }
}

/// Header cells with the table's header overrides applied.
fn header_row(table: &Table, header: &Row) -> Row {
    let mut row = header.clone();
    for run in row.cells.iter_mut().flat_map(|c| c.runs.iter_mut()) {
        if table.style.header_bold {
            run.style.font.weight = FontWeight::Bold;
        }
        if let Some(color) = table.style.header_text {
            run.style.color = color;
        }
    }
    row
}

fn content_xml(styles: &StyleRegistry, body: &[u8]) -> Result<Vec<u8>> {
    let mut xml = XmlBuilder::document()?;
    xml.start(
        "office:document-content",
        &[
            ("xmlns:office", NS_OFFICE),
            ("xmlns:style", NS_STYLE),
            ("xmlns:text", NS_TEXT),
            ("xmlns:table", NS_TABLE),
            ("xmlns:draw", NS_DRAW),
            ("xmlns:fo", NS_FO),
            ("xmlns:svg", NS_SVG),
            ("xmlns:xlink", NS_XLINK),
            ("office:version", ODF_VERSION),
        ],
    )?;
    styles.write(&mut xml)?;
    xml.start("office:body", &[])?;
    xml.start("office:text", &[])?;
    xml.raw(body);
    xml.end("office:text")?;
    xml.end("office:body")?;
    xml.end("office:document-content")?;
    Ok(xml.into_bytes())
}

fn styles_xml(tree: &DocumentTree) -> Result<Vec<u8>> {
    let page = &tree.page;
    let (width, height) = (pt(page.width()), pt(page.height()));
    let margins = [
        pt(page.margins.top),
        pt(page.margins.right),
        pt(page.margins.bottom),
        pt(page.margins.left),
    ];
    let orientation = if page.width() > page.height() { "landscape" } else { "portrait" };

    let mut xml = XmlBuilder::document()?;
    xml.start(
        "office:document-styles",
        &[
            ("xmlns:office", NS_OFFICE),
            ("xmlns:style", NS_STYLE),
            ("xmlns:fo", NS_FO),
            ("office:version", ODF_VERSION),
        ],
    )?;
    xml.start("office:styles", &[])?;
    xml.start("style:default-style", &[("style:family", "paragraph")])?;
    xml.empty("style:text-properties", &[("fo:font-family", "Helvetica"), ("fo:font-size", "10pt")])?;
    xml.end("style:default-style")?;
    xml.end("office:styles")?;

    xml.start("office:automatic-styles", &[])?;
    xml.start("style:page-layout", &[("style:name", "pm1")])?;
    xml.empty(
        "style:page-layout-properties",
        &[
            ("fo:page-width", width.as_str()),
            ("fo:page-height", height.as_str()),
            ("fo:margin-top", margins[0].as_str()),
            ("fo:margin-right", margins[1].as_str()),
            ("fo:margin-bottom", margins[2].as_str()),
            ("fo:margin-left", margins[3].as_str()),
            ("style:print-orientation", orientation),
        ],
    )?;
    xml.end("style:page-layout")?;
    xml.end("office:automatic-styles")?;

    xml.start("office:master-styles", &[])?;
    xml.empty("style:master-page", &[("style:name", "Standard"), ("style:page-layout-name", "pm1")])?;
    xml.end("office:master-styles")?;
    xml.end("office:document-styles")?;
    Ok(xml.into_bytes())
}

fn meta_xml(tree: &DocumentTree) -> Result<Vec<u8>> {
    let mut xml = XmlBuilder::document()?;
    xml.start(
        "office:document-meta",
        &[
            ("xmlns:office", NS_OFFICE),
            ("xmlns:meta", NS_META),
            ("xmlns:dc", NS_DC),
            ("office:version", ODF_VERSION),
        ],
    )?;
    xml.start("office:meta", &[])?;
    xml.start("meta:generator", &[])?;
    xml.text("quire")?;
    xml.end("meta:generator")?;
    xml.start("dc:title", &[])?;
    xml.text(&tree.meta.title)?;
    xml.end("dc:title")?;
    if let Some(author) = &tree.meta.author {
        xml.start("meta:initial-creator", &[])?;
        xml.text(author)?;
        xml.end("meta:initial-creator")?;
    }
    if let Some(created) = tree.meta.creation_date {
        xml.start("meta:creation-date", &[])?;
        xml.text(&created.format("%Y-%m-%dT%H:%M:%S").to_string())?;
        xml.end("meta:creation-date")?;
    }
    xml.end("office:meta")?;
    xml.end("office:document-meta")?;
    Ok(xml.into_bytes())
}

fn manifest_xml(pictures: &[Picture]) -> Result<Vec<u8>> {
    let mut xml = XmlBuilder::document()?;
    xml.start("manifest:manifest", &[("xmlns:manifest", NS_MANIFEST), ("manifest:version", ODF_VERSION)])?;
    xml.empty(
        "manifest:file-entry",
        &[
            ("manifest:full-path", "/"),
            ("manifest:version", ODF_VERSION),
            ("manifest:media-type", MIMETYPE),
        ],
    )?;
    for part in ["content.xml", "styles.xml", "meta.xml"] {
        xml.empty("manifest:file-entry", &[("manifest:full-path", part), ("manifest:media-type", "text/xml")])?;
    }
    for picture in pictures {
        xml.empty(
            "manifest:file-entry",
            &[("manifest:full-path", picture.path.as_str()), ("manifest:media-type", picture.media_type)],
        )?;
    }
    xml.end("manifest:manifest")?;
    Ok(xml.into_bytes())
}
