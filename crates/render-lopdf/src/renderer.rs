use crate::error::RenderError;
use crate::fonts::{FaceKind, FontFace, FontId, FontLibrary};
use crate::layout::{PageLayout, PositionedElement, TextElement, paginate};
use crate::raster::DecodedImage;
use crate::writer::PdfWriter;
use log::{debug, warn};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, ObjectId, Stream, StringFormat, dictionary};
use quire_model::{Color, DocumentTree, Rect};
use quire_traits::ResourceProvider;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::sync::Arc;

/// Renders document trees straight to PDF bytes.
///
/// The renderer holds no per-document state; one instance can serve any
/// number of threads.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    fonts: Arc<FontLibrary>,
    resources: Option<Arc<dyn ResourceProvider>>,
}

impl PdfRenderer {
    pub fn new(fonts: Arc<FontLibrary>) -> Self {
        Self { fonts, resources: None }
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceProvider>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    /// Page layout without serialization.
    pub fn paginate(&self, tree: &DocumentTree) -> Result<Vec<PageLayout>, RenderError> {
        tree.validate()?;
        Ok(paginate(tree, &self.fonts))
    }

    pub fn render(&self, tree: &DocumentTree) -> Result<Vec<u8>, RenderError> {
        let pages = self.paginate(tree)?;
        let bytes = self.write_pages(tree, &pages)?;
        debug!("Rendered '{}': {} pages, {} bytes", tree.meta.title, pages.len(), bytes.len());
        Ok(bytes)
    }

    fn write_pages(&self, tree: &DocumentTree, pages: &[PageLayout]) -> Result<Vec<u8>, RenderError> {
        let mut writer = PdfWriter::new(Cursor::new(Vec::new()));

        let mut used_fonts = BTreeSet::new();
        let mut image_keys: Vec<&str> = Vec::new();
        for element in pages.iter().flat_map(|p| &p.elements) {
            match element {
                PositionedElement::Text(text) => used_fonts.extend(text.segments.iter().map(|s| s.font)),
                PositionedElement::Image { resource, .. } => {
                    if !image_keys.contains(&resource.as_str()) {
                        image_keys.push(resource.as_str());
                    }
                }
                PositionedElement::Rect { .. } => {}
            }
        }

        let mut font_dict = Dictionary::new();
        for id in &used_fonts {
            let face = self.fonts.face(*id);
            let font_id = write_font(&mut writer, face);
            font_dict.set(face.resource_name(), font_id);
        }

        let mut images = BTreeMap::new();
        let mut xobject_dict = Dictionary::new();
        for (index, key) in image_keys.iter().enumerate() {
            match self.load_image(key) {
                Ok(image) => {
                    let name = format!("Im{}", index + 1);
                    let id = writer.buffer_object(image.to_xobject());
                    xobject_dict.set(name.clone(), id);
                    images.insert(key.to_string(), name);
                }
                Err(e) => warn!("Drawing placeholder for image '{}': {}", key, e),
            }
        }

        let mut resources = dictionary! { "Font" => font_dict };
        if !xobject_dict.is_empty() {
            resources.set("XObject", xobject_dict);
        }
        writer.buffer_object_at_id(writer.resources_id, resources.into());

        let (page_width, page_height) = (tree.page.width(), tree.page.height());
        for page in pages {
            let mut ctx = PageContext::new(page_height, &self.fonts, &images);
            for element in &page.elements {
                ctx.draw(element);
            }
            let content = ctx.finish().encode()?;
            let content_id = writer.buffer_object(Object::Stream(Stream::new(dictionary! {}, content)));
            let page_id = writer.new_object_id();
            let page_dict = dictionary! {
                "Type" => "Page",
                "Parent" => writer.pages_id,
                "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
                "Contents" => content_id,
                "Resources" => writer.resources_id,
            };
            writer.buffer_object_at_id(page_id, page_dict.into());
            writer.add_page(page_id);
        }

        writer.set_info(info_dictionary(tree));
        Ok(writer.finish()?.into_inner())
    }

    fn load_image(&self, key: &str) -> Result<DecodedImage, RenderError> {
        let provider = self
            .resources
            .as_ref()
            .ok_or_else(|| RenderError::Image("no resource provider configured".into()))?;
        let data = provider.load(key).map_err(|e| RenderError::Image(e.to_string()))?;
        DecodedImage::decode(&data)
    }
}

fn write_font<W: std::io::Write + std::io::Seek>(writer: &mut PdfWriter<W>, face: &FontFace) -> ObjectId {
    match &face.kind {
        FaceKind::Standard(standard) => writer.buffer_object(
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => standard.base_font(),
                "Encoding" => "WinAnsiEncoding",
            }
            .into(),
        ),
        FaceKind::Embedded(embedded) => {
            let file = Stream::new(
                dictionary! { "Length1" => embedded.data.len() as i64 },
                embedded.data.as_ref().clone(),
            );
            let file_id = writer.buffer_object(Object::Stream(file));
            let flags = if face.italic { 32 + 64 } else { 32 };
            let descriptor = dictionary! {
                "Type" => "FontDescriptor",
                "FontName" => Object::Name(face.postscript_name.as_bytes().to_vec()),
                "Flags" => flags,
                "FontBBox" => embedded.bbox.iter().map(|v| Object::Integer(*v as i64)).collect::<Vec<_>>(),
                "ItalicAngle" => if face.italic { -12 } else { 0 },
                "Ascent" => embedded.ascent as i64,
                "Descent" => embedded.descent as i64,
                "CapHeight" => embedded.cap_height as i64,
                "StemV" => if face.bold { 120 } else { 80 },
                "FontFile2" => file_id,
            };
            let descriptor_id = writer.buffer_object(descriptor.into());
            writer.buffer_object(
                dictionary! {
                    "Type" => "Font",
                    "Subtype" => "TrueType",
                    "BaseFont" => Object::Name(face.postscript_name.as_bytes().to_vec()),
                    "FirstChar" => 32,
                    "LastChar" => 255,
                    "Widths" => face.widths_from(32).map(|w| Object::Integer(w as i64)).collect::<Vec<_>>(),
                    "Encoding" => "WinAnsiEncoding",
                    "FontDescriptor" => descriptor_id,
                }
                .into(),
            )
        }
    }
}

fn info_dictionary(tree: &DocumentTree) -> Dictionary {
    let mut info = dictionary! {
        "Title" => text_string(&tree.meta.title),
        "Producer" => text_string("quire"),
    };
    if let Some(author) = &tree.meta.author {
        info.set("Author", text_string(author));
    }
    if let Some(created) = tree.meta.creation_date {
        let stamp = created.format("D:%Y%m%d%H%M%S").to_string();
        info.set("CreationDate", Object::String(stamp.into_bytes(), StringFormat::Literal));
    }
    info
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(value: &str) -> Object {
    if value.is_ascii() {
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        bytes.extend(value.encode_utf16().flat_map(u16::to_be_bytes));
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

fn round(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

fn color_operands(color: Color) -> Vec<Object> {
    let (r, g, b) = color.to_unit();
    vec![round(r).into(), round(g).into(), round(b).into()]
}

#[derive(Default, PartialEq)]
struct PageState {
    font: Option<(FontId, u32)>,
    fill: Option<Color>,
}

/// Translates one page of positioned elements into content stream operations.
struct PageContext<'a> {
    page_height: f32,
    fonts: &'a FontLibrary,
    images: &'a BTreeMap<String, String>,
    content: Content,
    state: PageState,
}

impl<'a> PageContext<'a> {
    fn new(page_height: f32, fonts: &'a FontLibrary, images: &'a BTreeMap<String, String>) -> Self {
        Self { page_height, fonts, images, content: Content { operations: vec![] }, state: PageState::default() }
    }

    fn finish(self) -> Content {
        self.content
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.content.operations.push(Operation::new(operator, operands));
    }

    fn draw(&mut self, element: &PositionedElement) {
        match element {
            PositionedElement::Text(text) => self.draw_text(text),
            PositionedElement::Rect { rect, fill, stroke } => {
                if let Some(fill) = fill {
                    self.set_fill(*fill);
                    self.rectangle(rect);
                    self.op("f", vec![]);
                }
                if let Some((width, color)) = stroke {
                    self.op("w", vec![round(*width).into()]);
                    self.op("RG", color_operands(*color));
                    self.rectangle(rect);
                    self.op("S", vec![]);
                }
            }
            PositionedElement::Image { rect, resource } => match self.images.get(resource).cloned() {
                Some(name) => {
                    let y = self.page_height - rect.bottom();
                    self.op("q", vec![]);
                    self.op(
                        "cm",
                        vec![
                            round(rect.width).into(),
                            0.into(),
                            0.into(),
                            round(rect.height).into(),
                            round(rect.x).into(),
                            round(y).into(),
                        ],
                    );
                    self.op("Do", vec![Object::Name(name.into_bytes())]);
                    self.op("Q", vec![]);
                }
                None => self.draw_missing_image(rect),
            },
        }
    }

    fn rectangle(&mut self, rect: &Rect) {
        let y = self.page_height - rect.bottom();
        self.op(
            "re",
            vec![round(rect.x).into(), round(y).into(), round(rect.width).into(), round(rect.height).into()],
        );
    }

    fn set_fill(&mut self, color: Color) {
        if self.state.fill != Some(color) {
            self.op("rg", color_operands(color));
            self.state.fill = Some(color);
        }
    }

    fn set_font(&mut self, font: FontId, size: f32) {
        let key = (font, size.to_bits());
        if self.state.font != Some(key) {
            let name = self.fonts.face(font).resource_name();
            self.op("Tf", vec![Object::Name(name.into_bytes()), round(size).into()]);
            self.state.font = Some(key);
        }
    }

    fn draw_text(&mut self, text: &TextElement) {
        let y = round(self.page_height - text.baseline);
        let mut x = text.x;
        self.op("BT", vec![]);
        // Tf is not part of the graphics state outside a text object.
        self.state.font = None;
        for segment in &text.segments {
            self.set_font(segment.font, segment.size);
            self.set_fill(segment.color);
            self.op("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), round(x).into(), y.into()]);
            self.op("Tj", vec![Object::String(segment.bytes.clone(), StringFormat::Literal)]);
            x += segment.width;
        }
        self.op("ET", vec![]);
    }

    /// Gray box with both diagonals.
    fn draw_missing_image(&mut self, rect: &Rect) {
        let (left, right) = (round(rect.x), round(rect.right()));
        let (bottom, top) = (round(self.page_height - rect.bottom()), round(self.page_height - rect.y));
        self.op("q", vec![]);
        self.op("w", vec![0.5.into()]);
        self.op("RG", color_operands(Color::gray(160)));
        self.rectangle(rect);
        self.op("m", vec![left.into(), bottom.into()]);
        self.op("l", vec![right.into(), top.into()]);
        self.op("m", vec![left.into(), top.into()]);
        self.op("l", vec![right.into(), bottom.into()]);
        self.op("S", vec![]);
        self.op("Q", vec![]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use lopdf::Document;
    use quire_model::{
        Column, DocumentMeta, FontSpec, Image, LayoutHints, PageSpec, Paragraph, Row, Table, TextAlign,
        TextStyle,
    };
    use quire_traits::InMemoryResourceProvider;

    fn renderer() -> PdfRenderer {
        PdfRenderer::new(Arc::new(FontLibrary::new()))
    }

    fn sample_tree() -> DocumentTree {
        let mut tree = DocumentTree::new(
            DocumentMeta { title: "Quote".into(), ..Default::default() },
            PageSpec::default(),
        );
        tree.push(Paragraph::plain("Double Oak Fence Co.", TextStyle::default()));
        tree.push(
            Table::new(vec![Column::default(), Column::default()])
                .with_header(Row::from_texts(&["Item", "Total"], &TextStyle::default()), true)
                .with_rows(vec![Row::from_texts(&["Cedar post", "$195.50"], &TextStyle::default())]),
        );
        tree
    }

    /// Tj strings per page, decoded from the content streams.
    fn page_strings(bytes: &[u8]) -> Vec<Vec<String>> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .values()
            .map(|page_id| {
                let content = Content::decode(&doc.get_page_content(*page_id).unwrap()).unwrap();
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .filter_map(|op| match op.operands.first() {
                        Some(Object::String(bytes, _)) => Some(String::from_utf8_lossy(bytes).into_owned()),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn renders_text_into_content_streams() {
        let bytes = renderer().render(&sample_tree()).unwrap();
        assert_eq!(page_strings(&bytes), vec![vec!["Double Oak Fence Co.", "Item", "Total", "Cedar post", "$195.50"]]);
    }

    #[test]
    fn output_is_byte_identical_across_runs() {
        let renderer = renderer();
        let tree = sample_tree();
        assert_eq!(renderer.render(&tree).unwrap(), renderer.render(&tree).unwrap());
    }

    #[test]
    fn creation_date_only_when_present() {
        let renderer = renderer();
        let mut tree = sample_tree();
        let without = renderer.render(&tree).unwrap();
        assert!(!without.windows(12).any(|w| w == b"CreationDate"));

        tree.meta.creation_date = NaiveDate::from_ymd_opt(2025, 3, 7).and_then(|d| d.and_hms_opt(0, 0, 0));
        let with = renderer.render(&tree).unwrap();
        let needle = b"(D:20250307000000)";
        assert!(with.windows(needle.len()).any(|w| w == needle));
    }

    #[test]
    fn unknown_fonts_and_glyphs_never_fail() {
        let mut tree = sample_tree();
        tree.push(Paragraph::plain(
            "Hello 世界",
            TextStyle { font: FontSpec::new("No Such Family", 10.0), ..Default::default() },
        ));
        let bytes = renderer().render(&tree).unwrap();
        assert_eq!(page_strings(&bytes)[0].last().unwrap(), "Hello ??");
    }

    #[test]
    fn invalid_trees_are_rejected() {
        let mut tree = sample_tree();
        tree.push(Table::new(vec![]));
        assert!(matches!(renderer().render(&tree), Err(RenderError::Structure(_))));
    }

    #[test]
    fn missing_images_draw_a_placeholder() {
        let mut tree = sample_tree();
        tree.push(Image {
            resource: "logo.png".into(),
            width: 100.0,
            height: 40.0,
            align: TextAlign::Left,
            hints: LayoutHints::default(),
        });
        let bytes = renderer().render(&tree).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        assert!(!bytes.windows(7).any(|w| w == b"XObject"));
    }

    #[test]
    fn images_are_embedded_from_the_provider() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(4, 4, image::Rgb([46, 110, 51]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let provider = InMemoryResourceProvider::new();
        provider.add("logo.png", png).unwrap();

        let mut tree = sample_tree();
        tree.push(Image {
            resource: "logo.png".into(),
            width: 100.0,
            height: 40.0,
            align: TextAlign::Center,
            hints: LayoutHints::default(),
        });
        let renderer = renderer().with_resources(Arc::new(provider));
        let bytes = renderer.render(&tree).unwrap();
        assert!(bytes.windows(5).any(|w| w == b"/Im1 "));
        assert!(bytes.windows(9).any(|w| w == b"DeviceRGB"));
    }
}
