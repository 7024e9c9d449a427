//! Automatic styles collected while the body is written.
//!
//! ODF requires every `text:style-name` to reference a declared style, and
//! declarations must precede the body. The registry hands out names in
//! first-use order and writes the declarations once the body is complete.

use crate::error::Result;
use crate::xml::XmlBuilder;
use quire_model::{Color, PageBreak, TextAlign, TextStyle};

/// Points with at most two decimals and no trailing zeros.
pub(crate) fn pt(value: f32) -> String {
    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    let text = if text == "-0" { "0" } else { text };
    format!("{}pt", text)
}

#[derive(Debug, Clone, PartialEq)]
struct TextKey {
    family: String,
    size: u32,
    bold: bool,
    italic: bool,
    color: Color,
}

impl TextKey {
    fn from_style(style: &TextStyle) -> Self {
        Self {
            family: style.font.family.clone(),
            size: style.font.size.to_bits(),
            bold: style.font.is_bold(),
            italic: style.font.italic,
            color: style.color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ParagraphKey {
    pub align: TextAlign,
    pub space_after: f32,
    pub page_break: PageBreak,
    /// Fixed line height; used by spacers.
    pub line_height: Option<f32>,
}

impl ParagraphKey {
    pub fn aligned(align: TextAlign) -> Self {
        Self { align, space_after: 0.0, page_break: PageBreak::Auto, line_height: None }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CellKey {
    pub padding: f32,
    pub fill: Option<Color>,
    pub border: Option<(f32, Color)>,
}

#[derive(Debug, Clone, PartialEq)]
enum AutoStyle {
    Text(TextKey),
    Paragraph(ParagraphKey),
    Table { width: f32, page_break: PageBreak },
    Column { width: f32 },
    Cell(CellKey),
    Graphic,
}

#[derive(Debug, Default)]
pub(crate) struct StyleRegistry {
    styles: Vec<(String, AutoStyle)>,
    counters: [usize; 5],
}

impl StyleRegistry {
    fn intern(&mut self, style: AutoStyle, prefix: &str, counter: usize) -> String {
        if let Some((name, _)) = self.styles.iter().find(|(_, s)| *s == style) {
            return name.clone();
        }
        self.counters[counter] += 1;
        let name = format!("{}{}", prefix, self.counters[counter]);
        self.styles.push((name.clone(), style));
        name
    }

    pub fn text(&mut self, style: &TextStyle) -> String {
        self.intern(AutoStyle::Text(TextKey::from_style(style)), "T", 0)
    }

    pub fn paragraph(&mut self, key: ParagraphKey) -> String {
        self.intern(AutoStyle::Paragraph(key), "P", 1)
    }

    pub fn table(&mut self, width: f32, page_break: PageBreak) -> String {
        self.intern(AutoStyle::Table { width, page_break }, "Tbl", 2)
    }

    pub fn column(&mut self, width: f32) -> String {
        self.intern(AutoStyle::Column { width }, "Col", 3)
    }

    pub fn cell(&mut self, key: CellKey) -> String {
        self.intern(AutoStyle::Cell(key), "Cell", 4)
    }

    pub fn graphic(&mut self) -> String {
        if !self.styles.iter().any(|(_, s)| *s == AutoStyle::Graphic) {
            self.styles.push(("fr1".to_string(), AutoStyle::Graphic));
        }
        "fr1".to_string()
    }

    pub fn write(&self, xml: &mut XmlBuilder) -> Result<()> {
        xml.start("office:automatic-styles", &[])?;
        for (name, style) in &self.styles {
            match style {
                AutoStyle::Text(key) => {
                    xml.start("style:style", &[("style:name", name.as_str()), ("style:family", "text")])?;
                    let size = pt(f32::from_bits(key.size));
                    let color = key.color.to_hex();
                    let mut attrs = vec![
                        ("fo:font-family", key.family.as_str()),
                        ("fo:font-size", size.as_str()),
                        ("fo:color", color.as_str()),
                    ];
                    if key.bold {
                        attrs.push(("fo:font-weight", "bold"));
                    }
                    if key.italic {
                        attrs.push(("fo:font-style", "italic"));
                    }
                    xml.empty("style:text-properties", &attrs)?;
                    xml.end("style:style")?;
                }
                AutoStyle::Paragraph(key) => {
                    xml.start("style:style", &[("style:name", name.as_str()), ("style:family", "paragraph")])?;
                    let align = match key.align {
                        TextAlign::Left => "start",
                        TextAlign::Center => "center",
                        TextAlign::Right => "end",
                    };
                    let margin = pt(key.space_after);
                    let line_height = key.line_height.map(pt);
                    let mut attrs = vec![("fo:text-align", align), ("fo:margin-bottom", margin.as_str())];
                    if let Some(height) = &line_height {
                        attrs.push(("fo:line-height", height.as_str()));
                    }
                    match key.page_break {
                        PageBreak::Auto => {}
                        PageBreak::Before => attrs.push(("fo:break-before", "page")),
                        PageBreak::Avoid => attrs.push(("fo:keep-together", "always")),
                    }
                    xml.empty("style:paragraph-properties", &attrs)?;
                    xml.end("style:style")?;
                }
                AutoStyle::Table { width, page_break } => {
                    xml.start("style:style", &[("style:name", name.as_str()), ("style:family", "table")])?;
                    let width = pt(*width);
                    let mut attrs = vec![("style:width", width.as_str()), ("table:align", "left")];
                    match page_break {
                        PageBreak::Auto => {}
                        PageBreak::Before => attrs.push(("fo:break-before", "page")),
                        PageBreak::Avoid => attrs.push(("style:may-break-between-rows", "false")),
                    }
                    xml.empty("style:table-properties", &attrs)?;
                    xml.end("style:style")?;
                }
                AutoStyle::Column { width } => {
                    xml.start("style:style", &[("style:name", name.as_str()), ("style:family", "table-column")])?;
                    xml.empty("style:table-column-properties", &[("style:column-width", pt(*width).as_str())])?;
                    xml.end("style:style")?;
                }
                AutoStyle::Cell(key) => {
                    xml.start("style:style", &[("style:name", name.as_str()), ("style:family", "table-cell")])?;
                    let padding = pt(key.padding);
                    let fill = key.fill.map(Color::to_hex);
                    let border = match key.border {
                        Some((width, color)) => format!("{} solid {}", pt(width), color.to_hex()),
                        None => "none".to_string(),
                    };
                    let mut attrs = vec![("fo:padding", padding.as_str()), ("fo:border", border.as_str())];
                    if let Some(fill) = &fill {
                        attrs.push(("fo:background-color", fill.as_str()));
                    }
                    xml.empty("style:table-cell-properties", &attrs)?;
                    xml.end("style:style")?;
                }
                AutoStyle::Graphic => {
                    xml.start("style:style", &[("style:name", name.as_str()), ("style:family", "graphic")])?;
                    xml.empty(
                        "style:graphic-properties",
                        &[("style:wrap", "none"), ("style:vertical-pos", "top"), ("style:horizontal-pos", "center")],
                    )?;
                    xml.end("style:style")?;
                }
            }
        }
        xml.end("office:automatic-styles")
    }
}
