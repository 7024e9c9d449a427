use crate::color::Color;
use crate::geometry::PageSpec;
use crate::style::{LayoutHints, TextAlign, TextStyle};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Only written into output when set; renderers never read the clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<NaiveDateTime>,
}

/// A composed report, ready for either rendering path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentTree {
    pub meta: DocumentMeta,
    pub page: PageSpec,
    pub body: Vec<Node>,
}

impl DocumentTree {
    pub fn new(meta: DocumentMeta, page: PageSpec) -> Self {
        Self { meta, page, body: Vec::new() }
    }

    pub fn push(&mut self, node: impl Into<Node>) -> &mut Self {
        self.body.push(node.into());
        self
    }

    /// Visits every table in document order, descending into sections.
    pub fn tables(&self) -> Vec<&Table> {
        fn collect<'a>(nodes: &'a [Node], out: &mut Vec<&'a Table>) {
            for node in nodes {
                match node {
                    Node::Table(table) => out.push(table),
                    Node::Section(section) => collect(&section.children, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.body, &mut out);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Node {
    Section(Section),
    Paragraph(Paragraph),
    Table(Table),
    Image(Image),
    Spacer(Spacer),
}

impl From<Section> for Node {
    fn from(value: Section) -> Self {
        Node::Section(value)
    }
}

impl From<Paragraph> for Node {
    fn from(value: Paragraph) -> Self {
        Node::Paragraph(value)
    }
}

impl From<Table> for Node {
    fn from(value: Table) -> Self {
        Node::Table(value)
    }
}

impl From<Image> for Node {
    fn from(value: Image) -> Self {
        Node::Image(value)
    }
}

impl From<Spacer> for Node {
    fn from(value: Spacer) -> Self {
        Node::Spacer(value)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<Paragraph>,
    pub children: Vec<Node>,
    #[serde(default)]
    pub hints: LayoutHints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl TextRun {
    pub fn new(text: impl Into<String>, style: TextStyle) -> Self {
        Self { text: text.into(), style }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Paragraph {
    pub runs: Vec<TextRun>,
    #[serde(default)]
    pub align: TextAlign,
    /// Extra vertical space below the last line, in points.
    #[serde(default)]
    pub space_after: f32,
    #[serde(default)]
    pub hints: LayoutHints,
}

impl Paragraph {
    pub fn new(runs: Vec<TextRun>) -> Self {
        Self { runs, ..Default::default() }
    }

    pub fn plain(text: impl Into<String>, style: TextStyle) -> Self {
        Self::new(vec![TextRun::new(text, style)])
    }

    pub fn aligned(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_space_after(mut self, space: f32) -> Self {
        self.space_after = space;
        self
    }

    /// Concatenated text of all runs, without styling.
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnWidth {
    /// Shares whatever the fixed and percent columns leave over.
    #[default]
    Auto,
    Fixed(f32),
    Percent(f32),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Column {
    #[serde(default)]
    pub width: ColumnWidth,
    #[serde(default)]
    pub align: TextAlign,
}

impl Column {
    pub fn new(width: ColumnWidth, align: TextAlign) -> Self {
        Self { width, align }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cell {
    pub runs: Vec<TextRun>,
}

impl Cell {
    pub fn plain(text: impl Into<String>, style: TextStyle) -> Self {
        Self { runs: vec![TextRun::new(text, style)] }
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// One plain cell per text, all sharing `style`.
    pub fn from_texts<S: AsRef<str>>(texts: &[S], style: &TextStyle) -> Self {
        Self {
            cells: texts.iter().map(|t| Cell::plain(t.as_ref(), style.clone())).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLine {
    pub width: f32,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableStyle {
    #[serde(default = "default_cell_padding")]
    pub cell_padding: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_fill: Option<Color>,
    /// Overrides the header cells' own run colors when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_text: Option<Color>,
    #[serde(default)]
    pub header_bold: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridLine>,
    /// Body row backgrounds, cycled by row index.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stripes: Vec<Color>,
}

fn default_cell_padding() -> f32 {
    4.0
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            cell_padding: default_cell_padding(),
            header_fill: None,
            header_text: None,
            header_bold: false,
            grid: None,
            stripes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<Row>,
    pub rows: Vec<Row>,
    #[serde(default)]
    pub style: TableStyle,
    #[serde(default)]
    pub hints: LayoutHints,
}

impl Table {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns, ..Default::default() }
    }

    pub fn with_header(mut self, header: Row, repeat: bool) -> Self {
        self.header = Some(header);
        self.hints.repeat_header = repeat;
        self
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    /// Resolves every column to points within `available`. Auto columns
    /// share what fixed and percent columns leave over. Claims wider than
    /// `available` are scaled down so the table never exceeds it.
    pub fn column_widths(&self, available: f32) -> Vec<f32> {
        let claims: Vec<Option<f32>> = self
            .columns
            .iter()
            .map(|c| match c.width {
                ColumnWidth::Fixed(w) => Some(w),
                ColumnWidth::Percent(p) => Some(available * p / 100.0),
                ColumnWidth::Auto => None,
            })
            .collect();
        let claimed: f32 = claims.iter().flatten().sum();
        let scale = if claimed > available && claimed > 0.0 { available / claimed } else { 1.0 };
        let autos = claims.iter().filter(|w| w.is_none()).count();
        let share = if autos > 0 { ((available - claimed) / autos as f32).max(0.0) } else { 0.0 };
        claims.into_iter().map(|w| w.map_or(share, |w| w * scale)).collect()
    }
}

/// A raster image referenced by resource key, drawn into a fixed box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub resource: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default)]
    pub hints: LayoutHints,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spacer {
    pub height: f32,
}
