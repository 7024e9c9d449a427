//! The JSON template format.
//!
//! ```json
//! {
//!   "id": "quote",
//!   "title": "Quote {{project}}",
//!   "page": { "size": "Letter", "margins": { "top": 40, "right": 36, "bottom": 36, "left": 36 } },
//!   "styles": { "h1": { "size": 16, "bold": true } },
//!   "fields": [
//!     { "name": "project", "kind": "text" },
//!     { "name": "lines", "kind": "rows", "columns": [
//!         { "name": "qty", "kind": "number" },
//!         { "name": "total", "kind": "number", "format": { "decimals": 2, "prefix": "$" } } ] }
//!   ],
//!   "derived": [ { "name": "subtotal", "sum": { "rows": "lines", "column": "total" } } ],
//!   "body": [ { "type": "paragraph", "text": "Project: {{project}}", "style": "h1" } ]
//! }
//! ```

use quire_model::{Color, ColumnWidth, FontSpec, FontWeight, PageBreak, PageSpec, TableStyle, TextAlign, TextStyle};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateDef {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub page: PageSpec,
    /// Overrides applied to the built-in base style (Helvetica 10pt, black).
    #[serde(default)]
    pub base_style: StyleDef,
    #[serde(default)]
    pub styles: BTreeMap<String, StyleDef>,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub derived: Vec<DerivedDef>,
    /// Name of a date field stamped into the document metadata.
    #[serde(default)]
    pub creation_date_field: Option<String>,
    pub body: Vec<ElementDef>,
}

impl TemplateDef {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A partial style; unset attributes inherit from the style it is layered on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StyleDef {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub size: Option<f32>,
    #[serde(default)]
    pub bold: Option<bool>,
    #[serde(default)]
    pub italic: Option<bool>,
    #[serde(default)]
    pub color: Option<Color>,
}

impl StyleDef {
    pub fn apply(&self, base: &TextStyle) -> TextStyle {
        let mut font = FontSpec {
            family: self.family.clone().unwrap_or_else(|| base.font.family.clone()),
            size: self.size.unwrap_or(base.font.size),
            ..base.font.clone()
        };
        if let Some(bold) = self.bold {
            font.weight = if bold { FontWeight::Bold } else { FontWeight::Regular };
        }
        if let Some(italic) = self.italic {
            font.italic = italic;
        }
        TextStyle { font, color: self.color.unwrap_or(base.color) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Date,
    Rows,
}

impl FieldKind {
    pub fn describe(self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "a number",
            FieldKind::Date => "a date (YYYY-MM-DD or RFC 3339)",
            FieldKind::Rows => "an array of row objects",
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default = "default_true")]
    pub required: bool,
    /// Used when an optional field is absent or null.
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub format: Format,
    /// Row schema; only meaningful for `rows` fields.
    #[serde(default)]
    pub columns: Vec<FieldDef>,
}

/// Display formatting for numbers and dates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Format {
    #[serde(default)]
    pub decimals: Option<usize>,
    #[serde(default)]
    pub thousands: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    /// strftime-style pattern for dates, e.g. `%b %d, %Y`.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivedOp {
    /// Sum of a numeric column over a rows field; absent cells count as zero.
    Sum { rows: String, column: String },
    /// A numeric field multiplied by a constant.
    Scale { field: String, factor: f64 },
    /// Sum of numeric fields (bound or previously derived).
    Add(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct DerivedDef {
    pub name: String,
    #[serde(flatten)]
    pub op: DerivedOp,
    #[serde(default)]
    pub format: Format,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementDef {
    Paragraph(ParagraphDef),
    Spacer { height: f32 },
    Table(TableDef),
    Image(ImageDef),
    Section(SectionDef),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunDef {
    pub text: String,
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParagraphDef {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub runs: Vec<RunDef>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default)]
    pub space_after: f32,
    #[serde(default)]
    pub page_break: PageBreak,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableColumnDef {
    pub header: String,
    /// Column of the source rows field shown in this table column.
    pub field: String,
    #[serde(default)]
    pub width: ColumnWidth,
    #[serde(default)]
    pub align: TextAlign,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableDef {
    /// Name of a `rows` field.
    pub source: String,
    pub columns: Vec<TableColumnDef>,
    #[serde(default = "default_true")]
    pub repeat_header: bool,
    /// Shown below the header when the source has no rows.
    #[serde(default)]
    pub empty_text: Option<String>,
    #[serde(default)]
    pub cell_style: Option<String>,
    #[serde(default)]
    pub header_style: Option<String>,
    #[serde(default)]
    pub table_style: TableStyle,
    #[serde(default)]
    pub page_break: PageBreak,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageDef {
    /// Resource key; may contain placeholders.
    pub src: String,
    pub width: f32,
    pub height: f32,
    #[serde(default)]
    pub align: TextAlign,
    #[serde(default)]
    pub page_break: PageBreak,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionDef {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_style: Option<String>,
    pub children: Vec<ElementDef>,
    #[serde(default)]
    pub page_break: PageBreak,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_derived_and_body() {
        let def = TemplateDef::from_json(
            r##"{
                "id": "quote",
                "styles": { "h1": { "size": 16, "bold": true, "color": "#2e6e33" } },
                "fields": [
                    { "name": "project", "kind": "text" },
                    { "name": "note", "kind": "text", "required": false, "default": "n/a" },
                    { "name": "lines", "kind": "rows", "columns": [ { "name": "total", "kind": "number" } ] }
                ],
                "derived": [
                    { "name": "subtotal", "sum": { "rows": "lines", "column": "total" }, "format": { "decimals": 2 } },
                    { "name": "tax", "scale": { "field": "subtotal", "factor": 0.0825 } },
                    { "name": "grand", "add": ["subtotal", "tax"] }
                ],
                "body": [
                    { "type": "paragraph", "text": "{{project}}", "style": "h1" },
                    { "type": "spacer", "height": 6 },
                    { "type": "table", "source": "lines",
                      "columns": [ { "header": "Total", "field": "total", "width": { "fixed": 80 }, "align": "right" } ] }
                ]
            }"##,
        )
        .unwrap();

        assert_eq!(def.fields.len(), 3);
        assert_eq!(def.field("lines").unwrap().columns[0].kind, FieldKind::Number);
        assert!(!def.field("note").unwrap().required);
        assert!(matches!(def.derived[0].op, DerivedOp::Sum { .. }));
        assert_eq!(def.derived[0].format.decimals, Some(2));
        assert!(matches!(def.derived[2].op, DerivedOp::Add(ref names) if names.len() == 2));
        assert!(matches!(def.body[1], ElementDef::Spacer { height } if height == 6.0));
        match &def.body[2] {
            ElementDef::Table(table) => {
                assert!(table.repeat_header);
                assert_eq!(table.columns[0].width, ColumnWidth::Fixed(80.0));
            }
            other => panic!("expected table, got {:?}", other),
        }
    }

    #[test]
    fn style_layers_over_base() {
        let base = TextStyle::default();
        let h1 = StyleDef { size: Some(16.0), bold: Some(true), ..Default::default() }.apply(&base);
        assert_eq!(h1.font.family, "Helvetica");
        assert_eq!(h1.font.size, 16.0);
        assert!(h1.font.is_bold());
        assert_eq!(h1.color, base.color);
    }
}
