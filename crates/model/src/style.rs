use crate::color::Color;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Regular,
    Bold,
}

/// The face a run asks for. Whether it exists is the renderer's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
    #[serde(default)]
    pub weight: FontWeight,
    #[serde(default)]
    pub italic: bool,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "Helvetica".to_string(),
            size: 10.0,
            weight: FontWeight::Regular,
            italic: false,
        }
    }
}

impl FontSpec {
    pub fn new(family: impl Into<String>, size: f32) -> Self {
        Self { family: family.into(), size, ..Default::default() }
    }

    pub fn bold(mut self) -> Self {
        self.weight = FontWeight::Bold;
        self
    }

    pub fn italic(mut self) -> Self {
        self.italic = true;
        self
    }

    pub fn is_bold(&self) -> bool {
        self.weight == FontWeight::Bold
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TextStyle {
    #[serde(default)]
    pub font: FontSpec,
    #[serde(default)]
    pub color: Color,
}

impl TextStyle {
    pub fn new(font: FontSpec, color: Color) -> Self {
        Self { font, color }
    }
}

/// How a block treats page boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageBreak {
    /// Flow across pages as needed.
    #[default]
    Auto,
    /// Always start on a fresh page.
    Before,
    /// Keep the block on one page when it fits on one.
    Avoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LayoutHints {
    #[serde(default)]
    pub page_break: PageBreak,
    /// Tables only: re-emit the header row at the top of each continuation page.
    #[serde(default)]
    pub repeat_header: bool,
}
