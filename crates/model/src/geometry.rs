use serde::{Deserialize, Serialize};

/// An axis-aligned box in points, measured from the top-left of the page.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamedSize {
    A4,
    Letter,
    Legal,
}

/// Page dimensions, either a well-known paper size or explicit points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageSize {
    Named(NamedSize),
    Custom { width: f32, height: f32 },
}

impl Default for PageSize {
    fn default() -> Self {
        PageSize::Named(NamedSize::Letter)
    }
}

impl PageSize {
    /// Returns `(width, height)` in points.
    pub fn dimensions(&self) -> (f32, f32) {
        match self {
            PageSize::Named(NamedSize::A4) => (595.28, 841.89),
            PageSize::Named(NamedSize::Letter) => (612.0, 792.0),
            PageSize::Named(NamedSize::Legal) => (612.0, 1008.0),
            PageSize::Custom { width, height } => (*width, *height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Margins {
    pub fn uniform(value: f32) -> Self {
        Self { top: value, right: value, bottom: value, left: value }
    }
}

impl Default for Margins {
    fn default() -> Self {
        Margins::uniform(36.0)
    }
}

/// Page size plus margins; every page of a document shares one spec.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PageSpec {
    #[serde(default)]
    pub size: PageSize,
    #[serde(default)]
    pub margins: Margins,
}

impl PageSpec {
    pub fn new(size: PageSize, margins: Margins) -> Self {
        Self { size, margins }
    }

    pub fn width(&self) -> f32 {
        self.size.dimensions().0
    }

    pub fn height(&self) -> f32 {
        self.size.dimensions().1
    }

    pub fn content_width(&self) -> f32 {
        self.width() - self.margins.left - self.margins.right
    }

    pub fn content_height(&self) -> f32 {
        self.height() - self.margins.top - self.margins.bottom
    }

    /// The printable area, in top-left page coordinates.
    pub fn content_area(&self) -> Rect {
        Rect::new(
            self.margins.left,
            self.margins.top,
            self.content_width(),
            self.content_height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_content_area_respects_margins() {
        let spec = PageSpec::new(
            PageSize::Named(NamedSize::Letter),
            Margins { top: 40.0, right: 36.0, bottom: 36.0, left: 36.0 },
        );
        assert_eq!(spec.content_width(), 540.0);
        assert_eq!(spec.content_height(), 716.0);
        assert_eq!(spec.content_area().bottom(), 756.0);
    }

    #[test]
    fn page_size_deserializes_named_and_custom() {
        let named: PageSize = serde_json::from_str("\"A4\"").unwrap();
        let custom: PageSize = serde_json::from_str(r#"{"width": 300, "height": 200}"#).unwrap();
        assert_eq!(named, PageSize::Named(NamedSize::A4));
        assert_eq!(custom.dimensions(), (300.0, 200.0));
    }
}
