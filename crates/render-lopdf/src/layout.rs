//! Pagination: places document nodes onto fixed-size pages.
//!
//! Blocks are stacked top to bottom inside the page content area. When the
//! next block does not fit in the space left, a new page starts. Paragraph
//! lines flow across pages one at a time; table rows are atomic. A table that
//! asks for it repeats its header as the first element of every continuation
//! page. A row taller than a whole page is placed on a page of its own and
//! allowed to overflow the bottom margin.
//!
//! Coordinates are in points from the top-left corner of the page.

use crate::fonts::FontLibrary;
use crate::text::{Line, Segment, wrap};
use log::{debug, warn};
use quire_model::{
    Color, DocumentTree, FontWeight, Image, Node, PageBreak, PageSpec, Paragraph, Rect,
    Row, Section, Table, TextAlign, TextRun,
};

/// Positions within this distance are treated as equal when checking fit.
const EPSILON: f32 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct TextElement {
    /// Left edge of the first segment.
    pub x: f32,
    pub baseline: f32,
    pub segments: Vec<Segment>,
}

impl TextElement {
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionedElement {
    Text(TextElement),
    Rect {
        rect: Rect,
        fill: Option<Color>,
        stroke: Option<(f32, Color)>,
    },
    Image {
        rect: Rect,
        resource: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageLayout {
    pub number: usize,
    pub elements: Vec<PositionedElement>,
}

impl PageLayout {
    /// Text of every text element on the page, in drawing order.
    pub fn texts(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter_map(|e| match e {
                PositionedElement::Text(text) => Some(text.text()),
                _ => None,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Lays out the whole tree. Always returns at least one page.
pub fn paginate(tree: &DocumentTree, fonts: &FontLibrary) -> Vec<PageLayout> {
    let mut engine = LayoutEngine::new(fonts, tree.page);
    engine.place_nodes(&tree.body);
    let pages = engine.finish();
    debug!("Paginated '{}' into {} pages", tree.meta.title, pages.len());
    pages
}

struct LaidRow {
    height: f32,
    cells: Vec<Vec<Line>>,
}

struct LayoutEngine<'a> {
    fonts: &'a FontLibrary,
    area: Rect,
    pages: Vec<PageLayout>,
    /// Offset below the top of the content area.
    cursor: f32,
    placeholders: usize,
}

impl<'a> LayoutEngine<'a> {
    fn new(fonts: &'a FontLibrary, page: PageSpec) -> Self {
        Self {
            fonts,
            area: page.content_area(),
            pages: vec![PageLayout { number: 1, elements: Vec::new() }],
            cursor: 0.0,
            placeholders: 0,
        }
    }

    fn finish(self) -> Vec<PageLayout> {
        if self.placeholders > 0 {
            debug!("{} characters drawn as placeholders", self.placeholders);
        }
        self.pages
    }

    fn remaining(&self) -> f32 {
        self.area.height - self.cursor
    }

    fn fits(&self, height: f32) -> bool {
        height <= self.remaining() + EPSILON
    }

    fn at_top(&self) -> bool {
        self.cursor <= EPSILON
    }

    fn new_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(PageLayout { number, elements: Vec::new() });
        self.cursor = 0.0;
    }

    /// Starts a new page unless nothing has been placed on the current one.
    fn break_page(&mut self) {
        if !self.at_top() {
            self.new_page();
        }
    }

    fn push(&mut self, element: PositionedElement) {
        if let Some(page) = self.pages.last_mut() {
            page.elements.push(element);
        }
    }

    fn top(&self) -> f32 {
        self.area.y + self.cursor
    }

    fn apply_break_policy(&mut self, policy: PageBreak, total_height: impl FnOnce(&Self) -> f32) {
        match policy {
            PageBreak::Auto => {}
            PageBreak::Before => self.break_page(),
            PageBreak::Avoid => {
                let height = total_height(self);
                if height <= self.area.height + EPSILON && !self.fits(height) {
                    self.break_page();
                }
            }
        }
    }

    fn place_nodes(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Section(section) => self.place_section(section),
                Node::Paragraph(paragraph) => self.place_paragraph(paragraph),
                Node::Table(table) => self.place_table(table),
                Node::Image(image) => self.place_image(image),
                Node::Spacer(spacer) => {
                    // A spacer that does not fit ends at the page boundary;
                    // at the top of a page it has nothing to separate.
                    if self.fits(spacer.height) {
                        self.cursor += spacer.height;
                    } else {
                        self.break_page();
                    }
                }
            }
        }
    }

    // ========================================================================
    // Measuring
    // ========================================================================

    fn wrap_runs(&mut self, runs: &[TextRun], width: f32) -> Vec<Line> {
        let wrapped = wrap(self.fonts, runs, width);
        self.placeholders += wrapped.placeholders;
        wrapped.lines
    }

    fn paragraph_height(&self, paragraph: &Paragraph) -> f32 {
        wrap(self.fonts, &paragraph.runs, self.area.width).height() + paragraph.space_after
    }

    fn column_widths(&self, table: &Table) -> Vec<f32> {
        table.column_widths(self.area.width)
    }

    fn header_runs(table: &Table, row: &Row) -> Vec<Vec<TextRun>> {
        row.cells
            .iter()
            .map(|cell| {
                cell.runs
                    .iter()
                    .map(|run| {
                        let mut run = run.clone();
                        if table.style.header_bold {
                            run.style.font.weight = FontWeight::Bold;
                        }
                        if let Some(color) = table.style.header_text {
                            run.style.color = color;
                        }
                        run
                    })
                    .collect()
            })
            .collect()
    }

    fn lay_row<'r>(&mut self, cells: impl Iterator<Item = &'r [TextRun]>, widths: &[f32], padding: f32) -> LaidRow {
        let mut laid = Vec::with_capacity(widths.len());
        let mut content = 0.0_f32;
        for (runs, width) in cells.zip(widths) {
            let lines = self.wrap_runs(runs, width - 2.0 * padding);
            content = content.max(lines.iter().map(Line::height).sum());
            laid.push(lines);
        }
        LaidRow { height: content + 2.0 * padding, cells: laid }
    }

    fn measure_row<'r>(&self, cells: impl Iterator<Item = &'r [TextRun]>, widths: &[f32], padding: f32) -> f32 {
        cells
            .zip(widths)
            .map(|(runs, width)| wrap(self.fonts, runs, width - 2.0 * padding).height())
            .fold(0.0_f32, f32::max)
            + 2.0 * padding
    }

    /// Header height followed by each body row height.
    fn table_heights(&self, table: &Table) -> (f32, Vec<f32>) {
        let widths = self.column_widths(table);
        let padding = table.style.cell_padding;
        let header = table.header.as_ref().map_or(0.0, |row| {
            let runs = Self::header_runs(table, row);
            self.measure_row(runs.iter().map(Vec::as_slice), &widths, padding)
        });
        let rows = table
            .rows
            .iter()
            .map(|row| self.measure_row(row.cells.iter().map(|c| c.runs.as_slice()), &widths, padding))
            .collect();
        (header, rows)
    }

    /// Height of the part of a node that must stay with a preceding title.
    fn lead_height(&self, node: &Node) -> f32 {
        match node {
            Node::Paragraph(p) => wrap(self.fonts, &p.runs, self.area.width)
                .lines
                .first()
                .map(Line::height)
                .unwrap_or(0.0),
            Node::Table(t) => {
                let (header, rows) = self.table_heights(t);
                header + rows.first().copied().unwrap_or(0.0)
            }
            Node::Image(i) => i.height.min(self.area.height),
            Node::Spacer(_) => 0.0,
            Node::Section(s) => {
                s.title.as_ref().map(|t| self.paragraph_height(t)).unwrap_or(0.0)
                    + s.children.first().map(|c| self.lead_height(c)).unwrap_or(0.0)
            }
        }
    }

    fn node_height(&self, node: &Node) -> f32 {
        match node {
            Node::Paragraph(p) => self.paragraph_height(p),
            Node::Table(t) => {
                let (header, rows) = self.table_heights(t);
                header + rows.iter().sum::<f32>()
            }
            Node::Image(i) => i.height.min(self.area.height),
            Node::Spacer(s) => s.height,
            Node::Section(s) => self.section_height(s),
        }
    }

    fn section_height(&self, section: &Section) -> f32 {
        section.title.as_ref().map(|t| self.paragraph_height(t)).unwrap_or(0.0)
            + section.children.iter().map(|c| self.node_height(c)).sum::<f32>()
    }

    // ========================================================================
    // Placement
    // ========================================================================

    fn place_section(&mut self, section: &Section) {
        self.apply_break_policy(section.hints.page_break, |engine| engine.section_height(section));
        if let Some(title) = &section.title {
            // Keep the title with the start of the section's content.
            let lead = self.paragraph_height(title)
                + section.children.first().map(|c| self.lead_height(c)).unwrap_or(0.0);
            if lead <= self.area.height && !self.fits(lead) {
                self.break_page();
            }
            self.place_paragraph(title);
        }
        self.place_nodes(&section.children);
    }

    fn place_paragraph(&mut self, paragraph: &Paragraph) {
        self.apply_break_policy(paragraph.hints.page_break, |engine| engine.paragraph_height(paragraph));

        let lines = self.wrap_runs(&paragraph.runs, self.area.width);
        for line in lines {
            let height = line.height();
            if !self.fits(height) && !self.at_top() {
                self.new_page();
            }
            let x = self.area.x + align_offset(paragraph.align, self.area.width, line.width);
            let baseline = self.top() + line.baseline();
            if !line.segments.is_empty() {
                self.push(PositionedElement::Text(TextElement { x, baseline, segments: line.segments }));
            }
            self.cursor += height;
        }
        self.cursor = (self.cursor + paragraph.space_after).min(self.area.height.max(self.cursor));
    }

    fn place_image(&mut self, image: &Image) {
        let mut width = image.width;
        let mut height = image.height;
        let scale = (self.area.width / width).min(self.area.height / height).min(1.0);
        if scale < 1.0 {
            debug!("Scaling image '{}' by {:.3} to fit the page", image.resource, scale);
            width *= scale;
            height *= scale;
        }

        if image.hints.page_break == PageBreak::Before || !self.fits(height) {
            self.break_page();
        }
        let x = self.area.x + align_offset(image.align, self.area.width, width);
        self.push(PositionedElement::Image {
            rect: Rect::new(x, self.top(), width, height),
            resource: image.resource.clone(),
        });
        self.cursor += height;
    }

    fn place_table(&mut self, table: &Table) {
        let widths = self.column_widths(table);
        let padding = table.style.cell_padding;

        let header = table.header.as_ref().map(|row| {
            let runs = Self::header_runs(table, row);
            self.lay_row(runs.iter().map(Vec::as_slice), &widths, padding)
        });
        let rows: Vec<LaidRow> = table
            .rows
            .iter()
            .map(|row| self.lay_row(row.cells.iter().map(|c| c.runs.as_slice()), &widths, padding))
            .collect();
        let header_height = header.as_ref().map_or(0.0, |h| h.height);

        let total = header_height + rows.iter().map(|r| r.height).sum::<f32>();
        self.apply_break_policy(table.hints.page_break, |_| total);

        // Never leave a header alone at the bottom of a page.
        let lead = header_height + rows.first().map_or(0.0, |r| r.height);
        if !self.fits(lead) && lead <= self.area.height + EPSILON {
            self.break_page();
        }

        if let Some(header) = &header {
            self.draw_row(table, header, &widths, None, true);
        }

        for (index, row) in rows.iter().enumerate() {
            if !self.fits(row.height) && !self.at_top() {
                self.new_page();
                if table.hints.repeat_header
                    && let Some(header) = &header
                {
                    self.draw_row(table, header, &widths, None, true);
                }
            }
            if !self.fits(row.height) {
                warn!(
                    "Table row {} is {:.1}pt tall, more than the {:.1}pt left on page {}; it will overflow",
                    index,
                    row.height,
                    self.remaining(),
                    self.pages.len()
                );
            }
            self.draw_row(table, row, &widths, Some(index), false);
        }
    }

    fn draw_row(&mut self, table: &Table, row: &LaidRow, widths: &[f32], body_index: Option<usize>, header: bool) {
        let style = &table.style;
        let top = self.top();
        let row_width: f32 = widths.iter().sum();

        let fill = if header {
            style.header_fill
        } else {
            body_index.and_then(|i| style.stripes.get(i % style.stripes.len().max(1)).copied())
        };
        if let Some(fill) = fill {
            self.push(PositionedElement::Rect {
                rect: Rect::new(self.area.x, top, row_width, row.height),
                fill: Some(fill),
                stroke: None,
            });
        }

        let mut x = self.area.x;
        for ((lines, width), column) in row.cells.iter().zip(widths).zip(&table.columns) {
            let inner = width - 2.0 * style.cell_padding;
            let mut y = top + style.cell_padding;
            for line in lines {
                if !line.segments.is_empty() {
                    self.push(PositionedElement::Text(TextElement {
                        x: x + style.cell_padding + align_offset(column.align, inner, line.width),
                        baseline: y + line.baseline(),
                        segments: line.segments.clone(),
                    }));
                }
                y += line.height();
            }
            if let Some(grid) = style.grid {
                self.push(PositionedElement::Rect {
                    rect: Rect::new(x, top, *width, row.height),
                    fill: None,
                    stroke: Some((grid.width, grid.color)),
                });
            }
            x += width;
        }

        self.cursor += row.height;
    }
}

fn align_offset(align: TextAlign, available: f32, used: f32) -> f32 {
    match align {
        TextAlign::Left => 0.0,
        TextAlign::Center => ((available - used) / 2.0).max(0.0),
        TextAlign::Right => (available - used).max(0.0),
    }
}
