//! Character resolution, measuring, and greedy line breaking.

use crate::fonts::{FontId, FontLibrary};
use quire_model::{Color, TextRun};

/// Drawn in place of characters no face in the chain can render.
pub const PLACEHOLDER_CHAR: char = '?';

pub(crate) const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// A horizontal run of glyphs sharing one font, size and color.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub font: FontId,
    pub size: f32,
    pub color: Color,
    /// WinAnsi bytes as written into the content stream.
    pub bytes: Vec<u8>,
    /// The characters actually drawn (placeholders included).
    pub text: String,
    pub width: f32,
}

#[derive(Debug, Clone, Copy)]
struct Glyph {
    font: FontId,
    code: u8,
    drawn: char,
    run: usize,
    width: f32,
    space: bool,
    newline: bool,
}

/// One laid-out line of a paragraph or table cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub segments: Vec<Segment>,
    pub width: f32,
    /// Largest font size on the line.
    pub size: f32,
}

impl Line {
    pub fn height(&self) -> f32 {
        self.size * LINE_HEIGHT_FACTOR
    }

    /// Distance from the line top to its baseline.
    pub fn baseline(&self) -> f32 {
        self.size * 0.9
    }

    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }
}

/// Result of breaking a run list into lines.
#[derive(Debug, Clone, Default)]
pub struct Wrapped {
    pub lines: Vec<Line>,
    /// Number of characters replaced by [`PLACEHOLDER_CHAR`].
    pub placeholders: usize,
}

impl Wrapped {
    pub fn height(&self) -> f32 {
        self.lines.iter().map(Line::height).sum()
    }
}

fn resolve(fonts: &FontLibrary, runs: &[TextRun]) -> (Vec<Glyph>, usize) {
    let mut glyphs = Vec::new();
    let mut placeholders = 0;
    for (run_index, run) in runs.iter().enumerate() {
        let chain = fonts.chain(&run.style.font);
        for ch in run.text.chars() {
            let ch = if ch == '\t' { ' ' } else { ch };
            if ch == '\n' {
                glyphs.push(Glyph {
                    font: chain[0],
                    code: 0,
                    drawn: '\n',
                    run: run_index,
                    width: 0.0,
                    space: false,
                    newline: true,
                });
                continue;
            }
            if ch.is_control() {
                continue;
            }
            let resolved = fonts.resolve_char(ch, &chain);
            if resolved.placeholder {
                placeholders += 1;
            }
            glyphs.push(Glyph {
                font: resolved.font,
                code: resolved.code,
                drawn: if resolved.placeholder { PLACEHOLDER_CHAR } else { ch },
                run: run_index,
                width: fonts.face(resolved.font).width(resolved.code) as f32 * run.style.font.size / 1000.0,
                space: ch == ' ',
                newline: false,
            });
        }
    }
    (glyphs, placeholders)
}

fn build_line(glyphs: &[Glyph], runs: &[TextRun], fallback_size: f32) -> Line {
    // Trailing spaces do not count towards alignment.
    let end = glyphs.iter().rposition(|g| !g.space).map_or(0, |i| i + 1);
    let glyphs = &glyphs[..end];

    let mut segments: Vec<Segment> = Vec::new();
    for glyph in glyphs {
        let style = &runs[glyph.run].style;
        match segments.last_mut() {
            Some(last)
                if last.font == glyph.font && last.size == style.font.size && last.color == style.color =>
            {
                last.bytes.push(glyph.code);
                last.text.push(glyph.drawn);
                last.width += glyph.width;
            }
            _ => segments.push(Segment {
                font: glyph.font,
                size: style.font.size,
                color: style.color,
                bytes: vec![glyph.code],
                text: glyph.drawn.to_string(),
                width: glyph.width,
            }),
        }
    }

    let width = segments.iter().map(|s| s.width).sum();
    let size = glyphs
        .iter()
        .map(|g| runs[g.run].style.font.size)
        .fold(0.0_f32, f32::max);
    Line { segments, width, size: if size > 0.0 { size } else { fallback_size } }
}

/// Breaks `runs` into lines no wider than `max_width`.
///
/// Breaks happen after spaces; a word wider than the line is split between
/// characters. `\n` forces a break. The result always has at least one line,
/// so an empty paragraph still occupies vertical space.
pub fn wrap(fonts: &FontLibrary, runs: &[TextRun], max_width: f32) -> Wrapped {
    let fallback_size = runs.first().map(|r| r.style.font.size).unwrap_or(10.0);
    let (glyphs, placeholders) = resolve(fonts, runs);
    let max_width = max_width.max(1.0);

    let mut lines = Vec::new();
    let mut start = 0;
    let mut width = 0.0;
    // Index just past the most recent space on the current line.
    let mut last_break: Option<usize> = None;
    let mut i = 0;

    while i < glyphs.len() {
        let glyph = glyphs[i];
        if glyph.newline {
            lines.push(build_line(&glyphs[start..i], runs, fallback_size));
            start = i + 1;
            width = 0.0;
            last_break = None;
            i += 1;
            continue;
        }
        // Spaces at the start of a wrapped line are dropped.
        if glyph.space && i == start && !lines.is_empty() && !glyphs[i - 1].newline {
            start = i + 1;
            i += 1;
            continue;
        }

        if width + glyph.width > max_width && i > start && !glyph.space {
            let cut = match last_break {
                Some(b) if b > start => b,
                _ => i,
            };
            lines.push(build_line(&glyphs[start..cut], runs, fallback_size));
            start = cut;
            while start < glyphs.len() && glyphs[start].space {
                start += 1;
            }
            width = glyphs[start..i].iter().map(|g| g.width).sum();
            last_break = None;
            if start > i {
                i = start;
                continue;
            }
        }

        width += glyph.width;
        if glyph.space {
            last_break = Some(i + 1);
        }
        i += 1;
    }

    if start < glyphs.len() || lines.is_empty() || glyphs.last().is_some_and(|g| g.newline) {
        lines.push(build_line(&glyphs[start.min(glyphs.len())..], runs, fallback_size));
    }

    Wrapped { lines, placeholders }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_model::{FontSpec, TextStyle};

    fn style(size: f32) -> TextStyle {
        TextStyle { font: FontSpec::new("Helvetica", size), color: Color::BLACK }
    }

    fn texts(wrapped: &Wrapped) -> Vec<String> {
        wrapped.lines.iter().map(Line::text).collect()
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let fonts = FontLibrary::new();
        let wrapped = wrap(&fonts, &[TextRun::new("Cedar post", style(10.0))], 500.0);
        assert_eq!(texts(&wrapped), vec!["Cedar post"]);
        assert_eq!(wrapped.lines[0].height(), 12.0);
    }

    #[test]
    fn wraps_at_spaces() {
        let fonts = FontLibrary::new();
        // "aaaa" at 10pt is 22.24pt wide; two words fit in 50pt, three do not.
        let wrapped = wrap(&fonts, &[TextRun::new("aaaa aaaa aaaa", style(10.0))], 50.0);
        assert_eq!(texts(&wrapped), vec!["aaaa aaaa", "aaaa"]);
    }

    #[test]
    fn overlong_words_break_between_characters() {
        let fonts = FontLibrary::new();
        let wrapped = wrap(&fonts, &[TextRun::new("aaaaaaaaaa", style(10.0))], 20.0);
        // 5.56pt per 'a' at 10pt: three per 20pt line.
        assert_eq!(texts(&wrapped), vec!["aaa", "aaa", "aaa", "a"]);
    }

    #[test]
    fn newlines_force_breaks_and_empty_text_keeps_a_line() {
        let fonts = FontLibrary::new();
        let wrapped = wrap(&fonts, &[TextRun::new("one\ntwo", style(10.0))], 500.0);
        assert_eq!(texts(&wrapped), vec!["one", "two"]);

        let empty = wrap(&fonts, &[], 500.0);
        assert_eq!(empty.lines.len(), 1);
        assert_eq!(empty.height(), 12.0);
    }

    #[test]
    fn runs_with_different_styles_become_segments() {
        let fonts = FontLibrary::new();
        let mut bold = style(10.0);
        bold.font = bold.font.bold();
        let runs = [TextRun::new("Project: ", bold), TextRun::new("Backyard", style(12.0))];
        let wrapped = wrap(&fonts, &runs, 500.0);
        let line = &wrapped.lines[0];
        assert_eq!(line.segments.len(), 2);
        assert_eq!(line.segments[0].font, FontId(1));
        assert_eq!(line.segments[1].font, FontId(0));
        assert_eq!(line.size, 12.0);
        assert_eq!(line.text(), "Project: Backyard");
    }

    #[test]
    fn unknown_glyphs_are_counted_and_replaced() {
        let fonts = FontLibrary::new();
        let wrapped = wrap(&fonts, &[TextRun::new("Hello 世界", style(10.0))], 500.0);
        assert_eq!(wrapped.placeholders, 2);
        assert_eq!(texts(&wrapped), vec!["Hello ??"]);
        assert_eq!(wrapped.lines[0].segments[0].bytes, b"Hello ??".to_vec());
    }
}
