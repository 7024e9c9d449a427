//! Read-only font library and the per-character fallback chain.
//!
//! Every library starts with the four Helvetica standard faces, which PDF
//! viewers must provide, so a fallback always exists. Provisioned TrueType
//! and OpenType faces are added on top and embedded when used.
//!
//! Each character is looked up along a chain: the requested face, then the
//! regular face of the requested family, then the Helvetica face matching the
//! requested weight and slant. Characters that WinAnsi cannot encode, or that
//! no face in the chain covers, become a placeholder in the fallback face.

use crate::error::RenderError;
use crate::metrics;
use crate::winansi;
use log::{debug, info, warn};
use quire_model::FontSpec;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
    HelveticaBoldOblique,
}

impl StandardFont {
    pub fn for_style(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => StandardFont::Helvetica,
            (true, false) => StandardFont::HelveticaBold,
            (false, true) => StandardFont::HelveticaOblique,
            (true, true) => StandardFont::HelveticaBoldOblique,
        }
    }

    pub fn base_font(self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
            StandardFont::HelveticaBoldOblique => "Helvetica-BoldOblique",
        }
    }

    fn is_bold(self) -> bool {
        matches!(self, StandardFont::HelveticaBold | StandardFont::HelveticaBoldOblique)
    }

    fn is_italic(self) -> bool {
        matches!(self, StandardFont::HelveticaOblique | StandardFont::HelveticaBoldOblique)
    }
}

/// Font program and descriptor metrics of a provisioned face, in 1/1000 em.
#[derive(Debug, Clone)]
pub struct EmbeddedFace {
    pub data: Arc<Vec<u8>>,
    pub ascent: i32,
    pub descent: i32,
    pub cap_height: i32,
    pub bbox: [i32; 4],
}

#[derive(Debug, Clone)]
pub enum FaceKind {
    Standard(StandardFont),
    Embedded(EmbeddedFace),
}

#[derive(Debug, Clone)]
pub struct FontFace {
    pub id: FontId,
    pub family: String,
    pub postscript_name: String,
    pub bold: bool,
    pub italic: bool,
    pub kind: FaceKind,
    /// Advance width per WinAnsi code; `None` where the face has no glyph.
    widths: Vec<Option<u16>>,
}

impl FontFace {
    pub fn covers(&self, code: u8) -> bool {
        self.widths[code as usize].is_some()
    }

    /// Width of `code` in 1/1000 em; zero for uncovered codes.
    pub fn width(&self, code: u8) -> u16 {
        self.widths[code as usize].unwrap_or(0)
    }

    /// The name the face is registered under in page resources.
    pub fn resource_name(&self) -> String {
        format!("F{}", self.id.0 + 1)
    }

    pub(crate) fn widths_from(&self, first: u8) -> impl Iterator<Item = u16> + '_ {
        (first..=255).map(|code| self.width(code))
    }

    pub fn is_standard(&self) -> bool {
        matches!(self.kind, FaceKind::Standard(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FaceKey {
    family: String,
    bold: bool,
    italic: bool,
}

impl FaceKey {
    fn new(family: &str, bold: bool, italic: bool) -> Self {
        Self { family: family.trim().to_lowercase(), bold, italic }
    }
}

/// Where a character ends up after fallback resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedChar {
    pub font: FontId,
    pub code: u8,
    /// True when the character could not be drawn and `code` is the placeholder.
    pub placeholder: bool,
}

#[derive(Debug, Clone)]
pub struct FontLibrary {
    faces: Vec<FontFace>,
    index: BTreeMap<FaceKey, FontId>,
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl FontLibrary {
    /// A library holding only the built-in Helvetica faces.
    pub fn new() -> Self {
        let mut library = Self { faces: Vec::new(), index: BTreeMap::new() };
        for standard in [
            StandardFont::Helvetica,
            StandardFont::HelveticaBold,
            StandardFont::HelveticaOblique,
            StandardFont::HelveticaBoldOblique,
        ] {
            let widths = (0u16..=255)
                .map(|code| {
                    let code = code as u8;
                    winansi::decode(code).map(|_| metrics::helvetica_width(code, standard.is_bold()))
                })
                .collect();
            library.register(FontFace {
                id: FontId(0),
                family: "Helvetica".to_string(),
                postscript_name: standard.base_font().to_string(),
                bold: standard.is_bold(),
                italic: standard.is_italic(),
                kind: FaceKind::Standard(standard),
                widths,
            });
        }
        library
    }

    /// Built-in faces plus every usable font file under `dir`.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Result<Self, RenderError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(RenderError::Font(format!("font directory does not exist: {}", dir.display())));
        }

        let mut db = fontdb::Database::new();
        db.load_fonts_dir(dir);

        let mut faces: Vec<_> = db.faces().collect();
        // fontdb order depends on directory iteration; ids must not.
        faces.sort_by(|a, b| a.post_script_name.cmp(&b.post_script_name).then(a.index.cmp(&b.index)));

        let mut library = Self::new();
        for info in faces {
            let family = info.families.first().map(|(name, _)| name.clone());
            let Some(data) = db.with_face_data(info.id, |data, index| (data.to_vec(), index)) else {
                continue;
            };
            let (bytes, index) = data;
            if index != 0 || bytes.starts_with(b"ttcf") {
                debug!("Skipping collection face '{}'", info.post_script_name);
                continue;
            }
            let bold = info.weight.0 >= 600;
            let italic = info.style != fontdb::Style::Normal;
            match library.add_face(bytes, family, Some(info.post_script_name.clone()), Some((bold, italic))) {
                Ok(_) => {}
                Err(e) => warn!("Skipping font '{}': {}", info.post_script_name, e),
            }
        }
        info!("Font library ready: {} faces from {}", library.faces.len(), dir.display());
        Ok(library)
    }

    /// Registers a TrueType/OpenType face, reading names and style from the font itself.
    pub fn add_font_data(&mut self, data: Vec<u8>) -> Result<FontId, RenderError> {
        self.add_face(data, None, None, None)
    }

    fn add_face(
        &mut self,
        data: Vec<u8>,
        family: Option<String>,
        postscript_name: Option<String>,
        style: Option<(bool, bool)>,
    ) -> Result<FontId, RenderError> {
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| RenderError::Font(e.to_string()))?;

        let name = |id: u16| {
            face.names()
                .into_iter()
                .filter(|n| n.name_id == id)
                .find_map(|n| n.to_string())
        };
        let family = family
            .or_else(|| name(ttf_parser::name_id::FAMILY))
            .ok_or_else(|| RenderError::Font("font has no family name".into()))?;
        let postscript_name = postscript_name
            .or_else(|| name(ttf_parser::name_id::POST_SCRIPT_NAME))
            .unwrap_or_else(|| family.clone());
        let postscript_name: String = postscript_name
            .chars()
            .filter(|c| c.is_ascii_graphic() && !"[](){}<>/%#".contains(*c))
            .collect();
        let (bold, italic) = style.unwrap_or((face.is_bold(), face.is_italic()));

        let units = face.units_per_em().max(1) as f32;
        let scale = |v: f32| (v * 1000.0 / units).round() as i32;
        let widths = (0u16..=255)
            .map(|code| {
                let ch = winansi::decode(code as u8)?;
                let glyph = face.glyph_index(ch)?;
                let advance = face.glyph_hor_advance(glyph).unwrap_or(0);
                Some(scale(advance as f32).max(0) as u16)
            })
            .collect();
        let bbox = face.global_bounding_box();
        let embedded = EmbeddedFace {
            ascent: scale(face.ascender() as f32),
            descent: scale(face.descender() as f32),
            cap_height: scale(face.capital_height().unwrap_or(face.ascender()) as f32),
            bbox: [
                scale(bbox.x_min as f32),
                scale(bbox.y_min as f32),
                scale(bbox.x_max as f32),
                scale(bbox.y_max as f32),
            ],
            data: Arc::new(Vec::new()),
        };
        drop(face);

        debug!("Registered font '{}' ({}, bold={}, italic={})", postscript_name, family, bold, italic);
        Ok(self.register(FontFace {
            id: FontId(0),
            family,
            postscript_name,
            bold,
            italic,
            kind: FaceKind::Embedded(EmbeddedFace { data: Arc::new(data), ..embedded }),
            widths,
        }))
    }

    fn register(&mut self, mut face: FontFace) -> FontId {
        let id = FontId(self.faces.len());
        face.id = id;
        // First registration of a family/style wins.
        self.index
            .entry(FaceKey::new(&face.family, face.bold, face.italic))
            .or_insert(id);
        self.faces.push(face);
        id
    }

    pub fn face(&self, id: FontId) -> &FontFace {
        &self.faces[id.0]
    }

    pub fn faces(&self) -> &[FontFace] {
        &self.faces
    }

    pub fn lookup(&self, family: &str, bold: bool, italic: bool) -> Option<FontId> {
        self.index.get(&FaceKey::new(family, bold, italic)).copied()
    }

    /// The guaranteed-present face for a weight and slant.
    pub fn fallback(&self, spec: &FontSpec) -> FontId {
        let standard = StandardFont::for_style(spec.is_bold(), spec.italic);
        // Standard faces are registered first, in `for_style` order.
        FontId(match standard {
            StandardFont::Helvetica => 0,
            StandardFont::HelveticaBold => 1,
            StandardFont::HelveticaOblique => 2,
            StandardFont::HelveticaBoldOblique => 3,
        })
    }

    /// Requested face, family default, fallback; duplicates removed.
    pub fn chain(&self, spec: &FontSpec) -> Vec<FontId> {
        let mut chain = Vec::with_capacity(3);
        let candidates = [
            self.lookup(&spec.family, spec.is_bold(), spec.italic),
            self.lookup(&spec.family, false, false),
            Some(self.fallback(spec)),
        ];
        for id in candidates.into_iter().flatten() {
            if !chain.contains(&id) {
                chain.push(id);
            }
        }
        chain
    }

    /// Resolves one character against a precomputed chain.
    pub fn resolve_char(&self, ch: char, chain: &[FontId]) -> ResolvedChar {
        if let Some(code) = winansi::encode(ch) {
            for &font in chain {
                if self.face(font).covers(code) {
                    return ResolvedChar { font, code, placeholder: false };
                }
            }
        }
        // The last chain entry is always the standard fallback.
        let font = chain.last().copied().unwrap_or(FontId(0));
        ResolvedChar { font, code: b'?', placeholder: true }
    }

    /// Width in points of `text` drawn at `spec`, after fallback resolution.
    pub fn measure(&self, text: &str, spec: &FontSpec) -> f32 {
        let chain = self.chain(spec);
        text.chars()
            .map(|ch| {
                let resolved = self.resolve_char(ch, &chain);
                self.face(resolved.font).width(resolved.code) as f32 * spec.size / 1000.0
            })
            .sum()
    }
}
