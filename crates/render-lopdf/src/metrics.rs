//! Advance widths of the built-in Helvetica faces, in 1/1000 em.
//!
//! Printable ASCII comes from the Adobe core font metrics. The upper half of
//! WinAnsi uses the widths of common punctuation and a 556 default elsewhere,
//! which matches most accented Latin letters closely enough for line breaking.

const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :;<=>?@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // A-M
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // N-Z
    278, 278, 278, 469, 556, 333, // [\]^_`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // a-m
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // n-z
    334, 260, 334, 584, // {|}~
];

const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

fn upper_half(code: u8, bold: bool) -> u16 {
    match code {
        0x85 | 0x89 | 0x97 | 0x8C | 0x9C => 1000,
        0x91 | 0x92 | 0x82 => {
            if bold {
                278
            } else {
                222
            }
        }
        0x93 | 0x94 | 0x84 => {
            if bold {
                500
            } else {
                333
            }
        }
        0x95 => 350,
        0x99 => 1000,
        0x8B | 0x9B => 333,
        0xA0 => 278,
        0xA9 | 0xAE => 737,
        0xB0 => 400,
        0xB7 => 278,
        0xD7 => 584,
        0xF7 => 584,
        _ => 556,
    }
}

/// Width of WinAnsi `code` in the regular or bold Helvetica face.
///
/// Oblique faces share the upright widths.
pub(crate) fn helvetica_width(code: u8, bold: bool) -> u16 {
    match code {
        0x20..=0x7E => {
            let table = if bold { &HELVETICA_BOLD_ASCII } else { &HELVETICA_ASCII };
            table[(code - 0x20) as usize]
        }
        _ => upper_half(code, bold),
    }
}
