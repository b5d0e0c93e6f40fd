//! Fixed-size bitmap glyphs.
//!
//! A glyph is stored the way it lands on the canvas: rows of packed bytes,
//! eight pixels per byte with the most significant bit on the left. The
//! width of a glyph is therefore counted in byte columns.

use std::collections::HashMap;

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glyph {
    width: usize,
    rows: Vec<Vec<u8>>,
}

impl Glyph {
    /// Build a glyph from rows of packed bytes.
    ///
    /// Every row must have the same, non-zero length.
    pub fn from_packed(rows: Vec<Vec<u8>>) -> Result<Self, ValidationError> {
        let width = match rows.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Err(ValidationError::InvalidInput("empty glyph".to_string())),
        };
        if let Some(i) = rows.iter().position(|row| row.len() != width) {
            return Err(ValidationError::InvalidInput(format!(
                "glyph row {} has {} bytes, expected {}",
                i,
                rows[i].len(),
                width
            )));
        }
        Ok(Glyph { width, rows })
    }

    /// Build a glyph from a matrix of 0/1 pixel values.
    ///
    /// Each row is packed MSB first; a row whose length is not a multiple of
    /// eight is padded with blank pixels on the right.
    pub fn from_bits<R: AsRef<[u8]>>(bits: &[R]) -> Result<Self, ValidationError> {
        let rows = bits
            .iter()
            .map(|row| {
                let row = row.as_ref();
                if let Some(v) = row.iter().find(|v| **v > 1) {
                    return Err(ValidationError::InvalidInput(format!(
                        "glyph pixel value {} is not 0 or 1",
                        v
                    )));
                }
                Ok(pack_bits(row))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_packed(rows)
    }

    /// Width in byte columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in rows.
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.rows
    }
}

/// Pack 0/1 pixels MSB first, zero-padding the last byte.
pub(crate) fn pack_bits(bits: &[u8]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, bit)| byte | ((bit & 1) << (7 - i)))
        })
        .collect()
}

/// Lookup table from character to glyph.
///
/// The table is supplied by the caller; this crate ships no font.
#[derive(Debug, Clone, Default)]
pub struct GlyphTable {
    glyphs: HashMap<char, Glyph>,
}

impl GlyphTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ch: char, glyph: Glyph) -> Option<Glyph> {
        self.glyphs.insert(ch, glyph)
    }

    pub fn with(mut self, ch: char, glyph: Glyph) -> Self {
        self.glyphs.insert(ch, glyph);
        self
    }

    pub fn get(&self, ch: char) -> Result<&Glyph, ValidationError> {
        self.glyphs
            .get(&ch)
            .ok_or(ValidationError::UnknownGlyph(ch))
    }

    pub fn contains(&self, ch: char) -> bool {
        self.glyphs.contains_key(&ch)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

impl FromIterator<(char, Glyph)> for GlyphTable {
    fn from_iter<I: IntoIterator<Item = (char, Glyph)>>(iter: I) -> Self {
        GlyphTable {
            glyphs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_bits_msb_first() {
        assert_eq!(pack_bits(&[1, 0, 0, 0, 0, 0, 0, 1]), vec![0x81]);
        assert_eq!(pack_bits(&[1, 1, 1]), vec![0xE0]);
        assert_eq!(pack_bits(&[0, 0, 0, 0, 0, 0, 0, 0, 1]), vec![0x00, 0x80]);
    }

    #[test]
    fn glyph_from_bits_measures_width_in_bytes() {
        let glyph = Glyph::from_bits(&[[1u8; 10], [0u8; 10]]).unwrap();
        assert_eq!(glyph.width(), 2);
        assert_eq!(glyph.height(), 2);
        assert_eq!(glyph.rows()[0], vec![0xFF, 0xC0]);
    }

    #[test]
    fn ragged_glyph_is_rejected() {
        let err = Glyph::from_packed(vec![vec![0xFF], vec![0xFF, 0x00]]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidInput(_)));
    }

    #[test]
    fn non_binary_pixel_is_rejected() {
        let err = Glyph::from_bits(&[[0u8, 2]]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidInput(_)));
    }

    #[test]
    fn missing_glyph_is_reported() {
        let table = GlyphTable::new();
        assert_eq!(table.get('x'), Err(ValidationError::UnknownGlyph('x')));
    }
}
