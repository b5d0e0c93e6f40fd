//! Monochrome canvas with cursor based text layout.
//!
//! The canvas is exactly as wide as the print head: 384 dots, stored as 48
//! packed bytes per row with the most significant bit on the left and `1`
//! meaning ink. Rows 0-3 are reserved and are never drawn into by the text
//! layout or by direct pixel writes.

use log::debug;

use crate::{
    error::ValidationError,
    glyph::{Glyph, GlyphTable},
};

/// Print head width in dots.
pub const WIDTH_DOTS: usize = 384;

/// Bytes per canvas row (384 / 8).
pub const ROW_BYTES: usize = WIDTH_DOTS / 8;

/// Rows at the top of every canvas that drawing may not touch.
pub const RESERVED_ROWS: usize = 4;

/// Rows the cursor moves down on a line break.
pub const LINE_HEIGHT: usize = 23;

/// Largest height the 16-bit row index of a row frame can address.
pub const MAX_HEIGHT: usize = u16::MAX as usize;

/// One packed canvas row.
pub type Row = [u8; ROW_BYTES];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub row: usize,
    /// Column in bytes, not dots.
    pub col: usize,
}

impl Cursor {
    const START: Cursor = Cursor {
        row: RESERVED_ROWS,
        col: 0,
    };

    fn newline(&mut self) {
        self.row += LINE_HEIGHT;
        self.col = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canvas {
    rows: Vec<Row>,
    cursor: Cursor,
}

impl Canvas {
    /// Allocate a blank canvas of `height` rows.
    pub fn new(height: usize) -> Result<Self, ValidationError> {
        check_height(height)?;
        Ok(Canvas {
            rows: vec![[0u8; ROW_BYTES]; height],
            cursor: Cursor::START,
        })
    }

    /// Allocate a canvas just tall enough for `text`, then draw it.
    pub fn with_text(glyphs: &GlyphTable, text: &str) -> Result<Self, ValidationError> {
        let height = compute_required_height(glyphs, text)?;
        let mut canvas = Self::new(height)?;
        canvas.draw_string(glyphs, text)?;
        Ok(canvas)
    }

    /// Wrap pre-packed rows, e.g. the output of the dither encoder.
    ///
    /// The rows are taken as they are, reserved region included.
    pub fn from_rows(rows: Vec<Row>) -> Result<Self, ValidationError> {
        check_height(rows.len())?;
        Ok(Canvas {
            rows,
            cursor: Cursor::START,
        })
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Blank every pixel and move the cursor back to the start.
    pub fn clear(&mut self) {
        for row in self.rows.iter_mut() {
            *row = [0u8; ROW_BYTES];
        }
        self.cursor = Cursor::START;
    }

    /// Move the cursor to the start of the next text line.
    pub fn newline(&mut self) -> Result<(), ValidationError> {
        let mut cursor = self.cursor;
        cursor.newline();
        if cursor.row >= self.height() {
            return Err(ValidationError::ContentTooLong {
                height: self.height(),
            });
        }
        self.cursor = cursor;
        Ok(())
    }

    /// Draw a single character with its top-left corner at `(row, col)`.
    ///
    /// `ch` must hold exactly one character. The cursor does not move.
    pub fn draw_char(
        &mut self,
        glyphs: &GlyphTable,
        ch: &str,
        row: usize,
        col: usize,
    ) -> Result<(), ValidationError> {
        let mut chars = ch.chars();
        let ch = match (chars.next(), chars.next()) {
            (Some(ch), None) => ch,
            _ => {
                return Err(ValidationError::InvalidInput(format!(
                    "expected exactly one character, got {:?}",
                    ch
                )))
            }
        };
        if row < RESERVED_ROWS {
            return Err(ValidationError::ReservedRegion(row));
        }
        let glyph = glyphs.get(ch)?;
        if col + glyph.width() > ROW_BYTES {
            return Err(ValidationError::InvalidInput(format!(
                "glyph {:?} at column {} overflows the {} byte row",
                ch, col, ROW_BYTES
            )));
        }
        if row + glyph.height() > self.height() {
            return Err(ValidationError::ContentTooLong {
                height: self.height(),
            });
        }
        self.blit(glyph, row, col);
        Ok(())
    }

    /// Lay `text` out from the cursor, wrapping at the right edge.
    ///
    /// The whole string is laid out before anything is drawn, so a failure
    /// leaves the canvas untouched.
    pub fn draw_string(&mut self, glyphs: &GlyphTable, text: &str) -> Result<(), ValidationError> {
        let layout = layout(glyphs, text, self.cursor, self.height())?;
        for placement in layout.placements.iter() {
            self.blit(placement.glyph, placement.row, placement.col);
        }
        debug!(
            "drew {} glyphs, cursor {:?} -> {:?}",
            layout.placements.len(),
            self.cursor,
            layout.cursor
        );
        self.cursor = layout.cursor;
        Ok(())
    }

    /// Set or clear the pixel at dot `x` of row `y`.
    pub fn set_pixel(&mut self, x: usize, y: usize, ink: bool) -> Result<(), ValidationError> {
        if y < RESERVED_ROWS {
            return Err(ValidationError::ReservedRegion(y));
        }
        if x >= WIDTH_DOTS || y >= self.height() {
            return Err(ValidationError::InvalidInput(format!(
                "pixel ({}, {}) is outside the {}x{} canvas",
                x,
                y,
                WIDTH_DOTS,
                self.height()
            )));
        }
        let mask = 0x80 >> (x % 8);
        let byte = &mut self.rows[y][x / 8];
        if ink {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
        Ok(())
    }

    /// `true` if the pixel at dot `x` of row `y` is inked.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        match self.rows.get(y) {
            Some(row) if x < WIDTH_DOTS => row[x / 8] & (0x80 >> (x % 8)) != 0,
            _ => false,
        }
    }

    fn blit(&mut self, glyph: &Glyph, row: usize, col: usize) {
        for (i, line) in glyph.rows().iter().enumerate() {
            self.rows[row + i][col..col + line.len()].copy_from_slice(line);
        }
    }
}

/// Height a fresh canvas needs to hold `text`.
///
/// Runs the same layout as [`Canvas::draw_string`] from the start cursor
/// without allocating a canvas.
pub fn compute_required_height(glyphs: &GlyphTable, text: &str) -> Result<usize, ValidationError> {
    let layout = layout(glyphs, text, Cursor::START, usize::MAX)?;
    let bottom = layout
        .placements
        .iter()
        .map(|p| p.row + p.glyph.height())
        .max()
        .unwrap_or(0);
    let height = bottom.max(layout.cursor.row + LINE_HEIGHT);
    if height > MAX_HEIGHT {
        return Err(ValidationError::ContentTooLong { height: MAX_HEIGHT });
    }
    Ok(height)
}

fn check_height(height: usize) -> Result<(), ValidationError> {
    if height == 0 || height > MAX_HEIGHT {
        return Err(ValidationError::InvalidHeight(height));
    }
    Ok(())
}

struct Placement<'g> {
    glyph: &'g Glyph,
    row: usize,
    col: usize,
}

struct Layout<'g> {
    placements: Vec<Placement<'g>>,
    cursor: Cursor,
}

fn layout<'g>(
    glyphs: &'g GlyphTable,
    text: &str,
    start: Cursor,
    height: usize,
) -> Result<Layout<'g>, ValidationError> {
    let mut cursor = start;
    let mut placements = Vec::new();
    let too_long = || ValidationError::ContentTooLong { height };

    for ch in text.chars() {
        if ch == '\n' {
            cursor.newline();
            if cursor.row >= height {
                return Err(too_long());
            }
            continue;
        }

        let glyph = glyphs.get(ch)?;
        if glyph.width() > ROW_BYTES {
            return Err(ValidationError::InvalidInput(format!(
                "glyph {:?} is wider than a row",
                ch
            )));
        }
        if cursor.col + glyph.width() > ROW_BYTES {
            cursor.newline();
            if cursor.row >= height {
                return Err(too_long());
            }
        }
        if cursor.row + glyph.height() > height {
            return Err(too_long());
        }

        placements.push(Placement {
            glyph,
            row: cursor.row,
            col: cursor.col,
        });
        cursor.col += glyph.width();
    }

    Ok(Layout { placements, cursor })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(width: usize, height: usize) -> Glyph {
        Glyph::from_packed(vec![vec![0xFF; width]; height]).unwrap()
    }

    fn table() -> GlyphTable {
        GlyphTable::new()
            .with('a', block(2, 16))
            .with('w', block(30, 20))
    }

    #[test]
    fn rejects_out_of_range_heights() {
        assert_eq!(Canvas::new(0), Err(ValidationError::InvalidHeight(0)));
        assert_eq!(
            Canvas::new(65_536),
            Err(ValidationError::InvalidHeight(65_536))
        );
        assert_eq!(Canvas::new(65_535).unwrap().height(), 65_535);
        assert_eq!(Canvas::new(1).unwrap().height(), 1);
    }

    #[test]
    fn every_row_is_48_bytes() {
        let canvas = Canvas::new(7).unwrap();
        assert!(canvas.rows().iter().all(|row| row.len() == 48));
    }

    #[test]
    fn empty_string_changes_nothing() {
        let mut canvas = Canvas::new(64).unwrap();
        let before = canvas.clone();
        canvas.draw_string(&table(), "").unwrap();
        assert_eq!(canvas, before);
        assert_eq!(canvas.cursor(), Cursor { row: 4, col: 0 });
    }

    #[test]
    fn wide_glyphs_wrap_to_next_line() {
        let mut canvas = Canvas::new(64).unwrap();
        canvas.draw_string(&table(), "ww").unwrap();

        // first glyph at (4, 0), second wrapped to (27, 0)
        assert_eq!(canvas.rows()[4][0], 0xFF);
        assert_eq!(canvas.rows()[4][30], 0x00);
        assert_eq!(canvas.rows()[4 + LINE_HEIGHT][0], 0xFF);
        assert_eq!(canvas.rows()[4 + LINE_HEIGHT][29], 0xFF);
        assert_eq!(canvas.rows()[4 + LINE_HEIGHT][30], 0x00);
        assert_eq!(
            canvas.cursor(),
            Cursor {
                row: 4 + LINE_HEIGHT,
                col: 30
            }
        );
    }

    #[test]
    fn newline_advances_without_drawing() {
        let mut canvas = Canvas::new(64).unwrap();
        canvas.draw_string(&table(), "a\na").unwrap();
        assert_eq!(canvas.rows()[4][0..2], [0xFF, 0xFF]);
        assert_eq!(canvas.rows()[27][0..2], [0xFF, 0xFF]);
        assert_eq!(canvas.cursor(), Cursor { row: 27, col: 2 });
    }

    #[test]
    fn reserved_rows_are_rejected() {
        let mut canvas = Canvas::new(64).unwrap();
        assert_eq!(
            canvas.draw_char(&table(), "a", 2, 0),
            Err(ValidationError::ReservedRegion(2))
        );
        assert_eq!(
            canvas.set_pixel(0, 3, true),
            Err(ValidationError::ReservedRegion(3))
        );
    }

    #[test]
    fn draw_char_takes_exactly_one_character() {
        let mut canvas = Canvas::new(64).unwrap();
        assert!(matches!(
            canvas.draw_char(&table(), "aa", 4, 0),
            Err(ValidationError::InvalidInput(_))
        ));
        assert!(matches!(
            canvas.draw_char(&table(), "", 4, 0),
            Err(ValidationError::InvalidInput(_))
        ));
        assert_eq!(
            canvas.draw_char(&table(), "z", 4, 0),
            Err(ValidationError::UnknownGlyph('z'))
        );
        canvas.draw_char(&table(), "a", 10, 46).unwrap();
        assert_eq!(canvas.rows()[10][46..], [0xFF, 0xFF]);
        assert_eq!(canvas.cursor(), Cursor { row: 4, col: 0 });
    }

    #[test]
    fn overflowing_text_fails_without_drawing() {
        let mut canvas = Canvas::new(30).unwrap();
        let before = canvas.clone();
        assert_eq!(
            canvas.draw_string(&table(), "ww"),
            Err(ValidationError::ContentTooLong { height: 30 })
        );
        assert_eq!(canvas, before);
    }

    #[test]
    fn required_height_fits_the_text() {
        let glyphs = table();
        assert_eq!(compute_required_height(&glyphs, "").unwrap(), 4 + LINE_HEIGHT);
        let height = compute_required_height(&glyphs, "ww").unwrap();
        assert_eq!(height, 4 + 2 * LINE_HEIGHT);

        let canvas = Canvas::with_text(&glyphs, "ww").unwrap();
        assert_eq!(canvas.height(), height);
    }

    #[test]
    fn pixels_are_msb_first() {
        let mut canvas = Canvas::new(8).unwrap();
        canvas.set_pixel(0, 4, true).unwrap();
        canvas.set_pixel(9, 4, true).unwrap();
        assert_eq!(canvas.rows()[4][0], 0x80);
        assert_eq!(canvas.rows()[4][1], 0x40);
        assert!(canvas.pixel(9, 4));
        canvas.set_pixel(9, 4, false).unwrap();
        assert!(!canvas.pixel(9, 4));
        assert!(canvas.set_pixel(384, 4, true).is_err());
    }

    #[test]
    fn clear_resets_pixels_and_cursor() {
        let mut canvas = Canvas::new(64).unwrap();
        canvas.draw_string(&table(), "aa").unwrap();
        canvas.clear();
        assert_eq!(canvas, Canvas::new(64).unwrap());
    }
}
