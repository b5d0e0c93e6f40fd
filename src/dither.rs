//! Grayscale to 1-bit conversion.
//!
//! Photos are converted with Floyd-Steinberg error diffusion in a single
//! raster-order pass. Samples brighter than the threshold become background,
//! everything else becomes ink. Rotating and scaling the picture to the print
//! width is left to the caller.

use log::debug;

use crate::{
    canvas::{Canvas, Row, ROW_BYTES, WIDTH_DOTS},
    error::ValidationError,
    Matrix,
};

/// Default quantisation threshold. A sample of exactly 127 prints as ink.
pub const DEFAULT_THRESHOLD: u8 = 127;

/// Borrowed 8-bit grayscale image, row-major, one byte per pixel.
#[derive(Debug, Clone, Copy)]
pub struct Raster<'a> {
    width: usize,
    height: usize,
    samples: &'a [u8],
}

impl<'a> Raster<'a> {
    pub fn new(width: usize, height: usize, samples: &'a [u8]) -> Result<Self, ValidationError> {
        if width == 0 || height == 0 {
            return Err(ValidationError::InvalidInput(format!(
                "raster must not be empty, got {}x{}",
                width, height
            )));
        }
        if samples.len() != width * height {
            return Err(ValidationError::InvalidInput(format!(
                "raster data has {} samples, expected {}x{}",
                samples.len(),
                width,
                height
            )));
        }
        Ok(Raster {
            width,
            height,
            samples,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DitherOptions {
    threshold: u8,
    diffusion: bool,
    padding_rows: usize,
}

impl Default for DitherOptions {
    fn default() -> Self {
        DitherOptions {
            threshold: DEFAULT_THRESHOLD,
            diffusion: true,
            padding_rows: 0,
        }
    }
}

impl DitherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples strictly above `threshold` are background.
    pub fn threshold(self, threshold: u8) -> Self {
        DitherOptions { threshold, ..self }
    }

    /// Disable to get plain thresholding.
    pub fn diffusion(self, diffusion: bool) -> Self {
        DitherOptions { diffusion, ..self }
    }

    /// Blank rows appended below the image. They take no diffused error.
    pub fn padding_rows(self, padding_rows: usize) -> Self {
        DitherOptions {
            padding_rows,
            ..self
        }
    }
}

/// Convert `raster` to packed 1-bit rows of `ceil(width / 8)` bytes.
pub fn dither(raster: &Raster<'_>, options: &DitherOptions) -> Matrix {
    let (w, h) = (raster.width, raster.height);
    let threshold = options.threshold as f32;
    let mut work: Vec<f32> = raster.samples.iter().map(|s| *s as f32).collect();
    let row_len = (w + 7) / 8;
    let mut rows: Matrix = Vec::with_capacity(h + options.padding_rows);

    for y in 0..h {
        let mut row = vec![0u8; row_len];
        for x in 0..w {
            let old = work[y * w + x];
            let ink = old <= threshold;
            if ink {
                row[x / 8] |= 0x80 >> (x % 8);
            }

            if !options.diffusion {
                continue;
            }
            let err = old - if ink { 0.0 } else { 255.0 };
            if x + 1 < w {
                work[y * w + x + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < h {
                let next = (y + 1) * w;
                if x > 0 {
                    work[next + x - 1] += err * 3.0 / 16.0;
                }
                work[next + x] += err * 5.0 / 16.0;
                if x + 1 < w {
                    work[next + x + 1] += err * 1.0 / 16.0;
                }
            }
        }
        rows.push(row);
    }
    rows.resize(h + options.padding_rows, vec![0u8; row_len]);

    debug!(
        "dithered {}x{} raster into {} rows of {} bytes",
        w,
        h,
        rows.len(),
        row_len
    );
    rows
}

/// Dither `raster` straight into a full-width canvas.
///
/// The image is placed against the left edge starting at row 0; narrower
/// images are padded with blank bytes on the right.
pub fn dither_to_canvas(
    raster: &Raster<'_>,
    options: &DitherOptions,
) -> Result<Canvas, ValidationError> {
    if raster.width > WIDTH_DOTS {
        return Err(ValidationError::InvalidInput(format!(
            "raster is {} dots wide, the print head has {}",
            raster.width, WIDTH_DOTS
        )));
    }
    let rows = dither(raster, options)
        .into_iter()
        .map(|packed| {
            let mut row: Row = [0u8; ROW_BYTES];
            row[..packed.len()].copy_from_slice(&packed);
            row
        })
        .collect();
    Canvas::from_rows(rows)
}
