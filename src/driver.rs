//! One-shot printing: encode a job, open the printer, print, close.

use log::info;

use crate::{
    canvas::Canvas,
    dither::{dither_to_canvas, DitherOptions, Raster},
    error::{Error, ValidationError},
    glyph::GlyphTable,
    protocol::{self, Mission},
    session::{Session, SessionConfig},
    transport,
};

/// Something to print.
#[derive(Debug, Clone, Copy)]
pub enum Job<'a> {
    /// Text laid out with the caller's glyph table on a canvas sized to fit.
    Text(&'a str),
    /// A grayscale image at most 384 dots wide, dithered to 1 bit.
    Image {
        raster: Raster<'a>,
        options: DitherOptions,
    },
}

impl<'a> Job<'a> {
    pub fn canvas(&self, glyphs: &GlyphTable) -> Result<Canvas, ValidationError> {
        match self {
            Job::Text(text) => Canvas::with_text(glyphs, text),
            Job::Image { raster, options } => dither_to_canvas(raster, options),
        }
    }

    /// Encode the job. Nothing is sent.
    pub fn encode(&self, glyphs: &GlyphTable) -> Result<Mission, ValidationError> {
        let canvas = self.canvas(glyphs)?;
        Ok(protocol::encode(&canvas))
    }
}

/// Print `job` on the printer at `identifier` and wait for it to finish.
///
/// The job is encoded before the printer is opened, so
/// [`Error::is_rejected_before_send`] tells an invalid job apart from a
/// printer that did not confirm.
pub fn print_job(
    identifier: &str,
    job: &Job<'_>,
    glyphs: &GlyphTable,
    config: SessionConfig,
) -> Result<(), Error> {
    let mission = job.encode(glyphs)?;
    info!("printing {} byte mission on {}", mission.len(), identifier);

    let transport = transport::open(identifier)?;
    let mut session = Session::new(transport, config);
    let ticket = session.submit(mission);
    session.run_until_idle()?;
    ticket.wait()
}
