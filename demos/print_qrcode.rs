use guagua::{
    dither_to_canvas, encode, transport, DitherOptions, Mission, Raster, Session, SessionConfig,
    ShutdownMode, Ticket,
};
use image::Luma;
use qrcode::QrCode;
use std::env;
//
// cargo run --example print_qrcode [count]
//
// Queues `count` QR code labels on a background session and waits for all
// of them. The port comes from GUAGUA_PORT (environment or .env).
//

fn label(counter: u16) -> Mission {
    let qrcode = QrCode::new(format!("12345-{}", counter)).unwrap();
    let code = qrcode
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .min_dimensions(200, 200)
        .max_dimensions(384, 384)
        .build();
    let (width, height) = code.dimensions();
    let samples = code.into_raw();

    let raster = Raster::new(width as usize, height as usize, &samples).unwrap();
    let canvas = dither_to_canvas(&raster, &DitherOptions::new().diffusion(false)).unwrap();
    encode(&canvas)
}

fn main() {
    env_logger::init();
    dotenvy::dotenv().ok();

    let count: u16 = env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(2);
    let port = env::var("GUAGUA_PORT").unwrap_or_else(|_| "/dev/rfcomm0".to_string());

    let printer = match transport::open(&port) {
        Ok(printer) => printer,
        Err(err) => panic!("Could not open printer {}: {}", port, err),
    };
    let mut session = Session::new(printer, SessionConfig::default());
    session.start().unwrap();

    let tickets: Vec<Ticket> = (1..=count).map(|n| session.submit(label(n))).collect();
    for ticket in tickets {
        let id = ticket.id();
        match ticket.wait() {
            Ok(()) => println!("label {} printed", id),
            Err(err) => println!("label {} failed: {}", id, err),
        }
    }

    session.shutdown(ShutdownMode::Drain).unwrap();
}
