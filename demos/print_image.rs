use guagua::{print_job, DitherOptions, GlyphTable, Job, Raster, SessionConfig, WIDTH_DOTS};
use image::{imageops::FilterType, GenericImageView};
use std::env;
//
// cargo run --example print_image photo.png [/dev/rfcomm0]
//
// The port may also come from GUAGUA_PORT in the environment or a .env file.
//

fn main() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{}:{}] {} - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .init();
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: cargo run --example print_image <image> [port]");
        return;
    }
    let port = args
        .get(2)
        .cloned()
        .or_else(|| env::var("GUAGUA_PORT").ok())
        .unwrap_or_else(|| "/dev/rfcomm0".to_string());

    let mut picture = image::open(&args[1]).unwrap().grayscale();

    // The paper is narrow, print landscape pictures sideways
    let (width, height) = picture.dimensions();
    if width > height {
        println!("Image is wider than tall, rotating 90 degrees.");
        picture = picture.rotate270();
    }

    let (width, height) = picture.dimensions();
    if width != WIDTH_DOTS as u32 {
        let new_height = (height as u64 * WIDTH_DOTS as u64 / width as u64).max(1) as u32;
        println!("Image width is {}, resizing to {}.", width, WIDTH_DOTS);
        picture = picture.resize_exact(WIDTH_DOTS as u32, new_height, FilterType::Triangle);
    }

    let (width, height) = picture.dimensions();
    let samples = picture.to_luma8().into_raw();
    let job = Job::Image {
        raster: Raster::new(width as usize, height as usize, &samples).unwrap(),
        options: DitherOptions::new().padding_rows(32),
    };

    match print_job(&port, &job, &GlyphTable::new(), SessionConfig::default()) {
        Ok(()) => println!("Image sent successfully!"),
        Err(err) if err.is_rejected_before_send() => println!("Rejected: {}", err),
        Err(err) => println!("ERROR, the printer may have printed part of the job: {:#?}", err),
    }
}
