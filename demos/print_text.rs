use guagua::{compute_required_height, print_job, Glyph, GlyphTable, Job, SessionConfig};
use std::env;
//
// cargo run --example print_text "12:34" [/dev/rfcomm0]
//
// Uses a blocky 3x5 digit font scaled up four times, just enough to print
// times and dates.
//

const SCALE: usize = 4;

const DIGITS: [(char, [&str; 5]); 13] = [
    ('0', ["###", "#.#", "#.#", "#.#", "###"]),
    ('1', [".#.", "##.", ".#.", ".#.", "###"]),
    ('2', ["###", "..#", "###", "#..", "###"]),
    ('3', ["###", "..#", "###", "..#", "###"]),
    ('4', ["#.#", "#.#", "###", "..#", "..#"]),
    ('5', ["###", "#..", "###", "..#", "###"]),
    ('6', ["###", "#..", "###", "#.#", "###"]),
    ('7', ["###", "..#", "..#", "..#", "..#"]),
    ('8', ["###", "#.#", "###", "#.#", "###"]),
    ('9', ["###", "#.#", "###", "..#", "###"]),
    (':', ["...", ".#.", "...", ".#.", "..."]),
    ('-', ["...", "...", "###", "...", "..."]),
    (' ', ["...", "...", "...", "...", "..."]),
];

fn font() -> GlyphTable {
    DIGITS
        .iter()
        .map(|(ch, pattern)| {
            let mut bits: Vec<Vec<u8>> = Vec::new();
            for line in pattern.iter() {
                let mut row: Vec<u8> = line
                    .chars()
                    .flat_map(|c| std::iter::repeat((c == '#') as u8).take(SCALE))
                    .collect();
                // one blank column of spacing on the right
                row.extend(std::iter::repeat(0).take(SCALE));
                for _ in 0..SCALE {
                    bits.push(row.clone());
                }
            }
            (*ch, Glyph::from_bits(&bits).unwrap())
        })
        .collect()
}

fn main() {
    env_logger::init();
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    let text = args.get(1).map(String::as_str).unwrap_or("12:34");
    let port = args
        .get(2)
        .cloned()
        .or_else(|| env::var("GUAGUA_PORT").ok())
        .unwrap_or_else(|| "/dev/rfcomm0".to_string());

    let glyphs = font();
    match compute_required_height(&glyphs, text) {
        Ok(height) => println!("{:?} needs {} rows", text, height),
        Err(err) => {
            println!("Cannot print {:?}: {}", text, err);
            return;
        }
    }

    if let Err(err) = print_job(&port, &Job::Text(text), &glyphs, SessionConfig::default()) {
        println!("ERROR {:#?}", err);
    }
}
