//! Decode a captured Shepard byte stream.
//!
//! Usage: `shepard-dissect <capture.hex>` (or `-` for stdin)

mod dissect;

use anyhow::{bail, Context, Result};
use std::io::Read;

use dissect::{dissect_capture, parse_hex_dump, FrameContent};

fn main() -> Result<()> {
    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: shepard-dissect <capture.hex | ->");
    };

    let text = if path == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        text
    } else {
        std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?
    };

    let capture = parse_hex_dump(&text)?;
    let frames = dissect_capture(&capture);

    let mut unrecognized = 0;
    for frame in &frames {
        if let FrameContent::Unrecognized { .. } = frame.content {
            unrecognized += 1;
        }
        println!("{frame}");
    }

    println!(
        "\n{} bytes, {} frames, {} unrecognized",
        capture.len(),
        frames.len(),
        unrecognized
    );
    Ok(())
}
