//! Chart image shrinking for multimodal payloads.
//!
//! Charts come off matplotlib as large PNGs; the annotation service does
//! not need that fidelity. Downscale above a pixel bound, then walk JPEG
//! quality down until the bytes fit the budget. If anything goes wrong
//! the original bytes are returned so the pipeline never stalls on a
//! cosmetic step.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage, Rgba};
use tracing::{debug, warn};

const MAX_DIMENSION: u32 = 500;
const START_QUALITY: u8 = 50;
const QUALITY_FLOOR: u8 = 40;
const QUALITY_STEP: u8 = 5;
const MAX_BYTES: usize = 100 * 1024;

/// Re-encode chart bytes as a small JPEG. Falls back to the input on any
/// decode/encode failure.
pub fn optimize(original: &[u8]) -> Vec<u8> {
    match try_optimize(original) {
        Some(optimized) => {
            debug!(
                from_kb = original.len() / 1024,
                to_kb = optimized.len() / 1024,
                "optimized chart image"
            );
            optimized
        }
        None => {
            warn!("image optimization failed, sending original bytes");
            original.to_vec()
        }
    }
}

fn try_optimize(original: &[u8]) -> Option<Vec<u8>> {
    let decoded = image::load_from_memory(original).ok()?;
    let mut img = flatten_onto_white(decoded);

    let (w, h) = img.dimensions();
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        img = img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3);
    }

    let rgb = img.to_rgb8();
    let mut quality = START_QUALITY;
    let mut encoded = encode_jpeg(&rgb, quality)?;
    while encoded.len() > MAX_BYTES && quality > QUALITY_FLOOR {
        quality -= QUALITY_STEP;
        encoded = encode_jpeg(&rgb, quality)?;
    }
    Some(encoded)
}

/// Transparent chart backgrounds become white, as in a printed report.
fn flatten_onto_white(img: DynamicImage) -> DynamicImage {
    if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        let mut flat = RgbImage::from_pixel(rgba.width(), rgba.height(), image::Rgb([255, 255, 255]));
        for (x, y, Rgba([r, g, b, a])) in rgba.enumerate_pixels().map(|(x, y, p)| (x, y, *p)) {
            let alpha = a as u32;
            let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
            flat.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
        }
        DynamicImage::ImageRgb8(flat)
    } else {
        img
    }
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Option<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder).ok()?;
    Some(buf)
}
