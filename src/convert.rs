//! The imaging seam. Everything that touches pixel data lives here; the
//! rest of the crate only sees bytes in, bytes out.

use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageError};

/// Matches the encoder setting the existing exported archives were built
/// with, so re-runs stay byte-identical to them.
pub const JPEG_QUALITY: u8 = 95;

/// Decode a payload, proving it is a well-formed image. A failure here is
/// the per-row corrupt outcome, never a run-level error.
pub fn decode(data: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(data)
}

/// Re-encode as baseline JPEG. An alpha channel is discarded by the RGB
/// conversion, not composited against a background.
pub fn to_jpeg(img: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(out)
}

/// Extension reported by the decoder itself, for payloads the prefix
/// sniffer can't name.
pub fn decoder_ext(data: &[u8]) -> Option<&'static str> {
    image::guess_format(data)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
}
