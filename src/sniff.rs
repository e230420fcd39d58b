use std::fmt;

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Format {
    Jpeg,
    Png,
    Gif,
    Webp,
    Bmp,
    Unknown
}

impl Format {
    pub fn ext(self) -> &'static str {
        use Format::*;
        match self {
            Jpeg => "jpg",
            Png => "png",
            Gif => "gif",
            Webp => "webp",
            Bmp => "bmp",
            Unknown => "bin"
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Format::*;
        f.write_str(match *self {
            Jpeg => "jpeg",
            Png => "png",
            Gif => "gif",
            Webp => "webp",
            Bmp => "bmp",
            Unknown => "unknown"
        })
    }
}

/// Classify a payload by its leading bytes, most specific signature first,
/// so a generic RIFF container is only called webp when bytes 8..12 agree.
pub fn detect(data: &[u8]) -> Format {
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        Format::Webp
    } else if data.starts_with(PNG_MAGIC) {
        Format::Png
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Format::Gif
    } else if data.starts_with(JPEG_MAGIC) {
        Format::Jpeg
    } else if data.starts_with(b"BM") {
        Format::Bmp
    } else {
        Format::Unknown
    }
}
