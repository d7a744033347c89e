// ============================================================================
// Image IO: loading source images, decoding model output, writing PNGs
// ============================================================================

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, ImageError, ImageFormat, RgbaImage};

/// Errors raised while reading or writing image files.
#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    UnsupportedFormat(String),
    Decode(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "I/O error: {}", e),
            LoadError::UnsupportedFormat(e) => write!(f, "Unsupported image format: {}", e),
            LoadError::Decode(e) => write!(f, "Could not decode image: {}", e),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<ImageError> for LoadError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => LoadError::Io(io),
            ImageError::Unsupported(u) => LoadError::UnsupportedFormat(u.to_string()),
            other => LoadError::Decode(other.to_string()),
        }
    }
}

/// MIME type for the formats the model endpoint accepts as inline data.
pub fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::WebP => Some("image/webp"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

/// The workspace image: original encoded bytes (sent to the model untouched)
/// plus a decoded RGBA copy for display and guide compositing.
#[derive(Clone, Debug)]
pub struct SourceImage {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub rgba: RgbaImage,
}

impl SourceImage {
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, LoadError> {
        let format = image::guess_format(&bytes)?;
        let mime_type = mime_for_format(format)
            .ok_or_else(|| LoadError::UnsupportedFormat(format!("{:?}", format)))?;
        let rgba = image::load_from_memory_with_format(&bytes, format)?.to_rgba8();
        Ok(Self {
            name: name.into(),
            bytes,
            mime_type,
            rgba,
        })
    }

    pub fn width(&self) -> u32 {
        self.rgba.width()
    }

    pub fn height(&self) -> u32 {
        self.rgba.height()
    }
}

/// Read and decode an image file from disk.
pub fn load_image_sync(path: &Path) -> Result<SourceImage, LoadError> {
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
        .to_string();
    SourceImage::from_bytes(name, bytes)
}

/// Image returned by the model, still encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl GeneratedImage {
    pub fn decode(&self) -> Result<RgbaImage, LoadError> {
        Ok(image::load_from_memory(&self.bytes)?.to_rgba8())
    }

    /// Turn the result into the next workspace image.
    pub fn into_source(self, name: impl Into<String>) -> Result<SourceImage, LoadError> {
        SourceImage::from_bytes(name, self.bytes)
    }
}

pub fn unix_millis(now: SystemTime) -> u128 {
    now.duration_since(UNIX_EPOCH).map(|d| d.as_millis()).unwrap_or(0)
}

/// Default download name for a generated image.
pub fn result_file_name(now: SystemTime) -> String {
    format!("inpaint-result-{}.png", unix_millis(now))
}

/// Name given to a result once it becomes the workspace image.
pub fn edited_file_name(now: SystemTime) -> String {
    format!("edited_{}.png", unix_millis(now))
}

/// Encode `image` as PNG and write it to `path`.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<(), LoadError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    PngEncoder::new(&mut writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::guide::encode_png;
    use image::Rgba;
    use std::time::Duration;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        encode_png(&RgbaImage::from_pixel(w, h, Rgba([1, 2, 3, 255]))).unwrap()
    }

    #[test]
    fn sniffs_png() {
        let img = SourceImage::from_bytes("a.png", png_bytes(4, 3)).unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = SourceImage::from_bytes("x", b"definitely not an image".to_vec()).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_) | LoadError::Decode(_)));
    }

    #[test]
    fn file_names_carry_the_timestamp() {
        let t = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(result_file_name(t), "inpaint-result-1700000000123.png");
        assert_eq!(edited_file_name(t), "edited_1700000000123.png");
    }

    #[test]
    fn write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let img = RgbaImage::from_pixel(5, 5, Rgba([10, 20, 30, 255]));
        write_png(&img, &path).unwrap();

        let loaded = load_image_sync(&path).unwrap();
        assert_eq!(loaded.name, "out.png");
        assert_eq!(loaded.rgba, img);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_image_sync(&dir.path().join("nope.png")).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn generated_image_becomes_source() {
        let generated = GeneratedImage { bytes: png_bytes(2, 2), mime_type: "image/png".into() };
        assert_eq!(generated.decode().unwrap().dimensions(), (2, 2));
        let src = generated.into_source("edited_1.png").unwrap();
        assert_eq!(src.name, "edited_1.png");
    }
}
