//! Raster image converters backed by the `image` crate.
//!
//! Inputs are decoded by content sniffing rather than by extension, because
//! uploaded files are staged under arbitrary names. JPEG has no alpha
//! channel, so images are flattened to RGB before JPEG encoding.

use super::text::{escape_html, html_document};
use crate::registry::ConverterReport;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs;
use std::path::Path;
use tracing::debug;

pub fn to_png(input: &Path, output: &Path) -> ConverterReport {
    reencode(input, output, ImageFormat::Png)
}

pub fn to_jpg(input: &Path, output: &Path) -> ConverterReport {
    reencode(input, output, ImageFormat::Jpeg)
}

pub fn to_bmp(input: &Path, output: &Path) -> ConverterReport {
    reencode(input, output, ImageFormat::Bmp)
}

/// Wrap the image in a standalone HTML page as a base64 data URI.
pub fn to_html(input: &Path, output: &Path) -> ConverterReport {
    let result = (|| -> Result<String, String> {
        let bytes = fs::read(input).map_err(|e| e.to_string())?;
        let format = image::guess_format(&bytes).map_err(|e| format!("not a recognised image: {e}"))?;
        let img = image::load_from_memory_with_format(&bytes, format).map_err(|e| e.to_string())?;
        let mime = format.to_mime_type();

        let name = input
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let body = format!(
            "<img src=\"data:{mime};base64,{}\" width=\"{}\" height=\"{}\" alt=\"{}\">\n",
            STANDARD.encode(&bytes),
            img.width(),
            img.height(),
            escape_html(&name)
        );
        fs::write(output, html_document(&name, &body)).map_err(|e| e.to_string())?;
        Ok(format!("Embedded {}x{} {mime} image", img.width(), img.height()))
    })();
    result.into()
}

fn reencode(input: &Path, output: &Path, format: ImageFormat) -> ConverterReport {
    let img = match load(input) {
        Ok(img) => img,
        Err(e) => return ConverterReport::failed(format!("cannot decode image: {e}")),
    };
    let (w, h) = (img.width(), img.height());
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        _ => img,
    };
    debug!("Re-encoding {}x{} image as {:?}", w, h, format);
    match img.save_with_format(output, format) {
        Ok(()) => ConverterReport::ok(format!("Converted {w}x{h} image to {format:?}")),
        Err(e) => ConverterReport::failed(format!("cannot encode image: {e}")),
    }
}

fn load(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}
