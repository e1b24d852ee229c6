//! Built-in converters and the manifest that registers them.
//!
//! Each converter is a plain `fn(&Path, &Path) -> ConverterReport` that
//! wraps one library call or a small text transform. Adding a converter
//! means writing the function and adding one line to [`MANIFEST`];
//! [`crate::registry::ConverterRegistry::builtin`] rejects duplicates at
//! startup.

pub mod data;
pub mod raster;
pub mod text;

use crate::registry::ConverterDescriptor;

macro_rules! pair {
    ($src:literal => $tgt:literal, $f:path) => {
        ConverterDescriptor {
            source: $src,
            target: $tgt,
            convert: $f,
        }
    };
}

/// Every built-in `(source, target)` pair.
pub static MANIFEST: &[ConverterDescriptor] = &[
    // text
    pair!("txt" => "html", text::txt_to_html),
    pair!("txt" => "md", text::txt_to_md),
    pair!("md" => "html", text::md_to_html),
    pair!("md" => "txt", text::md_to_txt),
    pair!("html" => "txt", text::html_to_txt),
    // data
    pair!("csv" => "html", data::csv_to_html),
    pair!("csv" => "json", data::csv_to_json),
    pair!("json" => "csv", data::json_to_csv),
    // raster
    pair!("png" => "jpg", raster::to_jpg),
    pair!("png" => "bmp", raster::to_bmp),
    pair!("png" => "html", raster::to_html),
    pair!("jpg" => "png", raster::to_png),
    pair!("jpg" => "bmp", raster::to_bmp),
    pair!("jpg" => "html", raster::to_html),
    pair!("bmp" => "png", raster::to_png),
    pair!("bmp" => "jpg", raster::to_jpg),
    pair!("gif" => "png", raster::to_png),
];
