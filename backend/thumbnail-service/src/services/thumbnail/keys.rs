//! Derived object key layout
//!
//! Thumbnails live under [`THUMBNAIL_PREFIX`]. Uploads into that namespace
//! raise notifications like any other upload, so the pipeline refuses to
//! process keys under the prefix.

use image::ImageFormat;

/// Namespace reserved for derived objects
pub const THUMBNAIL_PREFIX: &str = "thumbnails/";

const THUMBNAIL_SUFFIX: &str = "_thumb";
const FALLBACK_EXTENSION: &str = "jpg";

pub fn is_thumbnail_key(key: &str) -> bool {
    key.starts_with(THUMBNAIL_PREFIX)
}

/// Split `key` into (stem, extension). The extension is the text after the
/// last `.` of the final path component, and must be non-empty.
pub fn split_extension(key: &str) -> (&str, Option<&str>) {
    match key.rfind('.') {
        Some(dot) => {
            let ext = &key[dot + 1..];
            if ext.is_empty() || ext.contains('/') {
                (key, None)
            } else {
                (&key[..dot], Some(ext))
            }
        }
        None => (key, None),
    }
}

/// Lowercased extension the derived key carries
fn thumbnail_extension(source_key: &str) -> String {
    split_extension(source_key)
        .1
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

/// `photos/cat.png` -> `thumbnails/photos/cat_thumb.png`
pub fn thumbnail_key(source_key: &str) -> String {
    let (stem, _) = split_extension(source_key);
    let ext = thumbnail_extension(source_key);
    format!("{THUMBNAIL_PREFIX}{stem}{THUMBNAIL_SUFFIX}.{ext}")
}

/// Image format named by the derived key's extension, if it names one.
/// Keys without an extension map to JPEG, matching their `.jpg` key.
pub fn thumbnail_format(source_key: &str) -> Option<ImageFormat> {
    ImageFormat::from_extension(thumbnail_extension(source_key))
}
