//! Format converters: markdown rendering and raster transcoding.

use bytes::Bytes;
use image::{DynamicImage, ImageFormat};
use pulldown_cmark::{Event, Options, Parser, html};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("markdown source is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("`{0}` is not a raster format")]
    UnknownRaster(String),
    #[error("image codec failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("conversion task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Render CommonMark source (with tables and strikethrough) into HTML markup.
///
/// Raw HTML in the source is escaped, never passed through.
pub fn markdown_to_html(source: &[u8]) -> Result<Bytes, ConversionError> {
    let text = std::str::from_utf8(source)?;
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let events = Parser::new_ext(text, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(text.len() * 3 / 2);
    html::push_html(&mut out, events);
    Ok(Bytes::from(out))
}

fn raster_format(mime: &str) -> Result<ImageFormat, ConversionError> {
    match mime {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" => Ok(ImageFormat::Jpeg),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/gif" => Ok(ImageFormat::Gif),
        other => Err(ConversionError::UnknownRaster(other.to_string())),
    }
}

/// Decode `source` and re-encode it as `target_mime`.
///
/// Runs on the blocking pool; codecs are CPU bound.
pub async fn transcode_image(source: Bytes, target_mime: &str) -> Result<Bytes, ConversionError> {
    let format = raster_format(target_mime)?;
    tokio::task::spawn_blocking(move || encode_image(&source, format)).await?
}

fn encode_image(source: &[u8], format: ImageFormat) -> Result<Bytes, ConversionError> {
    let decoded = image::load_from_memory(source)?;
    // jpeg has no alpha channel; the webp and gif encoders want 8-bit rgba
    let prepared = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(decoded.to_rgb8()),
        ImageFormat::WebP | ImageFormat::Gif => DynamicImage::ImageRgba8(decoded.to_rgba8()),
        _ => decoded,
    };
    let mut out = Cursor::new(Vec::new());
    prepared.write_to(&mut out, format)?;
    Ok(Bytes::from(out.into_inner()))
}
