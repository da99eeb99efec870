// ABOUTME: Image transform helpers
// ABOUTME: Decode, downscale, flatten transparency and re-encode raster images

use crate::errors::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat, Rgb, RgbImage};
use log::{debug, warn};
use std::io::Cursor;

pub const DEFAULT_QUALITY: u8 = 85;

/// Encoded output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailFormat {
    Jpeg,
    Png,
    Gif,
}

impl ThumbnailFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "image/jpeg",
            ThumbnailFormat::Png => "image/png",
            ThumbnailFormat::Gif => "image/gif",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ThumbnailFormat::Jpeg => "jpg",
            ThumbnailFormat::Png => "png",
            ThumbnailFormat::Gif => "gif",
        }
    }

    /// Formats we can write back keep their format, everything else becomes JPEG.
    fn for_input(format: ImageFormat) -> Self {
        match format {
            ImageFormat::Png => ThumbnailFormat::Png,
            ImageFormat::Gif => ThumbnailFormat::Gif,
            _ => ThumbnailFormat::Jpeg,
        }
    }
}

pub fn is_image_type(content_type: &str) -> bool {
    content_type.trim().to_ascii_lowercase().starts_with("image/")
}

/// Composite onto an opaque white background. Opaque images are converted as is.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Downscale so the longest side fits `max_size`, keeping the aspect ratio.
/// Images already within bounds are never enlarged.
pub fn fit_within(img: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_width && height <= max_height {
        return img;
    }
    img.resize(max_width.max(1), max_height.max(1), FilterType::Lanczos3)
}

pub fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(out.into_inner())
}

fn encode(img: &DynamicImage, format: ThumbnailFormat, quality: u8) -> Result<Vec<u8>> {
    match format {
        ThumbnailFormat::Jpeg => encode_jpeg(&flatten_onto_white(img), quality),
        ThumbnailFormat::Png => {
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, ImageOutputFormat::Png)?;
            Ok(out.into_inner())
        }
        ThumbnailFormat::Gif => {
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, ImageOutputFormat::Gif)?;
            Ok(out.into_inner())
        }
    }
}

fn try_optimize(data: &[u8], max_size: Option<u32>, quality: u8) -> Result<Vec<u8>> {
    let input_format = image::guess_format(data)?;
    let mut img = image::load_from_memory_with_format(data, input_format)?;

    if let Some(max) = max_size {
        img = fit_within(img, max, max);
    }

    let output_format = ThumbnailFormat::for_input(input_format);
    let encoded = encode(&img, output_format, quality)?;
    debug!(
        "Optimized image {:?} -> {:?}: {} -> {} bytes",
        input_format,
        output_format,
        data.len(),
        encoded.len()
    );
    Ok(encoded)
}

/// Resize and re-encode an image for storage.
///
/// Never fails: if the bytes cannot be decoded or re-encoded the original
/// bytes are returned unchanged.
pub fn optimize_image(data: &[u8], max_size: Option<u32>, quality: u8) -> Vec<u8> {
    match try_optimize(data, max_size, quality) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("Image optimization skipped: {}", e);
            data.to_vec()
        }
    }
}

/// Strict thumbnail: fit within `size`, encode as `format` at the default quality.
pub fn create_thumbnail(data: &[u8], size: (u32, u32), format: ThumbnailFormat) -> Result<Vec<u8>> {
    let img = image::load_from_memory(data)?;
    let img = if format == ThumbnailFormat::Jpeg {
        DynamicImage::ImageRgb8(flatten_onto_white(&img))
    } else {
        img
    };
    let img = fit_within(img, size.0, size.1);
    encode(&img, format, DEFAULT_QUALITY)
}
