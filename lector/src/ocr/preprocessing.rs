use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, ImageReader, Luma};

use crate::config::OcrConfig;
use crate::error::{LectorError, Result};

/// Normalize an uploaded image before recognition.
///
/// Decodes any format the `image` crate can sniff, rejects images below the
/// minimum dimension, downsizes anything above the maximum, flattens to 8-bit
/// grayscale with a stretched histogram and re-encodes as PNG.
///
/// Decode and dimension failures are client faults.
pub fn preprocess_image(bytes: &[u8], config: &OcrConfig) -> Result<Vec<u8>> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| LectorError::bad_input(format!("Failed to read image: {e}")))?
        .decode()
        .map_err(|e| LectorError::bad_input(format!("Failed to decode image: {e}")))?;

    let (width, height) = img.dimensions();
    let min = config.min_image_dimension;
    if width < min || height < min {
        return Err(LectorError::bad_input(format!(
            "Image too small: {width}x{height}, minimum {min}x{min}"
        )));
    }

    let gray = fit_within(img, config.max_image_dimension).to_luma8();
    let gray = stretch_contrast(gray);

    let mut output = Vec::new();
    DynamicImage::ImageLuma8(gray)
        .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|e| LectorError::engine_fault(format!("Failed to encode image: {e}")))?;

    Ok(output)
}

/// Scale down so the longer side is at most `max_dim`, keeping aspect ratio.
fn fit_within(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if max_dim == 0 || (width <= max_dim && height <= max_dim) {
        return img;
    }

    let ratio = max_dim as f32 / width.max(height) as f32;
    let new_width = ((width as f32 * ratio) as u32).max(1);
    let new_height = ((height as f32 * ratio) as u32).max(1);

    img.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// Linear histogram stretch: darkest pixel to 0, lightest to 255.
fn stretch_contrast(gray: GrayImage) -> GrayImage {
    let (lo, hi) = gray
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if hi <= lo {
        return gray;
    }

    let range = (hi - lo) as f32;
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y)[0];
        Luma([((v - lo) as f32 / range * 255.0).round() as u8])
    })
}
