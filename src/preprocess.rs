use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

use crate::config::DatasetConfig;
use crate::error::OcrError;

/// Resized widths are rounded up to a multiple of this before clamping.
const WIDTH_ROUND_TO: u32 = 10;
const PAD_FILL: Rgb<u8> = Rgb([255, 255, 255]);

/// Width for an image scaled to `target_height`, keeping aspect ratio, rounded
/// up to a multiple of ten and clamped to `[min_width, max_width]`.
pub fn target_width(
    width: u32,
    height: u32,
    target_height: u32,
    min_width: u32,
    max_width: u32,
) -> u32 {
    let scaled = (f64::from(target_height) * f64::from(width) / f64::from(height)) as u32;
    let rounded = scaled.div_ceil(WIDTH_ROUND_TO) * WIDTH_ROUND_TO;
    rounded.max(min_width).min(max_width)
}

/// Resizes a text-line image for the recognizer. With `is_padding` the resized
/// line is pasted at the left of a white canvas `image_max_width` wide.
pub fn resize_line(image: &DynamicImage, dataset: &DatasetConfig) -> Result<RgbImage, OcrError> {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(OcrError::invalid_input(format!(
            "cannot preprocess an empty image ({width}x{height})"
        )));
    }

    let new_width = target_width(
        width,
        height,
        dataset.image_height,
        dataset.image_min_width,
        dataset.image_max_width,
    );
    let resized = image::imageops::resize(
        &rgb,
        new_width,
        dataset.image_height,
        FilterType::Lanczos3,
    );
    if !dataset.is_padding {
        return Ok(resized);
    }

    let mut canvas = RgbImage::from_pixel(dataset.image_max_width, dataset.image_height, PAD_FILL);
    image::imageops::replace(&mut canvas, &resized, 0, 0);
    Ok(canvas)
}

/// Packs an RGB image into a `(1, 3, H, W)` tensor scaled to `[0, 1]`.
pub fn to_chw_tensor(image: &RgbImage, device: &Device) -> Result<Tensor, OcrError> {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut data = vec![0f32; 3 * h * w];
    for (x, y, pixel) in image.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for c in 0..3 {
            data[c * h * w + offset] = f32::from(pixel[c]) / 255.0;
        }
    }
    Tensor::from_vec(data, (1, 3, h, w), device)
        .map_err(|e| OcrError::inference("image tensor creation", e))
}
