/// Bitmap <-> bytes transform for the cutout store
///
/// Cutouts are stored as maximum-quality JPEG. The transform is lossy
/// and flattens alpha; callers tolerate the quality loss, but pixel
/// dimensions always survive a round trip.
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ExtendedColorType, ImageError, RgbaImage};

/// Encode a bitmap into the store's byte payload.
pub fn encode(image: &RgbaImage) -> Result<Vec<u8>, ImageError> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();

    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 100);
    encoder.encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(bytes)
}

/// Decode a stored byte payload back into a bitmap.
pub fn decode(bytes: &[u8]) -> Result<RgbaImage, ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}
