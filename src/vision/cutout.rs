/// Cutout pipeline
///
/// Turns a still photo into a subject-only cutout:
/// 1. normalize the input into an RGBA buffer at its own scale
/// 2. run the subject masker
/// 3. derive foreground instances, failing when none are found
/// 4. merge all instances into one mask at input resolution
/// 5. composite the input over a fully transparent background
/// 6. render as premultiplied RGBA, "up" orientation
/// 7. persist the result, tagged for the catalog
use chrono::Utc;
use image::{DynamicImage, GrayImage, Rgba, RgbaImage};

use crate::state::store::CutoutStore;

use super::mask::{label_instances, scale_mask_to, SubjectMasker, FOREGROUND_THRESHOLD};
use super::VisionError;

/// Tags every persisted cutout carries.
pub const CUTOUT_TAGS: [&str; 2] = ["cutout", "vision"];

/// Re-rasterize the input at its own scale into a consistent RGBA8
/// buffer, dropping any orientation or color-layout quirks.
pub fn normalize_image(image: &DynamicImage) -> RgbaImage {
    image.to_rgba8()
}

/// Alpha-matte the input with the mask over a transparent background.
/// Output pixels are premultiplied RGBA.
pub fn apply_mask(input: &RgbaImage, mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(input.width(), input.height(), |x, y| {
        let pixel = input.get_pixel(x, y).0;
        let coverage = mask.get_pixel(x, y).0[0] as f32 / 255.0;
        let alpha = (pixel[3] as f32 / 255.0) * coverage;

        Rgba([
            (pixel[0] as f32 * alpha).round() as u8,
            (pixel[1] as f32 * alpha).round() as u8,
            (pixel[2] as f32 * alpha).round() as u8,
            (alpha * 255.0).round() as u8,
        ])
    })
}

/// Run the full pipeline without persistence.
pub fn create_cutout(
    masker: &mut dyn SubjectMasker,
    input: &DynamicImage,
) -> Result<RgbaImage, VisionError> {
    let normalized = normalize_image(input);

    let mask = masker.generate_mask(&normalized)?;

    let instances = label_instances(&mask, FOREGROUND_THRESHOLD);
    if instances.is_empty() {
        return Err(VisionError::NoSubjectFound);
    }
    log::debug!("Detected {} foreground instance(s)", instances.instance_count());

    let merged = instances.merged_mask(&mask);
    let scaled = scale_mask_to(&merged, normalized.width(), normalized.height());

    Ok(apply_mask(&normalized, &scaled))
}

/// Run the full pipeline and persist the result. A store failure is
/// logged only; the cutout stays usable for the current session.
pub fn create_and_store_cutout(
    masker: &mut dyn SubjectMasker,
    store: Option<&CutoutStore>,
    input: &DynamicImage,
) -> Result<RgbaImage, VisionError> {
    let cutout = create_cutout(masker, input)?;

    match store {
        Some(store) => {
            if let Err(e) = store.save(&cutout, &CUTOUT_TAGS, Utc::now()) {
                log::error!("Failed to persist cutout: {e}");
            }
        }
        None => log::warn!("Cutout store unavailable, cutout not persisted"),
    }

    Ok(cutout)
}
