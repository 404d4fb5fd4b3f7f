/// Picture-library writes
/// Every successfully captured original is saved here in addition to
/// being handed back to the caller.
use std::path::{Path, PathBuf};

use image::DynamicImage;

use super::device::{CapturedPhoto, PhotoCodec};

/// Where captured originals land.
/// Falls back from the platform picture directory to the home
/// directory, then to the temp directory.
pub fn default_dir() -> PathBuf {
    let mut path = dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir);
    path.push("wardrobe-studio");
    path
}

/// Save a captured original into the picture library.
/// Returns the path of the written file.
pub fn save_photo(
    library_dir: &Path,
    photo: &CapturedPhoto,
    codec: PhotoCodec,
) -> Result<PathBuf, String> {
    std::fs::create_dir_all(library_dir)
        .map_err(|e| format!("Failed to create picture library directory: {e}"))?;

    let filename = format!(
        "capture-{}.{}",
        photo.taken_at.format("%Y%m%d-%H%M%S%3f"),
        codec.extension()
    );
    let path = library_dir.join(filename);

    match codec {
        PhotoCodec::Jpeg => {
            // JPEG carries no alpha, flatten before writing
            let rgb = DynamicImage::ImageRgba8(photo.image.clone()).to_rgb8();
            rgb.save(&path)
                .map_err(|e| format!("Failed to write capture: {e}"))?;
        }
        PhotoCodec::Png => {
            photo
                .image
                .save(&path)
                .map_err(|e| format!("Failed to write capture: {e}"))?;
        }
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::PhotoOrientation;
    use chrono::Utc;
    use image::RgbaImage;

    #[test]
    fn test_save_photo_writes_file() {
        let dir = std::env::temp_dir()
            .join("wardrobe-studio-tests")
            .join(format!("gallery-save-{}", uuid::Uuid::new_v4()));

        let photo = CapturedPhoto {
            image: RgbaImage::from_pixel(8, 8, image::Rgba([10, 20, 30, 255])),
            orientation: PhotoOrientation::Up,
            taken_at: Utc::now(),
        };

        let path = save_photo(&dir, &photo, PhotoCodec::Jpeg).expect("save should succeed");
        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));

        let _ = std::fs::remove_dir_all(dir);
    }
}
