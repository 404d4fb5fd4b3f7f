/// ONNX subject masker
///
/// Runs a foreground-segmentation model through ONNX Runtime. The
/// model takes a 256x256 NHWC float image and produces a per-pixel
/// foreground probability map.
use std::path::PathBuf;

use image::imageops::FilterType;
use image::RgbaImage;
use ndarray::Array4;

use super::mask::{SubjectMask, SubjectMasker};
use super::VisionError;

const MODEL_FILE: &str = "subject_segmentation.onnx";
const INPUT_WIDTH: u32 = 256;
const INPUT_HEIGHT: u32 = 256;

pub struct OnnxMasker {
    session: ort::session::Session,
}

impl OnnxMasker {
    pub fn new() -> Result<Self, VisionError> {
        let model_path = Self::find_model_file()?;
        log::info!("Segmentation model: {}", model_path.display());

        ort::init()
            .with_name("WardrobeStudio")
            .commit()
            .map_err(|e| VisionError::ModelUnavailable(format!("ORT init failed: {e}")))?;

        let session = ort::session::Session::builder()
            .map_err(|e| VisionError::ModelUnavailable(format!("session builder failed: {e}")))?
            .with_intra_threads(2)
            .map_err(|e| VisionError::ModelUnavailable(format!("thread setup failed: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| VisionError::ModelUnavailable(format!("model load failed: {e}")))?;

        log::info!("✅ Segmentation model loaded");
        Ok(OnnxMasker { session })
    }

    /// Look for the model next to the executable, in the working
    /// directory, then in the user cache directory.
    fn find_model_file() -> Result<PathBuf, VisionError> {
        let mut candidates = Vec::new();

        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(parent) = exe_path.parent() {
                candidates.push(parent.join("models").join(MODEL_FILE));
            }
        }
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join("models").join(MODEL_FILE));
        }
        if let Some(cache) = dirs_next::cache_dir() {
            candidates.push(cache.join("wardrobe-studio").join(MODEL_FILE));
        }

        for candidate in &candidates {
            if candidate.exists() {
                return Ok(candidate.clone());
            }
        }

        Err(VisionError::ModelUnavailable(format!(
            "{MODEL_FILE} not found; searched {} locations",
            candidates.len()
        )))
    }

    /// Resize to model resolution and convert to NHWC float RGB in
    /// [0, 1].
    fn preprocess(image: &RgbaImage) -> Vec<f32> {
        let resized = image::imageops::resize(image, INPUT_WIDTH, INPUT_HEIGHT, FilterType::Triangle);

        let mut input = Vec::with_capacity((INPUT_WIDTH * INPUT_HEIGHT * 3) as usize);
        for pixel in resized.pixels() {
            input.push(pixel.0[0] as f32 / 255.0);
            input.push(pixel.0[1] as f32 / 255.0);
            input.push(pixel.0[2] as f32 / 255.0);
        }
        input
    }
}

impl SubjectMasker for OnnxMasker {
    fn generate_mask(&mut self, image: &RgbaImage) -> Result<SubjectMask, VisionError> {
        let input = Self::preprocess(image);

        let input_array = Array4::from_shape_vec(
            (1, INPUT_HEIGHT as usize, INPUT_WIDTH as usize, 3),
            input,
        )
        .map_err(|e| VisionError::RequestFailed(format!("input array failed: {e}")))?;

        let input_tensor = ort::value::Tensor::from_array(input_array)
            .map_err(|e| VisionError::RequestFailed(format!("tensor creation failed: {e}")))?;

        let outputs = self
            .session
            .run(ort::inputs![input_tensor])
            .map_err(|e| VisionError::RequestFailed(format!("inference failed: {e}")))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| VisionError::MaskGeneration(String::from("model produced no output")))?;

        let (_shape, data) = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::MaskGeneration(format!("output extraction failed: {e}")))?;

        let mask: Vec<f32> = data.iter().map(|&v| v.clamp(0.0, 1.0)).collect();
        if mask.len() != (INPUT_WIDTH * INPUT_HEIGHT) as usize {
            return Err(VisionError::MaskGeneration(format!(
                "unexpected mask size {}",
                mask.len()
            )));
        }

        Ok(SubjectMask {
            data: mask,
            width: INPUT_WIDTH,
            height: INPUT_HEIGHT,
        })
    }
}
