//! Background removal via ONNX saliency masking.
//!
//! Runs a U²-Net-style saliency model over a generated image and writes
//! an RGBA copy whose alpha channel is the predicted foreground mask.
//! The model file comes from `BG_REMOVAL_MODEL`; when unset the caller
//! skips the stage entirely.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Environment variable naming the ONNX model file.
pub const MODEL_ENV: &str = "BG_REMOVAL_MODEL";

/// Standard U²-Net input square.
const DEFAULT_INPUT_SIZE: u32 = 320;

/// Whether a mask model is configured at all.
pub fn is_model_configured() -> bool {
    std::env::var(MODEL_ENV).map(|v| !v.is_empty()).unwrap_or(false)
}

/// Saliency-mask background remover.
///
/// Session access is serialized through a mutex; removal runs on
/// blocking threads while the rest of the pipeline stays async.
pub struct BackgroundRemover {
    session: Mutex<Session>,
    output_name: String,
    input_size: u32,
}

impl BackgroundRemover {
    /// Load the model named by [`MODEL_ENV`].
    ///
    /// Returns `Ok(None)` when the variable is unset, so callers can
    /// skip the stage without treating it as a failure.
    pub fn from_env() -> MediaResult<Option<Self>> {
        match std::env::var(MODEL_ENV) {
            Ok(path) if !path.is_empty() => Self::new(Path::new(&path)).map(Some),
            _ => Ok(None),
        }
    }

    /// Load a saliency model from `model_path`.
    pub fn new(model_path: &Path) -> MediaResult<Self> {
        if !model_path.exists() {
            return Err(MediaError::model_not_found(
                model_path.to_string_lossy().to_string(),
            ));
        }

        let session = create_session(model_path)?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| MediaError::internal("Model declares no outputs"))?;

        info!(
            model_path = %model_path.display(),
            input_size = DEFAULT_INPUT_SIZE,
            "Background remover initialized"
        );

        Ok(Self {
            session: Mutex::new(session),
            output_name,
            input_size: DEFAULT_INPUT_SIZE,
        })
    }

    /// Mask the background of `input` and write an RGBA PNG to `output`.
    pub fn remove_background(&self, input: &Path, output: &Path) -> MediaResult<()> {
        let src = image::open(input)?;
        let (width, height) = src.dimensions();

        let tensor = self.preprocess(&src)?;
        let mask_values = self.run_inference(tensor)?;
        let mask = normalize_mask(&mask_values)?;

        let mask_img = GrayImage::from_raw(self.input_size, self.input_size, mask)
            .ok_or_else(|| MediaError::internal("Mask buffer has wrong length"))?;
        let mask_full = image::imageops::resize(&mask_img, width, height, FilterType::Triangle);

        let mut rgba = src.to_rgba8();
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            pixel[3] = mask_full.get_pixel(x, y)[0];
        }
        rgba.save(output)?;

        debug!(
            "Removed background: {} -> {}",
            input.display(),
            output.display()
        );
        Ok(())
    }

    /// Resize to the model square, normalize to [0, 1], NCHW layout.
    fn preprocess(&self, img: &DynamicImage) -> MediaResult<Value> {
        let size = self.input_size;
        let resized = img.resize_exact(size, size, FilterType::Triangle);
        let rgb = resized.to_rgb8();
        let (w, h) = (size as usize, size as usize);

        let mut chw_data: Vec<f32> = Vec::with_capacity(3 * h * w);
        for c in 0..3 {
            for y in 0..h {
                for x in 0..w {
                    let pixel = rgb.get_pixel(x as u32, y as u32);
                    chw_data.push(pixel[c] as f32 / 255.0);
                }
            }
        }

        let shape = vec![1usize, 3, h, w];
        Tensor::from_array((shape, chw_data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::removal_failed(format!("Failed to create tensor: {}", e)))
    }

    /// Run the session and pull the first output plane.
    fn run_inference(&self, input: Value) -> MediaResult<Vec<f32>> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::removal_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| {
                MediaError::removal_failed(format!("Missing output tensor {}", self.output_name))
            })?;

        let tensor = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::removal_failed(format!("Failed to extract tensor: {}", e)))?;

        let expected = (self.input_size * self.input_size) as usize;
        let values: Vec<f32> = tensor.1.iter().copied().collect();
        if values.len() != expected {
            return Err(MediaError::removal_failed(format!(
                "Unexpected mask size: expected {}, got {}",
                expected,
                values.len()
            )));
        }

        Ok(values)
    }
}

/// Min-max normalize raw saliency values to 8-bit alpha.
fn normalize_mask(values: &[f32]) -> MediaResult<Vec<u8>> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
    }

    if !min.is_finite() || !max.is_finite() || (max - min) < f32::EPSILON {
        return Err(MediaError::removal_failed(
            "Saliency mask has no contrast".to_string(),
        ));
    }

    let range = max - min;
    Ok(values
        .iter()
        .map(|&v| (((v - min) / range) * 255.0).round() as u8)
        .collect())
}

/// Create an ONNX Runtime session with provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for background removal");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(all(target_os = "macos", feature = "coreml"))]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider for background removal");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for background removal");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mask_full_range() {
        let mask = normalize_mask(&[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(mask, vec![0, 128, 255]);
    }

    #[test]
    fn test_normalize_mask_shifts_offset_values() {
        let mask = normalize_mask(&[2.0, 3.0, 4.0]).unwrap();
        assert_eq!(mask[0], 0);
        assert_eq!(mask[2], 255);
    }

    #[test]
    fn test_normalize_mask_rejects_flat_input() {
        assert!(normalize_mask(&[0.7, 0.7, 0.7]).is_err());
        assert!(normalize_mask(&[f32::NAN, 0.5]).is_err());
    }
}
