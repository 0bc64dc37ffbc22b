use crate::config::ModelConfig;
use crate::model::detector::{LoadedModels, ModelProvider};
use crate::model::error::ModelError;
use crate::model::types::{FaceMeta, ModelVersions, VehicleReport};
use bytes::Bytes;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const JPEG_QUALITY: u8 = 95;

/// Central holder of the two model functions.
///
/// Both the admission gate and the workers run detection through this one
/// surface; models load on first demand and are reused for the process
/// lifetime. Model execution is CPU-bound, so every call runs on the blocking
/// pool; callers bound concurrency by bounding the worker pool.
pub struct ModelManager {
    provider: Box<dyn ModelProvider>,
    models: OnceCell<LoadedModels>,
    car_confidence_threshold: f32,
    face_confidence_threshold: f32,
}

impl ModelManager {
    pub fn new(provider: Box<dyn ModelProvider>, config: &ModelConfig) -> Self {
        Self {
            provider,
            models: OnceCell::new(),
            car_confidence_threshold: config.car_confidence_threshold,
            face_confidence_threshold: config.face_confidence_threshold,
        }
    }

    pub fn versions(&self) -> ModelVersions {
        self.provider.versions()
    }

    async fn models(&self) -> Result<&LoadedModels, ModelError> {
        self.models
            .get_or_try_init(|| async {
                info!("Loading detection models");
                let loaded = self.provider.load()?;
                info!("Detection models loaded");
                Ok(loaded)
            })
            .await
    }

    /// Run the vehicle model and report whether any detection is a vehicle
    /// class with confidence at or above the configured threshold.
    pub async fn detect_vehicles(&self, data: Bytes) -> Result<VehicleReport, ModelError> {
        let models = self.models().await?;
        let model = models.vehicle.clone();
        let threshold = self.car_confidence_threshold;

        let report = tokio::task::spawn_blocking(move || {
            let image = decode_image(&data)?;
            let detections = model.detect(&image)?;

            let vehicle_detected = detections
                .iter()
                .any(|d| d.is_vehicle() && d.confidence >= threshold);

            Ok::<_, ModelError>(VehicleReport {
                vehicle_detected,
                detection_count: detections.len(),
                boxes: detections.iter().map(|d| d.bbox.as_array()).collect(),
                confidences: detections.iter().map(|d| d.confidence).collect(),
                class_ids: detections.iter().map(|d| d.class_id).collect(),
            })
        })
        .await
        .map_err(|e| ModelError::Inference(format!("vehicle detection task failed: {}", e)))??;

        debug!(
            "Vehicle pass: detected={}, detections={}",
            report.vehicle_detected, report.detection_count
        );
        Ok(report)
    }

    /// Run the face model, blur every face region at or above the threshold,
    /// and re-encode to the original container format.
    pub async fn detect_and_blur_faces(
        &self,
        data: Bytes,
        content_type: &str,
    ) -> Result<(Bytes, FaceMeta), ModelError> {
        let models = self.models().await?;
        let model = models.face.clone();
        let threshold = self.face_confidence_threshold;
        let format = encode_format(content_type);

        let (processed, meta) = tokio::task::spawn_blocking(move || {
            let mut image = decode_image(&data)?;
            let (width, height) = image.dimensions();

            let faces = model.detect(&image)?;
            let kept: Vec<_> = faces
                .into_iter()
                .filter(|f| f.confidence >= threshold)
                .collect();

            for face in &kept {
                let bbox = face.bbox;
                if bbox.width == 0 || bbox.height == 0 || bbox.x >= width || bbox.y >= height {
                    return Err(ModelError::InvalidOutput(format!(
                        "face box {:?} outside {}x{} image",
                        bbox, width, height
                    )));
                }
            }

            for face in &kept {
                blur_region(&mut image, face.bbox.as_array(), width, height);
            }

            let meta = if kept.is_empty() {
                FaceMeta::none()
            } else {
                FaceMeta {
                    face_count: kept.len(),
                    boxes: kept.iter().map(|f| f.bbox.as_array()).collect(),
                    confidences: kept.iter().map(|f| f.confidence).collect(),
                    reason: "face regions blurred".to_string(),
                }
            };

            let encoded = encode_image(&image, format)?;
            Ok::<_, ModelError>((Bytes::from(encoded), meta))
        })
        .await
        .map_err(|e| ModelError::Inference(format!("face blur task failed: {}", e)))??;

        debug!("Face pass: faces={}", meta.face_count);
        Ok((processed, meta))
    }
}

fn decode_image(data: &[u8]) -> Result<RgbImage, ModelError> {
    let image = image::load_from_memory(data).map_err(|e| ModelError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

fn encode_format(content_type: &str) -> ImageFormat {
    match content_type {
        "image/png" => ImageFormat::Png,
        "image/webp" => ImageFormat::WebP,
        // Unrecognized container types re-encode as JPEG, matching the
        // `.bin` fallback in the key discipline
        _ => ImageFormat::Jpeg,
    }
}

fn encode_image(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>, ModelError> {
    let mut out = Vec::new();

    match format {
        ImageFormat::Jpeg => {
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            image
                .write_with_encoder(encoder)
                .map_err(|e| ModelError::Encode(e.to_string()))?;
        }
        ImageFormat::WebP => {
            // The WebP encoder is lossless-only; blurred webp artifacts come
            // out larger than their originals
            let encoder = image::codecs::webp::WebPEncoder::new_lossless(&mut out);
            image
                .write_with_encoder(encoder)
                .map_err(|e| ModelError::Encode(e.to_string()))?;
        }
        _ => {
            DynamicImage::ImageRgb8(image.clone())
                .write_to(&mut Cursor::new(&mut out), format)
                .map_err(|e| ModelError::Encode(e.to_string()))?;
        }
    }

    Ok(out)
}

/// Gaussian-blur one face region in place. The box is clamped to the image
/// bounds; sigma scales with the region so small and large faces blur evenly.
fn blur_region(image: &mut RgbImage, bbox: [u32; 4], width: u32, height: u32) {
    let [x, y, w, h] = bbox;
    let w = w.min(width - x);
    let h = h.min(height - y);

    let region = image::imageops::crop_imm(image, x, y, w, h).to_image();
    let sigma = (w.min(h) as f32 / 4.0).max(4.0);
    let blurred = image::imageops::blur(&region, sigma);
    image::imageops::replace(image, &blurred, i64::from(x), i64::from(y));
}
