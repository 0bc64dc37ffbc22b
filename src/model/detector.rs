use crate::model::error::ModelError;
use crate::model::types::{Detection, FaceBox, ModelVersions};
use image::RgbImage;
use std::sync::Arc;

/// The vehicle detection model function. Implementations wrap whatever
/// inference runtime a deployment ships; the pipeline only sees detections.
pub trait VehicleModel: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError>;
}

/// The face detection model function. Returns candidate face regions; blur
/// application and threshold filtering happen in the manager.
pub trait FaceModel: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, ModelError>;
}

/// The pair of loaded model functions
#[derive(Clone)]
pub struct LoadedModels {
    pub vehicle: Arc<dyn VehicleModel>,
    pub face: Arc<dyn FaceModel>,
}

/// Produces the model functions on first demand. Loading may be expensive
/// (weights from disk, runtime warm-up); the manager guarantees it runs once.
pub trait ModelProvider: Send + Sync + 'static {
    fn load(&self) -> Result<LoadedModels, ModelError>;

    fn versions(&self) -> ModelVersions;
}
