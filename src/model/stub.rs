use crate::model::detector::{FaceModel, LoadedModels, ModelProvider, VehicleModel};
use crate::model::error::ModelError;
use crate::model::types::{BoundingBox, Detection, FaceBox, ModelVersions};
use image::RgbImage;
use std::sync::Arc;

/// Deterministic stand-in models, selected with `models.provider = "stub"`.
///
/// They let the whole pipeline run end-to-end without GPU bindings:
/// every decodable image counts as a vehicle and carries no faces.
/// Deployments plug real detector bindings through [`ModelProvider`].
pub struct StubModelProvider;

impl ModelProvider for StubModelProvider {
    fn load(&self) -> Result<LoadedModels, ModelError> {
        Ok(LoadedModels {
            vehicle: Arc::new(StubVehicleModel),
            face: Arc::new(StubFaceModel),
        })
    }

    fn versions(&self) -> ModelVersions {
        ModelVersions {
            vehicle: "stub-vehicle/1".to_string(),
            face: "stub-face/1".to_string(),
        }
    }
}

pub struct StubVehicleModel;

impl VehicleModel for StubVehicleModel {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        let (width, height) = image.dimensions();

        Ok(vec![Detection {
            class_id: 2,
            confidence: 0.99,
            bbox: BoundingBox::new(0, 0, width, height),
        }])
    }
}

pub struct StubFaceModel;

impl FaceModel for StubFaceModel {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<FaceBox>, ModelError> {
        Ok(Vec::new())
    }
}
