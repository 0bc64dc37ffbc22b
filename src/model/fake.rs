use crate::model::detector::{FaceModel, LoadedModels, ModelProvider, VehicleModel};
use crate::model::error::ModelError;
use crate::model::types::{BoundingBox, Detection, FaceBox, ModelVersions};
use image::RgbImage;
use std::sync::{Arc, Mutex};

/// Fake models scripted through marker pixels, for pipeline tests.
///
/// The top-left pixel of a test image encodes the scenario:
/// - red channel >= 128: one vehicle detection at confidence 0.95
/// - red channel in [64, 128): one vehicle detection at confidence 0.5
///   (below the default threshold)
/// - blue channel / 32: number of faces, each at confidence 0.9
///
/// `crate::test_utils::test_image` builds images in this encoding.
///
/// Clones share the same failure switches, so a test can keep a handle after
/// handing the provider to a manager.
#[derive(Clone)]
pub struct FakeModelProvider {
    fail_face_next: Arc<Mutex<Option<String>>>,
}

impl FakeModelProvider {
    pub fn new() -> Self {
        Self {
            fail_face_next: Arc::new(Mutex::new(None)),
        }
    }

    /// Make the next face-model invocation fail with an inference error
    pub fn fake_fail_next_face_pass(&self, message: &str) {
        let mut fail = self.fail_face_next.lock().unwrap();
        *fail = Some(message.to_string());
    }
}

impl Default for FakeModelProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelProvider for FakeModelProvider {
    fn load(&self) -> Result<LoadedModels, ModelError> {
        Ok(LoadedModels {
            vehicle: Arc::new(FakeVehicleModel),
            face: Arc::new(FakeFaceModel {
                fail_next: self.fail_face_next.clone(),
            }),
        })
    }

    fn versions(&self) -> ModelVersions {
        ModelVersions {
            vehicle: "fake-vehicle/1".to_string(),
            face: "fake-face/1".to_string(),
        }
    }
}

pub struct FakeVehicleModel;

impl VehicleModel for FakeVehicleModel {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        let marker = image.get_pixel(0, 0);
        let (width, height) = image.dimensions();

        let confidence = match marker.0[0] {
            red if red >= 128 => 0.95,
            red if red >= 64 => 0.5,
            _ => return Ok(Vec::new()),
        };

        Ok(vec![Detection {
            class_id: 2,
            confidence,
            bbox: BoundingBox::new(0, 0, width / 2, height),
        }])
    }
}

pub struct FakeFaceModel {
    fail_next: Arc<Mutex<Option<String>>>,
}

impl FaceModel for FakeFaceModel {
    fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, ModelError> {
        {
            let mut fail = self.fail_next.lock().unwrap();
            if let Some(message) = fail.take() {
                return Err(ModelError::Inference(message));
            }
        }

        let marker = image.get_pixel(0, 0);
        let face_count = usize::from(marker.0[2] / 32);

        Ok((0..face_count)
            .map(|i| FaceBox {
                confidence: 0.9,
                bbox: BoundingBox::new(16 * (i as u32 + 1), 16, 8, 8),
            })
            .collect())
    }
}
