use crate::config::ModelConfig;
use crate::model::detector::{FaceModel, LoadedModels, ModelProvider, VehicleModel};
use crate::model::error::ModelError;
use crate::model::fake::FakeModelProvider;
use crate::model::manager::ModelManager;
use crate::model::types::{BoundingBox, Detection, FaceBox, ModelVersions};
use crate::test_utils::{test_image, test_image_low_confidence};
use bytes::Bytes;
use image::RgbImage;
use std::sync::Arc;

fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "fake".to_string(),
        car_confidence_threshold: 0.8,
        face_confidence_threshold: 0.8,
    }
}

fn fake_manager() -> ModelManager {
    ModelManager::new(Box::new(FakeModelProvider::new()), &test_model_config())
}

#[tokio::test]
async fn vehicle_above_threshold_is_detected() {
    let manager = fake_manager();

    let report = manager.detect_vehicles(test_image(true, 0)).await.unwrap();

    assert!(report.vehicle_detected);
    assert_eq!(report.detection_count, 1);
    assert_eq!(report.class_ids, vec![2]);
}

#[tokio::test]
async fn no_detections_means_no_vehicle() {
    let manager = fake_manager();

    let report = manager.detect_vehicles(test_image(false, 0)).await.unwrap();

    assert!(!report.vehicle_detected);
    assert_eq!(report.detection_count, 0);
}

#[tokio::test]
async fn vehicle_below_confidence_threshold_is_not_detected() {
    let manager = fake_manager();

    let report = manager
        .detect_vehicles(test_image_low_confidence())
        .await
        .unwrap();

    // The detection is present in the report but does not count as a vehicle
    assert!(!report.vehicle_detected);
    assert_eq!(report.detection_count, 1);
}

#[tokio::test]
async fn undecodable_bytes_fail_with_decode_error() {
    let manager = fake_manager();

    let err = manager
        .detect_vehicles(Bytes::from_static(b"definitely not an image"))
        .await
        .unwrap_err();

    assert!(matches!(err, ModelError::Decode(_)));
}

#[tokio::test]
async fn zero_faces_returns_reencoded_image_and_empty_meta() {
    let manager = fake_manager();
    let original = test_image(true, 0);

    let (processed, meta) = manager
        .detect_and_blur_faces(original.clone(), "image/png")
        .await
        .unwrap();

    assert_eq!(meta.face_count, 0);
    assert!(meta.boxes.is_empty());

    let before = image::load_from_memory(&original).unwrap();
    let after = image::load_from_memory(&processed).unwrap();
    assert_eq!(before.to_rgb8().dimensions(), after.to_rgb8().dimensions());
}

#[tokio::test]
async fn faces_are_counted_and_regions_blurred() {
    let manager = fake_manager();

    // Checkerboard texture inside the face box so blurring visibly mixes pixels.
    // Pixel (0,0) carries the marker: vehicle present, two faces.
    let mut image = RgbImage::from_pixel(128, 64, image::Rgb([200, 60, 64]));
    for y in 16..24 {
        for x in 16..24 {
            if (x + y) % 2 == 0 {
                image.put_pixel(x, y, image::Rgb([255, 255, 255]));
            } else {
                image.put_pixel(x, y, image::Rgb([0, 0, 0]));
            }
        }
    }
    let mut encoded = Vec::new();
    image::DynamicImage::ImageRgb8(image.clone())
        .write_to(
            &mut std::io::Cursor::new(&mut encoded),
            image::ImageFormat::Png,
        )
        .unwrap();

    let (processed, meta) = manager
        .detect_and_blur_faces(Bytes::from(encoded), "image/png")
        .await
        .unwrap();

    assert_eq!(meta.face_count, 2);
    assert_eq!(meta.boxes.len(), 2);
    assert_eq!(meta.reason, "face regions blurred");

    let after = image::load_from_memory(&processed).unwrap().to_rgb8();
    let changed = (16..24)
        .flat_map(|y| (16..24).map(move |x| (x, y)))
        .any(|(x, y)| after.get_pixel(x, y) != image.get_pixel(x, y));
    assert!(changed, "face region should differ after blurring");
}

#[tokio::test]
async fn processed_bytes_keep_the_original_container_format() {
    let manager = fake_manager();
    let original = test_image(true, 0);

    for (content_type, expected) in [
        ("image/png", image::ImageFormat::Png),
        ("image/webp", image::ImageFormat::WebP),
        ("image/jpeg", image::ImageFormat::Jpeg),
        ("image/x-unknown", image::ImageFormat::Jpeg),
    ] {
        let (processed, _) = manager
            .detect_and_blur_faces(original.clone(), content_type)
            .await
            .unwrap();

        assert_eq!(
            image::guess_format(&processed).unwrap(),
            expected,
            "unexpected container for {}",
            content_type
        );
    }
}

#[tokio::test]
async fn face_model_failure_surfaces_as_inference_error() {
    let provider = FakeModelProvider::new();
    provider.fake_fail_next_face_pass("backend unavailable");
    let manager = ModelManager::new(Box::new(provider), &test_model_config());

    let err = manager
        .detect_and_blur_faces(test_image(true, 1), "image/png")
        .await
        .unwrap_err();

    assert!(matches!(err, ModelError::Inference(_)));
}

struct OutOfBoundsFaceModel;

impl FaceModel for OutOfBoundsFaceModel {
    fn detect(&self, _image: &RgbImage) -> Result<Vec<FaceBox>, ModelError> {
        Ok(vec![FaceBox {
            confidence: 0.99,
            bbox: BoundingBox::new(10_000, 10_000, 8, 8),
        }])
    }
}

struct AlwaysVehicleModel;

impl VehicleModel for AlwaysVehicleModel {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ModelError> {
        let (width, height) = image.dimensions();
        Ok(vec![Detection {
            class_id: 2,
            confidence: 0.99,
            bbox: BoundingBox::new(0, 0, width, height),
        }])
    }
}

struct OutOfBoundsProvider;

impl ModelProvider for OutOfBoundsProvider {
    fn load(&self) -> Result<LoadedModels, ModelError> {
        Ok(LoadedModels {
            vehicle: Arc::new(AlwaysVehicleModel),
            face: Arc::new(OutOfBoundsFaceModel),
        })
    }

    fn versions(&self) -> ModelVersions {
        ModelVersions {
            vehicle: "test/1".to_string(),
            face: "test/1".to_string(),
        }
    }
}

#[tokio::test]
async fn face_box_outside_image_is_invalid_output() {
    let manager = ModelManager::new(Box::new(OutOfBoundsProvider), &test_model_config());

    let err = manager
        .detect_and_blur_faces(test_image(true, 0), "image/png")
        .await
        .unwrap_err();

    assert!(matches!(err, ModelError::InvalidOutput(_)));
}
