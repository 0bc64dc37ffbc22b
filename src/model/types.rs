use serde::{Deserialize, Serialize};

/// COCO class ids the pipeline treats as vehicles: car, motorcycle, bus, truck.
pub const VEHICLE_CLASS_IDS: [u32; 4] = [2, 3, 5, 7];

/// Axis-aligned box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn as_array(&self) -> [u32; 4] {
        [self.x, self.y, self.width, self.height]
    }
}

/// A single object detection from the vehicle model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn is_vehicle(&self) -> bool {
        VEHICLE_CLASS_IDS.contains(&self.class_id)
    }
}

/// A single face detection from the face model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Full result of the vehicle pass, persisted as the detection blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleReport {
    pub vehicle_detected: bool,
    pub detection_count: usize,
    pub boxes: Vec<[u32; 4]>,
    pub confidences: Vec<f32>,
    pub class_ids: Vec<u32>,
}

/// Result of the face pass: count, boxes, confidences, and a short reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceMeta {
    pub face_count: usize,
    pub boxes: Vec<[u32; 4]>,
    pub confidences: Vec<f32>,
    pub reason: String,
}

impl FaceMeta {
    pub fn none() -> Self {
        Self {
            face_count: 0,
            boxes: Vec::new(),
            confidences: Vec::new(),
            reason: "no faces detected".to_string(),
        }
    }
}

/// Versions of the two models, reported in completion payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelVersions {
    pub vehicle: String,
    pub face: String,
}
