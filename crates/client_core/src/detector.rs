//! Adapters from detector backends to per-cycle hand samples.
//!
//! The tracker only consumes [`DetectionCycle`]s. Each backend gets a thin
//! adapter that turns its raw output into samples in a known coordinate
//! space; thresholds belong to the adapter and never reach the core.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CoreError;

/// Landmark indices averaged to approximate the center of a hand.
const WRIST: usize = 0;
const MIDDLE_MCP: usize = 9;

/// Label some box detectors attach to the face box they also report.
const FACE_LABEL: &str = "face";

/// One detected hand for the current cycle. A sample without a usable
/// vertical coordinate is malformed and gets discarded by the tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandSample {
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    /// Advisory side/index label, unstable across cycles.
    #[serde(default)]
    pub label: Option<String>,
}

impl HandSample {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            label: None,
        }
    }

    pub fn malformed() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Vertical offset in pixels, or `None` if the sample is malformed.
    pub fn height(&self, space: CoordinateSpace) -> Option<f64> {
        if !self.x.is_some_and(f64::is_finite) {
            return None;
        }
        let y = self.y.filter(|y| y.is_finite())?;
        match space {
            CoordinateSpace::Pixels => Some(y),
            CoordinateSpace::Normalized { image_height } => Some(y * image_height),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoordinateSpace {
    Pixels,
    /// Coordinates in `[0, 1]`, scaled by the active image height.
    Normalized { image_height: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionCycle {
    pub samples: Vec<HandSample>,
    pub space: CoordinateSpace,
}

impl DetectionCycle {
    pub fn pixels(samples: Vec<HandSample>) -> Self {
        Self {
            samples,
            space: CoordinateSpace::Pixels,
        }
    }

    pub fn normalized(samples: Vec<HandSample>, image_height: f64) -> Self {
        Self {
            samples,
            space: CoordinateSpace::Normalized { image_height },
        }
    }
}

pub trait DetectorAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decodes one raw backend result (one JSON document) into a cycle.
    fn adapt_json(&self, raw: &str) -> Result<DetectionCycle, CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorBackend {
    Landmarks,
    BoundingBoxes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorThresholds {
    /// Minimum handedness score for the landmark backend.
    pub min_detection_confidence: f64,
    /// Minimum prediction score for the bounding-box backend.
    pub score_threshold: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            score_threshold: 0.35,
        }
    }
}

impl DetectorBackend {
    pub fn adapter(
        self,
        thresholds: &DetectorThresholds,
        image_height: f64,
    ) -> Box<dyn DetectorAdapter> {
        match self {
            DetectorBackend::Landmarks => Box::new(LandmarkAdapter {
                min_detection_confidence: thresholds.min_detection_confidence,
                default_image_height: image_height,
            }),
            DetectorBackend::BoundingBoxes => Box::new(BoundingBoxAdapter {
                score_threshold: thresholds.score_threshold,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Handedness {
    pub index: usize,
    pub label: String,
    #[serde(default = "full_score")]
    pub score: f64,
}

fn full_score() -> f64 {
    1.0
}

/// Hand landmarker output: 21 normalized landmarks per hand.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandmarkFrame {
    #[serde(default)]
    pub multi_hand_landmarks: Vec<Vec<Landmark>>,
    #[serde(default)]
    pub multi_handedness: Vec<Handedness>,
    /// Height of the frame the landmarks were normalized against.
    #[serde(default)]
    pub image_height: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct LandmarkAdapter {
    pub min_detection_confidence: f64,
    pub default_image_height: f64,
}

impl LandmarkAdapter {
    pub fn adapt(&self, frame: LandmarkFrame) -> DetectionCycle {
        let mut samples = Vec::with_capacity(frame.multi_hand_landmarks.len());
        for (index, landmarks) in frame.multi_hand_landmarks.iter().enumerate() {
            let handedness = frame
                .multi_handedness
                .iter()
                .find(|handedness| handedness.index == index);
            if handedness.is_some_and(|h| h.score < self.min_detection_confidence) {
                trace!(index, "landmarks: dropping low-confidence hand");
                continue;
            }

            let mut sample = match (landmarks.get(WRIST), landmarks.get(MIDDLE_MCP)) {
                (Some(wrist), Some(knuckle)) => {
                    HandSample::new((wrist.x + knuckle.x) / 2.0, (wrist.y + knuckle.y) / 2.0)
                }
                _ => HandSample::malformed(),
            };
            sample.label = handedness.map(|h| h.label.clone());
            samples.push(sample);
        }

        let image_height = frame
            .image_height
            .filter(|height| height.is_finite() && *height > 0.0)
            .unwrap_or(self.default_image_height);
        DetectionCycle::normalized(samples, image_height)
    }
}

impl DetectorAdapter for LandmarkAdapter {
    fn name(&self) -> &'static str {
        "landmarks"
    }

    fn adapt_json(&self, raw: &str) -> Result<DetectionCycle, CoreError> {
        let frame: LandmarkFrame = serde_json::from_str(raw)?;
        Ok(self.adapt(frame))
    }
}

/// One box from a hand detector, `[x, y, width, height]` in pixels.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BoxPrediction {
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "full_score")]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BoxFrame {
    #[serde(default)]
    pub predictions: Vec<BoxPrediction>,
}

#[derive(Debug, Clone)]
pub struct BoundingBoxAdapter {
    pub score_threshold: f64,
}

impl BoundingBoxAdapter {
    pub fn adapt(&self, frame: BoxFrame) -> DetectionCycle {
        let samples = frame
            .predictions
            .into_iter()
            .filter(|prediction| prediction.label.as_deref() != Some(FACE_LABEL))
            .filter(|prediction| prediction.score >= self.score_threshold)
            .map(|prediction| {
                let sample = match prediction.bbox.as_deref() {
                    Some([x, y, width, height]) => {
                        HandSample::new(x + width / 2.0, y + height / 2.0)
                    }
                    _ => HandSample::malformed(),
                };
                HandSample {
                    label: prediction.label,
                    ..sample
                }
            })
            .collect();
        DetectionCycle::pixels(samples)
    }
}

impl DetectorAdapter for BoundingBoxAdapter {
    fn name(&self) -> &'static str {
        "bounding_boxes"
    }

    fn adapt_json(&self, raw: &str) -> Result<DetectionCycle, CoreError> {
        let frame: BoxFrame = serde_json::from_str(raw)?;
        Ok(self.adapt(frame))
    }
}

#[cfg(test)]
#[path = "tests/detector_tests.rs"]
mod tests;
