//! Prediction result and image input types

use crate::errors::Result;
use crate::types::cell::CellType;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Region of the image containing the classified cell, in percent of the
/// image width/height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    /// Clamp every edge into the 0..=100 percent range
    pub fn clamped(self) -> Self {
        let x = self.x.clamp(0.0, 100.0);
        let y = self.y.clamp(0.0, 100.0);
        Self {
            x,
            y,
            w: self.w.clamp(0.0, 100.0 - x),
            h: self.h.clamp(0.0, 100.0 - y),
        }
    }
}

/// Outcome of one analyze call.
///
/// `simulated` is always present so a synthesized result can never be
/// mistaken for a real inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub analysis_id: Uuid,
    pub cell_type: CellType,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<HashMap<CellType, f64>>,
}

impl PredictionResult {
    /// Result sourced from the inference server
    pub fn real(cell_type: CellType, confidence: f64) -> Self {
        Self::build(cell_type, confidence, false)
    }

    /// Result synthesized locally
    pub fn simulated(cell_type: CellType, confidence: f64) -> Self {
        Self::build(cell_type, confidence, true)
    }

    fn build(cell_type: CellType, confidence: f64, simulated: bool) -> Self {
        Self {
            analysis_id: Uuid::new_v4(),
            cell_type,
            confidence: confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
            bounding_box: None,
            simulated,
            probabilities: None,
        }
    }

    pub fn with_bounding_box(mut self, bbox: BoundingBox) -> Self {
        self.bounding_box = Some(bbox.clamped());
        self
    }

    pub fn with_probabilities(mut self, probabilities: HashMap<CellType, f64>) -> Self {
        self.probabilities = Some(probabilities);
        self
    }

    /// Confidence as a whole percentage for display
    pub fn confidence_percent(&self) -> f64 {
        (self.confidence * 1000.0).round() / 10.0
    }
}

/// Image handed to the bridge for analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageInput {
    /// Image file on disk; encoded as a data URL before sending
    Path(PathBuf),
    /// Data URL or bare base64 string, passed through unchanged
    Data(String),
}

impl ImageInput {
    /// Produce the `image` field of a predict request
    pub async fn to_payload(&self) -> Result<String> {
        match self {
            ImageInput::Data(data) => Ok(data.clone()),
            ImageInput::Path(path) => {
                let bytes = tokio::fs::read(path).await?;
                Ok(format!(
                    "data:{};base64,{}",
                    mime_for(path),
                    STANDARD.encode(bytes)
                ))
            }
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            ImageInput::Path(path) => path.display().to_string(),
            ImageInput::Data(data) => format!("<inline image, {} chars>", data.len()),
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}
