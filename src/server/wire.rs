//! Inference server request/response shapes
//!
//! The server owns its response format, so parsing here is deliberately
//! lenient: several field spellings are accepted and anything missing is
//! reported as a malformed response rather than a panic.

use crate::errors::{BridgeError, Result};
use crate::types::{BoundingBox, CellType, PredictionResult};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// `POST /load_model` body
#[derive(Debug, Clone, Serialize)]
pub struct LoadModelRequest {
    pub model_path: String,
}

/// `POST /predict` body
#[derive(Debug, Clone, Serialize)]
pub struct PredictRequest {
    pub image: String,
}

const LABEL_KEYS: [&str; 6] = ["class", "label", "prediction", "predicted_class", "cell_type", "cellType"];
const INDEX_KEYS: [&str; 3] = ["class_index", "predicted_index", "index"];
const CONFIDENCE_KEYS: [&str; 3] = ["confidence", "probability", "score"];
const BBOX_KEYS: [&str; 3] = ["bbox", "bounding_box", "boundingBox"];

/// Extract an error message from a server body, if it carries one
pub fn error_message(body: &Value) -> Option<String> {
    ["error", "message", "detail"]
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Interpret a `/load_model` response body.
///
/// A 2xx body is accepted unless it says `success: false`.
pub fn interpret_load_response(body: &Value) -> Result<()> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = error_message(body).unwrap_or_else(|| "server could not load model".to_string());
        return Err(BridgeError::ServerRejectedModel(message));
    }
    Ok(())
}

/// Map a `/predict` response body into a real prediction
pub fn parse_prediction(body: &Value) -> Result<PredictionResult> {
    if body.get("success").and_then(Value::as_bool) == Some(false) || reports_error(body) {
        let message = error_message(body).unwrap_or_else(|| "prediction failed".to_string());
        return Err(BridgeError::TransientAnalysis(message));
    }

    let probabilities = parse_probabilities(body);

    let cell_type = parse_label(body)
        .or_else(|| {
            probabilities.as_ref().and_then(|p| {
                p.iter()
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(cell, _)| *cell)
            })
        })
        .ok_or_else(|| malformed("missing class label"))?;

    let confidence = CONFIDENCE_KEYS
        .iter()
        .find_map(|k| body.get(*k).and_then(Value::as_f64))
        .map(normalize_confidence)
        .or_else(|| probabilities.as_ref().and_then(|p| p.get(&cell_type).copied()))
        .ok_or_else(|| malformed("missing confidence"))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(malformed("confidence out of range"));
    }

    let mut result = PredictionResult::real(cell_type, confidence);
    if let Some(bbox) = BBOX_KEYS.iter().find_map(|k| body.get(*k)).and_then(parse_bbox) {
        result = result.with_bounding_box(bbox);
    }
    if let Some(probabilities) = probabilities {
        result = result.with_probabilities(probabilities);
    }
    Ok(result)
}

/// `"error": null` and `"error": false` are how some servers say "no error"
fn reports_error(body: &Value) -> bool {
    !matches!(body.get("error"), None | Some(Value::Null) | Some(Value::Bool(false)))
}

fn malformed(what: &str) -> BridgeError {
    BridgeError::TransientAnalysis(format!("malformed prediction response: {}", what))
}

fn parse_label(body: &Value) -> Option<CellType> {
    let by_name = LABEL_KEYS
        .iter()
        .filter_map(|k| body.get(*k).and_then(Value::as_str))
        .find_map(|label| label.parse::<CellType>().ok());

    by_name.or_else(|| {
        INDEX_KEYS
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_u64))
            .and_then(|i| CellType::from_model_index(i as usize))
    })
}

/// Servers report either a fraction or a percentage
fn normalize_confidence(value: f64) -> f64 {
    if value > 1.0 && value <= 100.0 {
        value / 100.0
    } else {
        value
    }
}

fn parse_probabilities(body: &Value) -> Option<HashMap<CellType, f64>> {
    match body.get("probabilities")? {
        Value::Object(map) => {
            let parsed: HashMap<CellType, f64> = map
                .iter()
                .filter_map(|(label, p)| Some((label.parse::<CellType>().ok()?, normalize_confidence(p.as_f64()?))))
                .collect();
            (!parsed.is_empty()).then_some(parsed)
        }
        Value::Array(values) if values.len() == CellType::MODEL_ORDER.len() => values
            .iter()
            .zip(CellType::MODEL_ORDER)
            .map(|(p, cell)| p.as_f64().map(|p| (cell, normalize_confidence(p))))
            .collect(),
        _ => None,
    }
}

fn parse_bbox(value: &Value) -> Option<BoundingBox> {
    match value {
        Value::Object(map) => {
            let get = |keys: &[&str]| keys.iter().find_map(|k| map.get(*k).and_then(Value::as_f64));
            Some(BoundingBox {
                x: get(&["x"])?,
                y: get(&["y"])?,
                w: get(&["w", "width"])?,
                h: get(&["h", "height"])?,
            })
        }
        Value::Array(values) if values.len() == 4 => {
            let v: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            (v.len() == 4).then(|| BoundingBox { x: v[0], y: v[1], w: v[2], h: v[3] })
        }
        _ => None,
    }
}
