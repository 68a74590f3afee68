//! Request and response shapes of the operation surface

use crate::types::ImageInput;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// One call from the UI layer.
///
/// On the wire this is `{ "method": ..., "params": ... }`. `params` may be
/// omitted, `null` or `{}` for methods that take no arguments or only
/// optional ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Envelope")]
pub enum Request {
    LocateModel,
    BrowseForModel,
    ValidateModel {
        path: PathBuf,
    },
    LoadModel {
        path: Option<PathBuf>,
    },
    ReloadModel {
        path: PathBuf,
    },
    IsServerRunning,
    /// `image` is a file path, a data URL or bare base64
    Analyze {
        image: String,
    },
    GetEnvironmentInfo,
    SessionStatus,
}

impl Request {
    /// Wire name of the method
    pub fn method(&self) -> &'static str {
        match self {
            Request::LocateModel => "locateModel",
            Request::BrowseForModel => "browseForModel",
            Request::ValidateModel { .. } => "validateModel",
            Request::LoadModel { .. } => "loadModel",
            Request::ReloadModel { .. } => "reloadModel",
            Request::IsServerRunning => "isServerRunning",
            Request::Analyze { .. } => "analyze",
            Request::GetEnvironmentInfo => "getEnvironmentInfo",
            Request::SessionStatus => "sessionStatus",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct PathParams {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct OptionalPathParams {
    #[serde(default)]
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeParams {
    image: String,
}

fn params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T, String> {
    let params = if params.is_null() { Value::Object(Map::new()) } else { params };
    serde_json::from_value(params).map_err(|e| format!("invalid params for {}: {}", method, e))
}

impl TryFrom<Envelope> for Request {
    type Error = String;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let Envelope { method, params: raw } = envelope;
        let request = match method.as_str() {
            "locateModel" => Request::LocateModel,
            "browseForModel" => Request::BrowseForModel,
            "validateModel" => {
                let PathParams { path } = params(&method, raw)?;
                Request::ValidateModel { path }
            }
            "loadModel" => {
                let OptionalPathParams { path } = params(&method, raw)?;
                Request::LoadModel { path }
            }
            "reloadModel" => {
                let PathParams { path } = params(&method, raw)?;
                Request::ReloadModel { path }
            }
            "isServerRunning" => Request::IsServerRunning,
            "analyze" => {
                let AnalyzeParams { image } = params(&method, raw)?;
                Request::Analyze { image }
            }
            "getEnvironmentInfo" => Request::GetEnvironmentInfo,
            "sessionStatus" => Request::SessionStatus,
            other => return Err(format!("unknown method `{}`", other)),
        };
        Ok(request)
    }
}

/// Interpret the `image` parameter of an analyze request
pub fn image_input(image: String) -> ImageInput {
    if image.starts_with("data:") {
        ImageInput::Data(image)
    } else if Path::new(&image).is_file() {
        ImageInput::Path(PathBuf::from(image))
    } else {
        ImageInput::Data(image)
    }
}

/// `{ ok, data }` on success, `{ ok, error }` on failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_requests_with_params() {
        let request: Request = serde_json::from_value(json!({
            "method": "validateModel",
            "params": {"path": "/models/model.h5"}
        }))
        .unwrap();
        assert_eq!(
            request,
            Request::ValidateModel {
                path: PathBuf::from("/models/model.h5")
            }
        );
        assert_eq!(request.method(), "validateModel");

        let request: Request = serde_json::from_value(json!({
            "method": "loadModel",
            "params": {}
        }))
        .unwrap();
        assert_eq!(request, Request::LoadModel { path: None });
    }

    #[test]
    fn test_params_may_be_omitted() {
        for body in [
            json!({"method": "loadModel"}),
            json!({"method": "loadModel", "params": null}),
            json!({"method": "loadModel", "params": {}}),
        ] {
            let request: Request = serde_json::from_value(body.clone()).unwrap();
            assert_eq!(request, Request::LoadModel { path: None }, "body: {}", body);
        }

        for body in [
            json!({"method": "locateModel"}),
            json!({"method": "locateModel", "params": null}),
            json!({"method": "locateModel", "params": {}}),
        ] {
            let request: Request = serde_json::from_value(body.clone()).unwrap();
            assert_eq!(request, Request::LocateModel, "body: {}", body);
        }

        let request: Request = serde_json::from_str(r#"{"method":"sessionStatus"}"#).unwrap();
        assert_eq!(request, Request::SessionStatus);
    }

    #[test]
    fn test_required_params_are_enforced() {
        assert!(serde_json::from_value::<Request>(json!({"method": "validateModel"})).is_err());
        assert!(serde_json::from_value::<Request>(json!({"method": "reloadModel", "params": {}})).is_err());
        assert!(serde_json::from_value::<Request>(json!({"method": "analyze", "params": null})).is_err());

        let request: Request = serde_json::from_value(json!({
            "method": "analyze",
            "params": {"image": "data:image/png;base64,AAAA"}
        }))
        .unwrap();
        assert_eq!(request.method(), "analyze");
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let parsed = serde_json::from_value::<Request>(json!({"method": "formatDisk", "params": {}}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_image_input_detection() {
        assert!(matches!(
            image_input("data:image/png;base64,AAAA".to_string()),
            ImageInput::Data(_)
        ));
        assert!(matches!(image_input("iVBORw0KGgo=".to_string()), ImageInput::Data(_)));

        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().display().to_string();
        assert_eq!(image_input(path.clone()), ImageInput::Path(PathBuf::from(path)));
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::success(json!(true))).unwrap();
        assert_eq!(ok, json!({"ok": true, "data": true}));

        let err = serde_json::to_value(Response::failure("boom")).unwrap();
        assert_eq!(err, json!({"ok": false, "error": "boom"}));
    }
}
