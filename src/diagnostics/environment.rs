//! Runtime environment introspection
//!
//! Best-effort: ask the running server, else ask the interpreter directly,
//! else report `Unavailable`. Never fails.

use crate::server::InferenceServer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Python modules the classifier depends on: (import name, distribution)
pub const RUNTIME_MODULES: [(&str, &str); 6] = [
    ("tensorflow", "tensorflow"),
    ("keras", "keras"),
    ("numpy", "numpy"),
    ("PIL", "Pillow"),
    ("h5py", "h5py"),
    ("flask", "flask"),
];

/// Installation state of one runtime module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleStatus {
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub version: Option<String>,
}

/// Description of the inference runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    #[serde(alias = "python_version", alias = "runtime_version")]
    pub runtime_version: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleStatus>,
}

impl EnvironmentInfo {
    /// Names of required modules that are missing
    pub fn missing_modules(&self) -> Vec<String> {
        RUNTIME_MODULES
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| !self.modules.get(*name).map(|m| m.installed).unwrap_or(false))
            .map(str::to_string)
            .collect()
    }
}

/// Where the environment information came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentSource {
    Server,
    Interpreter,
}

/// Environment lookup outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnvironmentReport {
    Available {
        source: EnvironmentSource,
        #[serde(flatten)]
        info: EnvironmentInfo,
    },
    Unavailable {
        reason: String,
    },
}

impl EnvironmentReport {
    pub fn is_available(&self) -> bool {
        matches!(self, EnvironmentReport::Available { .. })
    }

    pub fn info(&self) -> Option<&EnvironmentInfo> {
        match self {
            EnvironmentReport::Available { info, .. } => Some(info),
            EnvironmentReport::Unavailable { .. } => None,
        }
    }
}

/// Collect environment information, degrading to `Unavailable`
pub async fn collect_environment(
    server: &dyn InferenceServer,
    python: &str,
    limit: Duration,
) -> EnvironmentReport {
    let server_error = if server.is_alive().await {
        match server.environment().await {
            Ok(info) => {
                return EnvironmentReport::Available {
                    source: EnvironmentSource::Server,
                    info,
                }
            }
            Err(e) => e.to_string(),
        }
    } else {
        "inference server not running".to_string()
    };

    match probe_interpreter(python, limit).await {
        Ok(info) => EnvironmentReport::Available {
            source: EnvironmentSource::Interpreter,
            info,
        },
        Err(probe_error) => EnvironmentReport::Unavailable {
            reason: format!("{}; {}", server_error, probe_error),
        },
    }
}

fn probe_script() -> String {
    let modules: Vec<String> = RUNTIME_MODULES
        .iter()
        .map(|(name, dist)| format!("({:?}, {:?})", name, dist))
        .collect();

    format!(
        r#"import json, platform, sys
import importlib.util
try:
    from importlib import metadata
except ImportError:
    metadata = None
mods = {{}}
for name, dist in [{}]:
    installed = importlib.util.find_spec(name) is not None
    version = None
    if installed and metadata is not None:
        try:
            version = metadata.version(dist)
        except Exception:
            pass
    mods[name] = {{"installed": installed, "version": version}}
print(json.dumps({{"python_version": platform.python_version(), "platform": sys.platform, "modules": mods}}))
"#,
        modules.join(", ")
    )
}

/// Run the interpreter with a small introspection script
pub async fn probe_interpreter(python: &str, limit: Duration) -> Result<EnvironmentInfo, String> {
    let mut command = Command::new(python);
    command.arg("-c").arg(probe_script()).kill_on_drop(true);

    let output = match timeout(limit, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("cannot run {}: {}", python, e)),
        Err(_) => return Err(format!("{} probe timed out after {:?}", python, limit)),
    };

    if !output.status.success() {
        return Err(format!(
            "{} probe failed: {}",
            python,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout.lines().last().unwrap_or_default();
    serde_json::from_str(line).map_err(|e| format!("unreadable probe output: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_server_payload() {
        let info: EnvironmentInfo = serde_json::from_str(
            r#"{"python_version": "3.10.12", "platform": "linux",
                "modules": {"tensorflow": {"installed": true, "version": "2.15.0"},
                            "numpy": {"installed": true, "version": "1.26.4"}}}"#,
        )
        .unwrap();
        assert_eq!(info.runtime_version, "3.10.12");
        assert_eq!(info.modules["tensorflow"].version.as_deref(), Some("2.15.0"));

        let missing = info.missing_modules();
        assert!(missing.contains(&"h5py".to_string()));
        assert!(!missing.contains(&"numpy".to_string()));
    }

    #[test]
    fn test_unavailable_report_shape() {
        let report = EnvironmentReport::Unavailable {
            reason: "python3 not found".to_string(),
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "unavailable");
        assert!(!report.is_available());
        assert!(report.info().is_none());
    }

    #[test]
    fn test_available_report_is_flat() {
        let report = EnvironmentReport::Available {
            source: EnvironmentSource::Interpreter,
            info: EnvironmentInfo {
                runtime_version: "3.11.4".to_string(),
                platform: "darwin".to_string(),
                modules: BTreeMap::new(),
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "available");
        assert_eq!(value["runtimeVersion"], "3.11.4");
        assert_eq!(value["source"], "interpreter");
    }

    #[test]
    fn test_probe_script_lists_modules() {
        let script = probe_script();
        assert!(script.contains("(\"PIL\", \"Pillow\")"));
        assert!(script.contains("json.dumps"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_degrades() {
        let result = probe_interpreter("/no/such/python", Duration::from_secs(2)).await;
        assert!(result.is_err());
    }
}
