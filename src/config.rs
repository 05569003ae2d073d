use serde::{Deserialize, Serialize};

use crate::checklist::CHECKED_SUFFIX;
use crate::drawing::DEFAULT_HEIGHT;

/// Editor behaviour knobs, read from the settings JSON the backend hands over.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EditorConfig {
    /// Idle time after the last edit before an autosave fires.
    pub autosave_idle_ms: u64,
    pub checked_suffix: String,
    pub default_code_language: String,
    pub spinner: String,
    pub drawing_height: u32,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            autosave_idle_ms: 10_000,
            checked_suffix: CHECKED_SUFFIX.to_string(),
            default_code_language: "plaintext".to_string(),
            spinner: "✨".to_string(),
            drawing_height: DEFAULT_HEIGHT,
        }
    }
}

impl EditorConfig {
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<EditorConfig>(raw) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("unreadable editor config, using defaults: {err}");
                EditorConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EditorConfig::from_json(r#"{"autosaveIdleMs": 2500}"#);
        assert_eq!(config.autosave_idle_ms, 2500);
        assert_eq!(config.checked_suffix, "✓");
        assert_eq!(config.default_code_language, "plaintext");
    }

    #[test]
    fn malformed_json_falls_back() {
        assert_eq!(EditorConfig::from_json("{not json"), EditorConfig::default());
        assert_eq!(EditorConfig::from_json(""), EditorConfig::default());
    }

    #[test]
    fn writes_camel_case_keys() {
        let json = serde_json::to_string(&EditorConfig::default()).unwrap();
        assert!(json.contains("\"autosaveIdleMs\":10000"));
        assert!(json.contains("\"drawingHeight\":300"));
    }
}
