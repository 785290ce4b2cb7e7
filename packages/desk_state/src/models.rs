use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Theme a fresh desktop starts with.
pub const DEFAULT_THEME: &str = "system7";

/// An open window. Geometry is unconstrained; `content` is owned by the window kind.
///
/// Missing fields decode to their zero values, so `{"id":"w1"}` is a valid window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Window {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub minimized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A virtual file. `modified` is supplied by the caller, never generated here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct File {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub modified: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub windows: Vec<Window>,
    pub files: Vec<File>,
    pub theme: String,
}

impl SystemState {
    pub fn with_theme(theme: impl Into<String>) -> Self {
        Self {
            windows: Vec::new(),
            files: Vec::new(),
            theme: theme.into(),
        }
    }
}

impl Default for SystemState {
    fn default() -> Self {
        Self::with_theme(DEFAULT_THEME)
    }
}

/// Body of a theme change, and the shape it is echoed back in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeUpdate {
    pub theme: String,
}

/// Content read back from the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedFile {
    pub name: String,
    pub content: String,
}

/// Immutable view of the state at one instant.
///
/// `version` increases with every committed mutation. It orders snapshots for
/// subscribers and is not part of the serialized form.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub state: Arc<SystemState>,
}

impl Snapshot {
    /// Serialize the state as sent to subscribers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self.state.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_window_kind_serializes_as_type() {
        let window = Window {
            id: "w1".to_string(),
            title: "Calculator".to_string(),
            kind: "app".to_string(),
            x: 10,
            y: 10,
            width: 200,
            height: 300,
            minimized: false,
            content: None,
        };
        let value = serde_json::to_value(&window).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "w1",
                "title": "Calculator",
                "type": "app",
                "x": 10,
                "y": 10,
                "width": 200,
                "height": 300,
                "minimized": false
            })
        );
    }

    #[test]
    fn test_window_content_present_when_set() {
        let window = Window {
            content: Some(String::new()),
            ..Default::default()
        };
        let value = serde_json::to_value(&window).unwrap();
        assert_eq!(value["content"], json!(""));
    }

    #[test]
    fn test_window_missing_fields_decode_to_zero_values() {
        let window: Window = serde_json::from_str(r#"{"id":"w9"}"#).unwrap();
        assert_eq!(window.id, "w9");
        assert_eq!(window.title, "");
        assert_eq!(window.width, 0);
        assert!(!window.minimized);
        assert!(window.content.is_none());
    }

    #[test]
    fn test_window_negative_geometry_accepted() {
        let window: Window =
            serde_json::from_str(r#"{"id":"w","x":-40,"y":-1,"width":-5,"height":0}"#).unwrap();
        assert_eq!(window.x, -40);
        assert_eq!(window.width, -5);
    }

    #[test]
    fn test_window_wrong_type_rejected() {
        let result = serde_json::from_str::<Window>(r#"{"id":"w","x":"left"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_file_round_trip_shape() {
        let file: File = serde_json::from_str(
            r#"{"name":"notes.txt","type":"text","content":"hi","modified":"2024-01-01"}"#,
        )
        .unwrap();
        assert_eq!(file.kind, "text");
        assert_eq!(file.content.as_deref(), Some("hi"));

        let without_content = File {
            content: None,
            ..file
        };
        let value = serde_json::to_value(&without_content).unwrap();
        assert!(value.get("content").is_none());
        assert_eq!(value["modified"], json!("2024-01-01"));
    }

    #[test]
    fn test_default_state() {
        let state = SystemState::default();
        assert!(state.windows.is_empty());
        assert!(state.files.is_empty());
        assert_eq!(state.theme, "system7");
    }

    #[test]
    fn test_snapshot_json_omits_version() {
        let snapshot = Snapshot {
            version: 42,
            state: Arc::new(SystemState::with_theme("dark")),
        };
        let value: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(value, json!({"windows": [], "files": [], "theme": "dark"}));
    }
}
