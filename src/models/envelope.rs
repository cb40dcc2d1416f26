use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// File reference in the shape Gradio exchanges on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default)]
    pub meta: FileMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

impl Default for FileMeta {
    fn default() -> Self {
        FileMeta {
            kind: "gradio.FileData".to_string(),
        }
    }
}

impl FileData {
    /// Reference to a file already uploaded to the app's temp storage.
    pub fn uploaded(path: impl Into<String>, orig_name: impl Into<String>, size: usize) -> Self {
        FileData {
            path: path.into(),
            url: None,
            orig_name: Some(orig_name.into()),
            mime_type: None,
            size: Some(size as u64),
            meta: FileMeta::default(),
        }
    }
}

/// Value of an `ImageEditor` input: a background plus drawn layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageEditorValue {
    pub background: Option<FileData>,
    pub layers: Vec<FileData>,
    pub composite: Option<FileData>,
}

impl ImageEditorValue {
    pub fn background_only(background: FileData) -> Self {
        ImageEditorValue {
            background: Some(background),
            layers: Vec::new(),
            composite: None,
        }
    }
}

/// The try-on image as returned by the remote app, decoded by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputImage {
    /// Object carrying a fetchable `url` field.
    RemoteUrl(String),
    /// Object carrying only a filesystem `path`; valid on same-host deployments.
    LocalPath(PathBuf),
    /// A bare string that is itself an HTTP(S) URL.
    BareUrl(String),
    /// Bytes inlined in the response as a base64 data URL.
    Blob { mime_type: String, data: Vec<u8> },
    Unrecognized(Value),
}

impl OutputImage {
    /// Decodes one output value. Shapes are checked in a fixed order and the
    /// first match wins.
    pub fn from_value(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if let Some(url) = map.get("url").and_then(Value::as_str) {
                if looks_like_http_url(url) {
                    return OutputImage::RemoteUrl(url.to_string());
                }
            }
            if let Some(path) = map.get("path").and_then(Value::as_str) {
                if !path.is_empty() {
                    return OutputImage::LocalPath(PathBuf::from(path));
                }
            }
        }

        if let Value::String(s) = &value {
            if looks_like_http_url(s) {
                return OutputImage::BareUrl(s.clone());
            }
            if let Some((mime_type, data)) = decode_data_url(s) {
                return OutputImage::Blob { mime_type, data };
            }
        }

        OutputImage::Unrecognized(value)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            OutputImage::RemoteUrl(_) => "remote-url",
            OutputImage::LocalPath(_) => "local-path",
            OutputImage::BareUrl(_) => "bare-url",
            OutputImage::Blob { .. } => "blob",
            OutputImage::Unrecognized(_) => "unrecognized",
        }
    }
}

pub fn looks_like_http_url(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn decode_data_url(s: &str) -> Option<(String, Vec<u8>)> {
    let rest = s.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let data = STANDARD.decode(payload.trim()).ok()?;
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    Some((mime_type.to_string(), data))
}
