use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Outcome of a single try-on call. Processing time is in milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum TryOnResult {
    Success {
        image_buffer: Vec<u8>,
        processing_time: u64,
    },
    Failure {
        error: String,
        processing_time: u64,
    },
}

impl TryOnResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TryOnResult::Success { .. })
    }

    pub fn processing_time(&self) -> u64 {
        match self {
            TryOnResult::Success {
                processing_time, ..
            }
            | TryOnResult::Failure {
                processing_time, ..
            } => *processing_time,
        }
    }

    pub fn image(&self) -> Option<&[u8]> {
        match self {
            TryOnResult::Success { image_buffer, .. } => Some(image_buffer),
            TryOnResult::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            TryOnResult::Success { .. } => None,
            TryOnResult::Failure { error, .. } => Some(error),
        }
    }
}

// Wire shape: {success, imageBuffer (base64) | error, processingTime}
impl Serialize for TryOnResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TryOnResult", 3)?;
        match self {
            TryOnResult::Success {
                image_buffer,
                processing_time,
            } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("imageBuffer", &STANDARD.encode(image_buffer))?;
                state.serialize_field("processingTime", processing_time)?;
            }
            TryOnResult::Failure {
                error,
                processing_time,
            } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
                state.serialize_field("processingTime", processing_time)?;
            }
        }
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelStatus {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelStatus {
    pub fn available(status: impl Into<String>) -> Self {
        ModelStatus {
            available: true,
            status: Some(status.into()),
            error: None,
        }
    }

    pub fn unavailable(error: impl Into<String>) -> Self {
        ModelStatus {
            available: false,
            status: None,
            error: Some(error.into()),
        }
    }
}
