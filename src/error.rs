use thiserror::Error;

#[derive(Debug, Error)]
pub enum TryOnError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Unexpected output format from Gradio client")]
    Format,

    /// Status and body are logged where the error is raised; the message
    /// returned to callers stays generic.
    #[error("Remote inference failed{}", status_suffix(.status))]
    RemoteInference { status: Option<u16>, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TryOnError {
    pub fn missing_credential() -> Self {
        TryOnError::Configuration(
            "missing required credential: set HF_TOKEN to a Hugging Face access token".into(),
        )
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, TryOnError>;
