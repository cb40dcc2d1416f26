use std::env;
use std::time::Duration;

pub const DEFAULT_SPACE_ID: &str = "yisol/IDM-VTON";
pub const DEFAULT_HUB_URL: &str = "https://huggingface.co";

#[derive(Debug, Clone)]
pub struct TryOnConfig {
    pub hf_token: Option<String>,
    pub space_id: String,
    pub hub_url: String,
    pub duplicate_hardware: Option<String>,
    pub duplicate_timeout: Duration,
    pub runtime_poll_interval: Duration,
}

/// Arguments sent with every `/tryon` call. Callers cannot override them.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceParams {
    pub description: String,
    pub auto_mask: bool,
    pub auto_crop: bool,
    pub denoise_steps: u32,
    pub seed: u64,
}

impl Default for InferenceParams {
    fn default() -> Self {
        InferenceParams {
            description: "a photo of a garment".to_string(),
            auto_mask: true,
            auto_crop: false,
            denoise_steps: 30,
            seed: 42,
        }
    }
}

impl Default for TryOnConfig {
    fn default() -> Self {
        TryOnConfig {
            hf_token: None,
            space_id: DEFAULT_SPACE_ID.to_string(),
            hub_url: DEFAULT_HUB_URL.to_string(),
            duplicate_hardware: None,
            duplicate_timeout: Duration::from_secs(300),
            runtime_poll_interval: Duration::from_secs(5),
        }
    }
}

impl TryOnConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();

        let hf_token = env::var("HF_TOKEN")
            .or_else(|_| env::var("HUGGINGFACE_API_TOKEN"))
            .ok()
            .filter(|token| !token.trim().is_empty());
        let space_id = env::var("TRYON_SPACE_ID").unwrap_or(defaults.space_id);
        let hub_url = env::var("HF_HUB_URL").unwrap_or(defaults.hub_url);
        let duplicate_hardware = env::var("TRYON_DUPLICATE_HARDWARE").ok();
        let duplicate_timeout = env::var("TRYON_DUPLICATE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.duplicate_timeout);

        TryOnConfig {
            hf_token,
            space_id,
            hub_url,
            duplicate_hardware,
            duplicate_timeout,
            runtime_poll_interval: defaults.runtime_poll_interval,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.hf_token = Some(token.into());
        self
    }

    pub fn with_space(mut self, space_id: impl Into<String>) -> Self {
        self.space_id = space_id.into();
        self
    }

    pub fn with_hub_url(mut self, hub_url: impl Into<String>) -> Self {
        self.hub_url = hub_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_duplicate_hardware(mut self, hardware: impl Into<String>) -> Self {
        self.duplicate_hardware = Some(hardware.into());
        self
    }

    pub fn with_duplicate_timeout(mut self, timeout: Duration) -> Self {
        self.duplicate_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.runtime_poll_interval = interval;
        self
    }

    pub fn has_token(&self) -> bool {
        self.hf_token.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TryOnConfig::new();
        assert_eq!(config.space_id, "yisol/IDM-VTON");
        assert_eq!(config.hub_url, "https://huggingface.co");
        assert_eq!(config.duplicate_timeout, Duration::from_secs(300));
        assert!(!config.has_token());
    }

    #[test]
    fn test_builder() {
        let config = TryOnConfig::new()
            .with_token("hf_abc")
            .with_space("someone/other-vton")
            .with_hub_url("http://localhost:9000/")
            .with_duplicate_timeout(Duration::from_secs(10));

        assert_eq!(config.hf_token.as_deref(), Some("hf_abc"));
        assert_eq!(config.space_id, "someone/other-vton");
        assert_eq!(config.hub_url, "http://localhost:9000");
        assert_eq!(config.duplicate_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_inference_params_are_fixed() {
        let params = InferenceParams::default();
        assert!(params.auto_mask);
        assert!(!params.auto_crop);
        assert_eq!(params.denoise_steps, 30);
        assert_eq!(params.seed, 42);
    }
}
