//! Client for hosted virtual try-on models served as Gradio apps on
//! Hugging Face Spaces.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod gradio;
pub mod logger;
pub mod models;
pub mod normalizer;
pub mod session;
pub mod tryon;

pub use config::{InferenceParams, TryOnConfig};
pub use error::{Result, TryOnError};
pub use fetcher::ImageFetcher;
pub use gradio::{GradioClient, HubConnector};
pub use models::*;
pub use normalizer::ResultNormalizer;
pub use session::{SessionManager, SpaceConnector};
pub use tryon::TryOnClient;
