use std::sync::Arc;

use reqwest::Client;
use serde_json::{json, Value};

use crate::{
    config::{InferenceParams, TryOnConfig},
    error::{Result, TryOnError},
    fetcher::ImageFetcher,
    gradio::{GradioClient, HubConnector},
    logger::Timer,
    models::{FileData, ImageEditorValue, ModelStatus, OutputImage, TryOnRequest, TryOnResult},
    normalizer::ResultNormalizer,
    session::{SessionManager, SpaceConnector},
};

pub const TRYON_ENDPOINT: &str = "/tryon";

pub struct TryOnClient {
    session: SessionManager,
    fetcher: ImageFetcher,
    normalizer: ResultNormalizer,
    params: InferenceParams,
}

impl TryOnClient {
    pub fn new(config: TryOnConfig) -> Self {
        let client = Client::new();
        let connector = Arc::new(HubConnector::with_client(client.clone(), &config));
        Self::build(config, connector, client)
    }

    pub fn from_env() -> Self {
        Self::new(TryOnConfig::from_env())
    }

    /// Uses a caller-supplied connector in place of the Hub.
    pub fn with_connector(config: TryOnConfig, connector: Arc<dyn SpaceConnector>) -> Self {
        Self::build(config, connector, Client::new())
    }

    fn build(config: TryOnConfig, connector: Arc<dyn SpaceConnector>, client: Client) -> Self {
        let fetcher = ImageFetcher::new(client);
        Self {
            session: SessionManager::new(connector, config.space_id, config.hf_token),
            normalizer: ResultNormalizer::new(fetcher.clone()),
            fetcher,
            params: InferenceParams::default(),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn params(&self) -> &InferenceParams {
        &self.params
    }

    /// Runs one try-on end to end. Never fails: errors come back as
    /// `TryOnResult::Failure` and drop the session handle that was used.
    pub async fn perform_try_on(&self, person_image_url: &str, garment_image_url: &str) -> TryOnResult {
        let timer = Timer::new("try-on");
        let request = TryOnRequest::new(person_image_url, garment_image_url);

        let outcome = match self.session.acquire().await {
            Ok(session) => {
                let outcome = self.run(&session, &request).await;
                if outcome.is_err() {
                    self.session.invalidate_handle(&session).await;
                }
                outcome
            }
            Err(err) => Err(err),
        };

        match outcome {
            Ok(image_buffer) => {
                let processing_time = timer.elapsed_ms();
                log::info!(
                    "Try-on finished: {} bytes in {}ms",
                    image_buffer.len(),
                    processing_time
                );
                TryOnResult::Success {
                    image_buffer,
                    processing_time,
                }
            }
            Err(err) => {
                let processing_time = timer.elapsed_ms();
                log::error!("Try-on failed after {}ms: {}", processing_time, err);
                TryOnResult::Failure {
                    error: err.to_string(),
                    processing_time,
                }
            }
        }
    }

    async fn run(&self, session: &GradioClient, request: &TryOnRequest) -> Result<Vec<u8>> {
        let (person, garment) = tokio::try_join!(
            self.fetcher.fetch(&request.person_image_url),
            self.fetcher.fetch(&request.garment_image_url),
        )?;
        let (person, garment) = tokio::try_join!(session.upload(&person), session.upload(&garment))?;

        let outputs = session
            .predict(TRYON_ENDPOINT, build_arguments(&self.params, person, garment))
            .await?;

        // Second output is the mask preview.
        let first = outputs.into_iter().next().ok_or(TryOnError::Format)?;
        self.normalizer
            .normalize(OutputImage::from_value(first), Some(session))
            .await
    }

    /// One direct connection attempt, bypassing the session cache and the
    /// provisioning fallback.
    pub async fn check_model_status(&self) -> ModelStatus {
        let connector = self.session.connector();
        match connector
            .connect(self.session.space_id(), self.session.token())
            .await
        {
            Ok(client) => ModelStatus::available(describe(&client)),
            Err(err) => {
                log::warn!("Model {} unavailable: {}", self.session.space_id(), err);
                ModelStatus::unavailable(err.to_string())
            }
        }
    }
}

fn describe(client: &GradioClient) -> String {
    match client.version() {
        Some(version) => format!("connected (gradio {})", version),
        None => "connected".to_string(),
    }
}

/// Positional arguments for the `/tryon` endpoint.
pub fn build_arguments(params: &InferenceParams, person: FileData, garment: FileData) -> Vec<Value> {
    vec![
        json!(ImageEditorValue::background_only(person)),
        json!(garment),
        json!(params.description),
        json!(params.auto_mask),
        json!(params.auto_crop),
        json!(params.denoise_steps),
        json!(params.seed),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::CountingConnector;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const OUT: &[u8] = b"try-on result bytes";

    fn config() -> TryOnConfig {
        TryOnConfig::new().with_token("hf_test")
    }

    async fn mount_images(server: &MockServer) {
        for name in ["p.jpg", "g.jpg"] {
            Mock::given(method("GET"))
                .and(path(format!("/x/{}", name)))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "image/jpeg")
                        .set_body_bytes(name.as_bytes().to_vec()),
                )
                .mount(server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/x/out.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(OUT.to_vec()))
            .mount(server)
            .await;
    }

    async fn mount_app(server: &MockServer, outputs: Value) {
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!(["/tmp/gradio/upload/image.jpg"])),
            )
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/call/tryon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "evt1"})))
            .mount(server)
            .await;
        let stream = format!(
            "event: generating\ndata: null\n\nevent: complete\ndata: {}\n\n",
            outputs
        );
        Mock::given(method("GET"))
            .and(path("/call/tryon/evt1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(stream),
            )
            .mount(server)
            .await;
    }

    fn client_for(connector: Arc<CountingConnector>) -> TryOnClient {
        TryOnClient::with_connector(config(), connector)
    }

    #[tokio::test]
    async fn test_end_to_end_remote_url() {
        let server = MockServer::start().await;
        mount_images(&server).await;
        mount_app(
            &server,
            json!([{"url": format!("{}/x/out.jpg", server.uri())}, {"path": "/tmp/mask.png"}]),
        )
        .await;

        let connector = Arc::new(CountingConnector::new(server.uri()));
        let client = client_for(connector.clone());
        let result = client
            .perform_try_on(
                &format!("{}/x/p.jpg", server.uri()),
                &format!("{}/x/g.jpg", server.uri()),
            )
            .await;

        assert!(result.is_success(), "{:?}", result.error());
        assert_eq!(result.image(), Some(OUT));
        assert!(client.session().is_cached().await);
    }

    #[tokio::test]
    async fn test_unrecognized_output_fails() {
        let server = MockServer::start().await;
        mount_images(&server).await;
        mount_app(&server, json!([42, {"path": "/tmp/mask.png"}])).await;

        let connector = Arc::new(CountingConnector::new(server.uri()));
        let client = client_for(connector.clone());
        let result = client
            .perform_try_on(
                &format!("{}/x/p.jpg", server.uri()),
                &format!("{}/x/g.jpg", server.uri()),
            )
            .await;

        assert_eq!(
            result.error(),
            Some("Unexpected output format from Gradio client")
        );
        assert!(!client.session().is_cached().await);
    }

    #[tokio::test]
    async fn test_missing_token_never_connects() {
        let connector = Arc::new(CountingConnector::new("http://127.0.0.1:9"));
        let client = TryOnClient::with_connector(TryOnConfig::new(), connector.clone());

        let result = client
            .perform_try_on("https://x/p.jpg", "https://x/g.jpg")
            .await;

        assert!(!result.is_success());
        assert!(result.error().unwrap().contains("credential"));
        assert_eq!(connector.connects(), 0);
        assert_eq!(connector.duplicates(), 0);
    }

    #[tokio::test]
    async fn test_cached_session_is_reused() {
        let server = MockServer::start().await;
        mount_images(&server).await;
        mount_app(&server, json!([{"url": format!("{}/x/out.jpg", server.uri())}])).await;

        let connector = Arc::new(CountingConnector::new(server.uri()));
        let client = client_for(connector.clone());
        let person = format!("{}/x/p.jpg", server.uri());
        let garment = format!("{}/x/g.jpg", server.uri());

        assert!(client.perform_try_on(&person, &garment).await.is_success());
        assert!(client.perform_try_on(&person, &garment).await.is_success());
        assert_eq!(connector.connects(), 1);
    }

    #[tokio::test]
    async fn test_remote_failure_invalidates_session() {
        let server = MockServer::start().await;
        mount_images(&server).await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["/tmp/x.jpg"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex("^/call/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("queue full"))
            .mount(&server)
            .await;

        let connector = Arc::new(CountingConnector::new(server.uri()));
        let client = client_for(connector.clone());
        let person = format!("{}/x/p.jpg", server.uri());
        let garment = format!("{}/x/g.jpg", server.uri());

        let result = client.perform_try_on(&person, &garment).await;
        assert_eq!(result.error(), Some("Remote inference failed (status 503)"));
        assert!(!client.session().is_cached().await);

        client.perform_try_on(&person, &garment).await;
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_reports_elapsed_time() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_delay(Duration::from_millis(30)))
            .mount(&server)
            .await;

        let connector = Arc::new(CountingConnector::new(server.uri()));
        let client = client_for(connector);
        let started = std::time::Instant::now();
        let result = client
            .perform_try_on(
                &format!("{}/x/p.jpg", server.uri()),
                &format!("{}/x/g.jpg", server.uri()),
            )
            .await;
        let wall = started.elapsed().as_millis() as u64;

        assert!(result.error().unwrap().starts_with("Fetch error"));
        assert!(result.processing_time() >= 30);
        assert!(result.processing_time() <= wall);
    }

    #[tokio::test]
    async fn test_check_model_status() {
        let connector = Arc::new(CountingConnector::new("http://shared"));
        let client = client_for(connector.clone());
        let status = client.check_model_status().await;
        assert!(status.available);
        assert_eq!(status.status.as_deref(), Some("connected"));
        assert!(!client.session().is_cached().await);

        let mut down = CountingConnector::new("http://shared");
        down.connect_ok = false;
        let down = Arc::new(down);
        let status = client_for(down.clone()).check_model_status().await;
        assert!(!status.available);
        assert!(status.error.unwrap().contains("busy"));
        assert_eq!(down.duplicates(), 0);
    }

    #[test]
    fn test_build_arguments_shape() {
        let person = FileData::uploaded("/tmp/p.jpg", "p.jpg", 10);
        let garment = FileData::uploaded("/tmp/g.jpg", "g.jpg", 20);
        let args = build_arguments(&InferenceParams::default(), person, garment);

        assert_eq!(args.len(), 7);
        assert_eq!(args[0]["background"]["path"], "/tmp/p.jpg");
        assert_eq!(args[0]["layers"], json!([]));
        assert!(args[0]["composite"].is_null());
        assert_eq!(args[1]["path"], "/tmp/g.jpg");
        assert_eq!(args[3], json!(true));
        assert_eq!(args[4], json!(false));
        assert_eq!(args[5], json!(30));
        assert_eq!(args[6], json!(42));
    }
}
