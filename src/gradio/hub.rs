use std::time::Duration;

use crate::{
    config::TryOnConfig,
    error::{Result, TryOnError},
    models::looks_like_http_url,
    session::SpaceConnector,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use super::GradioClient;

#[derive(Deserialize)]
struct SpaceHost {
    host: String,
}

#[derive(Deserialize)]
struct WhoAmI {
    name: String,
}

#[derive(Deserialize)]
struct SpaceRuntime {
    stage: String,
}

/// Minimal Hugging Face Hub API surface for Spaces.
#[derive(Clone)]
pub struct HubApi {
    client: Client,
    base_url: String,
}

impl HubApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn get(&self, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        let request = self.client.get(format!("{}{}", self.base_url, path));
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Resolves `owner/name` to the Space's serving URL.
    pub async fn space_host(&self, space_id: &str, token: Option<&str>) -> Result<String> {
        let response = self
            .get(&format!("/api/spaces/{}/host", space_id), token)
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("Hub unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(TryOnError::Connection(format!(
                "could not resolve Space {}: {}",
                space_id,
                response.status()
            )));
        }

        let host: SpaceHost = response
            .json()
            .await
            .map_err(|e| TryOnError::Connection(format!("invalid Space host response: {}", e)))?;
        Ok(host.host)
    }

    pub async fn whoami(&self, token: &str) -> Result<String> {
        let response = self
            .get("/api/whoami-v2", Some(token))
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("Hub unreachable: {}", e)))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(TryOnError::Configuration(
                "access token was rejected by the Hub".into(),
            )),
            status if !status.is_success() => Err(TryOnError::Connection(format!(
                "whoami failed: {}",
                status
            ))),
            _ => {
                let me: WhoAmI = response.json().await.map_err(|e| {
                    TryOnError::Connection(format!("invalid whoami response: {}", e))
                })?;
                Ok(me.name)
            }
        }
    }

    /// Creates a private copy of `from_id` named `to_id`. An existing copy is
    /// reused.
    pub async fn duplicate_space(
        &self,
        from_id: &str,
        to_id: &str,
        token: &str,
        hardware: Option<&str>,
    ) -> Result<()> {
        let mut payload = json!({
            "repository": to_id,
            "private": true,
        });
        if let Some(hardware) = hardware {
            payload["hardware"] = json!(hardware);
        }

        let response = self
            .client
            .post(format!("{}/api/spaces/{}/duplicate", self.base_url, from_id))
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("Hub unreachable: {}", e)))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            log::info!("Space {} already exists, reusing it", to_id);
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Duplicating {} failed: {} - {}", from_id, status, body);
            return Err(TryOnError::Connection(format!(
                "could not duplicate {}: {}",
                from_id, status
            )));
        }

        log::info!("Duplicated {} into {}", from_id, to_id);
        Ok(())
    }

    pub async fn runtime_stage(&self, space_id: &str, token: &str) -> Result<String> {
        let response = self
            .get(&format!("/api/spaces/{}/runtime", space_id), Some(token))
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("Hub unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(TryOnError::Connection(format!(
                "runtime lookup for {} failed: {}",
                space_id,
                response.status()
            )));
        }

        let runtime: SpaceRuntime = response
            .json()
            .await
            .map_err(|e| TryOnError::Connection(format!("invalid runtime response: {}", e)))?;
        Ok(runtime.stage)
    }
}

/// Connects through the Hugging Face Hub and provisions private copies of a
/// Space when the shared one cannot be reached.
#[derive(Clone)]
pub struct HubConnector {
    client: Client,
    hub: HubApi,
    hardware: Option<String>,
    timeout: Duration,
    poll_interval: Duration,
}

impl HubConnector {
    pub fn new(config: &TryOnConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(client: Client, config: &TryOnConfig) -> Self {
        Self {
            hub: HubApi::new(client.clone(), config.hub_url.clone()),
            client,
            hardware: config.duplicate_hardware.clone(),
            timeout: config.duplicate_timeout,
            poll_interval: config.runtime_poll_interval,
        }
    }

    async fn wait_until_running(&self, space_id: &str, token: &str) -> Result<()> {
        loop {
            let stage = self.hub.runtime_stage(space_id, token).await?;
            log::debug!("Space {} is {}", space_id, stage);
            match stage.as_str() {
                "RUNNING" => return Ok(()),
                s if s.ends_with("ERROR") || s == "PAUSED" || s == "STOPPED" => {
                    return Err(TryOnError::Connection(format!(
                        "Space {} stopped in stage {}",
                        space_id, s
                    )));
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

#[async_trait]
impl SpaceConnector for HubConnector {
    async fn connect(&self, space_id: &str, token: Option<&str>) -> Result<GradioClient> {
        let root = if looks_like_http_url(space_id) {
            space_id.to_string()
        } else {
            self.hub.space_host(space_id, token).await?
        };
        GradioClient::connect(self.client.clone(), &root, token).await
    }

    async fn duplicate(&self, space_id: &str, token: &str) -> Result<GradioClient> {
        if looks_like_http_url(space_id) {
            return Err(TryOnError::Connection(format!(
                "{} is a direct URL and cannot be duplicated",
                space_id
            )));
        }

        let owner = self.hub.whoami(token).await?;
        let name = space_id.rsplit('/').next().unwrap_or(space_id);
        let target = format!("{}/{}", owner, name);

        log::info!(
            "Provisioning private Space {} (this can take several minutes)",
            target
        );
        self.hub
            .duplicate_space(space_id, &target, token, self.hardware.as_deref())
            .await?;

        tokio::time::timeout(self.timeout, self.wait_until_running(&target, token))
            .await
            .map_err(|_| {
                TryOnError::Connection(format!(
                    "Space {} did not start within {}s",
                    target,
                    self.timeout.as_secs()
                ))
            })??;

        self.connect(&target, Some(token)).await
    }
}
