pub mod hub;
pub mod sse;

use crate::{
    error::{Result, TryOnError},
    models::{FileData, ImageBytes},
};
use futures::StreamExt;
use reqwest::{multipart, Client, RequestBuilder, Response, Url};
use serde::Deserialize;
use serde_json::{json, Value};

pub use hub::{HubApi, HubConnector};
use sse::{CallEvent, Parser};

/// Subset of a Gradio app's `/config` payload that the client relies on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub api_prefix: Option<String>,
}

#[derive(Deserialize)]
struct CallStarted {
    event_id: String,
}

/// Connected handle to one running Gradio app.
#[derive(Clone)]
pub struct GradioClient {
    http: Client,
    root: String,
    api_prefix: String,
    version: Option<String>,
    token: Option<String>,
}

impl std::fmt::Debug for GradioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradioClient")
            .field("root", &self.root)
            .field("api_prefix", &self.api_prefix)
            .field("version", &self.version)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GradioClient {
    pub fn new(http: Client, root: &str, token: Option<&str>, config: AppConfig) -> Self {
        let api_prefix = config
            .api_prefix
            .map(|p| p.trim_end_matches('/').to_string())
            .unwrap_or_default();
        Self {
            http,
            root: root.trim_end_matches('/').to_string(),
            api_prefix,
            version: config.version,
            token: token.map(String::from),
        }
    }

    /// Reads the app's `/config` and returns a handle bound to it.
    pub async fn connect(http: Client, root: &str, token: Option<&str>) -> Result<Self> {
        let root = root.trim_end_matches('/');
        log::debug!("Fetching Gradio config from {}", root);

        let mut request = http.get(format!("{}/config", root));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("{} unreachable: {}", root, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            log::warn!("Gradio config request failed: {} - {}", status, body);
            return Err(TryOnError::Connection(format!(
                "{} returned {} for /config",
                root, status
            )));
        }

        let config: AppConfig = response
            .json()
            .await
            .map_err(|e| TryOnError::Connection(format!("invalid Gradio config: {}", e)))?;

        log::info!(
            "Connected to Gradio app at {} (version {})",
            root,
            config.version.as_deref().unwrap_or("unknown")
        );
        Ok(Self::new(http, root, token, config))
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Whether `url` points at a file served by this app: same scheme, host
    /// and port as the app root.
    pub fn serves(&self, url: &str) -> bool {
        match (Url::parse(&self.root), Url::parse(url)) {
            (Ok(root), Ok(url)) => {
                root.scheme() == url.scheme()
                    && root.host_str() == url.host_str()
                    && root.port_or_known_default() == url.port_or_known_default()
            }
            _ => false,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}{}", self.root, self.api_prefix, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Uploads in-memory image bytes to the app's temp storage.
    pub async fn upload(&self, image: &ImageBytes) -> Result<FileData> {
        let part = multipart::Part::bytes(image.data.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| TryOnError::Fetch(format!("invalid MIME type: {}", e)))?;
        let form = multipart::Form::new().part("files", part);

        let response = self
            .authorize(self.http.post(self.endpoint("/upload")))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("upload failed: {}", e)))?;
        let response = check_status(response, "upload").await?;

        let paths: Vec<String> = response.json().await.map_err(|e| TryOnError::RemoteInference {
            status: None,
            body: format!("unreadable upload response: {}", e),
        })?;
        let path = paths.into_iter().next().ok_or(TryOnError::Format)?;

        log::debug!("Uploaded {} ({} bytes) as {}", image.file_name, image.len(), path);
        Ok(FileData::uploaded(path, image.file_name.clone(), image.len()))
    }

    /// Runs a named endpoint through the two-step `/call` API and waits for
    /// the `complete` event. Returns the ordered output list.
    pub async fn predict(&self, api_name: &str, data: Vec<Value>) -> Result<Vec<Value>> {
        let name = api_name.trim_start_matches('/');
        let call_url = self.endpoint(&format!("/call/{}", name));

        log::info!("Calling Gradio endpoint /{} at {}", name, self.root);
        log::debug!("Call arguments: {}", Value::Array(data.clone()));

        let response = self
            .authorize(self.http.post(&call_url))
            .json(&json!({ "data": data }))
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("call to /{} failed: {}", name, e)))?;
        let response = check_status(response, name).await?;

        let started: CallStarted = response.json().await.map_err(|e| TryOnError::RemoteInference {
            status: None,
            body: format!("missing event id: {}", e),
        })?;
        log::debug!("/{} queued as event {}", name, started.event_id);

        let response = self
            .authorize(self.http.get(format!("{}/{}", call_url, started.event_id)))
            .send()
            .await
            .map_err(|e| TryOnError::Connection(format!("result stream failed: {}", e)))?;
        let response = check_status(response, name).await?;

        let mut parser = Parser::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| TryOnError::Connection(format!("result stream broke: {}", e)))?;
            for raw in parser.process(&chunk) {
                if let Some(outputs) = handle_event(CallEvent::from_raw(raw), name)? {
                    return Ok(outputs);
                }
            }
        }
        if let Some(raw) = parser.finish() {
            if let Some(outputs) = handle_event(CallEvent::from_raw(raw), name)? {
                return Ok(outputs);
            }
        }

        log::error!("/{} stream closed without a complete event", name);
        Err(TryOnError::RemoteInference {
            status: None,
            body: "stream closed before completion".into(),
        })
    }
}

fn handle_event(event: CallEvent, name: &str) -> Result<Option<Vec<Value>>> {
    match event {
        CallEvent::Complete(Value::Array(outputs)) => Ok(Some(outputs)),
        CallEvent::Complete(other) => {
            log::error!("/{} completed with a non-list payload: {}", name, other);
            Err(TryOnError::Format)
        }
        CallEvent::Error(message) => {
            let body = message.unwrap_or_else(|| "no details".to_string());
            log::error!("/{} reported an error: {}", name, body);
            Err(TryOnError::RemoteInference { status: None, body })
        }
        CallEvent::Generating(_) | CallEvent::Heartbeat => Ok(None),
        CallEvent::Unknown(raw) => {
            log::debug!("Skipping unknown event {:?}", raw.event);
            Ok(None)
        }
    }
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    log::error!("Gradio {} request failed: {} - {}", what, status, body);
    Err(TryOnError::RemoteInference {
        status: Some(status.as_u16()),
        body,
    })
}
