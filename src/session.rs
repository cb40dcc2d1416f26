use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{Result, TryOnError},
    gradio::GradioClient,
};

/// The two ways of obtaining a connected app: a direct connection to the
/// shared Space, or provisioning a private copy of it.
#[async_trait]
pub trait SpaceConnector: Send + Sync {
    async fn connect(&self, space_id: &str, token: Option<&str>) -> Result<GradioClient>;
    async fn duplicate(&self, space_id: &str, token: &str) -> Result<GradioClient>;
}

/// Owns the cached session handle.
///
/// The handle is created lazily on the first `acquire` and reused until
/// `invalidate` drops it. Creation runs under the lock, so concurrent callers
/// wait for one in-flight attempt instead of racing their own.
pub struct SessionManager {
    connector: Arc<dyn SpaceConnector>,
    space_id: String,
    token: Option<String>,
    handle: Mutex<Option<Arc<GradioClient>>>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn SpaceConnector>,
        space_id: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            connector,
            space_id: space_id.into(),
            token,
            handle: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) -> Result<Arc<GradioClient>> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }

        let token = self
            .token
            .as_deref()
            .ok_or_else(TryOnError::missing_credential)?;

        let client = match self.connector.connect(&self.space_id, Some(token)).await {
            Ok(client) => client,
            Err(connect_err) => {
                log::warn!(
                    "Direct connection to {} failed ({}), provisioning a private copy",
                    self.space_id,
                    connect_err
                );
                self.connector
                    .duplicate(&self.space_id, token)
                    .await
                    .map_err(|dup_err| match dup_err {
                        TryOnError::Configuration(_) => dup_err,
                        other => TryOnError::Connection(format!(
                            "could not reach {}: {}; provisioning failed: {}",
                            self.space_id, connect_err, other
                        )),
                    })?
            }
        };

        let handle = Arc::new(client);
        *slot = Some(Arc::clone(&handle));
        log::info!("Session established with {}", handle.root());
        Ok(handle)
    }

    pub async fn invalidate(&self) {
        if self.handle.lock().await.take().is_some() {
            log::info!("Session with {} invalidated", self.space_id);
        }
    }

    /// Drops the cached handle only if it is still `handle`. A handle that a
    /// concurrent caller has already replaced is left alone.
    pub async fn invalidate_handle(&self, handle: &Arc<GradioClient>) {
        let mut slot = self.handle.lock().await;
        if slot.as_ref().is_some_and(|cached| Arc::ptr_eq(cached, handle)) {
            slot.take();
            log::info!("Session with {} invalidated", self.space_id);
        } else {
            log::debug!("Session with {} already replaced, keeping it", self.space_id);
        }
    }

    pub async fn is_cached(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    pub fn connector(&self) -> &Arc<dyn SpaceConnector> {
        &self.connector
    }

    pub fn space_id(&self) -> &str {
        &self.space_id
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}
