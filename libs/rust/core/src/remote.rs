//! Remote Apply Client: pushes a registry to a running serving process through
//! `ModelService/HandleReloadConfigRequest`.

use serving_proto::serving::model_service_client::ModelServiceClient;
use serving_proto::serving::ReloadConfigRequest;
use serving_proto::ModelServerConfig;
use std::time::Duration;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::{info, warn};

use crate::resilience::{retry_async, RetryConfig};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("rpc failed: {0}")]
    Status(#[from] tonic::Status),
    #[error("server rejected the config (code {code}): {message}")]
    Rejected { code: i32, message: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid tensor: {0}")]
    InvalidTensor(String),
    #[error("response has no output `{0}`")]
    MissingOutput(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl RemoteError {
    /// Failures worth another attempt against the same server.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport(_) | RemoteError::Timeout(_) => true,
            RemoteError::Status(s) => matches!(s.code(), Code::Unavailable | Code::DeadlineExceeded),
            RemoteError::Http(e) => e.is_connect() || e.is_timeout(),
            RemoteError::Server { status, .. } => *status == 503,
            _ => false,
        }
    }
}

pub(crate) fn endpoint(uri: &str, timeout: Duration) -> Result<Endpoint, RemoteError> {
    Ok(Endpoint::from_shared(uri.to_string())?.connect_timeout(timeout).timeout(timeout))
}

pub(crate) async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, tonic::Status>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(RemoteError::Timeout(timeout)),
    }
}

#[derive(Debug, Clone)]
pub struct ModelServerClient {
    inner: ModelServiceClient<Channel>,
    endpoint: String,
    timeout: Duration,
}

impl ModelServerClient {
    pub async fn connect(uri: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let channel = endpoint(uri, timeout)?.connect().await?;
        info!(endpoint = uri, "connected to model server");
        Ok(Self::with_channel(channel, uri, timeout))
    }

    /// Builds a client whose connection is established on first use, so connection
    /// failures surface from the reload call (as `Unavailable`) and fall under its retry.
    pub fn connect_lazy(uri: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let channel = endpoint(uri, timeout)?.connect_lazy();
        Ok(Self::with_channel(channel, uri, timeout))
    }

    fn with_channel(channel: Channel, uri: &str, timeout: Duration) -> Self {
        Self { inner: ModelServiceClient::new(channel), endpoint: uri.to_string(), timeout }
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }

    /// Makes the server serve exactly the models in `config`.
    pub async fn replace_server_config(&mut self, config: ModelServerConfig) -> Result<(), RemoteError> {
        reload(&mut self.inner, config, self.timeout).await?;
        info!(endpoint = %self.endpoint, "model server accepted config");
        Ok(())
    }

    pub async fn replace_server_config_with_retry(
        &mut self,
        config: ModelServerConfig,
        retry: &RetryConfig,
    ) -> Result<(), RemoteError> {
        let client = self.inner.clone();
        let timeout = self.timeout;
        let endpoint = self.endpoint.as_str();
        retry_async(retry, RemoteError::is_transient, |attempt| {
            let mut client = client.clone();
            let config = config.clone();
            async move {
                if attempt > 0 {
                    warn!(endpoint, attempt, "re-sending model server config");
                }
                reload(&mut client, config, timeout).await
            }
        })
        .await?;
        info!(endpoint = %self.endpoint, "model server accepted config");
        Ok(())
    }
}

async fn reload(client: &mut ModelServiceClient<Channel>, config: ModelServerConfig, timeout: Duration) -> Result<(), RemoteError> {
    let models = config.model_config_list().map(|l| l.config.len()).unwrap_or_default();
    let request = ReloadConfigRequest { config: Some(config), metric_names: Vec::new() };
    let response = with_timeout(timeout, client.handle_reload_config_request(request)).await?;
    let status = response.into_inner().status.unwrap_or_default();
    if !status.is_ok() {
        return Err(RemoteError::Rejected { code: status.error_code, message: status.error_message });
    }
    tracing::debug!(models, schema = serving_proto::SCHEMA_VERSION, "reload request acknowledged");
    Ok(())
}
