use crate::error::ClientError;
use charon_types::dataplane::CaddyConfig;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:2019".to_string(),
            timeout_secs: 10,
            max_retries: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// Thin HTTP client over the data plane's JSON admin API.
pub struct DataPlaneClient {
    client: Client,
    config: ClientConfig,
}

impl DataPlaneClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, config })
    }

    /// `GET /config/` used as a liveness probe before attempting a patch
    /// (spec.md §4.1 step 5 precondition).
    pub async fn ping(&self) -> Result<(), ClientError> {
        let resp = self
            .client
            .get(format!("{}/config/", self.config.base_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Connection(format!("ping failed: {}", resp.status())))
        }
    }

    pub async fn load_config(&self) -> Result<CaddyConfig, ClientError> {
        let resp = self.client.get(format!("{}/config/", self.config.base_url)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::ConfigRejected { status: status.as_u16(), message });
        }
        resp.json().await.map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }

    /// `POST /load` the full document, replacing whatever the data plane is
    /// currently running. Retries transient (5xx/connection) failures with
    /// exponential backoff; a 4xx response is a caller error and is never
    /// retried (spec.md §4.1 step 6).
    pub async fn patch_config(&self, config: &CaddyConfig) -> Result<(), ClientError> {
        let mut attempt = 0;
        let mut delay = self.config.base_delay_ms;

        loop {
            attempt += 1;
            match self.apply_once(config).await {
                Ok(()) => return Ok(()),
                Err(ClientError::ConfigRejected { status, message }) if status < 500 => {
                    return Err(ClientError::ConfigRejected { status, message });
                },
                Err(err) => {
                    if attempt > self.config.max_retries {
                        tracing::error!(%err, attempts = attempt, "data plane apply exhausted retries");
                        return Err(ClientError::RetriesExhausted(attempt));
                    }
                    tracing::warn!(%err, attempt, "data plane apply failed, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    delay = (delay * 2).min(self.config.max_delay_ms);
                },
            }
        }
    }

    async fn apply_once(&self, config: &CaddyConfig) -> Result<(), ClientError> {
        let resp =
            self.client.post(format!("{}/load", self.config.base_url)).json(config).send().await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let message = resp.text().await.unwrap_or_default();
            Err(ClientError::ConfigRejected { status: status.as_u16(), message })
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
