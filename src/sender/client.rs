use crate::domain::Payload;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the CRM API.
    pub endpoint: String,
    /// Bearer token for the CRM API.
    pub api_key: String,
    #[serde(with = "crate::app::config::serde_helpers")]
    pub timeout: Duration,
    #[serde(with = "crate::app::config::serde_helpers")]
    pub connect_timeout: Duration,
    pub max_connections: usize,
    #[serde(with = "crate::app::config::serde_helpers")]
    pub keep_alive_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.followupboss.com/v1".to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_connections: 10,
            keep_alive_timeout: Duration::from_secs(60),
            user_agent: format!("crm-dispatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Status plus the identifier the CRM assigned, when it returned one.
/// Classification into success/rate-limited/transient happens in the sender.
#[derive(Debug, Clone)]
pub struct CrmResponse {
    pub status: u16,
    pub external_id: Option<String>,
}

impl CrmResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS.as_u16()
    }
}

#[derive(Deserialize)]
struct IdBody {
    #[serde(default)]
    id: String,
}

/// HTTP client for the CRM's per-kind endpoints, with connection pooling and
/// bounded per-call timeouts.
#[derive(Debug, Clone)]
pub struct CrmClient {
    client: Client,
    config: ClientConfig,
    base_url: Url,
}

impl CrmClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base_url: Url = config.endpoint.parse().map_err(|e| {
            ClientError::InvalidConfiguration(format!(
                "Invalid endpoint URL '{}': {e}",
                config.endpoint
            ))
        })?;

        if config.api_key.is_empty() {
            return Err(ClientError::InvalidConfiguration(
                "CRM API key is not configured".to_string(),
            ));
        }

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .pool_idle_timeout(config.keep_alive_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .build()
            .map_err(|e| {
                ClientError::InvalidConfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    /// `POST /people`: create a person record; the CRM answers with the
    /// assigned identifier.
    pub async fn create_person(&self, payload: &Payload) -> Result<CrmResponse, ClientError> {
        let url = self.api_url(&["people"])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(map_send_error)?;

        Self::read_response(response).await
    }

    /// `PATCH /people/{id}`: partial update of an existing person.
    pub async fn update_person(
        &self,
        person_id: &str,
        payload: &Payload,
    ) -> Result<CrmResponse, ClientError> {
        let url = self.api_url(&["people", person_id])?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.config.api_key)
            .json(payload)
            .send()
            .await
            .map_err(map_send_error)?;

        Self::read_response(response).await
    }

    /// `POST /notes`: attach a note to a person.
    pub async fn create_note(
        &self,
        person_id: &str,
        body: &str,
    ) -> Result<CrmResponse, ClientError> {
        let url = self.api_url(&["notes"])?;
        let note = serde_json::json!({
            "personId": person_id,
            "body": body,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(&note)
            .send()
            .await
            .map_err(map_send_error)?;

        Self::read_response(response).await
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ClientError::InvalidConfiguration("Endpoint URL cannot be a base".to_string())
            })?
            .extend(segments);
        Ok(url)
    }

    async fn read_response(response: reqwest::Response) -> Result<CrmResponse, ClientError> {
        let status = response.status().as_u16();
        // Id extraction is best-effort; an unparseable body on a 2xx still
        // counts as accepted by the CRM.
        let external_id = if (200..300).contains(&status) {
            response
                .json::<IdBody>()
                .await
                .ok()
                .map(|body| body.id)
                .filter(|id| !id.is_empty())
        } else {
            None
        };

        Ok(CrmResponse {
            status,
            external_id,
        })
    }
}

fn map_send_error(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::RequestTimeout(error.to_string())
    } else {
        ClientError::Network(error)
    }
}
