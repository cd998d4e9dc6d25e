use std::time::Duration;

use catalog::Instance;
use runtime::BoxFuture;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("no credentials configured")]
    MissingCredentials,
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("instance list request failed: {0}")]
    Transport(String),
    #[error("instance list request returned HTTP {0}")]
    Status(u16),
    #[error("instance list is malformed: {0}")]
    Malformed(String),
}

/// Authenticated source of the user's own instances.
pub trait InstanceDirectory: Send + Sync {
    /// Log in with the ambient session and list every instance the user can
    /// see, in the order the service returns them.
    fn list_instances(&self) -> BoxFuture<'_, Result<Vec<Instance>, DirectoryError>>;
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct DirectoryEndpoints {
    /// OAuth token endpoint.
    pub token_url: String,
    /// Instance list endpoint; responds with a JSON array of instances.
    pub instances_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// OAuth client-credentials login followed by an instance list request.
pub struct HttpInstanceDirectory {
    client: reqwest::Client,
    endpoints: DirectoryEndpoints,
    credentials: Option<Credentials>,
}

impl HttpInstanceDirectory {
    pub fn new(
        client: reqwest::Client,
        endpoints: DirectoryEndpoints,
        credentials: Option<Credentials>,
    ) -> Self {
        Self {
            client,
            endpoints,
            credentials,
        }
    }

    pub fn with_timeout(
        timeout: Duration,
        endpoints: DirectoryEndpoints,
        credentials: Option<Credentials>,
    ) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        Ok(Self::new(client, endpoints, credentials))
    }

    async fn login(&self) -> Result<String, DirectoryError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(DirectoryError::MissingCredentials)?;

        let resp = self
            .client
            .post(&self.endpoints.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DirectoryError::Authentication(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Authentication(format!(
                "token endpoint returned HTTP {}",
                resp.status()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| DirectoryError::Authentication(e.to_string()))?;
        Ok(token.access_token)
    }
}

impl InstanceDirectory for HttpInstanceDirectory {
    fn list_instances(&self) -> BoxFuture<'_, Result<Vec<Instance>, DirectoryError>> {
        Box::pin(async move {
            let token = self.login().await?;

            let resp = self
                .client
                .get(&self.endpoints.instances_url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| DirectoryError::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(DirectoryError::Status(resp.status().as_u16()));
            }

            let body = resp
                .text()
                .await
                .map_err(|e| DirectoryError::Transport(e.to_string()))?;
            catalog::parse_instances(&body).map_err(|e| DirectoryError::Malformed(e.to_string()))
        })
    }
}
