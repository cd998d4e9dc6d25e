use std::time::Duration;

use catalog::Instance;
use runtime::BoxFuture;

/// Why one instance failed its capability check.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeFailure {
    #[error("instance {0:?} has no service url")]
    MissingEndpoint(String),
    #[error("capability request failed: {0}")]
    Transport(String),
    #[error("capability request returned HTTP {0}")]
    Status(u16),
    #[error("capability response was empty")]
    EmptyResponse,
}

/// Reachability/usability check against a single instance.
///
/// Implementations must be `Send + Sync` so one checker can serve every
/// probe of a cycle. Methods return boxed futures for dyn-compatibility.
pub trait CapabilityCheck: Send + Sync {
    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<(), ProbeFailure>>;
}

/// WMS `GetCapabilities` check against the instance's `url`.
pub struct HttpCapabilityCheck {
    client: reqwest::Client,
}

impl HttpCapabilityCheck {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, ProbeFailure> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeFailure::Transport(e.to_string()))?;
        Ok(Self::new(client))
    }
}

impl CapabilityCheck for HttpCapabilityCheck {
    fn check<'a>(&'a self, instance: &'a Instance) -> BoxFuture<'a, Result<(), ProbeFailure>> {
        Box::pin(async move {
            let url = instance
                .endpoint()
                .ok_or_else(|| ProbeFailure::MissingEndpoint(instance.name.clone()))?;

            let resp = self
                .client
                .get(url)
                .query(&[
                    ("SERVICE", "WMS"),
                    ("REQUEST", "GetCapabilities"),
                    ("VERSION", "1.3.0"),
                ])
                .send()
                .await
                .map_err(|e| ProbeFailure::Transport(e.to_string()))?;

            if !resp.status().is_success() {
                return Err(ProbeFailure::Status(resp.status().as_u16()));
            }

            let body = resp
                .bytes()
                .await
                .map_err(|e| ProbeFailure::Transport(e.to_string()))?;
            if body.is_empty() {
                return Err(ProbeFailure::EmptyResponse);
            }
            Ok(())
        })
    }
}
