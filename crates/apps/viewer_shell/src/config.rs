use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog::{CatalogError, Instance};
use hydration::{Credentials, DirectoryEndpoints};

const DEFAULT_TOKEN_URL: &str = "https://services.sentinel-hub.com/oauth/token";
const DEFAULT_INSTANCES_URL: &str =
    "https://services.sentinel-hub.com/configuration/v1/wms/instances";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: CatalogError },
}

/// Transport settings, read from the environment.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    pub endpoints: DirectoryEndpoints,
    pub credentials: Option<Credentials>,
    pub http_timeout: Duration,
}

impl ShellConfig {
    pub fn from_env() -> Self {
        let credentials = match (env::var("VIEWER_CLIENT_ID"), env::var("VIEWER_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) if !client_id.is_empty() => Some(Credentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };

        Self {
            endpoints: DirectoryEndpoints {
                token_url: env::var("VIEWER_TOKEN_URL")
                    .unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string()),
                instances_url: env::var("VIEWER_INSTANCES_URL")
                    .unwrap_or_else(|_| DEFAULT_INSTANCES_URL.to_string()),
            },
            credentials,
            http_timeout: Duration::from_secs(env_var_u64("VIEWER_HTTP_TIMEOUT_SECS", 20)),
        }
    }
}

fn env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Load the configured instance list from a JSON file.
pub async fn load_instances(path: &Path) -> Result<Vec<Instance>, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    catalog::parse_instances(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ConfigError, load_instances};

    #[tokio::test]
    async fn loads_example_configuration() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/instances.example.json");
        let instances = load_instances(&path).await.expect("example config");
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].name, "Sentinel-2 L1C");
        assert!(instances.iter().all(|inst| inst.endpoint().is_some()));
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let err = load_instances(Path::new("does/not/exist.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
