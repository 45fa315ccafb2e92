use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{ConfigError, RemoteOp};
use crate::models::ConfigRecord;

/// The plugin host's configuration endpoints.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn load(&self) -> Result<ConfigRecord, ConfigError>;
    async fn save(&self, record: &ConfigRecord) -> Result<(), ConfigError>;
    async fn restart(&self) -> Result<(), ConfigError>;
}

/// `RemoteStore` over HTTP: `GET/POST {base}/config` and `POST {base}/restart`.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    base_url: String,
    timeout: Option<Duration>,
    http: reqwest::Client,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            timeout,
            http: reqwest::Client::new(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        op: RemoteOp,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ConfigError> {
        let mut request = request.header("x-request-id", format!("req_{}", Uuid::new_v4().simple()));
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| ConfigError::Request {
            op,
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = match body.trim() {
                "" => "<empty>".to_string(),
                trimmed => trimmed.to_string(),
            };
            return Err(ConfigError::Http {
                op,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn load(&self) -> Result<ConfigRecord, ConfigError> {
        let op = RemoteOp::Load;
        let response = self.send(op, self.http.get(self.endpoint("config"))).await?;
        let bytes = response.bytes().await.map_err(|e| ConfigError::Request {
            op,
            message: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ConfigError::Decode {
            op,
            message: e.to_string(),
        })
    }

    async fn save(&self, record: &ConfigRecord) -> Result<(), ConfigError> {
        let request = self.http.post(self.endpoint("config")).json(record);
        self.send(RemoteOp::Save, request).await?;
        Ok(())
    }

    async fn restart(&self) -> Result<(), ConfigError> {
        self.send(RemoteOp::Restart, self.http.post(self.endpoint("restart")))
            .await?;
        Ok(())
    }
}

// reqwest needs an absolute URL, so relative `/api/plugins/...` paths are
// rejected here rather than at request time.
fn normalize_base_url(base_url: &str) -> Result<String, ConfigError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidBaseUrl(base_url.to_string()));
    }
    reqwest::Url::parse(trimmed).map_err(|_| ConfigError::InvalidBaseUrl(base_url.to_string()))?;
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_builder_normalizes_paths() {
        let store = HttpRemoteStore::new("http://nas.local:3000/api/plugins/vaultwarden/", None)
            .expect("remote store");

        assert_eq!(store.base_url(), "http://nas.local:3000/api/plugins/vaultwarden");
        assert_eq!(
            store.endpoint("/config"),
            "http://nas.local:3000/api/plugins/vaultwarden/config"
        );
        assert_eq!(
            store.endpoint("restart"),
            "http://nas.local:3000/api/plugins/vaultwarden/restart"
        );
    }

    #[test]
    fn relative_or_empty_base_url_is_rejected() {
        assert!(matches!(
            HttpRemoteStore::new("/api/plugins/vaultwarden", None),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
        assert!(matches!(
            HttpRemoteStore::new("  ", None),
            Err(ConfigError::InvalidBaseUrl(_))
        ));
    }
}
