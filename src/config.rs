use std::time::Duration;

pub const DEFAULT_PLUGIN_NAME: &str = "vaultwarden";
pub const PLUGIN_HOST_PORT: u16 = 3000;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Bind address for the local form server
    pub host: String,
    pub port: u16,
    /// Base URL of the plugin host's config endpoints, without trailing slash
    pub remote_url: String,
    pub request_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        let remote_url = std::env::var("VAULTWARDEN_PLUGIN_URL").unwrap_or_else(|_| {
            plugin_base_url(
                &std::env::var("PLUGIN_HOST").unwrap_or_else(|_| "localhost".to_string()),
                &std::env::var("PLUGIN_NAME").unwrap_or_else(|_| DEFAULT_PLUGIN_NAME.to_string()),
            )
        });

        Self {
            host: std::env::var("VAULTWARDEN_CONFIG_HOST")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("VAULTWARDEN_CONFIG_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8190),
            remote_url,
            request_timeout: std::env::var("VAULTWARDEN_REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis),
        }
    }
}

/// `http://<host>:3000/api/plugins/<plugin>`, the plugin host's layout.
pub fn plugin_base_url(host: &str, plugin: &str) -> String {
    format!(
        "http://{}:{}/api/plugins/{}",
        host.trim(),
        PLUGIN_HOST_PORT,
        plugin.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_plugin_host_url() {
        assert_eq!(
            plugin_base_url("nas.local", "vaultwarden"),
            "http://nas.local:3000/api/plugins/vaultwarden"
        );
        assert_eq!(
            plugin_base_url(" 10.0.0.2 ", "bitwarden "),
            "http://10.0.0.2:3000/api/plugins/bitwarden"
        );
    }
}
