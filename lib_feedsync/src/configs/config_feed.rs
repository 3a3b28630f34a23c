use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::{Category, ViewerId};

const DEFAULT_CONFIG_FILE: &str = "feedsync.conf";
const REALTIME_PATH: &str = "/realtime/v1/websocket";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Engagement-synchronized content feed", version)]
#[serde(rename_all = "camelCase")]
pub struct FeedSyncConfig {
    #[clap(long, env = "FEEDSYNC_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEEDSYNC_BACKEND_URL", help = "Base URL of the backend project, e.g. https://xyz.supabase.co/.")]
    pub backend_url: Option<String>,

    #[clap(long, env = "FEEDSYNC_API_KEY", help = "Project API key sent with every request.")]
    pub api_key: Option<String>,

    #[clap(long, env = "FEEDSYNC_ACCESS_TOKEN", help = "Access token of the signed-in viewer.")]
    pub access_token: Option<String>,

    #[clap(long, env = "FEEDSYNC_VIEWER_ID", help = "Identifier of the signed-in viewer. Omit to browse anonymously.")]
    pub viewer_id: Option<String>,

    #[clap(long, env = "FEEDSYNC_CATEGORY", help = "Feed category (stream, listen, blog, gallery, resources).")]
    pub category: Option<String>,

    #[clap(long, env = "FEEDSYNC_REALTIME_URL", help = "Realtime websocket endpoint. Derived from the backend URL when omitted.")]
    pub realtime_url: Option<String>,

    #[clap(long, env = "FEEDSYNC_HTTP_MAX_RETRIES", help = "Retries for transient HTTP failures.")]
    pub http_max_retries: Option<u32>,

    #[clap(long, env = "FEEDSYNC_REQUEST_TIMEOUT_SECS", help = "Per-request HTTP timeout in seconds.")]
    pub request_timeout_secs: Option<u64>,

    #[clap(long, env = "FEEDSYNC_HEARTBEAT_INTERVAL_SECS", help = "Seconds between realtime heartbeats.")]
    pub heartbeat_interval_secs: Option<u64>,

    #[clap(long, env = "FEEDSYNC_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds for realtime reconnect attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "FEEDSYNC_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds for realtime reconnect attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "FEEDSYNC_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEEDSYNC_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

/// Settings with every default applied and every required value present.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub backend_url: String,
    pub api_key: String,
    pub access_token: Option<String>,
    pub viewer: Option<ViewerId>,
    pub category: Category,
    pub realtime_url: String,
    pub http_max_retries: u32,
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl FeedSyncConfig {
    pub fn defaults() -> Self {
        Self {
            category: Some(Category::Stream.to_string()),
            http_max_retries: Some(3),
            request_timeout_secs: Some(10),
            heartbeat_interval_secs: Some(25),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(30000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            ..Default::default()
        }
    }

    // Merge two configs, where 'other' overrides 'self' for Some values
    pub fn merge(self, other: FeedSyncConfig) -> FeedSyncConfig {
        FeedSyncConfig {
            config_path: other.config_path.or(self.config_path),
            backend_url: other.backend_url.or(self.backend_url),
            api_key: other.api_key.or(self.api_key),
            access_token: other.access_token.or(self.access_token),
            viewer_id: other.viewer_id.or(self.viewer_id),
            category: other.category.or(self.category),
            realtime_url: other.realtime_url.or(self.realtime_url),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            request_timeout_secs: other.request_timeout_secs.or(self.request_timeout_secs),
            heartbeat_interval_secs: other.heartbeat_interval_secs.or(self.heartbeat_interval_secs),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let backend_url = non_empty(&self.backend_url).ok_or(ConfigError::Missing("backend_url"))?;
        let api_key = non_empty(&self.api_key).ok_or(ConfigError::Missing("api_key"))?;

        let category = match &self.category {
            Some(raw) => raw.parse::<Category>().map_err(|e| ConfigError::Invalid {
                field: "category",
                reason: e.to_string(),
            })?,
            None => Category::Stream,
        };
        let realtime_url = match non_empty(&self.realtime_url) {
            Some(url) => url,
            None => derive_realtime_url(&backend_url)?,
        };

        let base_delay = self.reconnect_base_delay_ms.unwrap_or(1000);
        let max_delay = self.reconnect_max_delay_ms.unwrap_or(30000);
        if base_delay == 0 || max_delay < base_delay {
            return Err(ConfigError::Invalid {
                field: "reconnect_max_delay_ms",
                reason: format!("must be at least the base delay ({}ms) and non-zero", base_delay),
            });
        }

        Ok(ResolvedConfig {
            backend_url,
            api_key,
            access_token: non_empty(&self.access_token),
            viewer: non_empty(&self.viewer_id).map(ViewerId::from),
            category,
            realtime_url,
            http_max_retries: self.http_max_retries.unwrap_or(3),
            request_timeout: Duration::from_secs(self.request_timeout_secs.unwrap_or(10)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_secs.unwrap_or(25).max(1)),
            reconnect_base_delay: Duration::from_millis(base_delay),
            reconnect_max_delay: Duration::from_millis(max_delay),
            log_dir: self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: self.log_level.clone().unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl ResolvedConfig {
    #[cfg(feature = "rest")]
    pub fn rest_config(&self) -> crate::backend::RestConfig {
        crate::backend::RestConfig {
            base_url: self.backend_url.clone(),
            api_key: self.api_key.clone(),
            access_token: self.access_token.clone(),
            max_retries: self.http_max_retries,
            timeout: self.request_timeout,
            page_size: crate::backend::rest::DEFAULT_PAGE_SIZE,
        }
    }

    #[cfg(feature = "realtime")]
    pub fn realtime_config(&self) -> crate::backend::RealtimeConfig {
        crate::backend::RealtimeConfig {
            url: self.realtime_url.clone(),
            api_key: self.api_key.clone(),
            access_token: self.access_token.clone(),
            heartbeat_interval: self.heartbeat_interval,
            reconnect_base_delay: self.reconnect_base_delay,
            reconnect_max_delay: self.reconnect_max_delay,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `https://host[:port]/...` becomes `wss://host[:port]/realtime/v1/websocket`.
/// Path, query and fragment of the backend URL are dropped.
fn derive_realtime_url(backend_url: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        field: "backend_url",
        reason,
    };
    let mut url = url::Url::parse(backend_url).map_err(|e| invalid(format!("'{}': {}", backend_url, e)))?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(invalid(format!("expected an http(s) URL, got scheme '{}'", other))),
    };
    if url.host_str().unwrap_or_default().is_empty() {
        return Err(invalid("missing host".to_string()));
    }
    url.set_scheme(scheme)
        .map_err(|_| invalid(format!("cannot switch '{}' to {}", backend_url, scheme)))?;
    url.set_path(REALTIME_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Layers defaults, the config file named by `cli` (or `feedsync.conf`) and
/// `cli` itself, which already holds environment values.
///
/// An unreadable or malformed file is logged and skipped.
pub fn load_from(cli: FeedSyncConfig) -> FeedSyncConfig {
    let mut current = FeedSyncConfig::defaults();

    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match FeedSyncConfig::from_file(&config_file_path) {
            Ok(file_config) => current = current.merge(file_config),
            Err(e) => log::warn!("{}. Falling back to other sources.", e),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment/CLI variables.",
            config_file_path.display()
        );
    }

    current.merge(cli)
}

/// `load_from` over the process arguments and environment.
pub fn load_config() -> FeedSyncConfig {
    load_from(FeedSyncConfig::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> FeedSyncConfig {
        let mut argv = vec!["feedsync"];
        argv.extend_from_slice(args);
        FeedSyncConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn later_layers_win_field_by_field() {
        let base = FeedSyncConfig {
            api_key: Some("file-key".into()),
            category: Some("blog".into()),
            ..Default::default()
        };
        let top = FeedSyncConfig {
            api_key: Some("cli-key".into()),
            ..Default::default()
        };
        let merged = base.merge(top);
        assert_eq!(merged.api_key.as_deref(), Some("cli-key"));
        assert_eq!(merged.category.as_deref(), Some("blog"));
    }

    #[test]
    fn file_layer_sits_between_defaults_and_cli() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"backendUrl": "https://file.supabase.co/", "apiKey": "file-key", "category": "gallery"}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = load_from(cli(&["--config-path", &path, "--api-key", "cli-key"]));
        let resolved = config.resolve().unwrap();

        assert_eq!(resolved.backend_url, "https://file.supabase.co/");
        assert_eq!(resolved.api_key, "cli-key");
        assert_eq!(resolved.category, Category::Gallery);
        assert_eq!(resolved.http_max_retries, 3);
        assert_eq!(resolved.realtime_url, "wss://file.supabase.co/realtime/v1/websocket");
    }

    #[test]
    fn malformed_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        assert!(matches!(
            FeedSyncConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        let config = load_from(cli(&["--config-path", &path]));
        assert_eq!(config.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let no_url = FeedSyncConfig::defaults();
        assert!(matches!(no_url.resolve(), Err(ConfigError::Missing("backend_url"))));

        let no_key = FeedSyncConfig {
            backend_url: Some("https://x.supabase.co".into()),
            api_key: Some("  ".into()),
            ..FeedSyncConfig::defaults()
        };
        assert!(matches!(no_key.resolve(), Err(ConfigError::Missing("api_key"))));
    }

    #[test]
    fn anonymous_unless_a_viewer_is_given() {
        let base = FeedSyncConfig {
            backend_url: Some("http://localhost:54321".into()),
            api_key: Some("k".into()),
            ..FeedSyncConfig::defaults()
        };
        let resolved = base.resolve().unwrap();
        assert!(resolved.viewer.is_none());
        assert_eq!(resolved.realtime_url, "ws://localhost:54321/realtime/v1/websocket");

        let signed_in = FeedSyncConfig {
            viewer_id: Some("u-42".into()),
            ..base
        };
        assert_eq!(signed_in.resolve().unwrap().viewer, Some(ViewerId::from("u-42")));
    }

    #[test]
    fn bad_values_are_rejected() {
        let base = FeedSyncConfig {
            backend_url: Some("https://x.supabase.co".into()),
            api_key: Some("k".into()),
            ..FeedSyncConfig::defaults()
        };
        let bad_category = FeedSyncConfig {
            category: Some("podcasts".into()),
            ..base.clone()
        };
        assert!(matches!(
            bad_category.resolve(),
            Err(ConfigError::Invalid { field: "category", .. })
        ));

        let bad_delays = FeedSyncConfig {
            reconnect_base_delay_ms: Some(5000),
            reconnect_max_delay_ms: Some(100),
            ..base.clone()
        };
        assert!(bad_delays.resolve().is_err());

        let bad_url = FeedSyncConfig {
            backend_url: Some("ftp://x".into()),
            ..base
        };
        assert!(matches!(
            bad_url.resolve(),
            Err(ConfigError::Invalid { field: "backend_url", .. })
        ));
    }

    #[test]
    fn realtime_url_keeps_only_the_authority() {
        assert_eq!(
            derive_realtime_url("https://host?x=1").unwrap(),
            "wss://host/realtime/v1/websocket"
        );
        assert_eq!(
            derive_realtime_url("http://localhost:54321/rest/v1/#top").unwrap(),
            "ws://localhost:54321/realtime/v1/websocket"
        );
        assert!(derive_realtime_url("https://").is_err());
        assert!(derive_realtime_url("not a url").is_err());
    }
}
