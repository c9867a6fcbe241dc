use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "CINEFYRA";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    crate::api::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!(
        "cinefyra/{} (+https://github.com/danielmerja/cinefyra)",
        env!("CARGO_PKG_VERSION")
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retries: default_retries(),
            retry_delay: default_retry_delay(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_millis(200)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_debounce", with = "humantime_serde")]
    pub debounce: Duration,
    /// How close to the end of the list the selection may get before the
    /// next page loads, in rows.
    #[serde(default = "default_scroll_threshold")]
    pub scroll_threshold: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            debounce: default_debounce(),
            scroll_threshold: default_scroll_threshold(),
        }
    }
}

fn default_page_size() -> usize {
    10
}

fn default_debounce() -> Duration {
    Duration::from_millis(500)
}

fn default_scroll_threshold() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Proactive token refresh fires this long before the reported expiry.
    #[serde(default = "default_refresh_skew", with = "humantime_serde")]
    pub refresh_skew: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_skew: default_refresh_skew(),
        }
    }
}

fn default_refresh_skew() -> Duration {
    Duration::from_secs(60)
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

/// Layering: defaults, then the config file, then `PREFIX_`-env overrides.
/// Missing file keys fall back to defaults through serde; env values are
/// written directly onto the merged config so an absent variable never
/// resets a file-configured value.
pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "enrich.workers" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.enrich.workers = parsed;
            }
        }
        "enrich.retries" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.enrich.retries = parsed;
            }
        }
        "enrich.retry_delay" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.enrich.retry_delay = duration;
            }
        }
        "feed.page_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.page_size = parsed;
            }
        }
        "feed.debounce" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.feed.debounce = duration;
            }
        }
        "feed.scroll_threshold" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.scroll_threshold = parsed;
            }
        }
        "auth.refresh_skew" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.auth.refresh_skew = duration;
            }
        }
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("cinefyra").join("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_defaults_without_files() {
        let dir = tempdir().unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            env_prefix: Some("CINEFYRA_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.enrich.workers, 4);
        assert_eq!(cfg.feed.page_size, 10);
        assert_eq!(cfg.feed.debounce, Duration::from_millis(500));
        assert_eq!(cfg.auth.refresh_skew, Duration::from_secs(60));
        assert_eq!(cfg.api.base_url, crate::api::DEFAULT_BASE_URL);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: http://localhost:3000/\nfeed:\n  page_size: 25\n  debounce: 250ms\n",
        )
        .unwrap();
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CINEFYRA_TEST_NONE".into()),
        })
        .unwrap();
        assert_eq!(cfg.api.base_url, "http://localhost:3000/");
        assert_eq!(cfg.feed.page_size, 25);
        assert_eq!(cfg.feed.debounce, Duration::from_millis(250));
        // untouched sections keep their defaults
        assert_eq!(cfg.enrich.retries, 2);
    }

    #[test]
    fn env_overlays_the_file_without_resetting_it() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "api:\n  base_url: http://localhost:3000/\nenrich:\n  retry_delay: 50ms\nfeed:\n  debounce: 250ms\n",
        )
        .unwrap();
        env::set_var("CINEFYRA_OVERLAY_FEED__PAGE_SIZE", "40");
        let cfg = load(LoadOptions {
            config_file: Some(path),
            env_prefix: Some("CINEFYRA_OVERLAY".into()),
        })
        .unwrap();
        // the one env var applies
        assert_eq!(cfg.feed.page_size, 40);
        // file values without a matching env var survive
        assert_eq!(cfg.api.base_url, "http://localhost:3000/");
        assert_eq!(cfg.enrich.retry_delay, Duration::from_millis(50));
        assert_eq!(cfg.feed.debounce, Duration::from_millis(250));
        env::remove_var("CINEFYRA_OVERLAY_FEED__PAGE_SIZE");
    }

    #[test]
    fn env_overrides() {
        env::set_var("CINEFYRA_ENVTEST_FEED__PAGE_SIZE", "50");
        env::set_var("CINEFYRA_ENVTEST_ENRICH__RETRY_DELAY", "1s");
        let cfg = load(LoadOptions {
            config_file: Some(PathBuf::from("/nonexistent/config.yaml")),
            env_prefix: Some("CINEFYRA_ENVTEST".into()),
        })
        .unwrap();
        assert_eq!(cfg.feed.page_size, 50);
        assert_eq!(cfg.enrich.retry_delay, Duration::from_secs(1));
        env::remove_var("CINEFYRA_ENVTEST_FEED__PAGE_SIZE");
        env::remove_var("CINEFYRA_ENVTEST_ENRICH__RETRY_DELAY");
    }
}
