use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "parceldesk.toml",
    "config/parceldesk.toml",
    "crates/config/parceldesk.toml",
    "../parceldesk.toml",
    "../config/parceldesk.toml",
    "../crates/config/parceldesk.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub session: SessionConfig,
    pub timeline: TimelineConfig,
    pub tracks: TracksConfig,
}

/// Where the REST API lives and how long a single call may take.
///
/// ```
/// use parceldesk_config::ApiConfig;
///
/// let api = ApiConfig::default();
/// assert_eq!(api.base_url, "https://lidercargo.kg/v1/api/users/");
/// assert_eq!(api.request_timeout_seconds, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "ApiConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "ApiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl ApiConfig {
    fn default_base_url() -> String {
        "https://lidercargo.kg/v1/api/users/".to_string()
    }

    const fn default_request_timeout() -> u64 {
        20
    }

    /// Base URL with trailing slashes collapsed to exactly one, so relative
    /// endpoint paths can be appended verbatim.
    ///
    /// ```
    /// use parceldesk_config::ApiConfig;
    ///
    /// let api = ApiConfig {
    ///     base_url: "http://localhost:8000/api///".into(),
    ///     request_timeout_seconds: 5,
    /// };
    /// assert_eq!(api.normalized_base_url(), "http://localhost:8000/api/");
    /// ```
    pub fn normalized_base_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_seconds: Self::default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub store_path: String,
    pub access_key: String,
    pub refresh_key: String,
    pub user_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_path: "parceldesk-session.json".to_string(),
            access_key: "lc_access".to_string(),
            refresh_key: "lc_refresh".to_string(),
            user_key: "lc_user".to_string(),
        }
    }
}

/// Delays after which inferred timeline milestones become visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConfig {
    pub storage_delay_seconds: u64,
    pub truck_delay_seconds: u64,
}

impl TimelineConfig {
    pub fn storage_delay(&self) -> Duration {
        Duration::from_secs(self.storage_delay_seconds)
    }

    pub fn truck_delay(&self) -> Duration {
        Duration::from_secs(self.truck_delay_seconds)
    }
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            storage_delay_seconds: 10,
            truck_delay_seconds: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracksConfig {
    pub history_key: String,
    pub history_limit: usize,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for TracksConfig {
    fn default() -> Self {
        Self {
            history_key: "lc_tracks".to_string(),
            history_limit: 200,
            min_length: 1,
            max_length: 32,
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use parceldesk_config::load;
///
/// std::env::remove_var("PARCELDESK_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.api.base_url.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let mut builder = config::Config::builder()
        .set_default("api.base_url", defaults.api.base_url.clone())?
        .set_default(
            "api.request_timeout_seconds",
            i64::try_from(defaults.api.request_timeout_seconds).unwrap_or(i64::MAX),
        )?
        .set_default("session.store_path", defaults.session.store_path.clone())?
        .set_default("session.access_key", defaults.session.access_key.clone())?
        .set_default("session.refresh_key", defaults.session.refresh_key.clone())?
        .set_default("session.user_key", defaults.session.user_key.clone())?
        .set_default(
            "timeline.storage_delay_seconds",
            i64::try_from(defaults.timeline.storage_delay_seconds).unwrap_or(i64::MAX),
        )?
        .set_default(
            "timeline.truck_delay_seconds",
            i64::try_from(defaults.timeline.truck_delay_seconds).unwrap_or(i64::MAX),
        )?
        .set_default("tracks.history_key", defaults.tracks.history_key.clone())?
        .set_default(
            "tracks.history_limit",
            i64::try_from(defaults.tracks.history_limit).unwrap_or(i64::MAX),
        )?
        .set_default(
            "tracks.min_length",
            i64::try_from(defaults.tracks.min_length).unwrap_or(i64::MAX),
        )?
        .set_default(
            "tracks.max_length",
            i64::try_from(defaults.tracks.max_length).unwrap_or(i64::MAX),
        )?;

    let environment_overrides = config::Environment::with_prefix("PARCELDESK").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("PARCELDESK_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via PARCELDESK_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.tracks.min_length > config.tracks.max_length {
        anyhow::bail!(
            "invalid configuration: tracks.min_length ({}) exceeds tracks.max_length ({})",
            config.tracks.min_length,
            config.tracks.max_length
        );
    }

    config.api.base_url = config.api.normalized_base_url();

    debug!(?config, "loaded client configuration");
    Ok(config)
}
