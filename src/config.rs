//! Bot configuration loaded from `~/.config/yomibot/config.toml`.
//!
//! Every field has a default, so an empty (or missing) file yields a working
//! configuration apart from the collaborator secrets, which are read from the
//! environment:
//!
//! - `YOMIBOT_TRANSLATE_API_KEY`
//! - `YOMIBOT_IMGUR_CLIENT_ID`
//! - `YOMIBOT_REDDIT_TOKEN`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const TRANSLATE_KEY_ENV: &str = "YOMIBOT_TRANSLATE_API_KEY";
const IMGUR_CLIENT_ENV: &str = "YOMIBOT_IMGUR_CLIENT_ID";
const REDDIT_TOKEN_ENV: &str = "YOMIBOT_REDDIT_TOKEN";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub queue: QueueConfig,
    pub gates: GateConfig,
    pub render: RenderConfig,
    pub services: ServiceConfig,
}

/// Upstream submission stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Subreddit to watch (without the `r/` prefix)
    pub subreddit: String,
    /// Number of newest submissions requested per poll
    pub listing_size: u32,
    /// Seconds between polls of the listing
    pub poll_interval_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            subreddit: "testingground4bots".to_string(),
            listing_size: 25,
            poll_interval_secs: 10 * 60,
        }
    }
}

/// Work queue timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Seconds between processing ticks
    pub tick_interval_secs: u64,
    /// Items older than this many seconds are discarded
    pub age_limit_secs: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 20 * 60,
            age_limit_secs: 24 * 60 * 60,
        }
    }
}

/// Eligibility gates applied per item.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub allowed_hosts: Vec<String>,
    pub min_view_count: u64,
    pub min_image_dimension: u32,
    pub supported_languages: Vec<String>,
    /// Account whose existing comments mark an item as already handled
    pub bot_username: String,
    /// Number of top-level comments inspected by the already-acted guard
    pub comment_scan_limit: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: [
                "i.redd.it",
                "preview.redd.it",
                "external-preview.redd.it",
                "i.imgur.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_view_count: 100,
            min_image_dimension: 375,
            supported_languages: ["jp", "kr", "cn"].into_iter().map(String::from).collect(),
            bot_username: "IchigoReader".to_string(),
            comment_scan_limit: 100,
        }
    }
}

/// Text layout and bubble drawing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// TTF/OTF font used for translated text. Relative paths resolve
    /// against the working directory; the default ships with the crate
    /// under `fonts/`.
    pub font_path: PathBuf,
    pub start_font_px: f32,
    pub min_font_px: f32,
    pub line_height: f32,
    pub shrink_factor: f32,
    pub corner_radius: f32,
    /// Bubble fill, RGBA
    pub bubble_color: [u8; 4],
    /// Text fill, RGBA
    pub text_color: [u8; 4],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            font_path: PathBuf::from("fonts/DejaVuSans.ttf"),
            start_font_px: 300.0,
            min_font_px: 8.0,
            line_height: 1.375,
            shrink_factor: 0.75,
            corner_radius: 10.0,
            bubble_color: [255, 255, 255, 255],
            text_color: [0, 0, 0, 255],
        }
    }
}

/// External services the pipeline calls.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub translate_endpoint: String,
    pub translate_api_key: String,
    pub imgur_client_id: String,
    /// OAuth bearer token used for posting replies
    pub reddit_token: String,
    pub user_agent: String,
    /// Upper bound for any single collaborator call
    pub call_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            translate_endpoint: "http://localhost:3001/translate".to_string(),
            translate_api_key: String::new(),
            imgur_client_id: String::new(),
            reddit_token: String::new(),
            user_agent: format!("reddit-bot-yomibot/{}", crate::VERSION),
            call_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// With `path == None` the default location is used and a missing file
    /// means "all defaults". An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override secrets from the environment (non-empty values only).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let services = &mut self.services;
        for (key, slot) in [
            (TRANSLATE_KEY_ENV, &mut services.translate_api_key),
            (IMGUR_CLIENT_ENV, &mut services.imgur_client_id),
            (REDDIT_TOKEN_ENV, &mut services.reddit_token),
        ] {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.poll_interval_secs == 0 || self.queue.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll and tick intervals must be positive".to_string(),
            ));
        }
        if self.queue.age_limit_secs <= 0 {
            return Err(ConfigError::Invalid("age limit must be positive".to_string()));
        }
        let render = &self.render;
        for (name, value) in [
            ("start_font_px", render.start_font_px),
            ("min_font_px", render.min_font_px),
            ("line_height", render.line_height),
            ("corner_radius", render.corner_radius),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!("{name} must be finite, got {value}")));
            }
        }
        if !(render.shrink_factor > 0.0 && render.shrink_factor < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "shrink factor must be in (0, 1), got {}",
                render.shrink_factor
            )));
        }
        if render.min_font_px < 1.0 || render.start_font_px < render.min_font_px {
            return Err(ConfigError::Invalid(format!(
                "font sizes must satisfy 1 <= min ({}) <= start ({})",
                render.min_font_px, render.start_font_px
            )));
        }
        if render.line_height <= 0.0 {
            return Err(ConfigError::Invalid("line height must be positive".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.stream.poll_interval_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.queue.tick_interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.services.call_timeout_secs)
    }
}

/// Return the path to the default config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("yomibot")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.queue.age_limit_secs, 86_400);
        assert_eq!(config.gates.min_view_count, 100);
        assert_eq!(config.gates.min_image_dimension, 375);
        assert_eq!(config.gates.allowed_hosts.len(), 4);
        assert!((config.render.line_height - 1.375).abs() < f32::EPSILON);
        assert!((config.render.shrink_factor - 0.75).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_section_keeps_other_defaults() {
        let toml_str = r#"
[stream]
subreddit = "manga"

[gates]
min_view_count = 5
supported_languages = ["jp"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.stream.subreddit, "manga");
        assert_eq!(config.stream.listing_size, 25);
        assert_eq!(config.gates.min_view_count, 5);
        assert_eq!(config.gates.supported_languages, vec!["jp"]);
        assert_eq!(config.gates.bot_username, "IchigoReader");
    }

    #[test]
    fn env_overrides_secrets() {
        let mut config = Config::default();
        config.services.imgur_client_id = "from-file".to_string();
        config.apply_env(|key| match key {
            TRANSLATE_KEY_ENV => Some("secret".to_string()),
            IMGUR_CLIENT_ENV => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.services.translate_api_key, "secret");
        assert_eq!(config.services.imgur_client_id, "from-file");
        assert!(config.services.reddit_token.is_empty());
    }

    #[test]
    fn rejects_shrink_factor_outside_unit_interval() {
        let mut config = Config::default();
        config.render.shrink_factor = 1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_non_finite_render_sizes() {
        for toml_text in [
            "[render]\nstart_font_px = inf",
            "[render]\nstart_font_px = nan",
            "[render]\nmin_font_px = nan",
            "[render]\nline_height = inf",
        ] {
            let config: Config = toml::from_str(toml_text).unwrap();
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "{toml_text}"
            );
        }
    }

    #[test]
    fn default_font_ships_with_the_crate() {
        let font = Path::new(env!("CARGO_MANIFEST_DIR")).join(RenderConfig::default().font_path);
        assert!(font.is_file(), "missing {}", font.display());
    }

    #[test]
    fn rejects_zero_tick_interval() {
        let mut config = Config::default();
        config.queue.tick_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/yomibot.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
