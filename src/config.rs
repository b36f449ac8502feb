use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) portal_mapper/0.1";

/// Runtime settings: defaults, then `portal_mapper.toml`, then `PORTAL_*` env vars.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Minimum gap between the starts of two network requests.
    pub throttle_ms: u64,
    pub user_agent: String,
    /// Raw `Cookie` header carrying the portal session.
    pub cookie: Option<String>,
    pub log_level: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            throttle_ms: 350,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookie: None,
            log_level: "info".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        Self::from_builder(
            Config::builder()
                .add_source(File::with_name("portal_mapper").required(false))
                .add_source(Environment::with_prefix("PORTAL")),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self> {
        let defaults = Settings::default();
        let settings = builder
            .set_default("throttle_ms", defaults.throttle_ms as i64)?
            .set_default("user_agent", defaults.user_agent)?
            .set_default("log_level", defaults.log_level)?
            .set_default("timeout_secs", defaults.timeout_secs as i64)?
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_sources() {
        let settings = Settings::from_builder(Config::builder()).unwrap();
        assert_eq!(settings.throttle_ms, 350);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.timeout_secs, 30);
        assert!(settings.cookie.is_none());
    }

    #[test]
    fn overrides_win_over_defaults() {
        let builder = Config::builder()
            .set_override("throttle_ms", 0_i64)
            .unwrap()
            .set_override("cookie", "PHPSESSID=abc")
            .unwrap();
        let settings = Settings::from_builder(builder).unwrap();
        assert_eq!(settings.throttle_ms, 0);
        assert_eq!(settings.cookie.as_deref(), Some("PHPSESSID=abc"));
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
    }
}
