use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Countdown tick interval. 1000 ms unless a test shortens it.
    pub tick_interval_ms: u64,
    /// Fallback exam length for categories that carry no time limit.
    pub default_time_limit_minutes: u32,
    /// Delete flows remove locally while the remote delete is in flight.
    pub optimistic_deletes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            default_time_limit_minutes: 10,
            optimistic_deletes: true,
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env_name = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env_name)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: EXAMDECK_)
            .add_source(config::Environment::with_prefix("EXAMDECK").separator("__"))
            .build()?;

        let defaults = Self::default();

        let tick_interval_ms = settings
            .get_int("engine.tick_interval_ms")
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.tick_interval_ms);

        let default_time_limit_minutes = settings
            .get_int("engine.default_time_limit_minutes")
            .ok()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults.default_time_limit_minutes);

        let optimistic_deletes = settings
            .get_bool("engine.optimistic_deletes")
            .unwrap_or(defaults.optimistic_deletes);

        Ok(Self {
            tick_interval_ms,
            default_time_limit_minutes,
            optimistic_deletes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.tick_interval_ms, 1000);
        assert_eq!(cfg.default_time_limit_minutes, 10);
        assert!(cfg.optimistic_deletes);
    }
}
