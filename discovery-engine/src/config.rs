use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Runtime parameters for the discovery engine. Every field has a literal
/// default; environment variables only override it.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub tenant_id: String,

    pub polling_interval: Duration,
    pub user_rescan_interval: Duration,
    pub jitter_max: Duration,
    pub channel_buffer: usize,
    pub shutdown_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            tenant_id: env::var("TENANT_ID").context("TENANT_ID must be set")?,

            polling_interval: Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 30)?),
            user_rescan_interval: Duration::from_secs(env_u64("USER_RESCAN_INTERVAL_SECS", 60)?),
            jitter_max: Duration::from_secs(env_u64("JITTER_MAX_SECS", 30)?),
            channel_buffer: env_u64("CHANNEL_BUFFER", 50)? as usize,
            shutdown_timeout: Duration::from_secs(env_u64("SHUTDOWN_TIMEOUT_SECS", 10)?),
        })
    }
}

fn env_u64(name: &str, default: u64) -> Result<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{name} must be a valid number")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment variables are process-global, so these tests run
    // serially within this module to avoid clobbering each other; none of
    // them touch variables another test in this crate reads.
    use std::sync::Mutex;
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear() {
        for key in [
            "DATABASE_URL",
            "TENANT_ID",
            "POLL_INTERVAL_SECS",
            "USER_RESCAN_INTERVAL_SECS",
            "JITTER_MAX_SECS",
            "CHANNEL_BUFFER",
            "SHUTDOWN_TIMEOUT_SECS",
        ] {
            env::remove_var(key);
        }
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("TENANT_ID", "tenant-a");
        assert!(Config::from_env().is_err());
        clear();
    }

    #[test]
    fn defaults_match_literal_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/db");
        env::set_var("TENANT_ID", "tenant-a");

        let config = Config::from_env().unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(30));
        assert_eq!(config.user_rescan_interval, Duration::from_secs(60));
        assert_eq!(config.jitter_max, Duration::from_secs(30));
        assert_eq!(config.channel_buffer, 50);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        clear();
    }

    #[test]
    fn overrides_are_honored() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear();
        env::set_var("DATABASE_URL", "postgres://localhost/db");
        env::set_var("TENANT_ID", "tenant-a");
        env::set_var("POLL_INTERVAL_SECS", "5");
        env::set_var("CHANNEL_BUFFER", "200");

        let config = Config::from_env().unwrap();
        assert_eq!(config.polling_interval, Duration::from_secs(5));
        assert_eq!(config.channel_buffer, 200);
        clear();
    }
}
