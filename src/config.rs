//! Environment-driven configuration merged with CLI overrides (§6).

use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{CoreError, Result};
use crate::pool::PoolConfig;

fn humantime_secs(raw: &str) -> std::result::Result<Duration, String> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| format!("expected an integer number of seconds: {e}"))
}

/// Raw environment shape, deserialized the way the teacher's config structs
/// derive `serde::Deserialize` directly from `envy`-style env maps.
#[derive(Debug, Clone, Deserialize)]
struct EnvConfig {
    ldap_server: String,
    ldap_base_dn: String,
    #[serde(default)]
    ldap_is_ad: bool,
    ldap_readonly_user: String,
    ldap_readonly_password: String,

    #[serde(default = "defaults::max_connections")]
    ldap_pool_max_connections: usize,
    #[serde(default = "defaults::min_connections")]
    ldap_pool_min_connections: usize,
    #[serde(default = "defaults::max_idle_secs")]
    ldap_pool_max_idle_secs: u64,
    #[serde(default = "defaults::max_lifetime_secs")]
    ldap_pool_max_lifetime_secs: u64,
    #[serde(default = "defaults::health_check_secs")]
    ldap_pool_health_check_secs: u64,
    #[serde(default = "defaults::acquire_timeout_secs")]
    ldap_pool_acquire_timeout_secs: u64,

    #[serde(default = "defaults::session_duration_secs")]
    session_duration_secs: u64,
    #[serde(default)]
    persist_sessions: bool,
    #[serde(default = "defaults::session_path")]
    session_path: String,

    #[serde(default = "defaults::log_level")]
    log_level: String,
}

mod defaults {
    pub fn max_connections() -> usize {
        10
    }
    pub fn min_connections() -> usize {
        2
    }
    pub fn max_idle_secs() -> u64 {
        15 * 60
    }
    pub fn max_lifetime_secs() -> u64 {
        60 * 60
    }
    pub fn health_check_secs() -> u64 {
        30
    }
    pub fn acquire_timeout_secs() -> u64 {
        10
    }
    pub fn session_duration_secs() -> u64 {
        60 * 60
    }
    pub fn session_path() -> String {
        "/var/lib/dirserve/sessions".to_string()
    }
    pub fn log_level() -> String {
        "info".to_string()
    }
}

/// CLI overrides layered on top of the environment, the way the teacher's
/// binary layers flags over its loaded config file.
#[derive(Debug, Parser)]
#[command(name = "dirserve-server", about = "Directory object cache and connection pool server")]
pub struct CliArgs {
    #[arg(long, env = "LDAP_SERVER")]
    pub ldap_server: Option<String>,

    #[arg(long, env = "LDAP_BASE_DN")]
    pub ldap_base_dn: Option<String>,

    #[arg(long, env = "LDAP_POOL_MAX_CONNECTIONS")]
    pub ldap_pool_max_connections: Option<usize>,

    #[arg(long, env = "LDAP_POOL_MIN_CONNECTIONS")]
    pub ldap_pool_min_connections: Option<usize>,

    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DirectoryEndpoint {
    pub server: String,
    pub base_dn: String,
    pub is_active_directory: bool,
    pub readonly_user: String,
    pub readonly_password: String,
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub duration: Duration,
    pub persist: bool,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub directory: DirectoryEndpoint,
    pub pool: PoolConfig,
    pub session: SessionPolicy,
    pub log_level: String,
}

impl AppConfig {
    /// Load from process environment, then apply CLI overrides, then
    /// validate eagerly — failures surface at startup, not on first use.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let env: EnvConfig = envy_like_from_env()?;

        let directory = DirectoryEndpoint {
            server: args.ldap_server.clone().unwrap_or(env.ldap_server),
            base_dn: args.ldap_base_dn.clone().unwrap_or(env.ldap_base_dn),
            is_active_directory: env.ldap_is_ad,
            readonly_user: env.ldap_readonly_user,
            readonly_password: env.ldap_readonly_password,
        };

        let pool = PoolConfig {
            max_connections: args.ldap_pool_max_connections.unwrap_or(env.ldap_pool_max_connections),
            min_connections: args.ldap_pool_min_connections.unwrap_or(env.ldap_pool_min_connections),
            max_idle_time: Duration::from_secs(env.ldap_pool_max_idle_secs),
            max_lifetime: Duration::from_secs(env.ldap_pool_max_lifetime_secs),
            health_check_interval: Duration::from_secs(env.ldap_pool_health_check_secs),
            acquire_timeout: Duration::from_secs(env.ldap_pool_acquire_timeout_secs),
        };
        pool.validate()?;

        let session = SessionPolicy {
            duration: Duration::from_secs(env.session_duration_secs),
            persist: env.persist_sessions,
            path: env.session_path,
        };

        let log_level = args.log_level.clone().unwrap_or(env.log_level);

        if directory.server.is_empty() {
            return Err(CoreError::Configuration("LDAP_SERVER must not be empty".to_string()));
        }
        if directory.readonly_user.is_empty() {
            return Err(CoreError::Configuration(
                "LDAP_READONLY_USER is required for the background refresh loop".to_string(),
            ));
        }

        Ok(Self {
            directory,
            pool,
            session,
            log_level,
        })
    }
}

/// Deserialize [`EnvConfig`] from `std::env`, matching the key-per-field
/// convention `envy` uses without taking on the extra dependency for a
/// handful of fields.
fn envy_like_from_env() -> Result<EnvConfig> {
    let get = |key: &str| std::env::var(key).ok();
    let get_or = |key: &str, default: String| get(key).unwrap_or(default);
    let get_bool = |key: &str| get(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    let get_u64 = |key: &str, default: u64| -> Result<u64> {
        match get(key) {
            Some(raw) => humantime_secs(&raw)
                .map(|d| d.as_secs())
                .map_err(|e| CoreError::Configuration(format!("{key}: {e}"))),
            None => Ok(default),
        }
    };
    let get_usize = |key: &str, default: usize| -> Result<usize> {
        match get(key) {
            Some(raw) => raw
                .parse::<usize>()
                .map_err(|e| CoreError::Configuration(format!("{key}: {e}"))),
            None => Ok(default),
        }
    };

    Ok(EnvConfig {
        ldap_server: get_or("LDAP_SERVER", String::new()),
        ldap_base_dn: get_or("LDAP_BASE_DN", String::new()),
        ldap_is_ad: get_bool("LDAP_IS_AD"),
        ldap_readonly_user: get_or("LDAP_READONLY_USER", String::new()),
        ldap_readonly_password: get_or("LDAP_READONLY_PASSWORD", String::new()),
        ldap_pool_max_connections: get_usize("LDAP_POOL_MAX_CONNECTIONS", defaults::max_connections())?,
        ldap_pool_min_connections: get_usize("LDAP_POOL_MIN_CONNECTIONS", defaults::min_connections())?,
        ldap_pool_max_idle_secs: get_u64("LDAP_POOL_MAX_IDLE_SECS", defaults::max_idle_secs())?,
        ldap_pool_max_lifetime_secs: get_u64("LDAP_POOL_MAX_LIFETIME_SECS", defaults::max_lifetime_secs())?,
        ldap_pool_health_check_secs: get_u64("LDAP_POOL_HEALTH_CHECK_SECS", defaults::health_check_secs())?,
        ldap_pool_acquire_timeout_secs: get_u64("LDAP_POOL_ACQUIRE_TIMEOUT_SECS", defaults::acquire_timeout_secs())?,
        session_duration_secs: get_u64("SESSION_DURATION_SECS", defaults::session_duration_secs())?,
        persist_sessions: get_bool("PERSIST_SESSIONS"),
        session_path: get_or("SESSION_PATH", defaults::session_path()),
        log_level: get_or("LOG_LEVEL", defaults::log_level()),
    })
}
