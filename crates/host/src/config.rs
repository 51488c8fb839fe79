//! Server configuration.
//!
//! Everything is sourced from the environment: the desktop shell that
//! launches this process passes the listener address and the shared terminal
//! secret through env vars.

use std::time::Duration;

const DEFAULT_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct Config {
    /// Listener address, `OMT_SERVER_ADDR`.
    pub addr: String,
    /// Bound on draining in-flight connections at shutdown.
    pub shutdown_timeout: Duration,
    /// Shared terminal secret, `OMT_TERMINAL_AUTH_TOKEN`. Empty disables
    /// token auth; the loopback and origin checks still apply.
    pub auth_token: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            auth_token: String::new(),
        }
    }
}

impl Config {
    pub fn load_from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("OMT_SERVER_ADDR") {
            let addr = addr.trim();
            if !addr.is_empty() {
                config.addr = addr.to_string();
            }
        }
        if let Ok(token) = std::env::var("OMT_TERMINAL_AUTH_TOKEN") {
            config.auth_token = token.trim().to_string();
        }
        config
    }
}
