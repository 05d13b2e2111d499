// Application Configuration
// Layered config: TOML file overridden by environment variables

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, IdentityProviderConfig};

/// Top-level configuration for the console backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Session and identity provider settings. The session secret and provider
/// credentials arrive from the environment in production.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret the session cookie is sealed with; the sealing key is derived
    /// from it at startup
    pub session_secret: String,

    /// Secure cookie flag; disable only for local development over HTTP
    #[serde(default = "default_true")]
    pub cookie_secure: bool,

    /// Landing page after a successful login
    #[serde(default = "default_home_url")]
    pub home_url: String,

    /// Landing page after a failed login
    #[serde(default = "default_error_url")]
    pub error_url: String,

    pub provider: IdentityProviderConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_true() -> bool {
    true
}

fn default_home_url() -> String {
    "/dashboard".to_string()
}

fn default_error_url() -> String {
    "/login/error".to_string()
}

impl AppConfig {
    /// Load configuration from an optional TOML file with `CONSOLE_*`
    /// environment overrides (e.g. `CONSOLE_AUTH__SESSION_SECRET`).
    pub fn load(path: Option<&str>) -> Result<Self, AuthError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: AppConfig = figment
            .merge(Env::prefixed("CONSOLE_").split("__"))
            .extract()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AuthError> {
        if self.auth.session_secret.len() < 32 {
            return Err(AuthError::Config(
                "auth.session_secret must be at least 32 characters".to_string(),
            ));
        }
        self.auth.provider.validate()
    }
}
