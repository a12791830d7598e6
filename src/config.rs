//! Configuration management

use std::{env, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::gateway::bridge::prefix_matches;
use crate::token::Role;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Session cookie configuration
    pub session: SessionConfig,
    /// Identity token configuration
    pub token: TokenConfig,
    /// Static route table: path prefix -> backend base address
    pub routes: Vec<RouteBindingConfig>,
    /// Outbound proxying configuration
    pub proxy: ProxyConfig,
    /// Users seeded into the credential store at startup
    pub users: Vec<SeedUserConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Session cookie configuration.
///
/// The cookie is the only session state in the system; the gateway itself is
/// stateless and horizontally replicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie
    pub cookie_name: String,
    /// Set the `Secure` attribute on the session cookie
    pub cookie_secure: bool,
    /// `SameSite` attribute (`Lax`, `Strict`, or `None`)
    pub cookie_same_site: String,
    /// Landing path after login when no `redirect` parameter was supplied
    pub default_landing: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "JWT_TOKEN".to_string(),
            cookie_secure: false,
            cookie_same_site: "Lax".to_string(),
            default_landing: "/ui/patients".to_string(),
        }
    }
}

/// Identity token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// HMAC signing secret. Supports `env:VAR_NAME` indirection.
    pub secret: String,
    /// Token (and cookie) lifetime in seconds
    pub ttl_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            ttl_seconds: 43_200,
        }
    }
}

impl TokenConfig {
    /// Resolve the signing secret (expand `env:VAR_NAME` indirection).
    #[must_use]
    pub fn resolve_secret(&self) -> String {
        if let Some(var_name) = self.secret.strip_prefix("env:") {
            env::var(var_name).unwrap_or_else(|_| self.secret.clone())
        } else {
            self.secret.clone()
        }
    }
}

/// One static prefix -> backend binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteBindingConfig {
    /// Path prefix owned by this binding (e.g. `/api`)
    pub prefix: String,
    /// Backend base address (e.g. `http://patient-service:8080/api`)
    pub backend: String,
}

/// Outbound proxying configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Timeout for a single backend call, in seconds. Expiry is treated
    /// identically to a connectivity failure (502).
    pub timeout_seconds: u64,
    /// Maximum request body size accepted for forwarding, in bytes
    pub max_body_bytes: usize,
    /// Maximum length of the target address quoted in 502 diagnostics and logs
    pub diagnostic_limit: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            max_body_bytes: 2 * 1024 * 1024,
            diagnostic_limit: 500,
        }
    }
}

/// A user seeded into the credential store at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUserConfig {
    /// Username (unique)
    pub username: String,
    /// Clear-text password; hashed at startup, never kept
    pub password: String,
    /// Role assigned to the user
    pub role: Role,
}

fn default_routes() -> Vec<RouteBindingConfig> {
    vec![
        RouteBindingConfig {
            prefix: "/api".to_string(),
            backend: "http://127.0.0.1:8082/api".to_string(),
        },
        RouteBindingConfig {
            prefix: "/ui".to_string(),
            backend: "http://127.0.0.1:8084".to_string(),
        },
    ]
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation (empty secret, malformed or overlapping prefixes).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (MEDIGATE_ prefix)
        figment = figment.merge(Env::prefixed("MEDIGATE_").split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        if config.routes.is_empty() {
            config.routes = default_routes();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the route table and token settings.
    ///
    /// Prefixes must start with `/` and be disjoint: no prefix may shadow
    /// another, otherwise the longest-prefix match would silently split one
    /// binding's traffic across two backends.
    pub fn validate(&self) -> Result<()> {
        if self.token.resolve_secret().is_empty() {
            return Err(Error::Config(
                "token.secret must be set (literal or env:VAR_NAME)".to_string(),
            ));
        }

        for route in &self.routes {
            if !route.prefix.starts_with('/') || route.prefix.len() < 2 {
                return Err(Error::Config(format!(
                    "Route prefix must start with '/' and name a path space: {:?}",
                    route.prefix
                )));
            }
            if route.backend.is_empty() {
                return Err(Error::Config(format!(
                    "Route {} has an empty backend address",
                    route.prefix
                )));
            }
        }

        // Segment-aware, the same match the router uses: /api and /apiv2
        // are disjoint, /api and /api/patients are not.
        for (i, a) in self.routes.iter().enumerate() {
            for b in self.routes.iter().skip(i + 1) {
                if prefix_matches(&a.prefix, &b.prefix) || prefix_matches(&b.prefix, &a.prefix) {
                    return Err(Error::Config(format!(
                        "Route prefixes overlap: {} and {}",
                        a.prefix, b.prefix
                    )));
                }
            }
        }

        Ok(())
    }
}
