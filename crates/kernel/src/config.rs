//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::content::CollisionPolicy;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind (default: localhost).
    pub bind_addr: String,

    /// HTTP server port (default: 8080).
    pub http_port: u16,

    /// HTTPS port, recorded for extensions (default: 443).
    pub https_port: u16,

    /// Path to extension sources (default: ./plugins).
    pub plugins_dir: PathBuf,

    /// Target dir for compiled extensions (default: ./.plugins).
    pub plugin_build_dir: PathBuf,

    /// Rebuild extensions even when a unit exists.
    pub plugin_force_rebuild: bool,

    /// Toolchain program used to build extensions (default: cargo).
    pub cargo: String,

    /// PostgreSQL connection URL. When None, content lives in memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Path to uploads directory (default: ./uploads).
    pub uploads_dir: PathBuf,

    /// Base URL for serving uploaded files (default: /api/uploads).
    pub files_url: String,

    /// CORS allowed origins (comma-separated, default: "*").
    pub cors_allowed_origins: Vec<String>,

    /// Request body limit for write endpoints (default: 4 MiB).
    pub max_form_bytes: usize,

    /// Reject forms mixing `field` and `field.N` instead of merging them.
    pub form_reject_ambiguous: bool,

    /// Bearer token that marks a caller as authorized.
    pub api_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "localhost".to_string());

        let http_port = env::var("HTTP_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("HTTP_PORT must be a valid u16")?;

        let https_port = env::var("HTTPS_PORT")
            .unwrap_or_else(|_| "443".to_string())
            .parse()
            .context("HTTPS_PORT must be a valid u16")?;

        let plugins_dir = env::var("PLUGINS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./plugins"));

        let plugin_build_dir = env::var("PLUGIN_BUILD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.plugins"));

        let plugin_force_rebuild = parse_flag("PLUGIN_FORCE_REBUILD")?;

        let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let uploads_dir = env::var("UPLOADS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./uploads"));

        let files_url = env::var("FILES_URL").unwrap_or_else(|_| "/api/uploads".to_string());

        let cors_allowed_origins = env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["*".to_string()]);

        let max_form_bytes = env::var("MAX_FORM_BYTES")
            .unwrap_or_else(|_| "4194304".to_string())
            .parse()
            .context("MAX_FORM_BYTES must be a valid usize")?;

        let form_reject_ambiguous = parse_flag("FORM_REJECT_AMBIGUOUS")?;

        let api_token = env::var("API_TOKEN").ok().filter(|s| !s.is_empty());

        Ok(Self {
            bind_addr,
            http_port,
            https_port,
            plugins_dir,
            plugin_build_dir,
            plugin_force_rebuild,
            cargo,
            database_url,
            database_max_connections,
            uploads_dir,
            files_url,
            cors_allowed_origins,
            max_form_bytes,
            form_reject_ambiguous,
            api_token,
        })
    }

    /// Policy for forms that send both `field` and `field.N`.
    pub fn collision_policy(&self) -> CollisionPolicy {
        if self.form_reject_ambiguous {
            CollisionPolicy::Reject
        } else {
            CollisionPolicy::Append
        }
    }

    /// `host:port` the HTTP listener binds.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "localhost".to_string(),
            http_port: 8080,
            https_port: 443,
            plugins_dir: PathBuf::from("./plugins"),
            plugin_build_dir: PathBuf::from("./.plugins"),
            plugin_force_rebuild: false,
            cargo: "cargo".to_string(),
            database_url: None,
            database_max_connections: 10,
            uploads_dir: PathBuf::from("./uploads"),
            files_url: "/api/uploads".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
            max_form_bytes: 4 * 1024 * 1024,
            form_reject_ambiguous: false,
            api_token: None,
        }
    }
}

fn parse_flag(name: &str) -> Result<bool> {
    match env::var(name) {
        Ok(v) => match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => anyhow::bail!("{name} must be a boolean, got '{other}'"),
        },
        Err(_) => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "localhost:8080");
        assert_eq!(config.files_url, "/api/uploads");
        assert_eq!(config.max_form_bytes, 4_194_304);
        assert_eq!(config.collision_policy(), CollisionPolicy::Append);
    }

    #[test]
    fn strict_forms() {
        let config = Config {
            form_reject_ambiguous: true,
            ..Config::default()
        };
        assert_eq!(config.collision_policy(), CollisionPolicy::Reject);
    }
}
