//! Server configuration.

use std::net::SocketAddr;
use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::Result;
use crate::BoundaryPolicy;

pub const ENV_PREFIX: &str = "RESUME_RANGE_";
pub const DEFAULT_CONFIG_PATH: &str = "resume-range.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
    /// Size of the synthetic resource in bytes.
    #[serde(default = "default_content_size")]
    pub content_size: usize,
    /// Use a random multipart boundary per response instead of the fixed one.
    #[serde(default)]
    pub random_boundary: bool,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 18062))
}

fn default_content_size() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            content_size: default_content_size(),
            random_boundary: false,
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    /// Reads the optional TOML file at `path`, then `RESUME_RANGE_*`
    /// environment variables on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut figment = Figment::new();
        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        Ok(figment.extract()?)
    }

    pub fn boundary_policy(&self) -> BoundaryPolicy {
        BoundaryPolicy::from_random(self.random_boundary)
    }
}
