//! Server configuration.
//!
//! Values come from three layers: built-in defaults, an optional JSON file,
//! and command-line flags (with environment fallbacks). Later layers win.

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use slidecast_hub::ConnectionLimits;
use slidecast_totp::{Algorithm, Totp, TotpError};

pub const DEFAULT_SECRET: &str = "awesomesecret";
pub const DEFAULT_ASSETS_DIR: &str = "static";
pub const DEFAULT_DIGITS: u32 = 8;
pub const DEFAULT_PERIOD: u64 = 30;

/// Where static presentation files are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetSource {
    /// A directory on disk, read on every request. Used while editing slides.
    Live(PathBuf),
    /// The `static` directory shipped next to the executable.
    Bundled(PathBuf),
    /// No static files; only `/ws` and `/code` are served.
    Disabled,
}

impl AssetSource {
    /// Picks the asset directory for a run.
    ///
    /// Live mode uses `assets_dir` as given. Otherwise the directory next to
    /// the executable is used, or nothing when it cannot be found.
    pub fn resolve(live: bool, assets_dir: &Path) -> Self {
        if live {
            return Self::Live(assets_dir.to_path_buf());
        }

        let bundled = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_ASSETS_DIR)));
        match bundled {
            Some(dir) if dir.is_dir() => Self::Bundled(dir),
            Some(dir) => {
                tracing::error!(path = %dir.display(), "bundled assets not found, static files disabled");
                Self::Disabled
            }
            None => {
                tracing::error!("cannot locate executable, static files disabled");
                Self::Disabled
            }
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            Self::Live(dir) | Self::Bundled(dir) => Some(dir),
            Self::Disabled => None,
        }
    }
}

/// On-disk config format. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub listen: Option<SocketAddr>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub live: Option<bool>,
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,
    #[serde(default)]
    pub digits: Option<u32>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub period: Option<u64>,
    #[serde(default)]
    pub skew: Option<u64>,
}

impl ConfigFile {
    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let file = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(file)
    }
}

/// Fully resolved server configuration.
#[derive(Clone)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    /// Passphrase the presenter code is derived from.
    pub secret: String,
    pub assets: AssetSource,
    pub digits: u32,
    pub algorithm: Algorithm,
    /// Code validity window in seconds.
    pub period: u64,
    /// Extra windows accepted on either side of the current one.
    pub skew: u64,
    pub limits: ConnectionLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            secret: DEFAULT_SECRET.into(),
            assets: AssetSource::Disabled,
            digits: DEFAULT_DIGITS,
            algorithm: Algorithm::default(),
            period: DEFAULT_PERIOD,
            skew: 0,
            limits: ConnectionLimits::default(),
        }
    }
}

// Keeps the secret out of logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen)
            .field("secret", &"<redacted>")
            .field("assets", &self.assets)
            .field("digits", &self.digits)
            .field("algorithm", &self.algorithm)
            .field("period", &self.period)
            .field("skew", &self.skew)
            .field("limits", &self.limits)
            .finish()
    }
}

impl ServerConfig {
    /// Builds the presenter code generator described by this config.
    pub fn totp(&self) -> Result<Totp, TotpError> {
        Ok(Totp::from_passphrase(&self.secret)?
            .with_digits(self.digits)?
            .with_algorithm(self.algorithm)
            .with_period(self.period)?
            .with_skew(self.skew)?)
    }
}
