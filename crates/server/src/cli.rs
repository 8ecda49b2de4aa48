//! Command-line interface.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use slidecast_totp::Algorithm;

use crate::config::{AssetSource, ConfigFile, DEFAULT_ASSETS_DIR, ServerConfig};

/// Serve a slide deck and mirror the presenter's navigation to every viewer.
#[derive(Debug, Parser)]
#[command(name = "slidecast", version, about)]
pub struct Cli {
    /// Serve assets from --assets-dir on disk instead of the bundled copy
    #[arg(long)]
    pub live: bool,

    /// Asset directory used in live mode [default: static]
    #[arg(long, value_name = "DIR")]
    pub assets_dir: Option<PathBuf>,

    /// Passphrase the presenter code is derived from
    #[arg(long, env = "SLIDECAST_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Address to listen on [default: 0.0.0.0:8080]
    #[arg(long, env = "SLIDECAST_LISTEN", value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Optional JSON config file; flags override its values
    #[arg(long, env = "SLIDECAST_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Presenter code length [default: 8]
    #[arg(long)]
    pub digits: Option<u32>,

    /// Code hash: sha1, sha256 or sha512 [default: sha256]
    #[arg(long)]
    pub algorithm: Option<Algorithm>,

    /// Code validity window in seconds [default: 30]
    #[arg(long)]
    pub period: Option<u64>,

    /// Extra code windows accepted on either side of the current one [default: 0]
    #[arg(long)]
    pub skew: Option<u64>,
}

impl Cli {
    /// Merges flags over the config file (if any) over built-in defaults.
    pub fn into_config(self) -> anyhow::Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::default(),
        };
        self.merge(file)
    }

    fn merge(self, file: ConfigFile) -> anyhow::Result<ServerConfig> {
        let defaults = ServerConfig::default();

        let file_algorithm = file
            .algorithm
            .as_deref()
            .map(str::parse::<Algorithm>)
            .transpose()
            .context("invalid algorithm in config file")?;

        let live = self.live || file.live.unwrap_or(false);
        let assets_dir = self
            .assets_dir
            .or(file.assets_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR));

        Ok(ServerConfig {
            listen: self.listen.or(file.listen).unwrap_or(defaults.listen),
            secret: self.secret.or(file.secret).unwrap_or(defaults.secret),
            assets: AssetSource::resolve(live, &assets_dir),
            digits: self.digits.or(file.digits).unwrap_or(defaults.digits),
            algorithm: self
                .algorithm
                .or(file_algorithm)
                .unwrap_or(defaults.algorithm),
            period: self.period.or(file.period).unwrap_or(defaults.period),
            skew: self.skew.or(file.skew).unwrap_or(defaults.skew),
            limits: defaults.limits,
        })
    }
}
