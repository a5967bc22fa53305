use std::fs;

use anyhow::{Context, Result};
use clap::Args;
use serde::Deserialize;

#[derive(Args, Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    #[clap(long, env)]
    #[serde(default)]
    pub database_url: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = 10)]
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[clap(long, env)]
    #[arg(default_value_t = 1)]
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    #[clap(long, env)]
    #[arg(default_value_t = false)]
    #[serde(default)]
    pub run_migrations: bool,
    #[clap(long, env)]
    #[arg(default_value_t = default_rust_log())]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    /// Events the in-process hub keeps for late watchers.
    #[clap(long, env)]
    #[arg(default_value_t = 100)]
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Recorded as the actor of every audit entry.
    #[clap(long, env)]
    #[arg(default_value_t = default_actor())]
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_rust_log() -> String {
    String::from("gim_server=info,gimctl=info")
}

fn default_max_size() -> u32 {
    10
}

fn default_min_idle() -> u32 {
    1
}

fn default_history_size() -> usize {
    100
}

fn default_actor() -> String {
    String::from("gimctl")
}

impl AppConfig {
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("database url is not configured")
    }
}

pub fn load(cfg: &str) -> Result<AppConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    toml::from_str(&content).context("could not parse config file")
}
