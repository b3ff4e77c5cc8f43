use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::Context;
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    /// Keep the database in memory and drop it on shutdown; `db_path` is ignored.
    pub temporary: bool,
}

impl Config {
    /// Environment first, then a positional port argument on top.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self {
            port: try_load("STRIDE_PORT", "8000")?,
            db_path: try_load::<String>("STRIDE_DB_PATH", "stride-db")?.into(),
            temporary: try_load("STRIDE_DB_TEMPORARY", "false")?,
        };
        if let Some(port) = env::args().nth(1) {
            config.port = port
                .parse()
                .with_context(|| format!("invalid port argument {port:?}"))?;
        }
        Ok(config)
    }

    /// In-memory database on an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self {
            port: 0,
            db_path: PathBuf::new(),
            temporary: true,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid {key} value {raw:?}: {e}"))
}
