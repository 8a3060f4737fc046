//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use thiserror::Error;

use boardcp_core::BoardUri;
use boardcp_infra::Board;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_BOARDS: &str = "b";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BOARDCP_BIND is not a socket address: {0}")]
    InvalidBind(String),

    #[error("BOARDCP_BOARDS contains an invalid board uri: {0}")]
    InvalidBoard(String),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres connection string; the in-memory store is used when absent.
    pub database_url: Option<String>,
    /// Boards ensured to exist at startup.
    pub boards: Vec<Board>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind = lookup("BOARDCP_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr = bind.parse().map_err(|_| ConfigError::InvalidBind(bind.clone()))?;

        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let boards = lookup("BOARDCP_BOARDS")
            .unwrap_or_else(|| DEFAULT_BOARDS.to_string())
            .split(',')
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .map(|uri| {
                BoardUri::parse(uri)
                    .map(|board_uri| Board {
                        title: format!("/{board_uri}/"),
                        board_uri,
                    })
                    .map_err(|_| ConfigError::InvalidBoard(uri.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bind_addr,
            jwt_secret,
            database_url,
            boards,
        })
    }
}
