//! Process configuration, read from the environment (and `.env` through dotenv).

use std::{env, path::PathBuf};

use log::warn;

use crate::consts;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub port: u16,
    pub admin_password: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(consts::DB_PATH),
            port: consts::HTTP_PORT,
            admin_password: consts::ADMIN_PASSWORD.to_string(),
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment.
    /// Unset or unparsable variables fall back to the defaults in [`consts`].
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = lookup(consts::ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.db_path = PathBuf::from(path);
        }

        if let Some(port) = lookup(consts::ENV_PORT) {
            match port.trim().parse() {
                Ok(port) => config.port = port,
                Err(_) => warn!("Ignoring invalid {}: {port}", consts::ENV_PORT),
            }
        }

        if let Some(password) = lookup(consts::ENV_ADMIN_PASSWORD).filter(|p| !p.is_empty()) {
            config.admin_password = password;
        }

        config
    }
}
