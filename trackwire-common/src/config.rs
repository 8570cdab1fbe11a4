//! Service configuration loading
//!
//! Resolution priority for every setting, highest first:
//! 1. Command-line argument (passed in by the binary)
//! 2. Environment variable (`TRACKWIRE_*`)
//! 3. TOML config file
//! 4. Compiled default

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_PORT: u16 = 5780;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_DATABASE: &str = "trackwire.db";

// ISRC registrant identity; a real deployment gets these assigned by the
// national ISRC agency.
const DEFAULT_ISRC_COUNTRY: &str = "US";
const DEFAULT_ISRC_REGISTRANT: &str = "ABC";

/// TOML file shape (all fields optional; missing fields fall through to
/// environment/defaults)
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    host: Option<String>,
    port: Option<u16>,
    database: Option<PathBuf>,
    webhook_secret: Option<String>,
    isrc_country: Option<String>,
    isrc_registrant: Option<String>,
}

/// Resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub database: PathBuf,
    /// Shared secret for payment-webhook signatures; empty disables the check
    pub webhook_secret: String,
    pub isrc_country: String,
    pub isrc_registrant: String,
}

impl ServiceConfig {
    /// Load configuration, merging CLI overrides over env/file/defaults
    pub fn load(
        config_file: Option<&Path>,
        cli_port: Option<u16>,
        cli_database: Option<&Path>,
    ) -> Result<Self> {
        let file = match config_file {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
                })?;
                toml::from_str::<ConfigFile>(&text)
                    .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))?
            }
            None => ConfigFile::default(),
        };

        let host = env_var("TRACKWIRE_HOST")
            .or(file.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match cli_port {
            Some(p) => p,
            None => match env_var("TRACKWIRE_PORT") {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| Error::Config(format!("Invalid TRACKWIRE_PORT: {}", raw)))?,
                None => file.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let database = cli_database
            .map(PathBuf::from)
            .or_else(|| env_var("TRACKWIRE_DATABASE").map(PathBuf::from))
            .or(file.database)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

        let webhook_secret = env_var("TRACKWIRE_WEBHOOK_SECRET")
            .or(file.webhook_secret)
            .unwrap_or_default();

        let isrc_country = env_var("TRACKWIRE_ISRC_COUNTRY")
            .or(file.isrc_country)
            .unwrap_or_else(|| DEFAULT_ISRC_COUNTRY.to_string());

        let isrc_registrant = env_var("TRACKWIRE_ISRC_REGISTRANT")
            .or(file.isrc_registrant)
            .unwrap_or_else(|| DEFAULT_ISRC_REGISTRANT.to_string());

        if isrc_country.len() != 2 || !isrc_country.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(Error::Config(format!(
                "ISRC country must be two uppercase letters, got {:?}",
                isrc_country
            )));
        }
        if isrc_registrant.len() != 3
            || !isrc_registrant
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(Error::Config(format!(
                "ISRC registrant must be three characters [A-Z0-9], got {:?}",
                isrc_registrant
            )));
        }

        Ok(Self {
            host,
            port,
            database,
            webhook_secret,
            isrc_country,
            isrc_registrant,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
