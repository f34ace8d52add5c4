use crate::{Credentials, ExportFormat, MovescountError};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};

const CONFIG_DIR_ENV: &str = "MOVESCOUNT_SYNC_CONFIG_DIR";
const CONFIG_FILE_NAME: &str = "movescount.json";
const SESSION_FILE_NAME: &str = "session.json";

/// Locations of the configuration file and the persisted session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub session_file: PathBuf,
}

impl Paths {
    pub fn in_dir(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            config_file: config_dir.join(CONFIG_FILE_NAME),
            session_file: config_dir.join(SESSION_FILE_NAME),
            config_dir,
        }
    }

    pub fn from_env() -> Result<Self, MovescountError> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    /// Resolve paths from `MOVESCOUNT_SYNC_CONFIG_DIR`, falling back to
    /// `~/.config/movescount-sync`.
    pub fn from_env_with<F>(mut get: F) -> Result<Self, MovescountError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(dir) = get(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
            return Ok(Self::in_dir(dir));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| MovescountError::Config("cannot locate home directory".into()))?;
        Ok(Self::in_dir(home.join(".config").join("movescount-sync")))
    }
}

/// Default destination offered when configuring interactively.
pub fn default_data_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("Documents"))
        .join("Movescount")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub email: String,
    #[serde(
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub password: SecretString,
    pub formats: Vec<ExportFormat>,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, MovescountError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            MovescountError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MovescountError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

fn serialize_secret<S: Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

fn deserialize_secret<'de, D: Deserializer<'de>>(d: D) -> Result<SecretString, D::Error> {
    let raw = String::deserialize(d)?;
    Ok(SecretString::new(raw.into()))
}

/// Parse a whitespace separated list of export formats. Every token must be
/// a known format and at least one is required.
pub fn parse_formats(input: &str) -> Result<Vec<ExportFormat>, MovescountError> {
    let formats = input
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<Vec<ExportFormat>, _>>()?;
    if formats.is_empty() {
        return Err(MovescountError::Config("no export format given".into()));
    }
    Ok(formats)
}

/// Remote endpoints used by the HTTP client.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub overview: String,
    pub login: String,
    pub token: String,
    pub login_referer: String,
    pub export: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            overview: "http://www.movescount.com/overview".into(),
            login: "https://servicegate.suunto.com/UserAuthorityService/".into(),
            token: "https://www.movescount.com/services/UserAuthenticated".into(),
            login_referer: "https://www.movescount.com/auth?redirect_uri=%2foverview".into(),
            export: "http://www.movescount.com/move/export".into(),
        }
    }
}

impl Endpoints {
    /// Serve every endpoint from a single host, keeping the production paths.
    pub fn with_base(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            overview: format!("{base}/overview"),
            login: format!("{base}/UserAuthorityService/"),
            token: format!("{base}/services/UserAuthenticated"),
            login_referer: format!("{base}/auth?redirect_uri=%2foverview"),
            export: format!("{base}/move/export"),
        }
    }
}
