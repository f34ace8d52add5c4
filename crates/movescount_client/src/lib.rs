//! Client, feed walker and on-disk store for syncing moves out of Movescount.
//!
//! The remote service is reached through the [`MovescountClient`] trait; the
//! reqwest implementation lives in [`http_client`]. [`engine::SyncEngine`]
//! runs the whole auth → walk → fetch sequence.

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod config;
pub mod engine;
pub mod feed;
pub mod http_client;
pub mod session;
pub mod store;
#[cfg(test)]
mod test_utils;

pub use config::{Config, Endpoints, Paths, parse_formats};
pub use engine::{SyncEngine, SyncReport};
pub use feed::{FeedConfig, FeedPage, extract_feed_config, walk_feed};
pub use session::{Session, SessionJar};
pub use store::{ActivityStore, StoreOutcome};

#[derive(Debug, Error)]
pub enum MovescountError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid activity record: {0}")]
    InvalidRecord(String),
    #[error("unknown export format: {0}")]
    UnknownFormat(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// File formats the export endpoint can render a move into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Fit,
    Gpx,
    Kml,
    Tcx,
    Xlsx,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 5] = [
        ExportFormat::Fit,
        ExportFormat::Gpx,
        ExportFormat::Kml,
        ExportFormat::Tcx,
        ExportFormat::Xlsx,
    ];

    /// Name used both as the `format` query value and as the file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Fit => "fit",
            ExportFormat::Gpx => "gpx",
            ExportFormat::Kml => "kml",
            ExportFormat::Tcx => "tcx",
            ExportFormat::Xlsx => "xlsx",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = MovescountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| MovescountError::UnknownFormat(s.to_string()))
    }
}

#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// One entry of the activity feed, kept as the raw JSON object. Object keys
/// stay in the order the service sent them, so the metadata file carries the
/// same fields in the same order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Activity {
    record: serde_json::Value,
}

impl Activity {
    pub const MOVE_TYPE: &'static str = "move";

    pub fn new(record: serde_json::Value) -> Self {
        Self { record }
    }

    pub fn record(&self) -> &serde_json::Value {
        &self.record
    }

    /// `eventObjectId`, accepting either a JSON string or number.
    pub fn id(&self) -> Option<String> {
        self.record.get("eventObjectId").and_then(id_from_value)
    }

    pub fn event_type(&self) -> Option<&str> {
        self.record.get("eventObjectType").and_then(|v| v.as_str())
    }

    pub fn is_move(&self) -> bool {
        self.event_type() == Some(Self::MOVE_TYPE)
    }

    /// `eventCreated`, the base name of every file stored for this activity.
    pub fn created(&self) -> Result<&str, MovescountError> {
        let created = self
            .record
            .get("eventCreated")
            .and_then(|v| v.as_str())
            .ok_or_else(|| MovescountError::InvalidRecord("missing eventCreated".into()))?;
        if !is_safe_path_fragment(created) {
            return Err(MovescountError::InvalidRecord(format!(
                "eventCreated is not a safe file name: {created:?}"
            )));
        }
        Ok(created)
    }
}

fn is_safe_path_fragment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

fn id_from_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = serde_json::Value::deserialize(deserializer)?;
    id_from_value(&value)
        .ok_or_else(|| D::Error::custom(format!("expected string or number, got {value}")))
}

/// The overview page as it was finally served, after following redirects.
#[derive(Clone, Debug)]
pub struct OverviewPage {
    pub url: reqwest::Url,
    pub body: String,
}

impl OverviewPage {
    /// The service bounces unauthenticated sessions to `/auth?redirect_uri=...`.
    pub fn requires_login(&self) -> bool {
        self.url.path().starts_with("/auth")
    }
}

#[async_trait]
pub trait MovescountClient: Send + Sync {
    async fn get_overview(&self) -> Result<OverviewPage, MovescountError>;

    /// Two-step login: request a short-lived token, then exchange it for
    /// session cookies.
    async fn login(&self, credentials: &Credentials) -> Result<(), MovescountError>;

    async fn get_feed_page(&self, feed_url: &str, token: &str)
    -> Result<FeedPage, MovescountError>;

    async fn export_move(
        &self,
        move_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, MovescountError>;

    /// Snapshot of the current session state, suitable for persisting.
    fn session(&self) -> Session;
}
