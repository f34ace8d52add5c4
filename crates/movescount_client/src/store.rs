//! Writing activity metadata and exports to the data directory.
//!
//! Files are created at most once: anything already on disk is left alone
//! and never fetched again, which makes interrupted runs safe to repeat.

use crate::{Activity, ExportFormat, MovescountClient, MovescountError};
use std::path::{Path, PathBuf};

/// What happened to one feed record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    /// Not a move; nothing written.
    Skipped,
    /// Files created by this call. Empty when everything already existed.
    Stored { written: Vec<PathBuf> },
}

#[derive(Clone, Debug)]
pub struct ActivityStore {
    destination: PathBuf,
    formats: Vec<ExportFormat>,
}

impl ActivityStore {
    pub fn new(destination: impl Into<PathBuf>, formats: Vec<ExportFormat>) -> Self {
        Self {
            destination: destination.into(),
            formats,
        }
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Write the record's metadata and every requested export that is not
    /// already present. Any HTTP failure aborts immediately.
    pub async fn fetch_move<C>(
        &self,
        client: &C,
        activity: &Activity,
    ) -> Result<StoreOutcome, MovescountError>
    where
        C: MovescountClient + ?Sized,
    {
        let event_id = activity.id().unwrap_or_default();
        if !activity.is_move() {
            tracing::info!(
                "Skipping event {}, type {}",
                event_id,
                activity.event_type().unwrap_or("<none>")
            );
            return Ok(StoreOutcome::Skipped);
        }

        let created = activity.created()?;
        let mut written = Vec::new();

        let json_path = self.destination.join(format!("{created}.json"));
        if !tokio::fs::try_exists(&json_path).await? {
            tracing::info!("Writing {}", json_path.display());
            tokio::fs::write(&json_path, serde_json::to_string(activity.record())?).await?;
            written.push(json_path);
        }

        for &format in &self.formats {
            let format_path = self.destination.join(format!("{created}.{format}"));
            if tokio::fs::try_exists(&format_path).await? {
                continue;
            }
            if event_id.is_empty() {
                return Err(MovescountError::InvalidRecord(
                    "move has no eventObjectId".into(),
                ));
            }
            tracing::info!(
                "Fetching {} for {}",
                format.as_str().to_uppercase(),
                event_id
            );
            let body = client.export_move(&event_id, format).await?;
            tracing::info!("Writing {}", format_path.display());
            tokio::fs::write(&format_path, body).await?;
            written.push(format_path);
        }

        Ok(StoreOutcome::Stored { written })
    }
}
