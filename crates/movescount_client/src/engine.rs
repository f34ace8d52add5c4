use crate::feed::walk_feed;
use crate::store::{ActivityStore, StoreOutcome};
use crate::{Credentials, MovescountClient, MovescountError};
use std::path::PathBuf;

/// Counts reported at the end of a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub activities: usize,
    pub skipped_events: usize,
    pub files_written: usize,
}

/// Owns one client (and through it the session) for a single sync run.
pub struct SyncEngine<C> {
    client: C,
    credentials: Credentials,
    store: ActivityStore,
    session_path: PathBuf,
}

impl<C: MovescountClient> SyncEngine<C> {
    pub fn new(
        client: C,
        credentials: Credentials,
        store: ActivityStore,
        session_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            credentials,
            store,
            session_path: session_path.into(),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Walk the feed and store every move, then persist the session whether
    /// or not that succeeded. A failed run reports its own error even when
    /// saving the session fails too.
    pub async fn run(&self, recurse: bool) -> Result<SyncReport, MovescountError> {
        let outcome = self.sync(recurse).await;
        let saved = self.client.session().save(&self.session_path);
        match (outcome, saved) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(save_err)) => {
                tracing::error!("failed to save session: {}", save_err);
                Err(e)
            }
        }
    }

    async fn sync(&self, recurse: bool) -> Result<SyncReport, MovescountError> {
        tokio::fs::create_dir_all(self.store.destination()).await?;

        let activities = walk_feed(&self.client, &self.credentials, recurse).await?;
        let mut report = SyncReport {
            activities: activities.len(),
            ..SyncReport::default()
        };
        for activity in &activities {
            match self.store.fetch_move(&self.client, activity).await? {
                StoreOutcome::Skipped => report.skipped_events += 1,
                StoreOutcome::Stored { written } => report.files_written += written.len(),
            }
        }
        Ok(report)
    }
}
