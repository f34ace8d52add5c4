//! Activity feed discovery and pagination.

use crate::{Activity, Credentials, MovescountClient, MovescountError};
use serde::Deserialize;

const CONFIG_MARKER: &str = "mc.OverviewPage.default.main(";
const CONFIG_TERMINATOR: &str = ");";

/// Feed settings embedded in the overview page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedConfig {
    /// Base URL that continuation tokens are appended to.
    pub url: String,
    pub token: String,
    pub target_username: String,
    /// Continuation of the first page.
    pub first_page: String,
}

#[derive(Deserialize)]
struct OverviewBootstrap {
    #[serde(rename = "activityFeed")]
    activity_feed: ActivityFeedPayload,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityFeedPayload {
    url: String,
    token: String,
    #[serde(default)]
    target_username: String,
    feeds: FeedsPayload,
}

#[derive(Deserialize)]
struct FeedsPayload {
    me: FeedRef,
}

#[derive(Deserialize)]
struct FeedRef {
    #[serde(deserialize_with = "crate::deserialize_string_or_number")]
    id: String,
}

/// Pull the activity feed settings out of the overview page markup.
pub fn extract_feed_config(html: &str) -> Result<FeedConfig, MovescountError> {
    let (_, rest) = html
        .split_once(CONFIG_MARKER)
        .ok_or_else(|| MovescountError::Parse("overview page has no feed configuration".into()))?;
    let blob = rest
        .split_once(CONFIG_TERMINATOR)
        .map(|(blob, _)| blob)
        .unwrap_or(rest);
    let bootstrap: OverviewBootstrap = serde_json::from_str(blob)
        .map_err(|e| MovescountError::Parse(format!("malformed feed configuration: {e}")))?;
    let feed = bootstrap.activity_feed;
    Ok(FeedConfig {
        url: feed.url.trim_end_matches('/').to_string(),
        token: feed.token,
        target_username: feed.target_username,
        first_page: feed.feeds.me.id,
    })
}

/// One page of the feed. The first and last entries of `objects` are
/// boundary markers; everything between them is an activity record.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FeedPage {
    pub objects: Vec<serde_json::Value>,
}

impl FeedPage {
    fn check(&self) -> Result<(), MovescountError> {
        if self.objects.len() < 2 {
            return Err(MovescountError::Parse(format!(
                "feed page has {} entries, expected at least the two boundary markers",
                self.objects.len()
            )));
        }
        Ok(())
    }

    pub fn records(&self) -> &[serde_json::Value] {
        match self.objects.len() {
            0..=2 => &[],
            n => &self.objects[1..n - 1],
        }
    }

    /// A page holding only the two boundary markers ends the feed.
    pub fn is_last(&self) -> bool {
        self.objects.len() <= 2
    }

    /// Continuation of the next page, read from the trailing marker.
    pub fn continuation(&self) -> Option<&str> {
        self.objects.last()?.get("url")?.as_str()
    }
}

/// Walk the feed from its newest page, logging in first if the stored
/// session is no longer accepted. With `recurse` unset only the first page
/// is read.
pub async fn walk_feed<C>(
    client: &C,
    credentials: &Credentials,
    recurse: bool,
) -> Result<Vec<Activity>, MovescountError>
where
    C: MovescountClient + ?Sized,
{
    let mut overview = client.get_overview().await?;
    if overview.requires_login() {
        client.login(credentials).await?;
        overview = client.get_overview().await?;
        if overview.requires_login() {
            return Err(MovescountError::Auth(
                "still redirected to the login page after logging in".into(),
            ));
        }
    }

    let config = extract_feed_config(&overview.body)?;
    tracing::info!("Fetching activity feed for {}", config.target_username);

    let mut continuation = config.first_page.clone();
    let mut activities = Vec::new();
    loop {
        tracing::info!("Fetching feed {}", continuation);
        let feed_url = format!("{}/{}", config.url, continuation);
        let page = client.get_feed_page(&feed_url, &config.token).await?;
        page.check()?;
        activities.extend(page.records().iter().cloned().map(Activity::new));

        if page.is_last() || !recurse {
            break;
        }
        continuation = page
            .continuation()
            .ok_or_else(|| {
                MovescountError::Parse("feed page has no continuation url".into())
            })?
            .to_string();
    }

    tracing::debug!("collected {} feed records", activities.len());
    Ok(activities)
}
