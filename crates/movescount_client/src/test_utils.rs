//! In-memory `MovescountClient` used by unit tests.
#![cfg(test)]

use crate::feed::FeedPage;
use crate::session::{Session, StoredCookie};
use crate::{Credentials, ExportFormat, MovescountClient, MovescountError, OverviewPage};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const FEED_BASE: &str = "https://feed.test/api";

/// Overview page markup carrying a feed configuration rooted at [`FEED_BASE`].
pub fn overview_html() -> String {
    let blob = json!({
        "activityFeed": {
            "url": FEED_BASE,
            "token": "feed-token",
            "targetUsername": "alice",
            "feeds": {"me": {"id": "page1"}}
        }
    });
    format!("<script>mc.OverviewPage.default.main({blob});</script>")
}

pub fn overview_page() -> OverviewPage {
    OverviewPage {
        url: "https://www.movescount.com/overview".parse().unwrap(),
        body: overview_html(),
    }
}

pub fn login_page() -> OverviewPage {
    OverviewPage {
        url: "https://www.movescount.com/auth?redirect_uri=%2foverview"
            .parse()
            .unwrap(),
        body: "<html>sign in</html>".into(),
    }
}

/// A feed page wrapping `records` between boundary markers, pointing at `next`.
pub fn feed_page(records: Vec<Value>, next: &str) -> FeedPage {
    let mut objects = vec![json!({"url": "head"})];
    objects.extend(records);
    objects.push(json!({"url": next}));
    FeedPage { objects }
}

pub fn move_record(id: &str, created: &str) -> Value {
    json!({"eventObjectId": id, "eventObjectType": "move", "eventCreated": created})
}

pub fn credentials() -> Credentials {
    Credentials {
        email: "alice@example.com".into(),
        password: secrecy::SecretString::new("pw".into()),
    }
}

#[derive(Default)]
pub struct MockClient {
    /// Served in order; the last one repeats once the queue is drained.
    pub overviews: Mutex<VecDeque<OverviewPage>>,
    /// Feed pages keyed by their full URL.
    pub pages: HashMap<String, FeedPage>,
    pub fail_exports: bool,
    pub logins: AtomicUsize,
    pub page_requests: Mutex<Vec<String>>,
    pub exports: Mutex<Vec<(String, ExportFormat)>>,
}

impl MockClient {
    pub fn with_overviews(overviews: Vec<OverviewPage>) -> Self {
        Self {
            overviews: Mutex::new(overviews.into()),
            ..Self::default()
        }
    }

    pub fn page(mut self, continuation: &str, page: FeedPage) -> Self {
        self.pages
            .insert(format!("{FEED_BASE}/{continuation}"), page);
        self
    }

    pub fn export_count(&self) -> usize {
        self.exports.lock().unwrap().len()
    }
}

#[async_trait]
impl MovescountClient for MockClient {
    async fn get_overview(&self) -> Result<OverviewPage, MovescountError> {
        let mut queue = self.overviews.lock().unwrap();
        let page = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        page.ok_or_else(|| MovescountError::Parse("no overview scripted".into()))
    }

    async fn login(&self, _credentials: &Credentials) -> Result<(), MovescountError> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_feed_page(
        &self,
        feed_url: &str,
        token: &str,
    ) -> Result<FeedPage, MovescountError> {
        assert_eq!(token, "feed-token");
        self.page_requests.lock().unwrap().push(feed_url.to_string());
        self.pages.get(feed_url).cloned().ok_or_else(|| MovescountError::Status {
            status: 404,
            url: feed_url.to_string(),
            body: String::new(),
        })
    }

    async fn export_move(
        &self,
        move_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, MovescountError> {
        self.exports
            .lock()
            .unwrap()
            .push((move_id.to_string(), format));
        if self.fail_exports {
            return Err(MovescountError::Status {
                status: 500,
                url: "export".into(),
                body: String::new(),
            });
        }
        Ok(format!("{format} export of {move_id}").into_bytes())
    }

    fn session(&self) -> Session {
        Session {
            cookies: vec![StoredCookie::new(
                "www.movescount.com",
                "sid",
                format!("logins-{}", self.logins.load(Ordering::SeqCst)),
            )],
        }
    }
}
