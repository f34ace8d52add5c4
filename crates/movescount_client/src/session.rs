//! Cookie-backed session that survives process restarts.
//!
//! [`SessionJar`] is installed as reqwest's cookie provider so every
//! `Set-Cookie`, including those on redirect hops, lands in it. A [`Session`]
//! is the plain-data snapshot that gets written to disk. Header parsing,
//! including the several `Expires` date formats seen in the wild, is left to
//! the `cookie` crate.

use crate::MovescountError;
use cookie::Cookie;
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub domain: String,
    #[serde(default = "root_path")]
    pub path: String,
    pub name: String,
    pub value: String,
    /// Only sent to `domain` itself, not its subdomains.
    #[serde(default)]
    pub host_only: bool,
    #[serde(default)]
    pub secure: bool,
    /// Unix seconds. `None` for a cookie that lives as long as the session.
    #[serde(default)]
    pub expires: Option<i64>,
}

fn root_path() -> String {
    "/".to_string()
}

impl StoredCookie {
    /// A host-only session cookie scoped to `/`.
    pub fn new(
        domain: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            path: root_path(),
            name: name.into(),
            value: value.into(),
            host_only: true,
            secure: false,
            expires: None,
        }
    }

    fn is_expired(&self, now: i64) -> bool {
        self.expires.is_some_and(|at| at <= now)
    }

    fn same_slot(&self, other: &StoredCookie) -> bool {
        self.domain == other.domain && self.path == other.path && self.name == other.name
    }

    fn matches(&self, url: &Url, host: &str) -> bool {
        let host_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(host, &self.domain)
        };
        let scheme_ok = !self.secure || url.scheme() == "https";
        host_ok && scheme_ok && path_matches(url.path(), &self.path)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub cookies: Vec<StoredCookie>,
}

impl Session {
    /// Load a persisted session. A missing file yields a fresh session; an
    /// unreadable one is logged and also yields a fresh session. Cookies that
    /// expired while the session sat on disk are dropped.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("ignoring unreadable session {}: {}", path.display(), e);
                return Self::default();
            }
        };
        let mut session: Self = serde_json::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!("ignoring corrupt session {}: {}", path.display(), e);
            Self::default()
        });
        session.purge_expired(now());
        session
    }

    /// Persist the session, replacing whatever was stored before.
    pub fn save(&self, path: &Path) -> Result<(), MovescountError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!(
            "saved session with {} cookies to {}",
            self.cookies.len(),
            path.display()
        );
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn get(&self, domain: &str, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|c| c.domain == domain && c.name == name)
            .map(|c| c.value.as_str())
    }

    fn purge_expired(&mut self, now: i64) {
        self.cookies.retain(|c| !c.is_expired(now));
    }

    fn apply(&mut self, update: CookieUpdate) {
        match update {
            CookieUpdate::Set(cookie) => {
                match self.cookies.iter_mut().find(|c| c.same_slot(&cookie)) {
                    Some(existing) => *existing = cookie,
                    None => self.cookies.push(cookie),
                }
            }
            CookieUpdate::Remove(cookie) => {
                self.cookies.retain(|c| !c.same_slot(&cookie));
            }
        }
    }

    fn header_for(&self, url: &Url, now: i64) -> Option<String> {
        let host = url.host_str()?.to_ascii_lowercase();
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .filter(|c| !c.is_expired(now) && c.matches(url, &host))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CookieUpdate {
    Set(StoredCookie),
    Remove(StoredCookie),
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_matches(request: &str, cookie: &str) -> bool {
    request == cookie
        || request
            .strip_prefix(cookie)
            .is_some_and(|rest| cookie.ends_with('/') || rest.starts_with('/'))
}

/// Path a cookie gets when the header names none: the request path up to,
/// not including, its last `/`.
fn default_path(url: &Url) -> String {
    match url.path().rfind('/') {
        Some(0) | None => root_path(),
        Some(i) => url.path()[..i].to_string(),
    }
}

/// Interpret one `Set-Cookie` header received for `url` at time `now`.
fn parse_set_cookie(header: &str, url: &Url, now: i64) -> Option<CookieUpdate> {
    let parsed = Cookie::parse(header).ok()?;
    if parsed.name().is_empty() {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();

    let (domain, host_only) = match parsed.domain().filter(|d| !d.is_empty()) {
        Some(d) => {
            let candidate = d.trim_start_matches('.').to_ascii_lowercase();
            // A host may only set cookies for itself or a parent domain.
            if !domain_matches(&host, &candidate) {
                return None;
            }
            (candidate, false)
        }
        None => (host, true),
    };
    let path = match parsed.path() {
        Some(p) if p.starts_with('/') => p.to_string(),
        _ => default_path(url),
    };
    // Max-Age takes precedence over Expires.
    let expires = match parsed.max_age() {
        Some(age) => Some(now.saturating_add(age.whole_seconds())),
        None => parsed.expires_datetime().map(|at| at.unix_timestamp()),
    };

    let cookie = StoredCookie {
        domain,
        path,
        name: parsed.name().to_string(),
        value: parsed.value_trimmed().to_string(),
        host_only,
        secure: parsed.secure().unwrap_or(false),
        expires,
    };
    if cookie.value.is_empty() || cookie.is_expired(now) {
        Some(CookieUpdate::Remove(cookie))
    } else {
        Some(CookieUpdate::Set(cookie))
    }
}

/// Shared, mutable cookie state handed to reqwest.
#[derive(Debug, Default)]
pub struct SessionJar {
    session: RwLock<Session>,
}

impl SessionJar {
    pub fn new(session: Session) -> Self {
        Self {
            session: RwLock::new(session),
        }
    }

    pub fn snapshot(&self) -> Session {
        let mut session = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        session.purge_expired(now());
        session
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let now = now();
        let mut session = self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for header in cookie_headers {
            let Ok(raw) = header.to_str() else {
                continue;
            };
            if let Some(update) = parse_set_cookie(raw, url, now) {
                session.apply(update);
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        let header = self
            .session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .header_for(url, now())?;
        HeaderValue::from_str(&header).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        s.parse().unwrap()
    }

    fn set(jar: &SessionJar, header: &str, at: &str) {
        let value = HeaderValue::from_str(header).unwrap();
        jar.set_cookies(&mut std::iter::once(&value), &url(at));
    }

    fn sent(jar: &SessionJar, at: &str) -> Option<String> {
        jar.cookies(&url(at)).map(|v| v.to_str().unwrap().to_string())
    }

    #[test]
    fn cookie_is_sent_back_to_same_host_only() {
        let jar = SessionJar::default();
        set(&jar, "sid=abc; Path=/; HttpOnly", "https://www.movescount.com/x");

        assert_eq!(
            sent(&jar, "https://www.movescount.com/overview").as_deref(),
            Some("sid=abc")
        );
        assert!(sent(&jar, "https://servicegate.suunto.com/").is_none());
        assert!(sent(&jar, "https://api.www.movescount.com/").is_none());
    }

    #[test]
    fn domain_attribute_covers_subdomains() {
        let jar = SessionJar::default();
        set(&jar, "auth=1; Domain=.movescount.com", "https://www.movescount.com/");
        assert!(sent(&jar, "http://api.movescount.com/").is_some());
        assert!(sent(&jar, "http://notmovescount.com/").is_none());
    }

    #[test]
    fn foreign_domain_attribute_is_ignored() {
        let jar = SessionJar::default();
        set(&jar, "evil=1; Domain=example.org", "https://www.movescount.com/");
        assert!(jar.snapshot().is_empty());
    }

    #[test]
    fn later_cookie_replaces_and_expiry_removes() {
        let jar = SessionJar::default();
        set(&jar, "sid=one; Path=/", "https://www.movescount.com/");
        set(&jar, "sid=two; Path=/", "https://www.movescount.com/");
        assert_eq!(jar.snapshot().get("www.movescount.com", "sid"), Some("two"));

        set(&jar, "sid=gone; Path=/; Max-Age=0", "https://www.movescount.com/");
        assert!(jar.snapshot().is_empty());

        set(&jar, "sid=three; Path=/", "https://www.movescount.com/");
        set(
            &jar,
            "sid=x; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
            "https://www.movescount.com/",
        );
        assert!(jar.snapshot().is_empty());
    }

    #[test]
    fn dashed_expires_date_removes_cookie() {
        let jar = SessionJar::default();
        set(&jar, "auth=live; path=/", "https://www.movescount.com/");
        set(
            &jar,
            "auth=old; expires=Mon, 01-Jan-2001 00:00:00 GMT; path=/",
            "https://www.movescount.com/",
        );
        assert!(jar.snapshot().is_empty());
        assert!(sent(&jar, "https://www.movescount.com/overview").is_none());
    }

    #[test]
    fn future_expiry_is_kept_and_persisted() {
        let jar = SessionJar::default();
        set(
            &jar,
            "auth=new; expires=Fri, 01-Jan-2100 00:00:00 GMT; path=/",
            "https://www.movescount.com/",
        );
        let session = jar.snapshot();
        assert_eq!(session.get("www.movescount.com", "auth"), Some("new"));
        assert_eq!(session.cookies[0].expires, Some(4_102_444_800));
    }

    #[test]
    fn secure_cookie_is_not_sent_over_plain_http() {
        let jar = SessionJar::default();
        set(&jar, "sid=abc; Path=/; Secure", "https://www.movescount.com/");
        assert!(sent(&jar, "https://www.movescount.com/").is_some());
        assert!(sent(&jar, "http://www.movescount.com/").is_none());
        assert!(jar.snapshot().cookies[0].secure);
    }

    #[test]
    fn path_scopes_cookie() {
        let jar = SessionJar::default();
        set(&jar, "feed=1; Path=/feeds", "https://www.movescount.com/");
        set(&jar, "page=1", "https://www.movescount.com/move/export");

        assert_eq!(
            sent(&jar, "https://www.movescount.com/feeds/me-1").as_deref(),
            Some("feed=1")
        );
        assert!(sent(&jar, "https://www.movescount.com/feedsx").is_none());
        assert_eq!(
            sent(&jar, "https://www.movescount.com/move/export").as_deref(),
            Some("page=1")
        );
        assert!(sent(&jar, "https://www.movescount.com/overview").is_none());
    }

    #[test]
    fn same_name_on_different_paths_are_separate() {
        let jar = SessionJar::default();
        set(&jar, "k=root; Path=/", "https://www.movescount.com/");
        set(&jar, "k=feeds; Path=/feeds", "https://www.movescount.com/");
        assert_eq!(jar.snapshot().cookies.len(), 2);
    }

    #[test]
    fn missing_session_file_gives_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::load(&dir.path().join("nope.json"));
        assert!(session.is_empty());
    }

    #[test]
    fn corrupt_session_file_gives_fresh_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Session::load(&path).is_empty());
    }

    #[test]
    fn saved_session_is_restored_with_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("session.json");
        let jar = SessionJar::default();
        set(&jar, "sid=abc; Secure; Path=/", "https://www.movescount.com/");
        jar.snapshot().save(&path).expect("save");

        let restored = SessionJar::new(Session::load(&path));
        assert_eq!(
            sent(&restored, "https://www.movescount.com/overview").as_deref(),
            Some("sid=abc")
        );
        assert!(sent(&restored, "http://www.movescount.com/overview").is_none());
    }

    #[test]
    fn cookies_that_expired_on_disk_are_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut stale = StoredCookie::new("www.movescount.com", "old", "1");
        stale.expires = Some(1);
        Session {
            cookies: vec![stale, StoredCookie::new("www.movescount.com", "sid", "2")],
        }
        .save(&path)
        .unwrap();

        let session = Session::load(&path);
        assert_eq!(session.cookies.len(), 1);
        assert_eq!(session.get("www.movescount.com", "sid"), Some("2"));
    }

    #[test]
    fn session_without_attribute_fields_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{"cookies":[{"domain":"www.movescount.com","name":"sid","value":"v"}]}"#,
        )
        .unwrap();
        let session = Session::load(&path);
        assert_eq!(session.cookies[0].path, "/");
        assert_eq!(session.get("www.movescount.com", "sid"), Some("v"));
    }
}
