//! HTTP client implementation for the Movescount web portal.
//!
//! This module provides a reqwest-based implementation of the
//! [`MovescountClient`](crate::MovescountClient) trait.

use crate::config::Endpoints;
use crate::feed::FeedPage;
use crate::session::{Session, SessionJar};
use crate::{Credentials, ExportFormat, MovescountClient, MovescountError, OverviewPage};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use std::sync::Arc;

/// Desktop browser user agent; the portal serves a different page to
/// unknown clients.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                          AppleWebKit/537.36 (KHTML, like Gecko) \
                          Chrome/55.0.2883.87 Safari/537.36";

const LOGIN_CALLBACK_PREFIX: &str = "jQuery18104619530053417804_";
const LOGIN_CACHE_BUSTER_OFFSET: i64 = 27314;
const LOGIN_SERVICE: &str = "Movescount";
const UTC_OFFSET: &str = "60";
const POST_LOGIN_REDIRECT: &str = "/overview";

/// Client for the Movescount portal using reqwest, holding the session
/// cookies in a [`SessionJar`].
#[derive(Clone, Debug)]
pub struct ReqwestMovescountClient {
    endpoints: Endpoints,
    jar: Arc<SessionJar>,
    client: reqwest::Client,
}

impl ReqwestMovescountClient {
    /// Create a client that resumes `session`.
    pub fn new(endpoints: Endpoints, session: Session) -> Result<Self, MovescountError> {
        let jar = Arc::new(SessionJar::new(session));
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .build()?;
        Ok(Self {
            endpoints,
            jar,
            client,
        })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Send a request and fail on any non-success status.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, MovescountError> {
        let request = request.build()?;
        tracing::debug!("{} {}", request.method(), request.url());
        let resp = self.client.execute(request).await?;
        tracing::debug!("{} <- {}", resp.status(), resp.url());
        if !resp.status().is_success() {
            return Err(Self::error_from_response(resp).await);
        }
        Ok(resp)
    }

    /// Extract error information from a failed response.
    async fn error_from_response(resp: reqwest::Response) -> MovescountError {
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let body = resp.text().await.unwrap_or_default();
        MovescountError::Status {
            status,
            url,
            body: body.chars().take(256).collect(),
        }
    }

    /// The login endpoint answers with JSONP, `callback("<token>")`.
    fn token_from_jsonp(body: &str) -> Result<String, MovescountError> {
        match body.split('"').nth(1) {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(MovescountError::Auth(
                "login response did not contain a token".into(),
            )),
        }
    }
}

#[async_trait]
impl MovescountClient for ReqwestMovescountClient {
    async fn get_overview(&self) -> Result<OverviewPage, MovescountError> {
        let resp = self.send(self.client.get(&self.endpoints.overview)).await?;
        let url = resp.url().clone();
        let body = resp.text().await?;
        Ok(OverviewPage { url, body })
    }

    async fn login(&self, credentials: &Credentials) -> Result<(), MovescountError> {
        tracing::info!("Logging in as {}", credentials.email);
        let ts = chrono::Utc::now().timestamp_millis();
        let callback = format!("{LOGIN_CALLBACK_PREFIX}{ts}");
        let cache_buster = (ts + LOGIN_CACHE_BUSTER_OFFSET).to_string();
        let query = [
            ("callback", callback.as_str()),
            ("service", LOGIN_SERVICE),
            ("emailAddress", credentials.email.as_str()),
            ("password", credentials.password.expose_secret()),
            ("_", cache_buster.as_str()),
        ];
        let resp = self
            .send(
                self.client
                    .get(&self.endpoints.login)
                    .query(&query)
                    .header(reqwest::header::REFERER, &self.endpoints.login_referer),
            )
            .await?;
        let token = Self::token_from_jsonp(&resp.text().await?)?;

        let body = serde_json::json!({
            "token": token,
            "utcOffset": UTC_OFFSET,
            "redirectUri": POST_LOGIN_REDIRECT,
        });
        self.send(self.client.post(&self.endpoints.token).json(&body))
            .await?;
        Ok(())
    }

    async fn get_feed_page(
        &self,
        feed_url: &str,
        token: &str,
    ) -> Result<FeedPage, MovescountError> {
        let resp = self
            .send(self.client.get(feed_url).query(&[("token", token)]))
            .await?;
        let text = resp.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| MovescountError::Parse(format!("malformed feed page: {e}")))
    }

    async fn export_move(
        &self,
        move_id: &str,
        format: ExportFormat,
    ) -> Result<Vec<u8>, MovescountError> {
        let resp = self
            .send(
                self.client
                    .get(&self.endpoints.export)
                    .query(&[("id", move_id), ("format", format.as_str())]),
            )
            .await?;
        Ok(resp.bytes().await?.to_vec())
    }

    fn session(&self) -> Session {
        self.jar.snapshot()
    }
}
