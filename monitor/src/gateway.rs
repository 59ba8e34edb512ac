//! Typed API calls against the platform, made with the authenticated session.
//!
//! Every call first makes sure the session is logged in. When the platform
//! answers as if it were not (HTTP 401, or redirects that end on the login
//! form), the gateway logs in again once and retries the call once before
//! giving up.

use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, SessionAuthenticator};
use crate::types::{ActivityBatch, Program};

/// `Accept` header sent with every API request.
const ACCEPT_JSON: &str = "application/json; charset=utf-8";

/// Path fragment of the login form, matched case-insensitively.
const LOGIN_FORM_PATH: &str = "/account/login";

/// Errors raised by gateway calls.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Logging in (or logging in again) failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The request failed before a response arrived.
    #[error("HTTP error during {operation}: {source}")]
    Http {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The platform answered with a non-success status.
    #[error("{operation} failed with status {status}")]
    UnexpectedStatus { operation: &'static str, status: u16 },

    /// Still unauthenticated after logging in again.
    #[error("{operation} still unauthenticated after re-login")]
    Unauthenticated { operation: &'static str },

    /// The response body is not the expected JSON.
    #[error("failed to decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The configured API URL cannot carry path segments.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),
}

/// Outcome of a single request.
enum Fetched {
    Body(String),
    Unauthenticated,
}

/// Platform API client bound to one session.
pub struct ActivityGateway {
    session: SessionAuthenticator,
}

impl ActivityGateway {
    /// Wraps a session; the gateway becomes its only user.
    #[must_use]
    pub fn new(session: SessionAuthenticator) -> Self {
        Self { session }
    }

    #[must_use]
    pub fn session(&self) -> &SessionAuthenticator {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionAuthenticator {
        &mut self.session
    }

    /// Number of activity events created after `watermark` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the session cannot be established or the call fails.
    pub async fn count_since(&mut self, watermark: i64) -> Result<usize, GatewayError> {
        let mut url = self.endpoint(&["dashboard", "activity", "amount"])?;
        url.query_pairs_mut()
            .append_pair("lastviewed", &watermark.to_string());

        let count: usize = self.get_json("activity count", url).await?;
        if count > 0 {
            info!(count, watermark, "New activity");
        } else {
            debug!(watermark, "No new activity");
        }
        Ok(count)
    }

    /// Most recent page of activity, newest first.
    ///
    /// The endpoint ignores the watermark; callers take the leading items they need.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the session cannot be established or the call fails.
    pub async fn list_activities(&mut self) -> Result<ActivityBatch, GatewayError> {
        let url = self.endpoint(&["dashboard", "activity"])?;
        let batch: ActivityBatch = self.get_json("activity list", url).await?;
        debug!(
            activities = batch.activities.len(),
            completed = batch.completed,
            "Fetched activity list"
        );
        Ok(batch)
    }

    /// Current state of one program, including its content history.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the session cannot be established or the call fails.
    pub async fn program_snapshot(
        &mut self,
        company_handle: &str,
        program_handle: &str,
    ) -> Result<Program, GatewayError> {
        let url = self.endpoint(&["programs", company_handle, program_handle])?;
        self.get_json("program snapshot", url).await
    }

    /// API base with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let base = &self.session.endpoints().api_url;
        let mut url = Url::parse(base).map_err(|e| GatewayError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| GatewayError::InvalidUrl(base.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &mut self,
        operation: &'static str,
        url: Url,
    ) -> Result<T, GatewayError> {
        self.session.authenticate().await?;

        let body = match self.fetch(operation, url.clone()).await? {
            Fetched::Body(body) => body,
            Fetched::Unauthenticated => {
                warn!(operation, "Session rejected, logging in again");
                self.session.reauthenticate().await?;

                match self.fetch(operation, url).await? {
                    Fetched::Body(body) => body,
                    Fetched::Unauthenticated => {
                        self.session.invalidate();
                        return Err(GatewayError::Unauthenticated { operation });
                    }
                }
            }
        };

        serde_json::from_str(&body).map_err(|source| GatewayError::Decode { operation, source })
    }

    async fn fetch(&self, operation: &'static str, url: Url) -> Result<Fetched, GatewayError> {
        let response = self
            .session
            .client()
            .get(url)
            .header(ACCEPT, ACCEPT_JSON)
            .send()
            .await
            .map_err(|source| GatewayError::Http { operation, source })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || self.is_login_page(response.url()) {
            return Ok(Fetched::Unauthenticated);
        }
        if !status.is_success() {
            return Err(GatewayError::UnexpectedStatus {
                operation,
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| GatewayError::Http { operation, source })?;
        Ok(Fetched::Body(body))
    }

    /// Whether a redirect chain ended on the identity provider instead of the API.
    fn is_login_page(&self, url: &Url) -> bool {
        if url.path().to_ascii_lowercase().contains(LOGIN_FORM_PATH) {
            return true;
        }

        let endpoints = self.session.endpoints();
        match (
            Url::parse(&endpoints.login_url),
            Url::parse(&endpoints.api_url),
        ) {
            (Ok(login), Ok(api)) => {
                login.origin() != api.origin() && url.origin() == login.origin()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, Endpoints};

    fn gateway(endpoints: Endpoints) -> ActivityGateway {
        let session = SessionAuthenticator::new(Credentials::new("a@b.c", "pw", None), endpoints)
            .expect("client should build");
        ActivityGateway::new(session)
    }

    #[test]
    fn endpoint_appends_encoded_segments() {
        let gw = gateway(Endpoints::default());
        let url = gw.endpoint(&["programs", "acme corp", "web/app"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://app.intigriti.com/api/core/researcher/programs/acme%20corp/web%2Fapp"
        );
    }

    #[test]
    fn login_host_detected_when_distinct() {
        let gw = gateway(Endpoints::default());

        let login = Url::parse("https://login.intigriti.com/connect/authorize?x=1").unwrap();
        let api = Url::parse("https://app.intigriti.com/api/core/researcher/dashboard/activity")
            .unwrap();
        assert!(gw.is_login_page(&login));
        assert!(!gw.is_login_page(&api));
    }

    #[test]
    fn login_form_path_detected_on_shared_host() {
        let gw = gateway(Endpoints::single_host("http://127.0.0.1:9"));

        let form = Url::parse("http://127.0.0.1:9/Account/Login?ReturnUrl=%2F").unwrap();
        let api = Url::parse("http://127.0.0.1:9/api/dashboard/activity").unwrap();
        assert!(gw.is_login_page(&form));
        assert!(!gw.is_login_page(&api));
    }
}
