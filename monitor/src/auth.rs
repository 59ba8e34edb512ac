//! Session authentication against the platform's browser login flow.
//!
//! The platform has no API keys for researchers, so the monitor logs in the
//! way a browser does and keeps the resulting session cookies:
//!
//! ```text
//! Start ──(dashboard reached)──────────────────────────────▶ Authenticated
//!   │
//!   ▼
//! CredentialSubmission ──(2FA redirect)──▶ TwoFactorCheck
//!   │                                         │
//!   ▼                                         ▼
//! OidcExchange(0) ──▶ OidcExchange(1) ──▶ ... ──────────────▶ Authenticated
//! ```
//!
//! Each arrow is one leg: a request whose response (final URL after redirects
//! and HTML body) is carried into the next state. Hidden form fields are read
//! from the *current* response before the next request is built.
//!
//! Authorization for later API calls is the session cookie alone; no bearer
//! token is fetched.
//!
//! TLS certificate validation is disabled for every request this client makes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use reqwest::{Client, Response, Url};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Credentials, Endpoints};
use crate::html::{ExtractError, HtmlPage};
use crate::totp::{self, TotpError};

/// Per-request timeout for platform calls.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Maximum redirects followed within one leg.
const MAX_REDIRECTS: usize = 10;

/// Entry point that redirects to the login form or, with a valid session, to the dashboard.
const DASHBOARD_ENTRY_PATH: &str = "/auth/dashboard";

/// Final path of an authenticated dashboard request.
pub const AUTHENTICATED_PATH: &str = "/researcher";

/// Credential form target on the identity provider.
const LOGIN_PATH: &str = "/Account/Login";

/// Marker in the post-login URL when a second factor is required (compared lowercase).
const TWO_FACTOR_MARKER: &str = "/account/loginwith2fa";

/// Path suffix reached after an accepted second factor.
const TWO_FACTOR_ACCEPTED_SUFFIX: &str = "/authorize";

/// OIDC callbacks on the web app, posted in order.
const OIDC_CALLBACK_PATHS: [&str; 2] = ["/signin-oidc", "/signin-oidc-researcher"];

/// Hidden fields round-tripped to each OIDC callback.
const OIDC_FIELDS: [&str; 5] = ["code", "scope", "state", "session_state", "iss"];

const CSRF_FIELD: &str = "__RequestVerificationToken";
const RETURN_URL_FIELD: &str = "Input.ReturnUrl";
const EMAIL_FIELD: &str = "Input.Email";
const PASSWORD_FIELD: &str = "Input.Password";
const LOCAL_LOGIN_FIELD: &str = "Input.LocalLogin";
const TWO_FACTOR_CODE_FIELD: &str = "Input.TwoFactorAuthentication.VerificationCode";

/// One request/response round-trip of the login flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Dashboard,
    Credentials,
    TwoFactor,
    OidcCallback(usize),
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dashboard => f.write_str("dashboard request"),
            Self::Credentials => f.write_str("credential submission"),
            Self::TwoFactor => f.write_str("two-factor submission"),
            Self::OidcCallback(n) => write!(f, "OIDC callback #{}", n + 1),
        }
    }
}

/// Errors that end an authentication attempt.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The request for a leg failed before a response arrived.
    #[error("HTTP error during {leg}: {source}")]
    Http {
        leg: Leg,
        #[source]
        source: reqwest::Error,
    },

    /// A leg answered with a status other than 2xx/3xx.
    #[error("{leg} failed with status {status}")]
    UnexpectedStatus { leg: Leg, status: u16 },

    /// A hidden form field needed for the next leg is missing.
    #[error("{leg}: {source}")]
    MissingField {
        leg: Leg,
        #[source]
        source: ExtractError,
    },

    /// The account requires 2FA but no TOTP seed is configured.
    #[error("two-factor authentication is enabled but no TOTP secret is configured")]
    MissingSecret,

    /// The configured TOTP seed cannot be used.
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(#[from] TotpError),

    /// The platform did not accept the generated code.
    #[error("two-factor code was rejected")]
    TwoFactorRejected,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl AuthError {
    /// Returns `true` if retrying cannot succeed without a configuration change.
    #[must_use]
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::MissingSecret | Self::InvalidSecret(_) | Self::ClientBuild(_)
        )
    }
}

/// Mutable per-process session: cookie jar, authentication flag and watermark.
#[derive(Debug)]
pub struct SessionState {
    jar: Arc<Jar>,
    authenticated: bool,
    watermark: i64,
}

impl SessionState {
    fn new(watermark: i64) -> Self {
        Self {
            jar: Arc::new(Jar::default()),
            authenticated: false,
            watermark,
        }
    }
}

/// Response of one leg: where the redirects ended and what was served there.
#[derive(Debug)]
struct LegResponse {
    url: Url,
    body: String,
}

/// States of the login flow.
#[derive(Debug)]
enum LoginStep {
    Start,
    CredentialSubmission(LegResponse),
    TwoFactorCheck(LegResponse),
    OidcExchange { page: LegResponse, leg: usize },
    Authenticated,
}

impl LoginStep {
    fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::CredentialSubmission(_) => "credential_submission",
            Self::TwoFactorCheck(_) => "two_factor_check",
            Self::OidcExchange { .. } => "oidc_exchange",
            Self::Authenticated => "authenticated",
        }
    }
}

/// Immutable inputs shared by every leg of one login attempt.
struct LoginContext<'a> {
    client: &'a Client,
    credentials: &'a Credentials,
    endpoints: &'a Endpoints,
}

impl LoginContext<'_> {
    /// Runs one leg and returns the next state.
    async fn transition(&self, step: LoginStep) -> Result<LoginStep, AuthError> {
        match step {
            LoginStep::Start => {
                let url = format!("{}{DASHBOARD_ENTRY_PATH}", self.endpoints.app_url);
                let page = self.get(Leg::Dashboard, &url).await?;
                if page.url.path() == AUTHENTICATED_PATH {
                    debug!("Session cookie still valid");
                    return Ok(LoginStep::Authenticated);
                }
                Ok(LoginStep::CredentialSubmission(page))
            }

            LoginStep::CredentialSubmission(page) => {
                let (token, return_url) = {
                    let html = HtmlPage::parse(&page.body);
                    (
                        field(&html, Leg::Credentials, CSRF_FIELD)?,
                        field(&html, Leg::Credentials, RETURN_URL_FIELD)?,
                    )
                };

                let url = format!("{}{LOGIN_PATH}", self.endpoints.login_url);
                let form = [
                    (CSRF_FIELD, token.as_str()),
                    (RETURN_URL_FIELD, return_url.as_str()),
                    (EMAIL_FIELD, self.credentials.username.as_str()),
                    (LOCAL_LOGIN_FIELD, "True"),
                    (PASSWORD_FIELD, self.credentials.password()),
                ];
                let response = self.post_form(Leg::Credentials, &url, &form).await?;

                if response
                    .url
                    .as_str()
                    .to_ascii_lowercase()
                    .contains(TWO_FACTOR_MARKER)
                {
                    Ok(LoginStep::TwoFactorCheck(response))
                } else {
                    Ok(LoginStep::OidcExchange {
                        page: response,
                        leg: 0,
                    })
                }
            }

            LoginStep::TwoFactorCheck(page) => {
                let secret = self
                    .credentials
                    .totp_secret()
                    .ok_or(AuthError::MissingSecret)?;
                let code = totp::generate_now(secret)?;
                let token = field(&HtmlPage::parse(&page.body), Leg::TwoFactor, CSRF_FIELD)?;

                let form = [
                    (CSRF_FIELD, token.as_str()),
                    (TWO_FACTOR_CODE_FIELD, code.as_str()),
                ];
                let response = self.post_form(Leg::TwoFactor, page.url.as_str(), &form).await?;

                let path = response.url.path();
                if path == AUTHENTICATED_PATH {
                    return Ok(LoginStep::Authenticated);
                }
                if !path.ends_with(TWO_FACTOR_ACCEPTED_SUFFIX) {
                    warn!(path = %path, "Two-factor submission did not reach authorize endpoint");
                    return Err(AuthError::TwoFactorRejected);
                }
                Ok(LoginStep::OidcExchange {
                    page: response,
                    leg: 0,
                })
            }

            LoginStep::OidcExchange { page, leg } => {
                if page.url.path() == AUTHENTICATED_PATH || leg >= OIDC_CALLBACK_PATHS.len() {
                    return Ok(LoginStep::Authenticated);
                }

                let fields = {
                    let html = HtmlPage::parse(&page.body);
                    // Later hops are optional: a page without a code ends the exchange
                    if leg > 0 && !html.has_field("code") {
                        return Ok(LoginStep::Authenticated);
                    }
                    OIDC_FIELDS
                        .iter()
                        .map(|name| Ok((*name, field(&html, Leg::OidcCallback(leg), name)?)))
                        .collect::<Result<Vec<_>, AuthError>>()?
                };

                let url = format!("{}{}", self.endpoints.app_url, OIDC_CALLBACK_PATHS[leg]);
                let form: Vec<(&str, &str)> =
                    fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
                let response = self.post_form(Leg::OidcCallback(leg), &url, &form).await?;

                Ok(LoginStep::OidcExchange {
                    page: response,
                    leg: leg + 1,
                })
            }

            LoginStep::Authenticated => Ok(LoginStep::Authenticated),
        }
    }

    async fn get(&self, leg: Leg, url: &str) -> Result<LegResponse, AuthError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| AuthError::Http { leg, source })?;
        read_leg(leg, response).await
    }

    async fn post_form(
        &self,
        leg: Leg,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<LegResponse, AuthError> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|source| AuthError::Http { leg, source })?;
        read_leg(leg, response).await
    }
}

/// Checks a leg's status and captures its final URL and body.
async fn read_leg(leg: Leg, response: Response) -> Result<LegResponse, AuthError> {
    let status = response.status();
    if !(status.is_success() || status.is_redirection()) {
        return Err(AuthError::UnexpectedStatus {
            leg,
            status: status.as_u16(),
        });
    }

    let url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|source| AuthError::Http { leg, source })?;
    debug!(leg = %leg, status = status.as_u16(), path = %url.path(), "Login leg completed");

    Ok(LegResponse { url, body })
}

fn field(page: &HtmlPage, leg: Leg, name: &str) -> Result<String, AuthError> {
    page.field_value(name)
        .map_err(|source| AuthError::MissingField { leg, source })
}

fn build_client(jar: Arc<Jar>) -> Result<Client, AuthError> {
    Client::builder()
        .cookie_provider(jar)
        .danger_accept_invalid_certs(true)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .user_agent(concat!("intiwatch-monitor/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AuthError::ClientBuild)
}

/// Owner of the one authenticated session of this process.
pub struct SessionAuthenticator {
    credentials: Credentials,
    endpoints: Endpoints,
    client: Client,
    state: SessionState,
}

impl SessionAuthenticator {
    /// Creates an unauthenticated session whose watermark starts at the current time.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClientBuild`] if the HTTP client cannot be created.
    pub fn new(credentials: Credentials, endpoints: Endpoints) -> Result<Self, AuthError> {
        let state = SessionState::new(chrono::Utc::now().timestamp());
        let client = build_client(Arc::clone(&state.jar))?;

        Ok(Self {
            credentials,
            endpoints,
            client,
            state,
        })
    }

    /// Overrides the starting watermark.
    #[must_use]
    pub fn with_watermark(mut self, watermark: i64) -> Self {
        self.state.watermark = watermark;
        self
    }

    /// Ensures the session is authenticated.
    ///
    /// A no-op when the session is already authenticated; use
    /// [`reauthenticate`](Self::reauthenticate) to force a new login.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if any leg of the login flow fails.
    pub async fn authenticate(&mut self) -> Result<(), AuthError> {
        if self.state.authenticated {
            return Ok(());
        }
        self.login().await
    }

    /// Discards the authenticated flag and runs the login flow again.
    ///
    /// Cookies are kept, so a still-valid session short-circuits at the first leg.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if any leg of the login flow fails.
    pub async fn reauthenticate(&mut self) -> Result<(), AuthError> {
        self.state.authenticated = false;
        self.login().await
    }

    async fn login(&mut self) -> Result<(), AuthError> {
        let ctx = LoginContext {
            client: &self.client,
            credentials: &self.credentials,
            endpoints: &self.endpoints,
        };

        let mut step = LoginStep::Start;
        loop {
            debug!(step = step.name(), "Login state");
            step = match step {
                LoginStep::Authenticated => break,
                other => ctx.transition(other).await?,
            };
        }

        self.state.authenticated = true;
        info!(username = %self.credentials.username, "Client authenticated");
        Ok(())
    }

    /// Replaces the credentials and starts over with an empty cookie jar.
    ///
    /// The watermark is kept.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ClientBuild`] if the HTTP client cannot be created.
    pub fn replace_credentials(
        &mut self,
        credentials: Credentials,
        endpoints: Endpoints,
    ) -> Result<(), AuthError> {
        let state = SessionState::new(self.state.watermark);
        self.client = build_client(Arc::clone(&state.jar))?;
        self.state = state;
        self.credentials = credentials;
        self.endpoints = endpoints;
        info!("Session reset with new credentials");
        Ok(())
    }

    /// Returns `true` if the last login succeeded and has not been invalidated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.authenticated
    }

    /// Marks the session as needing a new login.
    pub fn invalidate(&mut self) {
        self.state.authenticated = false;
    }

    /// Unix timestamp separating processed from unprocessed activity.
    #[must_use]
    pub fn watermark(&self) -> i64 {
        self.state.watermark
    }

    /// Moves the watermark forward to `to`; never moves it backwards.
    pub fn advance_watermark(&mut self, to: i64) -> i64 {
        self.state.watermark = self.state.watermark.max(to);
        self.state.watermark
    }

    /// HTTP client carrying the session cookies.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}
