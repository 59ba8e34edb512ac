//! Intiwatch Monitor - bug bounty activity notifier.
//!
//! This crate logs into the Intigriti researcher dashboard the way a browser
//! does, polls the account's activity feed and relays every new entry to a
//! Slack or Discord webhook. Program content changes (scope, FAQ, domains,
//! rules of engagement) are enriched with a diff against the previous version.
//!
//! # Modules
//!
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for monitor operations
//! - [`types`]: Activity feed and program wire types
//! - [`html`]: Hidden form field extraction from login pages
//! - [`totp`]: Time-based one-time passwords for 2FA
//! - [`auth`]: Login state machine and session ownership
//! - [`gateway`]: Typed platform API calls with one re-login retry
//! - [`diff`]: Version-history diffs of program content
//! - [`rate_limit`]: Token bucket pacing webhook sends
//! - [`notify`]: Slack/Discord formatting and delivery
//! - [`scheduler`]: The polling loop and watermark handling

pub mod auth;
pub mod config;
pub mod diff;
pub mod error;
pub mod gateway;
pub mod html;
pub mod notify;
pub mod rate_limit;
pub mod scheduler;
pub mod totp;
pub mod types;

pub use auth::{AuthError, SessionAuthenticator};
pub use config::{Config, ConfigError, Credentials, Endpoints, WebhookProvider};
pub use diff::DiffUnavailable;
pub use error::{MonitorError, Result};
pub use gateway::{ActivityGateway, GatewayError};
pub use notify::{DispatchError, DispatchOutcome, NotificationDispatcher};
pub use rate_limit::RateLimiter;
pub use scheduler::{PollingScheduler, TickOutcome, TickReport};
pub use types::{ActivityBatch, ActivityEvent, ActivityKind, Program};
