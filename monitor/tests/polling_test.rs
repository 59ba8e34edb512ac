//! End-to-end tests for single polling ticks against a mocked platform and webhook.

use std::time::Duration;

use intiwatch_monitor::auth::SessionAuthenticator;
use intiwatch_monitor::config::{Config, Credentials, Endpoints, WebhookProvider};
use intiwatch_monitor::gateway::ActivityGateway;
use intiwatch_monitor::notify::NotificationDispatcher;
use intiwatch_monitor::rate_limit::RateLimiter;
use intiwatch_monitor::scheduler::{PollingScheduler, TickOutcome};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Watermark the scheduler starts from.
const START: i64 = 1_700_000_000;

// =============================================================================
// Test Helpers
// =============================================================================

fn config(server: &MockServer, provider: WebhookProvider, send_last: usize) -> Config {
    Config {
        credentials: Credentials::new("user@example.com", "hunter2", None),
        endpoints: Endpoints::single_host(&server.uri()),
        webhook_url: format!("{}/hook", server.uri()),
        webhook_provider: provider,
        webhook_rate: 100.0,
        tick: Duration::from_secs(60),
        send_last,
    }
}

fn scheduler(server: &MockServer, provider: WebhookProvider, send_last: usize) -> PollingScheduler {
    let config = config(server, provider, send_last);
    let session = SessionAuthenticator::new(config.credentials.clone(), config.endpoints.clone())
        .expect("session client should build")
        .with_watermark(START);
    let dispatcher = NotificationDispatcher::new(
        config.webhook_url.clone(),
        provider,
        RateLimiter::with_rate(config.webhook_rate),
    )
    .expect("webhook client should build");

    PollingScheduler::from_parts(ActivityGateway::new(session), dispatcher, config)
}

fn activity(discriminator: i32, title: &str) -> Value {
    json!({
        "discriminator": discriminator,
        "submissionTitle": title,
        "programName": "Acme",
        "programId": "p1",
        "submissionCode": "ACME-1",
        "companyHandle": "acme",
        "programHandle": "web",
        "programLogoId": "logo",
        "createdAt": 1_700_000_100_000i64,
        "newState": {"status": 1, "closeReason": 0},
        "user": {"role": "TRIAGE", "userName": "t"}
    })
}

async fn mount_valid_session(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/auth/dashboard"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/researcher"))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/researcher"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

async fn mount_count(server: &MockServer, count: usize) {
    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity/amount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(count)))
        .mount(server)
        .await;
}

async fn mount_activities(server: &MockServer, activities: Vec<Value>, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"completed": false, "activities": activities})),
        )
        .expect(expected)
        .mount(server)
        .await;
}

async fn mount_slack_hook(server: &MockServer, expected: u64) {
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(expected)
        .mount(server)
        .await;
}

fn four_activities() -> Vec<Value> {
    vec![
        activity(2, "newest"),
        activity(3, "second"),
        activity(5, "third"),
        activity(2, "oldest"),
    ]
}

// =============================================================================
// Tick Outcomes
// =============================================================================

#[tokio::test]
async fn test_no_new_activity_leaves_watermark() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity/amount"))
        .and(query_param("lastviewed", START.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(0)))
        .expect(1)
        .mount(&server)
        .await;
    mount_activities(&server, vec![], 0).await;
    mount_slack_hook(&server, 0).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::NoChanges);
    assert_eq!(report.watermark, START);
    assert_eq!(sched.gateway().session().watermark(), START);
}

#[tokio::test]
async fn test_sends_only_counted_activities() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 2).await;
    mount_activities(&server, four_activities(), 1).await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("oldest"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(0)
        .mount(&server)
        .await;
    mount_slack_hook(&server, 2).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::Dispatched);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failed, 0);
    assert!(report.watermark > START);
}

#[tokio::test]
async fn test_own_messages_are_skipped() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 2).await;

    let mut own = activity(1, "mine");
    own["user"] = json!({"role": "RESEARCHER", "userName": "me"});
    let mut theirs = activity(1, "theirs");
    theirs["user"] = json!({"role": "TRIAGE", "userName": "triager"});
    mount_activities(&server, vec![own, theirs], 1).await;
    mount_slack_hook(&server, 1).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::Dispatched);
    assert_eq!(report.dispatched, 1);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_count_failure_still_advances_watermark() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity/amount"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_activities(&server, vec![], 0).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::CountFailed);
    assert!(report.watermark > START);
}

#[tokio::test]
async fn test_fetch_failure_still_advances_watermark() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    mount_slack_hook(&server, 0).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::FetchFailed);
    assert!(report.watermark > START);
}

#[tokio::test]
async fn test_auth_failure_keeps_watermark() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/dashboard"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity/amount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(0)
        .mount(&server)
        .await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::AuthFailed);
    assert_eq!(report.watermark, START);
    assert_eq!(sched.gateway().session().watermark(), START);
}

#[tokio::test]
async fn test_cancelled_tick_does_no_work() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/dashboard/activity/amount"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(1)))
        .expect(0)
        .mount(&server)
        .await;
    mount_slack_hook(&server, 0).await;

    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&cancel).await;

    assert_eq!(report.outcome, TickOutcome::Cancelled);
    assert_eq!(sched.gateway().session().watermark(), START);
}

// =============================================================================
// Replay and Delivery
// =============================================================================

#[tokio::test]
async fn test_replay_applies_to_first_tick_only() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 0).await;
    mount_activities(&server, four_activities(), 1).await;
    mount_slack_hook(&server, 3).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 3);
    let cancel = CancellationToken::new();

    let first = sched.run_tick(&cancel).await;
    assert_eq!(first.outcome, TickOutcome::Dispatched);
    assert_eq!(first.dispatched, 3);

    let second = sched.run_tick(&cancel).await;
    assert_eq!(second.outcome, TickOutcome::NoChanges);
    assert_eq!(second.watermark, first.watermark);
}

#[tokio::test]
async fn test_slack_rejection_counts_as_failed() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 1).await;
    mount_activities(&server, four_activities(), 1).await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200).set_body_string("invalid_payload"))
        .expect(1)
        .mount(&server)
        .await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::Dispatched);
    assert_eq!(report.dispatched, 0);
    assert_eq!(report.failed, 1);
    assert!(report.watermark > START);
}

#[tokio::test]
async fn test_one_failed_send_does_not_stop_the_tick() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 3).await;
    mount_activities(&server, four_activities(), 1).await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("second"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;
    mount_slack_hook(&server, 2).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.outcome, TickOutcome::Dispatched);
    assert_eq!(report.dispatched, 2);
    assert_eq!(report.failed, 1);
    assert!(report.watermark > START);
    assert_eq!(sched.gateway().session().watermark(), report.watermark);
}

#[tokio::test]
async fn test_discord_accepts_no_content() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 1).await;
    mount_activities(&server, four_activities(), 1).await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("embeds"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut sched = scheduler(&server, WebhookProvider::Discord, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.dispatched, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_scope_update_embeds_content_diff() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 1).await;
    mount_activities(&server, vec![activity(24, "")], 1).await;

    Mock::given(method("GET"))
        .and(path("/api/programs/acme/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "handle": "web",
            "inScopes": [
                {"createdAt": 1_700_000_000i64, "content": {"content": "old.acme.com\n"}},
                {"createdAt": 1_700_000_100i64, "content": {"content": "new.acme.com\n"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("-old.acme.com"))
        .and(body_string_contains("+new.acme.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.dispatched, 1);
}

#[tokio::test]
async fn test_missing_snapshot_sends_placeholder() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 1).await;
    mount_activities(&server, vec![activity(27, "")], 1).await;

    Mock::given(method("GET"))
        .and(path("/api/programs/acme/web"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_string_contains("Diff unavailable"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let report = sched.run_tick(&CancellationToken::new()).await;

    assert_eq!(report.dispatched, 1);
}

#[tokio::test]
async fn test_watermark_never_moves_backwards() {
    let server = MockServer::start().await;
    mount_valid_session(&server).await;
    mount_count(&server, 1).await;
    mount_activities(&server, four_activities(), 2).await;
    mount_slack_hook(&server, 2).await;

    let mut sched = scheduler(&server, WebhookProvider::Slack, 0);
    let cancel = CancellationToken::new();

    let first = sched.run_tick(&cancel).await;
    let second = sched.run_tick(&cancel).await;

    assert!(first.watermark > START);
    assert!(second.watermark >= first.watermark);
}
