mod common;

use chrono::{Duration, Utc};
use common::{Harness, ORG};
use futures::future::join_all;
use gworkspace_nexus::service::maintenance::run_sweep;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn no_stored_credential_yields_none() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;

    let client = h.manager.authenticated_client(ORG).await.unwrap();
    assert!(client.is_none());
    assert_eq!(h.google().token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unconfigured_workspace_yields_none() {
    let h = Harness::start().await;
    h.store_credential(ORG, "live", Some("rt"), Duration::hours(1))
        .await;

    assert!(h.manager.authenticated_client(ORG).await.unwrap().is_none());
    assert!(h.manager.authenticated_client("  ").await.unwrap().is_none());
}

#[tokio::test]
async fn valid_token_is_used_without_refresh() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "still-good", Some("rt"), Duration::minutes(30))
        .await;

    let client = h.manager.authenticated_client(ORG).await.unwrap().unwrap();
    assert_eq!(client.access_token(), "still-good");
    assert_eq!(client.admin_email(), common::ADMIN_EMAIL);
    assert_eq!(h.google().token_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_persisted() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("rt-1"), Duration::hours(-1))
        .await;

    let client = h.manager.authenticated_client(ORG).await.unwrap().unwrap();
    assert_eq!(client.access_token(), "refreshed-1");

    let row = h.manager.tokens().find(ORG).await.unwrap().unwrap();
    assert_eq!(row.access_token, "refreshed-1");
    assert_eq!(row.refresh_count, 1);
    assert!(row.last_refresh_at.is_some());
    assert!(row.expires_at.unwrap() > Utc::now() + Duration::minutes(55));
}

#[tokio::test]
async fn rejected_refresh_yields_none_and_keeps_the_row() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("revoked-rt"), Duration::hours(-1))
        .await;
    h.google().reject_refresh.store(true, Ordering::SeqCst);

    let client = h.manager.authenticated_client(ORG).await.unwrap();
    assert!(client.is_none());

    let row = h.manager.tokens().find(ORG).await.unwrap().unwrap();
    assert_eq!(row.access_token, "stale");
    assert_eq!(row.refresh_token.as_deref(), Some("revoked-rt"));
    assert_eq!(row.refresh_count, 0);
}

#[tokio::test]
async fn refresh_without_new_refresh_token_keeps_the_stored_one() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("long-lived-rt"), Duration::minutes(-5))
        .await;

    h.manager.authenticated_client(ORG).await.unwrap().unwrap();

    let row = h.manager.tokens().find(ORG).await.unwrap().unwrap();
    assert_eq!(row.refresh_token.as_deref(), Some("long-lived-rt"));
}

#[tokio::test]
async fn token_within_skew_is_refreshed() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "about-to-expire", Some("rt"), Duration::seconds(30))
        .await;

    let client = h.manager.authenticated_client(ORG).await.unwrap().unwrap();
    assert_eq!(client.access_token(), "refreshed-1");
}

#[tokio::test]
async fn missing_refresh_token_yields_none() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", None, Duration::hours(-1)).await;

    assert!(h.manager.authenticated_client(ORG).await.unwrap().is_none());
    assert_eq!(h.google().token_calls.load(Ordering::SeqCst), 0);
    assert!(h.manager.tokens().find(ORG).await.unwrap().is_some());
}

#[tokio::test]
async fn second_call_after_refresh_reuses_the_new_token() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("rt"), Duration::hours(-1))
        .await;

    let first = h.manager.authenticated_client(ORG).await.unwrap().unwrap();
    let second = h.manager.authenticated_client(ORG).await.unwrap().unwrap();

    assert_eq!(first.access_token(), second.access_token());
    assert_eq!(h.google().refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_expired_callers_share_one_refresh() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("rt"), Duration::hours(-1))
        .await;
    h.google().token_delay_ms.store(200, Ordering::SeqCst);

    let calls = (0..5).map(|_| h.manager.authenticated_client(ORG));
    let clients = join_all(calls).await;

    for client in clients {
        let client = client.unwrap().expect("every caller gets a client");
        assert_eq!(client.access_token(), "refreshed-1");
    }
    assert_eq!(h.google().refresh_calls.load(Ordering::SeqCst), 1);
    let row = h.manager.tokens().find(ORG).await.unwrap().unwrap();
    assert_eq!(row.refresh_count, 1);
    assert_eq!(h.manager.refreshes_in_flight(), 0);
}

#[tokio::test]
async fn organizations_are_isolated() {
    let h = Harness::start().await;
    h.configure_workspace("org-a").await;
    h.configure_workspace("org-b").await;
    h.store_credential("org-a", "token-a", Some("rt-a"), Duration::hours(1))
        .await;

    let a = h.manager.authenticated_client("org-a").await.unwrap().unwrap();
    assert_eq!(a.organization_id(), "org-a");
    assert!(h.manager.authenticated_client("org-b").await.unwrap().is_none());
}

#[tokio::test]
async fn sweep_refreshes_only_rows_inside_the_window() {
    let h = Harness::start().await;
    h.configure_workspace("org-soon").await;
    h.configure_workspace("org-later").await;
    h.store_credential("org-soon", "soon", Some("rt-soon"), Duration::minutes(5))
        .await;
    h.store_credential("org-later", "later", Some("rt-later"), Duration::hours(2))
        .await;

    let report = run_sweep(&h.manager, &h.config.maintenance).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.failed, 0);

    let soon = h.manager.tokens().find("org-soon").await.unwrap().unwrap();
    assert_eq!(soon.refresh_count, 1);
    let later = h.manager.tokens().find("org-later").await.unwrap().unwrap();
    assert_eq!(later.access_token, "later");
}

#[tokio::test]
async fn sweep_counts_rejections_without_deleting() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("revoked"), Duration::hours(-3))
        .await;
    h.google().reject_refresh.store(true, Ordering::SeqCst);

    let report = run_sweep(&h.manager, &h.config.maintenance).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.failed, 1);
    // upstream rejections are not retried
    assert_eq!(h.google().refresh_calls.load(Ordering::SeqCst), 1);
    assert!(h.manager.tokens().find(ORG).await.unwrap().is_some());
}

#[tokio::test]
async fn transient_refresh_failure_is_an_error_and_keeps_the_row() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("rt"), Duration::hours(-1))
        .await;
    h.google().unavailable_refreshes.store(1, Ordering::SeqCst);

    let err = h.manager.authenticated_client(ORG).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!err.is_rejection());
    assert_eq!(h.google().refresh_calls.load(Ordering::SeqCst), 1);

    let row = h.manager.tokens().find(ORG).await.unwrap().unwrap();
    assert_eq!(row.access_token, "stale");
    assert_eq!(row.refresh_count, 0);
    assert_eq!(h.manager.refreshes_in_flight(), 0);
}

#[tokio::test]
async fn sweep_retries_transient_failures() {
    let h = Harness::start().await;
    h.configure_workspace(ORG).await;
    h.store_credential(ORG, "stale", Some("rt"), Duration::minutes(2))
        .await;
    h.google().unavailable_refreshes.store(1, Ordering::SeqCst);

    let report = run_sweep(&h.manager, &h.config.maintenance).await.unwrap();
    assert_eq!(report.due, 1);
    assert_eq!(report.refreshed, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.google().refresh_calls.load(Ordering::SeqCst), 2);

    let row = h.manager.tokens().find(ORG).await.unwrap().unwrap();
    assert_eq!(row.access_token, "refreshed-2");
    assert_eq!(row.refresh_count, 1);
}
