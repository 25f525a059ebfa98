// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;
use crate::controller::ApiClient;
use crate::credential::CredentialHandle;
use crate::model::{SiteStatus, VoucherStatus};
use crate::store::SqliteStore;
use crate::test_support::{credential_for, MemoryCredentialStore};

const SITES: &str = "/openapi/v1/T1/sites";

struct Harness {
    scheduler: Arc<SyncScheduler>,
    store: Arc<SqliteStore>,
    tokens: Arc<TokenCache>,
}

async fn harness(server: &MockServer) -> anyhow::Result<Harness> {
    let credentials =
        CredentialHandle::load(Arc::new(MemoryCredentialStore::with(credential_for(&server.uri()))))
            .await?;
    let api = Arc::new(ApiClient::new(
        Duration::from_secs(2),
        Duration::from_secs(1),
        Duration::from_millis(10),
        "USD",
    )?);
    let tokens = Arc::new(TokenCache::new(api.clone(), credentials.clone(), Duration::from_secs(60)));
    let controller = Arc::new(Controller::new(api, tokens.clone(), credentials));
    let store = Arc::new(SqliteStore::in_memory().await?);
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    };
    let scheduler = SyncScheduler::new(
        controller,
        tokens.clone(),
        store.clone(),
        policy,
        Duration::from_secs(300),
        CancellationToken::new(),
    );
    Ok(Harness { scheduler, store, tokens })
}

fn ok(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "errorCode": 0, "result": result }))
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/openapi/authorize/token"))
        .respond_with(ok(json!({ "accessToken": "AT", "tokenType": "bearer", "expiresIn": 7200 })))
        .mount(server)
        .await;
}

async fn mount_sites(server: &MockServer, ids: &[&str], delay: Duration) {
    let data: Vec<_> = ids.iter().map(|id| json!({ "siteId": id, "name": format!("site {id}") })).collect();
    Mock::given(method("GET"))
        .and(path(SITES))
        .respond_with(ok(json!({ "totalRows": ids.len(), "data": data })).set_delay(delay))
        .mount(server)
        .await;
}

async fn mount_vouchers(server: &MockServer, site: &str, delay: Duration) {
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/{site}/hotspot/vouchers")))
        .respond_with(
            ok(json!({
                "totalRows": 2,
                "data": [
                    { "id": format!("{site}-v1"), "code": "11112222", "status": 0 },
                    { "id": format!("{site}-v2"), "code": "33334444", "status": 2 }
                ]
            }))
            .set_delay(delay),
        )
        .mount(server)
        .await;
}

async fn mount_usage(server: &MockServer, site: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/{site}/hotspot/vouchers/statistics")))
        .respond_with(ok(json!({
            "totalCount": 2, "unusedCount": 1, "inUseCount": 0, "expiredCount": 1, "totalAmount": 500
        })))
        .mount(server)
        .await;
}

async fn wait_idle(scheduler: &SyncScheduler) -> anyhow::Result<SyncStatus> {
    for _ in 0..500 {
        let status = scheduler.status().await;
        if status.phase == SyncPhase::Idle {
            return Ok(status);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("scheduler never returned to idle")
}

#[tokio::test]
async fn full_run_mirrors_sites_vouchers_and_usage() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_sites(&server, &["s1", "s2"], Duration::ZERO).await;
    for site in ["s1", "s2"] {
        mount_vouchers(&server, site, Duration::ZERO).await;
        mount_usage(&server, site).await;
    }
    let h = harness(&server).await?;

    let run = h.scheduler.run_once().await.ok_or_else(|| anyhow::anyhow!("run skipped"))?;
    assert_eq!(run.outcome, SyncOutcome::Succeeded);
    // 2 sites + 4 vouchers + 2 usage rows.
    assert_eq!(run.items_reconciled, 8);
    assert!(run.finished_at.is_some());

    assert_eq!(h.store.list_sites().await?.len(), 2);
    let vouchers = h.store.list_vouchers("s1").await?;
    assert_eq!(vouchers.len(), 2);
    assert!(vouchers.iter().any(|v| v.status == VoucherStatus::Expired));
    assert!(h.store.usage("s2").await?.is_some());

    let status = h.scheduler.status().await;
    assert_eq!(status.phase, SyncPhase::Idle);
    assert_eq!(status.latest.map(|r| r.id), Some(run.id));
    Ok(())
}

#[tokio::test]
async fn credential_rejection_halts_run_and_clears_token() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(SITES))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/s1/hotspot/vouchers")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/s1/hotspot/vouchers/statistics")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(&server).await?;

    let run = h.scheduler.run_once().await.ok_or_else(|| anyhow::anyhow!("run skipped"))?;
    assert_eq!(run.outcome, SyncOutcome::Failed);
    assert_eq!(run.error_kind, Some(ErrorKind::Credential));
    assert_eq!(run.steps.len(), 1);
    // Credential errors are never retried by the step policy.
    assert_eq!(run.steps[0].attempts, 1);
    assert!(!h.tokens.status().await.has_token);
    Ok(())
}

#[tokio::test]
async fn second_trigger_during_run_is_dropped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_sites(&server, &["s1"], Duration::from_millis(300)).await;
    mount_vouchers(&server, "s1", Duration::ZERO).await;
    mount_usage(&server, "s1").await;
    let h = harness(&server).await?;

    assert_eq!(h.scheduler.trigger(), TriggerOutcome::Started);
    assert!(matches!(h.scheduler.trigger(), TriggerOutcome::Skipped { .. }));
    assert!(h.scheduler.run_once().await.is_none());

    let status = wait_idle(&h.scheduler).await?;
    assert_eq!(status.runs_started, 1);
    assert_eq!(status.latest.map(|r| r.outcome), Some(SyncOutcome::Succeeded));
    Ok(())
}

#[tokio::test]
async fn missing_site_is_retired_not_failed() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_sites(&server, &["s1", "gone"], Duration::ZERO).await;
    mount_vouchers(&server, "s1", Duration::ZERO).await;
    mount_usage(&server, "s1").await;
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/gone/hotspot/vouchers")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "errorCode": -33004, "msg": "Site not exist." })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/gone/hotspot/vouchers/statistics")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let h = harness(&server).await?;

    let run = h.scheduler.run_once().await.ok_or_else(|| anyhow::anyhow!("run skipped"))?;
    assert_eq!(run.outcome, SyncOutcome::Succeeded);
    assert!(run.steps.iter().any(|s| s.status == StepStatus::Retired));

    let sites = h.store.list_sites().await?;
    let gone = sites.iter().find(|s| s.remote_site_id == "gone");
    assert_eq!(gone.map(|s| s.status), Some(SiteStatus::Missing));
    Ok(())
}

#[tokio::test]
async fn transient_step_failure_is_partial() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_sites(&server, &["s1"], Duration::ZERO).await;
    mount_vouchers(&server, "s1", Duration::ZERO).await;
    Mock::given(method("GET"))
        .and(path(format!("{SITES}/s1/hotspot/vouchers/statistics")))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    let h = harness(&server).await?;

    let run = h.scheduler.run_once().await.ok_or_else(|| anyhow::anyhow!("run skipped"))?;
    assert_eq!(run.outcome, SyncOutcome::PartiallyFailed);
    assert_eq!(run.error_kind, Some(ErrorKind::Transient));
    // The voucher batch still landed.
    assert_eq!(h.store.list_vouchers("s1").await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn site_list_failure_fails_run() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(SITES))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    let h = harness(&server).await?;

    let run = h.scheduler.run_once().await.ok_or_else(|| anyhow::anyhow!("run skipped"))?;
    assert_eq!(run.outcome, SyncOutcome::Failed);
    assert_eq!(run.steps[0].attempts, 3);
    // Transient failures keep the token.
    assert!(h.tokens.status().await.has_token);
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_at_step_boundary() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_sites(&server, &["s1", "s2"], Duration::ZERO).await;
    mount_vouchers(&server, "s1", Duration::from_millis(300)).await;
    mount_vouchers(&server, "s2", Duration::ZERO).await;
    let h = harness(&server).await?;

    assert_eq!(h.scheduler.trigger(), TriggerOutcome::Started);
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.scheduler.shutdown().await;

    let status = h.scheduler.status().await;
    assert_eq!(status.phase, SyncPhase::Idle);
    assert_eq!(status.latest.map(|r| r.outcome), Some(SyncOutcome::Cancelled));
    // The in-flight batch was written, the next site was never started.
    assert_eq!(h.store.list_vouchers("s1").await?.len(), 2);
    assert!(h.store.list_vouchers("s2").await?.is_empty());
    assert!(matches!(h.scheduler.trigger(), TriggerOutcome::Skipped { .. }));
    Ok(())
}

#[tokio::test]
async fn resync_site_retires_vanished_site() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_token(&server).await;
    mount_sites(&server, &["s1"], Duration::ZERO).await;
    let h = harness(&server).await?;
    h.store
        .upsert_sites(&[crate::model::SiteRecord {
            remote_site_id: "old".into(),
            name: "Old".into(),
            location: None,
        }])
        .await?;

    assert_eq!(h.scheduler.resync_site("old").await?, ResyncOutcome::Retired);
    let sites = h.store.list_sites().await?;
    assert_eq!(sites.first().map(|s| s.status), Some(SiteStatus::Missing));
    assert_eq!(h.scheduler.status().await.runs_started, 0);
    Ok(())
}

#[tokio::test]
async fn resync_site_after_shutdown_is_skipped() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET")).and(path(SITES)).respond_with(ok(json!({}))).expect(0).mount(&server).await;
    let h = harness(&server).await?;
    h.scheduler.shutdown().await;

    let outcome = h.scheduler.resync_site("s1").await?;
    assert!(
        matches!(&outcome, ResyncOutcome::Skipped { reason } if reason.contains("shutting down")),
        "{outcome:?}"
    );
    assert_eq!(h.scheduler.status().await.runs_started, 0);
    Ok(())
}

#[tokio::test]
async fn status_future_is_send() -> anyhow::Result<()> {
    fn assert_send<T: Send>(value: T) -> T {
        value
    }
    let server = MockServer::start().await;
    let h = harness(&server).await?;
    let scheduler = h.scheduler.clone();

    let status = tokio::spawn(assert_send(async move { scheduler.status().await })).await?;
    assert_eq!(status.phase, SyncPhase::Idle);
    Ok(())
}
