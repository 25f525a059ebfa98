// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic reconciliation of sites, vouchers and usage into the mirror.
//!
//! At most one run (or targeted re-sync) writes to the mirror at a time; a
//! trigger that finds one in progress is dropped, not queued.

pub mod retry;
pub mod run;

pub use retry::RetryPolicy;
pub use run::{
    ResyncOutcome, StepKind, StepReport, StepStatus, SyncOutcome, SyncPhase, SyncRun, SyncStatus,
    TriggerOutcome,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::controller::{Controller, ControllerError, ErrorKind};
use crate::model::SiteRecord;
use crate::store::Mirror;
use crate::token::TokenCache;
use retry::{retry, StepFailure};

pub struct SyncScheduler {
    controller: Arc<Controller>,
    tokens: Arc<TokenCache>,
    mirror: Arc<dyn Mirror>,
    policy: RetryPolicy,
    interval: Duration,
    running: AtomicBool,
    runs_started: AtomicU64,
    phase: watch::Sender<SyncPhase>,
    latest: RwLock<Option<SyncRun>>,
    cancel: CancellationToken,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Releases the single-run slot on drop.
struct RunGuard<'a>(&'a SyncScheduler);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        self.0.phase.send_replace(SyncPhase::Idle);
    }
}

enum Flow {
    Completed,
    Aborted,
    Cancelled,
}

/// What a failed per-site step means for the rest of the run.
enum SiteFailure {
    Continue,
    Retired,
    Stop(Flow),
}

fn report(
    step: StepKind,
    site_id: Option<&str>,
    status: StepStatus,
    attempts: u32,
    items: u64,
    err: Option<&ControllerError>,
) -> StepReport {
    StepReport {
        step,
        site_id: site_id.map(str::to_owned),
        status,
        attempts,
        items,
        error_kind: err.map(ControllerError::kind),
        error: err.map(ToString::to_string),
    }
}

impl SyncScheduler {
    pub fn new(
        controller: Arc<Controller>,
        tokens: Arc<TokenCache>,
        mirror: Arc<dyn Mirror>,
        policy: RetryPolicy,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (phase, _) = watch::channel(SyncPhase::Idle);
        Arc::new(Self {
            controller,
            tokens,
            mirror,
            policy,
            interval,
            running: AtomicBool::new(false),
            runs_started: AtomicU64::new(0),
            phase,
            latest: RwLock::new(None),
            cancel,
            timer: Mutex::new(None),
        })
    }

    /// Start the interval loop. The first tick fires immediately.
    pub fn spawn(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                if this.run_once().await.is_none() {
                    tracing::debug!("sync tick dropped, run already in progress");
                }
            }
            tracing::info!("sync scheduler stopped");
        });
        *self.timer.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        tracing::info!(interval_secs = self.interval.as_secs(), "sync scheduler started");
    }

    /// Start a run in the background unless one is already in progress.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        if self.cancel.is_cancelled() {
            return TriggerOutcome::Skipped { reason: "scheduler is shutting down".to_owned() };
        }
        if !self.try_acquire() {
            tracing::warn!("sync trigger dropped, run already in progress");
            return TriggerOutcome::Skipped { reason: "sync run already in progress".to_owned() };
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = RunGuard(&this);
            this.execute().await;
        });
        TriggerOutcome::Started
    }

    /// Run a reconciliation now. `None` when one is already in progress.
    pub async fn run_once(&self) -> Option<SyncRun> {
        if !self.try_acquire() {
            return None;
        }
        let _guard = RunGuard(self);
        Some(self.execute().await)
    }

    /// Re-read one site after the controller reported it missing.
    pub async fn resync_site(&self, site_id: &str) -> Result<ResyncOutcome, ControllerError> {
        if self.cancel.is_cancelled() {
            return Ok(ResyncOutcome::Skipped { reason: "scheduler is shutting down".to_owned() });
        }
        if !self.try_acquire() {
            return Ok(ResyncOutcome::Skipped { reason: "sync run already in progress".to_owned() });
        }
        let _guard = RunGuard(self);

        let sites = self.controller.list_sites().await?;
        let Some(site) = sites.into_iter().find(|s| s.remote_site_id == site_id) else {
            self.mirror.retire_site(site_id).await?;
            tracing::info!(site_id, "targeted re-sync retired missing site");
            return Ok(ResyncOutcome::Retired);
        };
        self.mirror.upsert_sites(std::slice::from_ref(&site)).await?;
        match self.controller.list_vouchers(site_id).await {
            Ok(vouchers) => {
                let count = self.mirror.upsert_vouchers(site_id, &vouchers).await?;
                tracing::info!(site_id, vouchers = count, "targeted re-sync refreshed site");
                Ok(ResyncOutcome::Refreshed { vouchers: count })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.mirror.retire_site(site_id).await?;
                Ok(ResyncOutcome::Retired)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let phase = *self.phase.borrow();
        SyncStatus {
            phase,
            runs_started: self.runs_started.load(Ordering::Relaxed),
            latest: self.latest.read().await.clone(),
        }
    }

    /// Stop the timer and wait for any in-flight run to reach a step
    /// boundary and finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = timer {
            let _ = handle.await;
        }
        let mut phase = self.phase.subscribe();
        let _ = phase.wait_for(|p| *p == SyncPhase::Idle).await;
    }

    fn try_acquire(&self) -> bool {
        let acquired = self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if acquired {
            self.phase.send_replace(SyncPhase::Running);
        }
        acquired
    }

    async fn execute(&self) -> SyncRun {
        let mut run = SyncRun::start();
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        *self.latest.write().await = Some(run.clone());
        tracing::info!(run_id = %run.id, "sync run started");

        let flow = self.reconcile(&mut run).await;
        run.finish(matches!(flow, Flow::Aborted), matches!(flow, Flow::Cancelled));

        match run.outcome {
            SyncOutcome::Succeeded => tracing::info!(
                run_id = %run.id,
                items = run.items_reconciled,
                "sync run succeeded"
            ),
            outcome => tracing::warn!(
                run_id = %run.id,
                ?outcome,
                items = run.items_reconciled,
                failed_steps = run.failed_steps(),
                err = run.error.as_deref().unwrap_or(""),
                "sync run did not fully succeed"
            ),
        }
        *self.latest.write().await = Some(run.clone());
        run
    }

    async fn reconcile(&self, run: &mut SyncRun) -> Flow {
        if self.cancel.is_cancelled() {
            return Flow::Cancelled;
        }
        let controller = &self.controller;

        let (result, attempts) =
            retry(&self.policy, &self.cancel, "sites", move || controller.list_sites()).await;
        let sites = match result {
            Ok(sites) => sites,
            Err(StepFailure::Cancelled) => {
                run.record(report(StepKind::Sites, None, StepStatus::Cancelled, attempts, 0, None));
                return Flow::Cancelled;
            }
            Err(StepFailure::Failed(err)) => {
                run.record(report(StepKind::Sites, None, StepStatus::Failed, attempts, 0, Some(&err)));
                if err.is_credential() {
                    self.abort_on_credential(&err).await;
                }
                return Flow::Aborted;
            }
        };
        match self.mirror_sites(&sites).await {
            Ok(count) => run.record(report(StepKind::Sites, None, StepStatus::Ok, attempts, count, None)),
            Err(err) => {
                run.record(report(StepKind::Sites, None, StepStatus::Failed, attempts, 0, Some(&err)));
                return Flow::Aborted;
            }
        }

        let mut retired = HashSet::new();
        for site in &sites {
            if self.cancel.is_cancelled() {
                return Flow::Cancelled;
            }
            let id = site.remote_site_id.as_str();
            let (result, attempts) =
                retry(&self.policy, &self.cancel, "vouchers", move || controller.list_vouchers(id))
                    .await;
            match result {
                Ok(vouchers) => match self.mirror.upsert_vouchers(id, &vouchers).await {
                    Ok(count) => run.record(report(
                        StepKind::Vouchers,
                        Some(id),
                        StepStatus::Ok,
                        attempts,
                        count,
                        None,
                    )),
                    Err(err) => run.record(report(
                        StepKind::Vouchers,
                        Some(id),
                        StepStatus::Failed,
                        attempts,
                        0,
                        Some(&err),
                    )),
                },
                Err(failure) => {
                    match self.step_failed(run, StepKind::Vouchers, id, attempts, failure).await {
                        SiteFailure::Continue => {}
                        SiteFailure::Retired => {
                            retired.insert(id);
                        }
                        SiteFailure::Stop(flow) => return flow,
                    }
                }
            }
        }

        for site in sites.iter().filter(|s| !retired.contains(s.remote_site_id.as_str())) {
            if self.cancel.is_cancelled() {
                return Flow::Cancelled;
            }
            let id = site.remote_site_id.as_str();
            let (result, attempts) =
                retry(&self.policy, &self.cancel, "usage", move || controller.usage_summary(id)).await;
            match result {
                Ok(usage) => match self.mirror.upsert_usage(id, &usage).await {
                    Ok(()) => {
                        run.record(report(StepKind::Usage, Some(id), StepStatus::Ok, attempts, 1, None))
                    }
                    Err(err) => run.record(report(
                        StepKind::Usage,
                        Some(id),
                        StepStatus::Failed,
                        attempts,
                        0,
                        Some(&err),
                    )),
                },
                Err(failure) => {
                    if let SiteFailure::Stop(flow) =
                        self.step_failed(run, StepKind::Usage, id, attempts, failure).await
                    {
                        return flow;
                    }
                }
            }
        }
        Flow::Completed
    }

    /// Record a failed per-site step.
    async fn step_failed(
        &self,
        run: &mut SyncRun,
        step: StepKind,
        site_id: &str,
        attempts: u32,
        failure: StepFailure,
    ) -> SiteFailure {
        let err = match failure {
            StepFailure::Cancelled => {
                run.record(report(step, Some(site_id), StepStatus::Cancelled, attempts, 0, None));
                return SiteFailure::Stop(Flow::Cancelled);
            }
            StepFailure::Failed(err) => err,
        };
        match err.kind() {
            ErrorKind::Credential => {
                run.record(report(step, Some(site_id), StepStatus::Failed, attempts, 0, Some(&err)));
                self.abort_on_credential(&err).await;
                SiteFailure::Stop(Flow::Aborted)
            }
            ErrorKind::NotFound => match self.mirror.retire_site(site_id).await {
                Ok(()) => {
                    tracing::info!(site_id, "site missing on controller, retired locally");
                    run.record(report(step, Some(site_id), StepStatus::Retired, attempts, 0, Some(&err)));
                    SiteFailure::Retired
                }
                Err(store_err) => {
                    run.record(report(
                        step,
                        Some(site_id),
                        StepStatus::Failed,
                        attempts,
                        0,
                        Some(&store_err),
                    ));
                    SiteFailure::Continue
                }
            },
            _ => {
                run.record(report(step, Some(site_id), StepStatus::Failed, attempts, 0, Some(&err)));
                SiteFailure::Continue
            }
        }
    }

    async fn mirror_sites(&self, sites: &[SiteRecord]) -> Result<u64, ControllerError> {
        let count = self.mirror.upsert_sites(sites).await?;
        let present: Vec<String> = sites.iter().map(|s| s.remote_site_id.clone()).collect();
        self.mirror.retire_missing_sites(&present).await?;
        Ok(count)
    }

    async fn abort_on_credential(&self, err: &ControllerError) {
        tracing::warn!(err = %err, "controller rejected credentials, aborting sync run");
        self.tokens.invalidate().await;
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
