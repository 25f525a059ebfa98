// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Observability record of one reconciliation pass.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::controller::ErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    Running,
    Succeeded,
    PartiallyFailed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Sites,
    Vouchers,
    Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    /// Site vanished remotely and was retired locally.
    Retired,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: StepKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    pub status: StepStatus,
    pub attempts: u32,
    pub items: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Latest-run record. Only one is retained.
#[derive(Debug, Clone, Serialize)]
pub struct SyncRun {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: SyncOutcome,
    pub items_reconciled: u64,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    pub steps: Vec<StepReport>,
}

impl SyncRun {
    pub fn start() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            outcome: SyncOutcome::Running,
            items_reconciled: 0,
            error_kind: None,
            error: None,
            steps: Vec::new(),
        }
    }

    pub fn record(&mut self, report: StepReport) {
        if report.status == StepStatus::Ok {
            self.items_reconciled += report.items;
        }
        if self.error.is_none() && report.status == StepStatus::Failed {
            self.error_kind = report.error_kind;
            self.error = report.error.clone();
        }
        self.steps.push(report);
    }

    /// Close the run. `aborted` marks a run-level failure (site list or
    /// credential rejection); otherwise any failed step is partial.
    pub fn finish(&mut self, aborted: bool, cancelled: bool) {
        self.finished_at = Some(Utc::now());
        self.outcome = if cancelled {
            SyncOutcome::Cancelled
        } else if aborted {
            SyncOutcome::Failed
        } else if self.steps.iter().any(|s| s.status == StepStatus::Failed) {
            SyncOutcome::PartiallyFailed
        } else {
            SyncOutcome::Succeeded
        };
    }

    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| s.status == StepStatus::Failed).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub runs_started: u64,
    pub latest: Option<SyncRun>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResyncOutcome {
    Refreshed { vouchers: u64 },
    Retired,
    Skipped { reason: String },
}
