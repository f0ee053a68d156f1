use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Instant;

use serde::Serialize;

use super::OPS_BLOCKED;
use super::OPS_ERRORED;
use super::OPS_RETRIED;
use super::OPS_SUBMITTED;
use super::OP_STAGE_LATENCY;
use crate::utils::time::elapsed_micros;
use crate::OpKind;
use crate::OpTimestamps;

#[derive(Debug, Default)]
struct KindCounters {
    submitted: AtomicU64,
    dispatched: AtomicU64,
    blocked: AtomicU64,
    retried: AtomicU64,
    errored: AtomicU64,
    completed: AtomicU64,
    callbacks: AtomicU64,
}

impl KindCounters {
    fn snapshot(&self) -> KindSnapshot {
        KindSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
        }
    }
}

/// Counters of one engine instance.
#[derive(Debug, Default)]
pub struct EngineStats {
    symmetric: KindCounters,
    asymmetric: KindCounters,
    migrated: AtomicU64,
    dispatch_wakeups: AtomicU64,
    completion_wakeups: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct KindSnapshot {
    pub submitted: u64,
    /// Driver `process` invocations, including ones answered with `Retry`
    pub dispatched: u64,
    pub blocked: u64,
    pub retried: u64,
    pub errored: u64,
    pub completed: u64,
    pub callbacks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StatsSnapshot {
    pub symmetric: KindSnapshot,
    pub asymmetric: KindSnapshot,
    pub migrated: u64,
    pub dispatch_wakeups: u64,
    pub completion_wakeups: u64,
}

impl EngineStats {
    fn kind(
        &self,
        kind: OpKind,
    ) -> &KindCounters {
        match kind {
            OpKind::Symmetric => &self.symmetric,
            OpKind::Asymmetric => &self.asymmetric,
        }
    }

    pub(crate) fn record_submitted(
        &self,
        kind: OpKind,
    ) {
        self.kind(kind).submitted.fetch_add(1, Ordering::Relaxed);
        OPS_SUBMITTED.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn record_dispatched(
        &self,
        kind: OpKind,
    ) {
        self.kind(kind).dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blocked(
        &self,
        kind: OpKind,
    ) {
        self.kind(kind).blocked.fetch_add(1, Ordering::Relaxed);
        OPS_BLOCKED.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn record_retried(
        &self,
        kind: OpKind,
    ) {
        self.kind(kind).retried.fetch_add(1, Ordering::Relaxed);
        OPS_RETRIED.with_label_values(&[kind.as_str()]).inc();
    }

    pub(crate) fn record_completed(
        &self,
        kind: OpKind,
        success: bool,
    ) {
        let counters = self.kind(kind);
        counters.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            counters.errored.fetch_add(1, Ordering::Relaxed);
            OPS_ERRORED.with_label_values(&[kind.as_str()]).inc();
        }
    }

    pub(crate) fn record_callback(
        &self,
        kind: OpKind,
    ) {
        self.kind(kind).callbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_migrated(&self) {
        self.migrated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dispatch_wakeup(&self) {
        self.dispatch_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completion_wakeup(&self) {
        self.completion_wakeups.fetch_add(1, Ordering::Relaxed);
    }

    /// Feed the stage latencies of a delivered operation into the histogram.
    pub(crate) fn observe_timing(
        &self,
        kind: OpKind,
        stamps: &OpTimestamps,
    ) {
        let stages: [(&str, Option<Instant>, Option<Instant>); 3] = [
            ("dispatch", stamps.submitted, stamps.invoked),
            ("process", stamps.invoked, stamps.finished),
            ("deliver", stamps.finished, stamps.callback),
        ];
        for (stage, from, to) in stages {
            if let (Some(from), Some(to)) = (from, to) {
                OP_STAGE_LATENCY
                    .with_label_values(&[kind.as_str(), stage])
                    .observe(elapsed_micros(from, to));
            }
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            symmetric: self.symmetric.snapshot(),
            asymmetric: self.asymmetric.snapshot(),
            migrated: self.migrated.load(Ordering::Relaxed),
            dispatch_wakeups: self.dispatch_wakeups.load(Ordering::Relaxed),
            completion_wakeups: self.completion_wakeups.load(Ordering::Relaxed),
        }
    }
}
