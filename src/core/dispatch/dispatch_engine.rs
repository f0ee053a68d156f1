use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::utils::time::stamp;
use crate::AsymmetricDriver;
use crate::AsymmetricOp;
use crate::CompletionEngine;
use crate::CryptoOp;
use crate::DispatchHint;
use crate::DispatchView;
use crate::DoneQueued;
use crate::DriverId;
use crate::DriverRegistry;
use crate::EngineStats;
use crate::HardwarePolicy;
use crate::OpFlags;
use crate::OpStatus;
use crate::OpTimestamps;
use crate::ProcessError;
use crate::Route;
use crate::SymmetricDriver;
use crate::SymmetricOp;

#[derive(Default)]
pub(crate) struct PendingQueues {
    symmetric: VecDeque<Arc<SymmetricOp>>,
    asymmetric: VecDeque<Arc<AsymmetricOp>>,
    /// Set by every wakeup request, cleared by the worker before it scans.
    kicked: bool,
    shutdown: bool,
}

pub(crate) trait PendingQueued: DoneQueued {
    fn pending_queue(queues: &mut PendingQueues) -> &mut VecDeque<Arc<Self>>;
}

impl PendingQueued for SymmetricOp {
    fn pending_queue(queues: &mut PendingQueues) -> &mut VecDeque<Arc<Self>> {
        &mut queues.symmetric
    }
}

impl PendingQueued for AsymmetricOp {
    fn pending_queue(queues: &mut PendingQueues) -> &mut VecDeque<Arc<Self>> {
        &mut queues.asymmetric
    }
}

/// What the worker took off a pending queue.
enum Picked<T, D: ?Sized> {
    Invoke {
        op: Arc<T>,
        driver_id: DriverId,
        driver: Arc<D>,
        seq: u64,
        hint: DispatchHint,
    },
    /// The driver behind the operation is gone.
    Orphaned(Arc<T>),
}

/// Routes submitted operations to drivers and runs the pending queues.
///
/// Per driver and queue kind the state is either `Ready` or `Blocked`. A
/// `Retry` answer moves it to `Blocked` and puts the operation back at the
/// front of its pending queue; only `unblock` moves it back.
pub struct DispatchEngine {
    registry: Arc<DriverRegistry>,
    completion: Arc<CompletionEngine>,
    stats: Arc<EngineStats>,
    queues: Mutex<PendingQueues>,
    work_cv: Condvar,
    batch_hints: bool,
    allow_software: bool,
    timing: bool,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let (symmetric, asymmetric) = self.pending();
        f.debug_struct("DispatchEngine")
            .field("symmetric", &symmetric)
            .field("asymmetric", &asymmetric)
            .field("batch_hints", &self.batch_hints)
            .finish()
    }
}

impl DispatchEngine {
    pub(crate) fn new(
        registry: Arc<DriverRegistry>,
        completion: Arc<CompletionEngine>,
        stats: Arc<EngineStats>,
        batch_hints: bool,
        allow_software: bool,
        timing: bool,
    ) -> Self {
        Self {
            registry,
            completion,
            stats,
            queues: Mutex::new(PendingQueues::default()),
            work_cv: Condvar::new(),
            batch_hints,
            allow_software,
            timing,
        }
    }

    /// Hands a symmetric operation to its session's driver, or queues it.
    /// Never blocks the caller.
    pub fn submit_symmetric(
        &self,
        op: Arc<SymmetricOp>,
    ) {
        self.record_submit(&op);
        if op.flags().contains(OpFlags::BATCH) {
            self.enqueue(op);
            return;
        }

        let view = self.registry.dispatch_view();
        match view.symmetric(op.session().driver_id) {
            Route::Ready { driver_id, driver, seq } => {
                self.invoke_symmetric(op, driver_id, driver, seq, DispatchHint::empty());
            }
            Route::Blocked => self.enqueue(op),
            Route::Gone => self.migrate(op),
        }
    }

    /// Asymmetric counterpart of [`Self::submit_symmetric`]. An unassigned
    /// operation is pinned to the driver picked for it.
    pub fn submit_asymmetric(
        &self,
        op: Arc<AsymmetricOp>,
    ) {
        self.record_submit(&op);
        if op.flags().contains(OpFlags::BATCH) {
            self.enqueue(op);
            return;
        }

        let view = self.registry.dispatch_view();
        match view.asymmetric(op.target(), op.kind(), self.allow_software) {
            Route::Ready { driver_id, driver, seq } => {
                op.set_target(driver_id);
                self.invoke_asymmetric(op, driver_id, driver, seq, DispatchHint::empty());
            }
            Route::Blocked => self.enqueue(op),
            Route::Gone => self.fail_no_device(op),
        }
    }

    /// Lengths of the (symmetric, asymmetric) pending queues.
    pub fn pending(&self) -> (usize, usize) {
        let queues = self.queues.lock();
        (queues.symmetric.len(), queues.asymmetric.len())
    }

    /// Asks the worker for another pass over the pending queues. Repeated
    /// kicks before the worker gets to run collapse into one wakeup.
    pub(crate) fn kick(&self) {
        let mut queues = self.queues.lock();
        self.kick_locked(&mut queues);
    }

    fn kick_locked(
        &self,
        queues: &mut PendingQueues,
    ) {
        if queues.kicked {
            return;
        }
        queues.kicked = true;
        self.stats.record_dispatch_wakeup();
        self.work_cv.notify_one();
    }

    /// Resets the completion state so a finished operation (e.g. one that
    /// came back `Again` after migration) can be submitted again. A stale
    /// completion still waiting on the done queue is withdrawn first.
    fn record_submit<T: DoneQueued>(
        &self,
        op: &Arc<T>,
    ) {
        if self.completion.retract(op) {
            debug!(op_id = op.id(), kind = %T::KIND, "resubmitted before completion delivery, dropped stale completion");
        }
        {
            let mut state = op.core().lock();
            state.flags.remove(OpFlags::DONE);
            state.status = OpStatus::Success;
            state.stamps = OpTimestamps {
                submitted: stamp(self.timing),
                ..Default::default()
            };
        }
        self.stats.record_submitted(T::KIND);
    }

    fn enqueue<T: PendingQueued>(
        &self,
        op: Arc<T>,
    ) {
        let mut queues = self.queues.lock();
        trace!(op_id = op.id(), kind = %T::KIND, "queued for dispatch");
        T::pending_queue(&mut queues).push_back(op);
        self.kick_locked(&mut queues);
    }

    fn requeue_front<T: PendingQueued>(
        &self,
        op: Arc<T>,
        kick: bool,
    ) {
        let mut queues = self.queues.lock();
        T::pending_queue(&mut queues).push_front(op);
        if kick {
            self.kick_locked(&mut queues);
        }
    }

    fn invoke_symmetric(
        &self,
        op: Arc<SymmetricOp>,
        driver_id: DriverId,
        driver: Arc<dyn SymmetricDriver>,
        seq: u64,
        hint: DispatchHint,
    ) {
        self.invoke(op, driver_id, seq, |op| driver.process(op, hint));
    }

    fn invoke_asymmetric(
        &self,
        op: Arc<AsymmetricOp>,
        driver_id: DriverId,
        driver: Arc<dyn AsymmetricDriver>,
        seq: u64,
        hint: DispatchHint,
    ) {
        self.invoke(op, driver_id, seq, |op| driver.process(op, hint));
    }

    /// Calls into the driver with no engine lock held and applies its answer.
    fn invoke<T, F>(
        &self,
        op: Arc<T>,
        driver_id: DriverId,
        seq: u64,
        process: F,
    ) where
        T: PendingQueued,
        F: FnOnce(Arc<T>) -> std::result::Result<(), ProcessError>,
    {
        if let Some(now) = stamp(self.timing) {
            op.core().lock().stamps.invoked = Some(now);
        }
        self.stats.record_dispatched(T::KIND);
        trace!(op_id = op.id(), kind = %T::KIND, driver_id, "invoking driver");

        match process(Arc::clone(&op)) {
            Ok(()) => {}
            Err(ProcessError::Retry) => {
                self.stats.record_retried(T::KIND);
                let blocked = self.registry.mark_blocked(driver_id, T::KIND.queue_mask(), seq);
                if blocked {
                    self.stats.record_blocked(T::KIND);
                }
                debug!(op_id = op.id(), kind = %T::KIND, driver_id, blocked, "driver asked to retry");
                // An unblock that raced with the Retry already happened, so
                // nobody else will wake the worker for this op.
                self.requeue_front(op, !blocked);
            }
            Err(ProcessError::Rejected(code)) => {
                warn!(op_id = op.id(), kind = %T::KIND, driver_id, code, "driver rejected operation");
                op.set_status(OpStatus::Driver(code));
                self.completion.finish(op);
            }
        }
    }

    /// The session's driver disappeared: open a fresh session for the same
    /// algorithm chain and complete with `Again` so the caller resubmits.
    fn migrate(
        &self,
        op: Arc<SymmetricOp>,
    ) {
        let stale = op.session();
        match self.registry.new_session(&op.algorithm_chain(), HardwarePolicy::Any) {
            Ok(sid) => {
                op.set_session(sid);
                info!(op_id = op.id(), %stale, %sid, "session migrated");
            }
            Err(e) => {
                warn!(op_id = op.id(), %stale, error = %e, "no driver left to migrate session to");
            }
        }
        self.stats.record_migrated();
        op.set_status(OpStatus::Again);
        self.completion.finish(op);
    }

    fn fail_no_device(
        &self,
        op: Arc<AsymmetricOp>,
    ) {
        debug!(op_id = op.id(), kind = ?op.kind(), target = ?op.target(), "no driver for asymmetric operation");
        op.set_status(OpStatus::NoDevice);
        self.completion.finish(op);
    }

    fn pick_symmetric(&self) -> Option<Picked<SymmetricOp, dyn SymmetricDriver>> {
        let view = self.registry.dispatch_view();
        let mut queues = self.queues.lock();
        if queues.shutdown {
            return None;
        }

        let mut chosen = None;
        for (index, op) in queues.symmetric.iter().enumerate() {
            match view.symmetric(op.session().driver_id) {
                Route::Blocked => continue,
                Route::Gone => {
                    chosen = Some((index, None));
                    break;
                }
                Route::Ready { driver_id, driver, seq } => {
                    chosen = Some((index, Some((driver_id, driver, seq))));
                    break;
                }
            }
        }

        let (index, route) = chosen?;
        let hint = match &route {
            Some((driver_id, _, _)) if self.batch_hints => {
                let more = queues
                    .symmetric
                    .iter()
                    .skip(index + 1)
                    .any(|later| later.session().driver_id == *driver_id);
                if more {
                    DispatchHint::MORE
                } else {
                    DispatchHint::empty()
                }
            }
            _ => DispatchHint::empty(),
        };
        let op = queues.symmetric.remove(index)?;

        Some(match route {
            Some((driver_id, driver, seq)) => Picked::Invoke {
                op,
                driver_id,
                driver,
                seq,
                hint,
            },
            None => Picked::Orphaned(op),
        })
    }

    fn pick_asymmetric(&self) -> Option<Picked<AsymmetricOp, dyn AsymmetricDriver>> {
        let view = self.registry.dispatch_view();
        let mut queues = self.queues.lock();
        if queues.shutdown {
            return None;
        }

        let mut chosen = None;
        for (index, op) in queues.asymmetric.iter().enumerate() {
            match view.asymmetric(op.target(), op.kind(), self.allow_software) {
                Route::Blocked => continue,
                Route::Gone => {
                    chosen = Some((index, None));
                    break;
                }
                Route::Ready { driver_id, driver, seq } => {
                    chosen = Some((index, Some((driver_id, driver, seq))));
                    break;
                }
            }
        }

        let (index, route) = chosen?;
        let hint = match &route {
            Some((driver_id, _, _)) if self.batch_hints => {
                let more = queues.asymmetric.iter().skip(index + 1).any(|later| {
                    matches!(
                        self.route_asymmetric(&view, later),
                        Route::Ready { driver_id: id, .. } if id == *driver_id
                    )
                });
                if more {
                    DispatchHint::MORE
                } else {
                    DispatchHint::empty()
                }
            }
            _ => DispatchHint::empty(),
        };
        let op = queues.asymmetric.remove(index)?;

        Some(match route {
            Some((driver_id, driver, seq)) => {
                op.set_target(driver_id);
                Picked::Invoke {
                    op,
                    driver_id,
                    driver,
                    seq,
                    hint,
                }
            }
            None => Picked::Orphaned(op),
        })
    }

    fn route_asymmetric(
        &self,
        view: &DispatchView,
        op: &AsymmetricOp,
    ) -> Route<dyn AsymmetricDriver> {
        view.asymmetric(op.target(), op.kind(), self.allow_software)
    }

    /// One pass: at most one symmetric and one asymmetric operation.
    /// Returns whether anything was taken off a queue.
    fn dispatch_pass(&self) -> bool {
        let mut progressed = false;

        if let Some(picked) = self.pick_symmetric() {
            progressed = true;
            match picked {
                Picked::Invoke {
                    op,
                    driver_id,
                    driver,
                    seq,
                    hint,
                } => self.invoke_symmetric(op, driver_id, driver, seq, hint),
                Picked::Orphaned(op) => self.migrate(op),
            }
        }

        if let Some(picked) = self.pick_asymmetric() {
            progressed = true;
            match picked {
                Picked::Invoke {
                    op,
                    driver_id,
                    driver,
                    seq,
                    hint,
                } => self.invoke_asymmetric(op, driver_id, driver, seq, hint),
                Picked::Orphaned(op) => self.fail_no_device(op),
            }
        }

        progressed
    }

    /// Repeats passes until one takes nothing. Returns the number of passes
    /// that made progress.
    pub(crate) fn drain(&self) -> usize {
        let mut passes = 0;
        while self.dispatch_pass() {
            passes += 1;
        }
        passes
    }

    /// Dispatch worker loop. Each wakeup drains both pending queues until a
    /// full pass finds nothing eligible.
    pub(crate) fn run(&self) {
        debug!("dispatch worker started");
        loop {
            {
                let mut queues = self.queues.lock();
                while !queues.kicked && !queues.shutdown {
                    self.work_cv.wait(&mut queues);
                }
                if queues.shutdown {
                    break;
                }
                queues.kicked = false;
            }

            let passes = self.drain();
            trace!(passes, "dispatch queues quiescent");
        }
        debug!("dispatch worker stopped");
    }

    /// Lets a restarted worker pick up where the last one stopped.
    pub(crate) fn open(&self) {
        let mut queues = self.queues.lock();
        queues.shutdown = false;
        queues.kicked = true;
    }

    pub(crate) fn shutdown(&self) {
        self.queues.lock().shutdown = true;
        self.work_cv.notify_all();
    }
}
