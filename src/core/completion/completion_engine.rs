use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::trace;

use crate::utils::time::stamp;
use crate::AsymmetricOp;
use crate::CryptoOp;
use crate::EngineStats;
use crate::OpFlags;
use crate::SymmetricOp;

#[derive(Default)]
pub(crate) struct DoneQueues {
    symmetric: VecDeque<Arc<SymmetricOp>>,
    asymmetric: VecDeque<Arc<AsymmetricOp>>,
    shutdown: bool,
}

/// Maps an operation type to its done queue.
pub(crate) trait DoneQueued: CryptoOp {
    fn done_queue(queues: &mut DoneQueues) -> &mut VecDeque<Arc<Self>>;
}

impl DoneQueued for SymmetricOp {
    fn done_queue(queues: &mut DoneQueues) -> &mut VecDeque<Arc<Self>> {
        &mut queues.symmetric
    }
}

impl DoneQueued for AsymmetricOp {
    fn done_queue(queues: &mut DoneQueues) -> &mut VecDeque<Arc<Self>> {
        &mut queues.asymmetric
    }
}

enum Delivery {
    Inline,
    Polled,
    Queued,
}

enum Popped {
    Symmetric(Arc<SymmetricOp>),
    Asymmetric(Arc<AsymmetricOp>),
}

/// Receives "operation finished" notifications from drivers and delivers
/// callbacks, either in-line or through the completion worker.
pub struct CompletionEngine {
    pub(super) queues: Mutex<DoneQueues>,
    work_cv: Condvar,
    stats: Arc<EngineStats>,
    timing: bool,
}

impl std::fmt::Debug for CompletionEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let (symmetric, asymmetric) = self.queued();
        f.debug_struct("CompletionEngine")
            .field("symmetric", &symmetric)
            .field("asymmetric", &asymmetric)
            .finish()
    }
}

impl CompletionEngine {
    pub(crate) fn new(
        stats: Arc<EngineStats>,
        timing: bool,
    ) -> Self {
        Self {
            queues: Mutex::new(DoneQueues::default()),
            work_cv: Condvar::new(),
            stats,
            timing,
        }
    }

    /// Called by a driver once it is done with a symmetric operation,
    /// successfully or not. The outcome must already be in `op.status`.
    pub fn finish_symmetric(
        &self,
        op: Arc<SymmetricOp>,
    ) {
        self.finish(op);
    }

    /// Asymmetric counterpart of [`Self::finish_symmetric`].
    pub fn finish_asymmetric(
        &self,
        op: Arc<AsymmetricOp>,
    ) {
        self.finish(op);
    }

    /// Takes a symmetric operation back off the done queue. Returns `false`
    /// when it is not queued (never was, or the worker already took it).
    pub fn retract_symmetric(
        &self,
        op: &Arc<SymmetricOp>,
    ) -> bool {
        self.retract(op)
    }

    pub fn retract_asymmetric(
        &self,
        op: &Arc<AsymmetricOp>,
    ) -> bool {
        self.retract(op)
    }

    /// Lengths of the (symmetric, asymmetric) done queues.
    pub fn queued(&self) -> (usize, usize) {
        let queues = self.queues.lock();
        (queues.symmetric.len(), queues.asymmetric.len())
    }

    pub(crate) fn finish<T: DoneQueued>(
        &self,
        op: Arc<T>,
    ) {
        // Done-queue lock before op lock: `ON_DONE_QUEUE` becomes visible
        // together with the queue entry, so `retract` never misses it.
        let (delivery, success, was_empty) = {
            let mut queues = self.queues.lock();
            let mut state = op.core().lock();
            if state.flags.contains(OpFlags::DONE) {
                error!(op_id = op.id(), kind = %T::KIND, "operation finished twice, ignoring");
                return;
            }
            state.flags.insert(OpFlags::DONE);
            if let Some(now) = stamp(self.timing) {
                state.stamps.finished = Some(now);
            }

            let mut was_empty = false;
            let delivery = if state.flags.contains(OpFlags::CALLBACK_INLINE) {
                Delivery::Inline
            } else if state.flags.contains(OpFlags::SUBMITTER_POLLS) {
                Delivery::Polled
            } else {
                state.flags.insert(OpFlags::ON_DONE_QUEUE);
                let queue = T::done_queue(&mut queues);
                was_empty = queue.is_empty();
                queue.push_back(Arc::clone(&op));
                Delivery::Queued
            };
            (delivery, state.status.is_success(), was_empty)
        };
        self.stats.record_completed(T::KIND, success);

        match delivery {
            Delivery::Inline => {
                trace!(op_id = op.id(), "in-line completion");
                op.core().wake_waiters();
                self.deliver(op);
            }
            Delivery::Polled => {
                trace!(op_id = op.id(), "completed in submitter context");
                op.core().wake_waiters();
            }
            Delivery::Queued => {
                if was_empty {
                    self.stats.record_completion_wakeup();
                    self.work_cv.notify_one();
                }
                trace!(op_id = op.id(), was_empty, "queued for completion worker");
                op.core().wake_waiters();
            }
        }
    }

    pub(crate) fn retract<T: DoneQueued>(
        &self,
        op: &Arc<T>,
    ) -> bool {
        let mut queues = self.queues.lock();
        if !op.flags().contains(OpFlags::ON_DONE_QUEUE) {
            return false;
        }
        let queue = T::done_queue(&mut queues);
        let Some(position) = queue.iter().position(|queued| Arc::ptr_eq(queued, op)) else {
            return false;
        };
        queue.remove(position);
        op.core().lock().flags.remove(OpFlags::ON_DONE_QUEUE);
        debug!(op_id = op.id(), "retracted from done queue");
        true
    }

    /// Runs the callback of a finished operation on the current thread.
    pub(crate) fn deliver<T: CryptoOp>(
        &self,
        op: Arc<T>,
    ) {
        if self.timing {
            let stamps = {
                let mut state = op.core().lock();
                state.stamps.callback = stamp(true);
                state.stamps
            };
            self.stats.observe_timing(T::KIND, &stamps);
        }

        if let Some(callback) = op.callback() {
            callback(Arc::clone(&op));
            self.stats.record_callback(T::KIND);
        }
    }

    fn take_front<T: DoneQueued>(queues: &mut DoneQueues) -> Option<Arc<T>> {
        while let Some(op) = T::done_queue(queues).pop_front() {
            let mut state = op.core().lock();
            if state.flags.contains(OpFlags::ON_DONE_QUEUE) {
                state.flags.remove(OpFlags::ON_DONE_QUEUE);
                drop(state);
                return Some(op);
            }
            error!(op_id = op.id(), kind = %T::KIND, "done queue entry without on-queue flag, dropping");
        }
        None
    }

    /// Completion worker loop. Drains both done queues, symmetric first,
    /// and sleeps only when both are empty. On shutdown the queues are
    /// drained before returning.
    pub(crate) fn run(&self) {
        debug!("completion worker started");
        loop {
            let next = {
                let mut queues = self.queues.lock();
                loop {
                    if let Some(op) = Self::take_front::<SymmetricOp>(&mut queues) {
                        break Some(Popped::Symmetric(op));
                    }
                    if let Some(op) = Self::take_front::<AsymmetricOp>(&mut queues) {
                        break Some(Popped::Asymmetric(op));
                    }
                    if queues.shutdown {
                        break None;
                    }
                    self.work_cv.wait(&mut queues);
                }
            };

            match next {
                Some(Popped::Symmetric(op)) => self.deliver(op),
                Some(Popped::Asymmetric(op)) => self.deliver(op),
                None => break,
            }
        }
        debug!("completion worker stopped");
    }

    pub(crate) fn open(&self) {
        self.queues.lock().shutdown = false;
    }

    pub(crate) fn shutdown(&self) {
        self.queues.lock().shutdown = true;
        self.work_cv.notify_all();
    }
}
