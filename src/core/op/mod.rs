//! Operation descriptors shared by submitters, the engine and drivers.
//!
//! Both request shapes are handed around as `Arc`s. The submitter keeps one
//! reference; the engine, the driver and the completion path share the others
//! until the callback fires. Mutable per-operation state sits behind a small
//! mutex inside [`OpCore`], which also carries the condvar and notifier used
//! by waiting submitters.

mod asymmetric;
mod flags;
mod symmetric;

pub use asymmetric::*;
pub use flags::*;
pub use symmetric::*;


use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::MutexGuard;
use tokio::sync::Notify;

/// Completion callback. Receives the operation back once it is done.
pub type OpCallback<T> = Box<dyn Fn(Arc<T>) + Send + Sync>;

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Optional timing stamps, filled only when timing is enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpTimestamps {
    pub submitted: Option<Instant>,
    pub invoked: Option<Instant>,
    pub finished: Option<Instant>,
    pub callback: Option<Instant>,
}

#[derive(Debug, Default)]
pub(crate) struct OpState {
    pub(crate) flags: OpFlags,
    pub(crate) status: OpStatus,
    pub(crate) stamps: OpTimestamps,
}

/// State common to both operation shapes.
pub struct OpCore {
    id: u64,
    state: Mutex<OpState>,
    done_cv: Condvar,
    done_notify: Notify,
}

impl std::fmt::Debug for OpCore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("OpCore")
            .field("id", &self.id)
            .field("flags", &state.flags)
            .field("status", &state.status)
            .finish()
    }
}

impl OpCore {
    pub(crate) fn new(flags: OpFlags) -> Self {
        Self {
            id: NEXT_OP_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(OpState {
                flags: flags & OpFlags::CALLER_MASK,
                ..Default::default()
            }),
            done_cv: Condvar::new(),
            done_notify: Notify::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, OpState> {
        self.state.lock()
    }

    /// Wake every submitter blocked in `wait` / `wait_async`.
    pub(crate) fn wake_waiters(&self) {
        self.done_cv.notify_all();
        self.done_notify.notify_waiters();
    }

    fn wait(&self) -> OpStatus {
        let mut state = self.state.lock();
        while !state.flags.contains(OpFlags::DONE) {
            self.done_cv.wait(&mut state);
        }
        state.status
    }

    async fn wait_async(&self) -> OpStatus {
        loop {
            let notified = self.done_notify.notified();
            {
                let state = self.state.lock();
                if state.flags.contains(OpFlags::DONE) {
                    return state.status;
                }
            }
            notified.await;
        }
    }
}

/// Behaviour shared by [`SymmetricOp`] and [`AsymmetricOp`].
pub trait CryptoOp: Send + Sync + Sized + 'static {
    const KIND: OpKind;

    fn core(&self) -> &OpCore;

    fn callback(&self) -> Option<&OpCallback<Self>>;

    /// Process-unique id, used in logs.
    fn id(&self) -> u64 {
        self.core().id
    }

    fn flags(&self) -> OpFlags {
        self.core().lock().flags
    }

    fn status(&self) -> OpStatus {
        self.core().lock().status
    }

    /// Drivers record the outcome here before calling `finish`.
    fn set_status(
        &self,
        status: OpStatus,
    ) {
        self.core().lock().status = status;
    }

    fn is_completed(&self) -> bool {
        self.flags().contains(OpFlags::DONE)
    }

    fn timestamps(&self) -> OpTimestamps {
        self.core().lock().stamps
    }

    /// Drop the "submitter polls" flag once the submitter stops polling.
    /// A later `finish` then goes through the regular completion path.
    fn clear_submitter_polls(&self) {
        self.core().lock().flags.remove(OpFlags::SUBMITTER_POLLS);
    }

    /// Block the current thread until the operation is done.
    fn wait(&self) -> OpStatus {
        self.core().wait()
    }

    /// Wait asynchronously until the operation is done.
    fn wait_async(&self) -> impl std::future::Future<Output = OpStatus> + Send {
        self.core().wait_async()
    }
}
