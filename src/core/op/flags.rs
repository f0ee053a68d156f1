use std::fmt;

use crate::constants::EAGAIN;
use crate::constants::EINVAL;
use crate::constants::EIO;
use crate::constants::ENODEV;

bitflags::bitflags! {
    /// Per-operation flags.
    ///
    /// `CALLBACK_INLINE`, `BATCH` and `SUBMITTER_POLLS` are set by the caller
    /// before submission. `DONE` and `ON_DONE_QUEUE` are owned by the engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpFlags: u32 {
        /// Deliver the callback on the finishing context, skipping the
        /// completion worker.
        const CALLBACK_INLINE = 0x01;
        /// Delay is acceptable: always go through the pending queue.
        const BATCH = 0x02;
        /// The submitter polls `DONE` itself; finishing touches no queue.
        const SUBMITTER_POLLS = 0x04;
        /// The driver finished the operation.
        const DONE = 0x10;
        /// The operation sits on a done queue waiting for the worker.
        const ON_DONE_QUEUE = 0x20;

        const CALLER_MASK = Self::CALLBACK_INLINE.bits()
            | Self::BATCH.bits()
            | Self::SUBMITTER_POLLS.bits();
    }
}

bitflags::bitflags! {
    /// Hint handed to a driver together with an operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DispatchHint: u32 {
        /// Another operation for the same driver is waiting right behind
        /// this one.
        const MORE = 0x01;
    }
}

bitflags::bitflags! {
    /// Selects the per-driver queue kinds an `unblock` applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct QueueMask: u32 {
        const SYMMETRIC = 0x01;
        const ASYMMETRIC = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Symmetric,
    Asymmetric,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Symmetric => "symmetric",
            OpKind::Asymmetric => "asymmetric",
        }
    }

    pub(crate) fn queue_mask(&self) -> QueueMask {
        match self {
            OpKind::Symmetric => QueueMask::SYMMETRIC,
            OpKind::Asymmetric => QueueMask::ASYMMETRIC,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one operation, as seen by its submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpStatus {
    #[default]
    Success,
    /// The owning driver disappeared; the session was migrated and the
    /// caller must resubmit.
    Again,
    InvalidArgument,
    /// No driver can process the operation.
    NoDevice,
    /// Internal invariant violation while processing this operation.
    Unexpected,
    /// Driver specific failure code.
    Driver(i32),
}

impl OpStatus {
    /// errno-style code, `0` on success.
    pub fn code(&self) -> i32 {
        match self {
            OpStatus::Success => 0,
            OpStatus::Again => EAGAIN,
            OpStatus::InvalidArgument => EINVAL,
            OpStatus::NoDevice => ENODEV,
            OpStatus::Unexpected => EIO,
            OpStatus::Driver(code) => *code,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OpStatus::Success)
    }
}
