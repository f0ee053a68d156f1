use std::collections::VecDeque;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::AsymmetricDriver;
use crate::AsymmetricOp;
use crate::CompletionEngine;
use crate::CryptoOp;
use crate::DispatchHint;
use crate::DriverError;
use crate::OpStatus;
use crate::ProcessError;
use crate::SessionInit;
use crate::SymmetricDriver;
use crate::SymmetricOp;

/// How a [`ScriptedDriver`] answers one `process` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    /// Set the status and finish before `process` returns.
    Complete(OpStatus),
    /// Accept and keep the operation until `finish_held`.
    Hold,
    Retry,
    Reject(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    pub op_id: u64,
    pub hint: DispatchHint,
}

/// Driver that answers from a script and records every invocation.
/// Once the script runs dry it answers with `fallback`.
pub struct ScriptedDriver {
    completion: Arc<CompletionEngine>,
    script: Mutex<VecDeque<Answer>>,
    fallback: Answer,
    calls: Mutex<Vec<Call>>,
    held_symmetric: Mutex<Vec<Arc<SymmetricOp>>>,
    held_asymmetric: Mutex<Vec<Arc<AsymmetricOp>>>,
    next_session: AtomicU32,
    freed: Mutex<Vec<u32>>,
}

impl ScriptedDriver {
    pub fn new(completion: Arc<CompletionEngine>) -> Arc<Self> {
        Self::with_script(completion, [])
    }

    pub fn with_script(
        completion: Arc<CompletionEngine>,
        script: impl IntoIterator<Item = Answer>,
    ) -> Arc<Self> {
        Self::build(completion, script, Answer::Complete(OpStatus::Success))
    }

    /// Driver that keeps every operation until `finish_held`.
    pub fn holding(completion: Arc<CompletionEngine>) -> Arc<Self> {
        Self::build(completion, [], Answer::Hold)
    }

    fn build(
        completion: Arc<CompletionEngine>,
        script: impl IntoIterator<Item = Answer>,
        fallback: Answer,
    ) -> Arc<Self> {
        Arc::new(Self {
            completion,
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            calls: Mutex::new(Vec::new()),
            held_symmetric: Mutex::new(Vec::new()),
            held_asymmetric: Mutex::new(Vec::new()),
            next_session: AtomicU32::new(1),
            freed: Mutex::new(Vec::new()),
        })
    }

    pub fn push(
        &self,
        answer: Answer,
    ) {
        self.script.lock().push_back(answer);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn freed_sessions(&self) -> Vec<u32> {
        self.freed.lock().clone()
    }

    /// Finishes every held operation with `status`, oldest first.
    pub fn finish_held(
        &self,
        status: OpStatus,
    ) -> usize {
        let symmetric: Vec<_> = self.held_symmetric.lock().drain(..).collect();
        let asymmetric: Vec<_> = self.held_asymmetric.lock().drain(..).collect();
        let count = symmetric.len() + asymmetric.len();
        for op in symmetric {
            op.set_status(status);
            self.completion.finish_symmetric(op);
        }
        for op in asymmetric {
            op.set_status(status);
            self.completion.finish_asymmetric(op);
        }
        count
    }

    fn next_answer(
        &self,
        op_id: u64,
        hint: DispatchHint,
    ) -> Answer {
        self.calls.lock().push(Call { op_id, hint });
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }
}

impl SymmetricDriver for ScriptedDriver {
    fn new_session(
        &self,
        _chain: &[SessionInit],
    ) -> Result<u32, DriverError> {
        Ok(self.next_session.fetch_add(1, Ordering::Relaxed))
    }

    fn free_session(
        &self,
        local_id: u32,
    ) -> Result<(), DriverError> {
        self.freed.lock().push(local_id);
        Ok(())
    }

    fn process(
        &self,
        op: Arc<SymmetricOp>,
        hint: DispatchHint,
    ) -> Result<(), ProcessError> {
        match self.next_answer(op.id(), hint) {
            Answer::Complete(status) => {
                op.set_status(status);
                self.completion.finish_symmetric(op);
                Ok(())
            }
            Answer::Hold => {
                self.held_symmetric.lock().push(op);
                Ok(())
            }
            Answer::Retry => Err(ProcessError::Retry),
            Answer::Reject(code) => Err(ProcessError::Rejected(code)),
        }
    }
}

impl AsymmetricDriver for ScriptedDriver {
    fn process(
        &self,
        op: Arc<AsymmetricOp>,
        hint: DispatchHint,
    ) -> Result<(), ProcessError> {
        match self.next_answer(op.id(), hint) {
            Answer::Complete(status) => {
                op.set_status(status);
                self.completion.finish_asymmetric(op);
                Ok(())
            }
            Answer::Hold => {
                self.held_asymmetric.lock().push(op);
                Ok(())
            }
            Answer::Retry => Err(ProcessError::Retry),
            Answer::Reject(code) => Err(ProcessError::Rejected(code)),
        }
    }
}
