use std::sync::Arc;

use parking_lot::Mutex;

use super::CryptoOp;
use super::OpCallback;
use super::OpCore;
use super::OpFlags;
use super::OpKind;
use crate::is_valid_algorithm;
use crate::AlgorithmId;
use crate::Error;
use crate::Result;
use crate::SessionId;
use crate::SessionInit;

/// One cipher/hash/MAC step of a symmetric operation.
///
/// `skip` and `len` select the region of the operation's data buffer the step
/// applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpStep {
    pub alg: AlgorithmId,
    pub skip: usize,
    pub len: usize,
    pub key: Vec<u8>,
    pub iv: Option<Vec<u8>>,
    pub encrypt: bool,
    pub mac_len: u16,
}

impl OpStep {
    pub fn new(alg: AlgorithmId) -> Self {
        Self {
            alg,
            skip: 0,
            len: 0,
            key: Vec::new(),
            iv: None,
            encrypt: true,
            mac_len: 0,
        }
    }

    pub fn key(
        mut self,
        key: impl Into<Vec<u8>>,
    ) -> Self {
        self.key = key.into();
        self
    }

    pub fn iv(
        mut self,
        iv: impl Into<Vec<u8>>,
    ) -> Self {
        self.iv = Some(iv.into());
        self
    }

    pub fn range(
        mut self,
        skip: usize,
        len: usize,
    ) -> Self {
        self.skip = skip;
        self.len = len;
        self
    }

    pub fn decrypt(mut self) -> Self {
        self.encrypt = false;
        self
    }

    pub fn mac_len(
        mut self,
        mac_len: u16,
    ) -> Self {
        self.mac_len = mac_len;
        self
    }
}

/// A chain of symmetric steps processed by one driver as a unit.
pub struct SymmetricOp {
    core: OpCore,
    steps: Vec<OpStep>,
    session: Mutex<SessionId>,
    buffer: Mutex<Vec<u8>>,
    callback: Option<OpCallback<SymmetricOp>>,
}

impl std::fmt::Debug for SymmetricOp {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SymmetricOp")
            .field("core", &self.core)
            .field("session", &*self.session.lock())
            .field("steps", &self.steps.len())
            .finish_non_exhaustive()
    }
}

impl CryptoOp for SymmetricOp {
    const KIND: OpKind = OpKind::Symmetric;

    fn core(&self) -> &OpCore {
        &self.core
    }

    fn callback(&self) -> Option<&OpCallback<Self>> {
        self.callback.as_ref()
    }
}

impl SymmetricOp {
    pub fn builder(session: SessionId) -> SymmetricOpBuilder {
        SymmetricOpBuilder {
            session,
            steps: Vec::new(),
            buffer: Vec::new(),
            flags: OpFlags::empty(),
            callback: None,
        }
    }

    pub fn session(&self) -> SessionId {
        *self.session.lock()
    }

    pub(crate) fn set_session(
        &self,
        session: SessionId,
    ) {
        *self.session.lock() = session;
    }

    pub fn steps(&self) -> &[OpStep] {
        &self.steps
    }

    /// The algorithm chain this operation was built for, in session-init form.
    pub fn algorithm_chain(&self) -> Vec<SessionInit> {
        self.steps
            .iter()
            .map(|s| SessionInit {
                alg: s.alg,
                key: s.key.clone(),
                mac_len: s.mac_len,
            })
            .collect()
    }

    pub fn with_buffer<R>(
        &self,
        f: impl FnOnce(&[u8]) -> R,
    ) -> R {
        f(&self.buffer.lock())
    }

    /// Drivers transform the data region in place through this.
    pub fn with_buffer_mut<R>(
        &self,
        f: impl FnOnce(&mut Vec<u8>) -> R,
    ) -> R {
        f(&mut self.buffer.lock())
    }
}

pub struct SymmetricOpBuilder {
    session: SessionId,
    steps: Vec<OpStep>,
    buffer: Vec<u8>,
    flags: OpFlags,
    callback: Option<OpCallback<SymmetricOp>>,
}

impl SymmetricOpBuilder {
    pub fn step(
        mut self,
        step: OpStep,
    ) -> Self {
        self.steps.push(step);
        self
    }

    pub fn buffer(
        mut self,
        buffer: impl Into<Vec<u8>>,
    ) -> Self {
        self.buffer = buffer.into();
        self
    }

    pub fn flags(
        mut self,
        flags: OpFlags,
    ) -> Self {
        self.flags = flags;
        self
    }

    pub fn callback(
        mut self,
        callback: impl Fn(Arc<SymmetricOp>) + Send + Sync + 'static,
    ) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Validates the step chain against the buffer.
    pub fn build(self) -> Result<Arc<SymmetricOp>> {
        if self.steps.is_empty() {
            return Err(Error::invalid("symmetric operation without steps"));
        }
        for step in &self.steps {
            if !is_valid_algorithm(step.alg) {
                return Err(Error::invalid(format!("algorithm {} out of range", step.alg)));
            }
            let end = step.skip.checked_add(step.len);
            if end.map_or(true, |end| end > self.buffer.len()) {
                return Err(Error::invalid(format!(
                    "step range {}+{} exceeds buffer of {} bytes",
                    step.skip,
                    step.len,
                    self.buffer.len()
                )));
            }
        }

        Ok(Arc::new(SymmetricOp {
            core: OpCore::new(self.flags),
            steps: self.steps,
            session: Mutex::new(self.session),
            buffer: Mutex::new(self.buffer),
            callback: self.callback,
        }))
    }
}
