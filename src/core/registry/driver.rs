use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::AsymmetricOp;
use crate::DispatchHint;
use crate::DriverError;
use crate::ProcessError;
use crate::SessionInit;
use crate::SymmetricOp;

/// Back-end contract for symmetric processing.
///
/// The engine never holds one of its locks while calling into a driver, so
/// implementations may block, allocate or submit follow-up work.
///
/// `process` accepts the operation for asynchronous completion: the driver
/// reports the outcome later through [`crate::CompletionEngine::finish_symmetric`].
/// Returning [`ProcessError::Retry`] hands the operation back to the engine.
#[cfg_attr(test, automock)]
pub trait SymmetricDriver: Send + Sync + 'static {
    /// Creates a driver-local session for the algorithm chain.
    fn new_session(
        &self,
        chain: &[SessionInit],
    ) -> std::result::Result<u32, DriverError>;

    fn free_session(
        &self,
        _local_id: u32,
    ) -> std::result::Result<(), DriverError> {
        Ok(())
    }

    fn process(
        &self,
        op: Arc<SymmetricOp>,
        hint: DispatchHint,
    ) -> std::result::Result<(), ProcessError>;
}

/// Back-end contract for asymmetric processing. Same completion rules as
/// [`SymmetricDriver::process`].
#[cfg_attr(test, automock)]
pub trait AsymmetricDriver: Send + Sync + 'static {
    fn process(
        &self,
        op: Arc<AsymmetricOp>,
        hint: DispatchHint,
    ) -> std::result::Result<(), ProcessError>;
}
