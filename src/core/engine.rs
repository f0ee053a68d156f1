use std::sync::Arc;
use std::thread;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::AlgorithmId;
use crate::AsymmetricDriver;
use crate::AsymmetricOp;
use crate::CompletionEngine;
use crate::CryptoOp;
use crate::DispatchEngine;
use crate::DriverFlags;
use crate::DriverId;
use crate::DriverInfo;
use crate::DriverRegistry;
use crate::EngineConfig;
use crate::EngineStats;
use crate::Error;
use crate::FeatureBitmap;
use crate::HardwarePolicy;
use crate::OpFlags;
use crate::OpStatus;
use crate::QueueMask;
use crate::Result;
use crate::SessionId;
use crate::SessionInit;
use crate::StatsSnapshot;
use crate::SymmetricDriver;
use crate::SymmetricOp;

struct Workers {
    dispatch: JoinHandle<()>,
    completion: JoinHandle<()>,
}

/// The crypto dispatch engine.
///
/// Owns the driver registry, the dispatch engine with its pending queues and
/// the completion engine with its done queues, plus the two worker threads.
/// Submission works before [`CryptoEngine::start`]; queued work simply waits
/// for the workers.
pub struct CryptoEngine {
    config: EngineConfig,
    registry: Arc<DriverRegistry>,
    dispatch: Arc<DispatchEngine>,
    completion: Arc<CompletionEngine>,
    stats: Arc<EngineStats>,
    workers: Mutex<Option<Workers>>,
}

impl std::fmt::Debug for CryptoEngine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("registry", &self.registry)
            .field("dispatch", &self.dispatch)
            .field("completion", &self.completion)
            .field("running", &self.is_running())
            .finish()
    }
}

impl CryptoEngine {
    /// Builds a stopped engine from a validated configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let config = config.validate()?;
        let stats = Arc::new(EngineStats::default());
        let timing = config.monitoring.timing_enabled;

        let registry = Arc::new(DriverRegistry::new(&config.registry));
        let completion = Arc::new(CompletionEngine::new(Arc::clone(&stats), timing));
        let dispatch = Arc::new(DispatchEngine::new(
            Arc::clone(&registry),
            Arc::clone(&completion),
            Arc::clone(&stats),
            config.dispatch.batch_hints,
            config.registry.allow_software,
            timing,
        ));

        Ok(Self {
            config,
            registry,
            dispatch,
            completion,
            stats,
            workers: Mutex::new(None),
        })
    }

    /// Spawns the dispatch and completion workers. No-op when running.
    pub fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.is_some() {
            return Ok(());
        }

        self.completion.open();
        let completion = Arc::clone(&self.completion);
        let completion = thread::Builder::new()
            .name(self.config.completion.thread_name.clone())
            .spawn(move || completion.run())
            .map_err(|e| Error::Fatal(format!("spawn completion worker: {}", e)))?;

        self.dispatch.open();
        let dispatch = Arc::clone(&self.dispatch);
        let dispatch = match thread::Builder::new()
            .name(self.config.dispatch.thread_name.clone())
            .spawn(move || dispatch.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                self.completion.shutdown();
                if completion.join().is_err() {
                    error!("completion worker panicked");
                }
                return Err(Error::Fatal(format!("spawn dispatch worker: {}", e)));
            }
        };

        *workers = Some(Workers { dispatch, completion });
        info!(
            dispatch = %self.config.dispatch.thread_name,
            completion = %self.config.completion.thread_name,
            "engine workers started"
        );
        Ok(())
    }

    /// Stops and joins both workers. Pending operations stay queued and are
    /// picked up again by a later `start`. No-op when stopped.
    pub fn stop(&self) {
        let Some(workers) = self.workers.lock().take() else {
            return;
        };

        self.dispatch.shutdown();
        if workers.dispatch.join().is_err() {
            error!("dispatch worker panicked");
        }
        self.completion.shutdown();
        if workers.completion.join().is_err() {
            error!("completion worker panicked");
        }
        info!("engine workers stopped");
    }

    pub fn is_running(&self) -> bool {
        self.workers.lock().is_some()
    }

    //-----------------------------------------------------------
    // Driver-facing surface

    pub fn get_driver_id(
        &self,
        flags: DriverFlags,
    ) -> Result<DriverId> {
        self.registry.get_driver_id(flags)
    }

    pub fn register_symmetric(
        &self,
        driver_id: DriverId,
        alg: AlgorithmId,
        max_operand_len: u32,
        flags: u32,
        driver: Arc<dyn SymmetricDriver>,
    ) -> Result<()> {
        self.registry
            .register_symmetric(driver_id, alg, max_operand_len, flags, driver)
    }

    pub fn register_asymmetric(
        &self,
        driver_id: DriverId,
        kalg: u32,
        flags: u32,
        driver: Arc<dyn AsymmetricDriver>,
    ) -> Result<()> {
        self.registry.register_asymmetric(driver_id, kalg, flags, driver)
    }

    pub fn unregister(
        &self,
        driver_id: DriverId,
        alg: AlgorithmId,
    ) -> Result<()> {
        self.registry.unregister(driver_id, alg)
    }

    pub fn unregister_asymmetric(
        &self,
        driver_id: DriverId,
        kalg: u32,
    ) -> Result<()> {
        self.registry.unregister_asymmetric(driver_id, kalg)
    }

    pub fn unregister_all(
        &self,
        driver_id: DriverId,
    ) -> Result<()> {
        self.registry.unregister_all(driver_id)
    }

    /// Driver signal that it can take work again. The dispatch worker is
    /// only woken when a queue kind actually left the blocked state.
    pub fn unblock(
        &self,
        driver_id: DriverId,
        mask: QueueMask,
    ) -> Result<()> {
        let released = self.registry.unblock(driver_id, mask)?;
        if !released.is_empty() {
            debug!(driver_id, ?released, "driver unblocked, rescanning pending queues");
            self.dispatch.kick();
        }
        Ok(())
    }

    /// Handle drivers use to report finished operations.
    pub fn completion(&self) -> Arc<CompletionEngine> {
        Arc::clone(&self.completion)
    }

    //-----------------------------------------------------------
    // Caller-facing surface

    pub fn new_session(
        &self,
        chain: &[SessionInit],
        policy: HardwarePolicy,
    ) -> Result<SessionId> {
        self.registry.new_session(chain, policy)
    }

    pub fn free_session(
        &self,
        sid: SessionId,
    ) -> Result<()> {
        self.registry.free_session(sid)
    }

    pub fn submit_symmetric(
        &self,
        op: Arc<SymmetricOp>,
    ) {
        self.dispatch.submit_symmetric(op);
    }

    pub fn submit_asymmetric(
        &self,
        op: Arc<AsymmetricOp>,
    ) {
        self.dispatch.submit_asymmetric(op);
    }

    /// Submits and blocks until the operation is done. A driver that finishes
    /// during `process` completes the op without touching a done queue.
    pub fn dispatch_and_wait_symmetric(
        &self,
        op: Arc<SymmetricOp>,
    ) -> OpStatus {
        let status = self.dispatch_and_wait(&op, |op| self.dispatch.submit_symmetric(op));
        self.completion.retract_symmetric(&op);
        status
    }

    pub fn dispatch_and_wait_asymmetric(
        &self,
        op: Arc<AsymmetricOp>,
    ) -> OpStatus {
        let status = self.dispatch_and_wait(&op, |op| self.dispatch.submit_asymmetric(op));
        self.completion.retract_asymmetric(&op);
        status
    }

    fn dispatch_and_wait<T, F>(
        &self,
        op: &Arc<T>,
        submit: F,
    ) -> OpStatus
    where
        T: CryptoOp,
        F: FnOnce(Arc<T>),
    {
        op.core().lock().flags.insert(OpFlags::SUBMITTER_POLLS);
        submit(Arc::clone(op));
        // Anything finished from here on goes through the done queue and is
        // retracted by the caller.
        op.clear_submitter_polls();
        op.wait()
    }

    /// Asymmetric classes available under the configured software policy.
    pub fn query_features(&self) -> FeatureBitmap {
        self.registry.query_features(self.config.registry.allow_software)
    }

    pub fn driver_info(
        &self,
        driver_id: DriverId,
    ) -> Option<DriverInfo> {
        self.registry.driver_info(driver_id)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Lengths of the (symmetric, asymmetric) pending queues.
    pub fn pending(&self) -> (usize, usize) {
        self.dispatch.pending()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Drop for CryptoEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
