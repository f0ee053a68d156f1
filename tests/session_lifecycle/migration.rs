use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use ocf_engine::CryptoOp;
use ocf_engine::DriverFlags;
use ocf_engine::HardwarePolicy;
use ocf_engine::OpFlags;
use ocf_engine::OpStatus;
use ocf_engine::OpStep;
use ocf_engine::SessionInit;
use ocf_engine::SymmetricOp;
use ocf_engine::AES_CBC;
use parking_lot::Mutex;

use crate::common::new_engine;
use crate::common::TestDriver;
use crate::common::WAIT_TIMEOUT;

#[test]
fn ops_for_unregistered_driver_should_complete_with_again_after_migration() {
    let engine = new_engine();
    let gone = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, Arc::clone(&gone) as _)
        .unwrap();
    let stale = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();

    let (tx, rx) = mpsc::channel();
    let ops: Vec<_> = (0..3)
        .map(|_| {
            let tx = Mutex::new(tx.clone());
            SymmetricOp::builder(stale)
                .step(OpStep::new(AES_CBC))
                .flags(OpFlags::BATCH)
                .callback(move |op| {
                    let _ = tx.lock().send((op.status(), op.session()));
                })
                .build()
                .unwrap()
        })
        .collect();
    for op in &ops {
        engine.submit_symmetric(Arc::clone(op));
    }
    assert_eq!(engine.pending(), (3, 0));

    let successor = TestDriver::new(&engine);
    let d1 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d1, AES_CBC, 4096, 0, Arc::clone(&successor) as _)
        .unwrap();

    // no sessions left, so the slot is released instead of tombstoned
    engine.free_session(stale).unwrap();
    engine.unregister_all(d0).unwrap();

    engine.start().unwrap();
    for _ in 0..ops.len() {
        let (status, session) = rx.recv_timeout(WAIT_TIMEOUT).expect("every op completes");
        assert_eq!(status, OpStatus::Again);
        assert_eq!(session.driver_id, d1);
    }

    assert_eq!(gone.invocations(), 0);
    assert_eq!(successor.invocations(), 0);
    assert_eq!(engine.stats().migrated, 3);
    assert_eq!(engine.pending(), (0, 0));
}

#[test]
fn migration_without_any_driver_should_still_complete() {
    let engine = new_engine();
    let driver = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine.register_symmetric(d0, AES_CBC, 4096, 0, driver).unwrap();
    let stale = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();
    engine.free_session(stale).unwrap();
    engine.unregister(d0, AES_CBC).unwrap();

    let op = SymmetricOp::builder(stale)
        .step(OpStep::new(AES_CBC))
        .build()
        .unwrap();
    let status = engine.dispatch_and_wait_symmetric(Arc::clone(&op));

    assert_eq!(status, OpStatus::Again);
    assert_eq!(op.session(), stale);
    assert_eq!(engine.stats().migrated, 1);
}

#[test]
fn migrated_op_should_succeed_when_resubmitted() {
    let engine = new_engine();
    engine.start().unwrap();
    let gone = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, Arc::clone(&gone) as _)
        .unwrap();
    let successor = TestDriver::new(&engine);
    let d1 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d1, AES_CBC, 4096, 0, Arc::clone(&successor) as _)
        .unwrap();
    let stale = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();
    assert_eq!(stale.driver_id, d0);
    engine.free_session(stale).unwrap();
    engine.unregister_all(d0).unwrap();

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    let op = SymmetricOp::builder(stale)
        .step(OpStep::new(AES_CBC))
        .callback(move |op| {
            let _ = tx.lock().send((op.status(), op.session()));
        })
        .build()
        .unwrap();

    engine.submit_symmetric(Arc::clone(&op));
    let (status, session) = rx.recv_timeout(WAIT_TIMEOUT).expect("migration completes");
    assert_eq!(status, OpStatus::Again);
    assert_eq!(session.driver_id, d1);

    engine.submit_symmetric(Arc::clone(&op));
    let (status, _) = rx.recv_timeout(WAIT_TIMEOUT).expect("resubmission completes");
    assert_eq!(status, OpStatus::Success);
    assert_eq!(op.wait(), OpStatus::Success);

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    assert_eq!(successor.invocations(), 1);
    assert_eq!(gone.invocations(), 0);
}
