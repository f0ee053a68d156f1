use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use ocf_engine::CryptoOp;
use ocf_engine::DriverFlags;
use ocf_engine::HardwarePolicy;
use ocf_engine::OpStatus;
use ocf_engine::OpStep;
use ocf_engine::QueueMask;
use ocf_engine::SessionInit;
use ocf_engine::SymmetricOp;
use ocf_engine::AES_CBC;
use ocf_engine::SHA1_HMAC;

use crate::common::new_engine;
use crate::common::wait_until;
use crate::common::Reply;
use crate::common::TestDriver;

#[test]
fn retried_op_should_complete_once_after_unblocks() {
    let engine = new_engine();
    engine.start().unwrap();
    let driver = TestDriver::with_replies(&engine, [Reply::Retry, Reply::Retry, Reply::Retry]);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, Arc::clone(&driver) as _)
        .unwrap();
    let sid = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();

    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&callbacks);
    let op = SymmetricOp::builder(sid)
        .step(OpStep::new(AES_CBC))
        .callback(move |op| {
            assert_eq!(op.status(), OpStatus::Success);
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

    engine.submit_symmetric(Arc::clone(&op));

    // the first Retry blocks the queue and puts the op back at the front
    assert!(engine.driver_info(d0).unwrap().symmetric_blocked);
    assert_eq!(engine.pending(), (1, 0));
    assert_eq!(driver.invocations(), 1);

    for retries in 1..=3 {
        assert!(wait_until(|| driver.invocations() == retries
            && engine.driver_info(d0).unwrap().symmetric_blocked));
        engine.unblock(d0, QueueMask::SYMMETRIC).unwrap();
    }

    assert!(wait_until(|| callbacks.load(Ordering::SeqCst) == 1));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
    assert_eq!(driver.invocations(), 4);
    assert!(op.is_completed());

    let stats = engine.stats();
    assert_eq!(stats.symmetric.retried, 3);
    assert_eq!(stats.symmetric.blocked, 3);
    assert_eq!(stats.symmetric.completed, 1);
    assert_eq!(stats.symmetric.callbacks, 1);
}

#[test]
fn blocked_driver_should_not_stall_other_drivers() {
    let engine = new_engine();
    engine.start().unwrap();
    let stuck = TestDriver::with_replies(&engine, [Reply::Retry]);
    let healthy = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, Arc::clone(&stuck) as _)
        .unwrap();
    let stuck_sid = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();
    let d1 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d1, SHA1_HMAC, 0, 0, Arc::clone(&healthy) as _)
        .unwrap();
    let healthy_sid = engine
        .new_session(&[SessionInit::new(SHA1_HMAC)], HardwarePolicy::Any)
        .unwrap();

    let blocked_op = SymmetricOp::builder(stuck_sid)
        .step(OpStep::new(AES_CBC))
        .build()
        .unwrap();
    engine.submit_symmetric(Arc::clone(&blocked_op));
    assert!(engine.driver_info(d0).unwrap().symmetric_blocked);

    let free_op = SymmetricOp::builder(healthy_sid)
        .step(OpStep::new(SHA1_HMAC))
        .build()
        .unwrap();
    engine.submit_symmetric(Arc::clone(&free_op));

    assert_eq!(free_op.wait(), OpStatus::Success);
    assert!(!blocked_op.is_completed());

    engine.unblock(d0, QueueMask::SYMMETRIC).unwrap();
    assert_eq!(blocked_op.wait(), OpStatus::Success);
}
