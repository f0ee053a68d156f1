use std::sync::Arc;

use ocf_engine::CryptoOp;
use ocf_engine::DriverFlags;
use ocf_engine::HardwarePolicy;
use ocf_engine::OpFlags;
use ocf_engine::OpStatus;
use ocf_engine::OpStep;
use ocf_engine::SessionInit;
use ocf_engine::SlotState;
use ocf_engine::SymmetricOp;
use ocf_engine::AES_CBC;

use crate::common::new_engine;
use crate::common::TestDriver;

#[test]
fn tombstoned_slot_should_be_reused_only_after_last_session_is_freed() {
    let engine = new_engine();
    let driver = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, Arc::clone(&driver) as _)
        .unwrap();
    let sid = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();

    engine.unregister(d0, AES_CBC).unwrap();
    assert_eq!(engine.driver_info(d0).unwrap().state, SlotState::Tombstoned);

    // the open session keeps working against the tombstoned driver
    let op = SymmetricOp::builder(sid)
        .step(OpStep::new(AES_CBC))
        .flags(OpFlags::CALLBACK_INLINE)
        .build()
        .unwrap();
    assert_eq!(engine.dispatch_and_wait_symmetric(op), OpStatus::Success);
    assert_eq!(driver.invocations(), 1);

    let other = engine.get_driver_id(DriverFlags::empty()).unwrap();
    assert_ne!(other, d0);

    engine.free_session(sid).unwrap();
    assert_eq!(engine.driver_info(d0).unwrap().state, SlotState::Free);

    let reused = engine.get_driver_id(DriverFlags::empty()).unwrap();
    assert_eq!(reused, d0);
}

#[test]
fn no_new_session_should_land_on_tombstoned_driver() {
    let engine = new_engine();
    let old = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine.register_symmetric(d0, AES_CBC, 4096, 0, old).unwrap();
    let pinned = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();
    engine.unregister_all(d0).unwrap();

    let fresh = TestDriver::new(&engine);
    let d1 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine.register_symmetric(d1, AES_CBC, 4096, 0, fresh).unwrap();

    let sid = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();
    assert_eq!(sid.driver_id, d1);

    engine.free_session(pinned).unwrap();
    assert!(engine.driver_info(d0).map_or(true, |info| info.state == SlotState::Free));
}
