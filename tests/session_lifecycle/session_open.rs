use std::sync::Arc;

use ocf_engine::AsymmetricKind;
use ocf_engine::DriverFlags;
use ocf_engine::HardwarePolicy;
use ocf_engine::SessionInit;
use ocf_engine::SlotState;
use ocf_engine::AES_CBC;
use ocf_engine::SHA1_HMAC;

use crate::common::new_engine;
use crate::common::TestDriver;

#[test]
fn session_should_bind_to_registered_driver() {
    let engine = new_engine();
    let driver = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, driver)
        .unwrap();

    let sid = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();

    assert_eq!(sid.driver_id, d0);
    let info = engine.driver_info(d0).unwrap();
    assert_eq!(info.state, SlotState::Active);
    assert_eq!(info.open_sessions, 1);
    let (alg, support) = info.algorithms[0];
    assert_eq!(alg, AES_CBC);
    assert_eq!(support.max_operand_len, 4096);
}

#[test]
fn chain_should_skip_driver_missing_one_step() {
    let engine = new_engine();
    let cipher = TestDriver::new(&engine);
    let full = TestDriver::new(&engine);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine.register_symmetric(d0, AES_CBC, 4096, 0, cipher).unwrap();
    let d1 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d1, AES_CBC, 4096, 0, Arc::clone(&full) as _)
        .unwrap();
    engine.register_symmetric(d1, SHA1_HMAC, 0, 0, full).unwrap();

    let chain = [SessionInit::new(AES_CBC), SessionInit::new(SHA1_HMAC)];
    let sid = engine.new_session(&chain, HardwarePolicy::Any).unwrap();

    assert_eq!(sid.driver_id, d1);
    assert_eq!(engine.driver_info(d0).unwrap().open_sessions, 0);
}

#[test]
fn features_should_reflect_asymmetric_registrations() {
    let engine = new_engine();
    let driver = TestDriver::new(&engine);
    let id = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_asymmetric(id, AsymmetricKind::ModExp as u32, 0, Arc::clone(&driver) as _)
        .unwrap();
    engine
        .register_asymmetric(id, AsymmetricKind::DsaSign as u32, 0, driver)
        .unwrap();

    let features = engine.query_features();
    assert!(features.contains(AsymmetricKind::ModExp));
    assert!(features.contains(AsymmetricKind::DsaSign));
    assert!(!features.contains(AsymmetricKind::ModMult));

    engine
        .unregister_asymmetric(id, AsymmetricKind::DsaSign as u32)
        .unwrap();
    assert!(!engine.query_features().contains(AsymmetricKind::DsaSign));
}
