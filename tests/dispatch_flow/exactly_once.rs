use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ocf_engine::DriverFlags;
use ocf_engine::HardwarePolicy;
use ocf_engine::OpFlags;
use ocf_engine::OpStatus;
use ocf_engine::OpStep;
use ocf_engine::QueueMask;
use ocf_engine::SessionInit;
use ocf_engine::SymmetricOp;
use ocf_engine::AES_CBC;

use crate::common::new_engine;
use crate::common::wait_until;
use crate::common::Reply;
use crate::common::TestDriver;

const SUBMITTERS: usize = 4;
const OPS_PER_SUBMITTER: usize = 250;

#[test]
fn every_op_should_get_exactly_one_callback_under_contention() {
    let engine = new_engine();
    engine.start().unwrap();

    let replies = (0..600).map(|i| match i % 4 {
        1 => Reply::Retry,
        3 => Reply::Hold,
        _ => Reply::Done(OpStatus::Success),
    });
    let driver = TestDriver::with_replies(&engine, replies);
    let d0 = engine.get_driver_id(DriverFlags::empty()).unwrap();
    engine
        .register_symmetric(d0, AES_CBC, 4096, 0, Arc::clone(&driver) as _)
        .unwrap();
    let sid = engine
        .new_session(&[SessionInit::new(AES_CBC)], HardwarePolicy::Any)
        .unwrap();

    let total = SUBMITTERS * OPS_PER_SUBMITTER;
    let counters: Arc<Vec<AtomicUsize>> = Arc::new((0..total).map(|_| AtomicUsize::new(0)).collect());
    let finished = AtomicBool::new(false);

    thread::scope(|scope| {
        // plays the driver's interrupt side: drains held work, lifts back-pressure
        scope.spawn(|| {
            while !finished.load(Ordering::SeqCst) {
                driver.release_held(OpStatus::Success);
                engine.unblock(d0, QueueMask::SYMMETRIC).unwrap();
                thread::sleep(Duration::from_millis(1));
            }
        });

        let submitters: Vec<_> = (0..SUBMITTERS)
            .map(|submitter| {
                let engine = &engine;
                let counters = Arc::clone(&counters);
                scope.spawn(move || {
                    for n in 0..OPS_PER_SUBMITTER {
                        let index = submitter * OPS_PER_SUBMITTER + n;
                        let flags = match n % 3 {
                            0 => OpFlags::empty(),
                            1 => OpFlags::CALLBACK_INLINE,
                            _ => OpFlags::BATCH,
                        };
                        let counters = Arc::clone(&counters);
                        let op = SymmetricOp::builder(sid)
                            .step(OpStep::new(AES_CBC))
                            .flags(flags)
                            .callback(move |_| {
                                counters[index].fetch_add(1, Ordering::SeqCst);
                            })
                            .build()
                            .unwrap();
                        engine.submit_symmetric(op);
                    }
                })
            })
            .collect();
        for submitter in submitters {
            submitter.join().unwrap();
        }

        let all_delivered = wait_until(|| engine.stats().symmetric.callbacks as usize == total);
        finished.store(true, Ordering::SeqCst);
        assert!(all_delivered, "stats: {:?}", engine.stats());
    });

    thread::sleep(Duration::from_millis(20));
    for (index, counter) in counters.iter().enumerate() {
        assert_eq!(counter.load(Ordering::SeqCst), 1, "op #{} callback count", index);
    }
    let stats = engine.stats();
    assert_eq!(stats.symmetric.completed as usize, total);
    assert_eq!(stats.symmetric.submitted as usize, total);
    assert_eq!(engine.pending(), (0, 0));
}
