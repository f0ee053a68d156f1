//! Pending queues and the dispatch worker.

mod dispatch_engine;
pub use dispatch_engine::*;
