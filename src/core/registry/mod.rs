//! Driver registry and session table.
//!
//! Slots move through `Free -> Reserved -> Active -> (Tombstoned ->) Free`.
//! A slot that loses its last algorithm while sessions are open is kept as a
//! tombstone so those sessions keep working, and released by the last
//! `free_session`.

mod driver;
mod driver_registry;
mod session;
mod view;

pub use driver::*;
pub use driver_registry::*;
pub use session::*;
pub(crate) use view::*;
