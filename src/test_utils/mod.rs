//! Test drivers shared by the unit tests.
mod scripted;

pub use scripted::*;
