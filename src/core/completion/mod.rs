//! Completion delivery.
//!
//! `finish` picks one of three paths from the operation's flags: in-line
//! callback on the finishing context, silent completion for submitters that
//! poll, or hand-off to the completion worker through a done queue.

mod completion_engine;
pub use completion_engine::*;
