//! Core of a pluggable cryptographic operation framework.
//!
//! Drivers register the algorithms they implement with a [`CryptoEngine`].
//! Callers open sessions, submit symmetric or asymmetric operations and
//! receive completions through callbacks or by waiting on the operation.
//! Saturated drivers push back with [`ProcessError::Retry`]; their queue kind
//! stays blocked until they call [`CryptoEngine::unblock`].

mod config;
mod constants;
mod core;
mod errors;
mod metrics;
mod utils;

pub use core::*;

pub use config::*;
pub use constants::*;
pub use errors::*;
pub use metrics::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
