//! Utilities for testing code built on top of the RPC layer. They are part of the crate's
//!  regular (non-#[cfg(test)]) code so that applications and integration tests can use them.

pub mod transport;
