//! Deterministic random number generation
//!
//! Uses xorshift64* for the random portion of record uuids.
//! CRITICAL: record uuid randomness MUST go through this module so a fixed
//! seed reproduces byte-identical state records.

mod xorshift;

pub use xorshift::RngManager;
