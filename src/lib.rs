//! Threshold proxy re-encryption (Umbral over secp256k1) and the work-order
//! protocol a delegatee uses to collect re-encrypted fragments from proxies.
//!
//! `pre` holds the cryptographic engine, `policy` the orchestration.

extern crate quick_error;

mod internal;
pub mod policy;
pub mod pre;
