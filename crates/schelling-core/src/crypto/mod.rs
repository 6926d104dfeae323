//! Cryptographic primitives for the commit-reveal scheme.
//!
//! This module provides:
//! - Salt generation and hex encoding
//! - CommitDigest derivation and verification (keccak256)

mod commitment;
mod salt;

pub use commitment::{keccak256, verify_encoded, CommitDigest};
pub use salt::Salt;
