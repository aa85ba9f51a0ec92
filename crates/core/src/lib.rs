//! Shared types and pure domain logic for the meshgen pipeline.
//!
//! This crate has no database or network dependencies. Everything here is
//! callable from unit tests without infrastructure: the proxy-URL rewriter,
//! the image fan-in derivation, the provider poll policy, and the retry
//! backoff computation.

pub mod backoff;
pub mod error;
pub mod fanin;
pub mod poll;
pub mod proxy;
pub mod types;
