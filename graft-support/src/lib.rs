//! # Graft Support
//!
//! Shared helpers for the Graft DI workspace:
//! - rendering of resolution chains for error messages and diagnostics
//! - type-name shortening and "did you mean" suggestions

pub mod rendering;
