//! Domain types and pure scan bookkeeping shared by every autodoc crate.
//!
//! This crate has zero internal dependencies so the storage layer, the
//! orchestrator and the HTTP surface can all build on it.

pub mod admission;
pub mod error;
pub mod scanning;
pub mod types;
