#![deny(unsafe_code)]

//! Shared test utilities for the ctxmesh workspace.
//!
//! Provides config builders, fixture widget sources and transforms, a
//! prewired test mesh, and tracing helpers so that individual crate tests
//! stay concise and consistent.
//!
//! Add this crate as a `[dev-dependency]` in any workspace member:
//!
//! ```toml
//! [dev-dependencies]
//! ctxmesh-test-utils = { workspace = true }
//! ```

pub mod config;
pub mod fixtures;
pub mod mesh;
pub mod tracing_setup;
