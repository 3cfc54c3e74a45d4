//! cockpit-testutil: Shared fixtures for cockpit's test suites.
//!
//! Provides:
//! - **MonorepoBuilder / TempMonorepo**: declarative on-disk monorepo
//!   fixtures over a `tempfile::TempDir`
//! - **CaptureLogger**: a `Logger` that records every emitted line for
//!   assertions

mod capture;
mod fixture;

pub use capture::CaptureLogger;
pub use fixture::{MonorepoBuilder, TempMonorepo};
