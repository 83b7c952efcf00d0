// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable summaries and documented exit codes for runs driven by `retry-runner`.
//!
//! The types in this crate are kept free of runner internals so that tools consuming a finished
//! retry run (CI dashboards, flaky-test trackers) can depend on them without pulling in the
//! runner itself.

mod errors;
mod exit_codes;
mod summary;

pub use errors::*;
pub use exit_codes::*;
pub use summary::*;
