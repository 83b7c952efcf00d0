// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for retry runs.
//!
//! Configuration is layered: the embedded default config comes first, and a repository's
//! `.config/test-retry.toml` (or an explicitly provided file) is merged on top of it.

mod max_failures;
mod retry_config;

pub use max_failures::*;
pub use retry_config::*;
