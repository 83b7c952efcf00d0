// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for retrying failed tests across bounded rounds of execution.
//!
//! Tests are executed by an external [execution engine](runner::TestExecuter). The
//! [`RetryRunner`](runner::RetryRunner) invokes that engine repeatedly, narrowing each retry
//! round down to the tests that failed in the previous one. A
//! [`RoundCollector`](collector::RoundCollector) sits between the engine and whatever consumes
//! test results: it tracks failures for the runner and folds all rounds into what looks, from
//! downstream, like a single run.

pub mod collector;
pub mod config;
pub mod errors;
pub mod events;
pub mod filter;
pub mod identity;
pub mod runner;

#[cfg(test)]
mod test_helpers;
