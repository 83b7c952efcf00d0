// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for runs driven by `retry-runner`.
///
/// Retry runs may fail for a variety of reasons. This structure documents the exit codes that may
/// occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum RetryExitCode {}

impl RetryExitCode {
    /// No errors occurred, and every test passed (possibly after being retried).
    pub const OK: i32 = 0;

    /// One or more tests were still failing once the retry budget was exhausted, or the
    /// max-failures cutoff was reached.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// The execution engine returned an error while running a round.
    pub const EXECUTION_FAILED: i32 = 104;

    /// A test that failed in one round was never started in the next round.
    ///
    /// This usually means that the test framework in use does not honor re-submission of a
    /// narrowed set of tests.
    pub const UNRETRIED_TESTS: i32 = 105;

    /// The run was cancelled before the round loop finished.
    pub const RUN_CANCELLED: i32 = 106;

    /// The retry runner detected an internal inconsistency, such as a collector being reset after
    /// its final round.
    pub const RETRY_PROTOCOL_VIOLATION: i32 = 107;

    /// A user issue happened while setting up a retry run, such as an invalid configuration file.
    pub const SETUP_ERROR: i32 = 96;
}
