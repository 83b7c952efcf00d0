// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by retry-runner.

use crate::identity::TestIdentity;
use camino::{Utf8Path, Utf8PathBuf};
use config::ConfigError;
use retry_metadata::RetryExitCode;
use std::{error, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse retry config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8Path {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }

    /// Returns the exit code a process reporting this error should use.
    pub fn process_exit_code(&self) -> i32 {
        RetryExitCode::SETUP_ERROR
    }
}

/// The kind of error that occurred while parsing a config.
///
/// Returned by [`ConfigParseError::kind`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// Error returned while parsing a [`MaxFailures`](crate::config::MaxFailures) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for max-failures: {reason}")]
pub struct MaxFailuresParseError {
    reason: String,
}

impl MaxFailuresParseError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Error returned while parsing a [`TestIdentity`] from a string.
#[derive(Clone, Debug, Error)]
#[error("invalid test identity `{input}`: expected `className#methodName`")]
pub struct TestIdentityParseError {
    input: String,
}

impl TestIdentityParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }

    /// Returns the input that failed to parse.
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// A [`RoundCollector`](crate::collector::RoundCollector) was reset after its final round.
///
/// This indicates a bug in the caller: once a round is terminal, no further round may be started
/// on the same collector.
#[derive(Clone, Debug, Error)]
#[error("round collector has completed (its last round recorded {failed} failed tests)")]
pub struct RoundCompletedError {
    failed: usize,
}

impl RoundCompletedError {
    pub(crate) fn new(failed: usize) -> Self {
        Self { failed }
    }

    /// Returns the number of failed tests recorded in the terminal round.
    pub fn failed(&self) -> usize {
        self.failed
    }
}

/// Tests that failed in one round were never started in the next one.
///
/// This signals that the test framework in use does not honor the re-submission of a narrowed set
/// of tests, or a defect in the retry infrastructure. It is distinct from an ordinary test
/// failure.
#[derive(Clone, Debug, Error)]
pub struct UnretriedTestsError {
    round: u32,
    tests: Vec<TestIdentity>,
}

impl UnretriedTestsError {
    pub(crate) fn new(round: u32, tests: impl IntoIterator<Item = TestIdentity>) -> Self {
        let mut tests: Vec<_> = tests.into_iter().collect();
        tests.sort_unstable();
        Self { round, tests }
    }

    /// Returns the round in which the tests should have been retried.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Returns the tests that were not retried, sorted.
    pub fn tests(&self) -> &[TestIdentity] {
        &self.tests
    }
}

impl fmt::Display for UnretriedTestsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "unable to retry the following test methods in round {}, \
             which is unexpected (is the test framework compatible with retries?):",
            self.round,
        )?;
        for test in &self.tests {
            writeln!(f, "   {test}")?;
        }
        Ok(())
    }
}

/// An error that aborted a retry run.
///
/// Ordinary test failures are not errors: they are reported through
/// [`RetryRunOutcome::Failed`](crate::runner::RetryRunOutcome::Failed).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RetryRunError {
    /// Tests that failed were not retried in the following round.
    #[error(transparent)]
    UnretriedTests(#[from] UnretriedTestsError),

    /// The round loop tried to continue a run that had already finished.
    #[error("internal error: retry protocol violated")]
    ProtocolViolation(#[source] RoundCompletedError),

    /// The execution engine returned an error.
    #[error("error executing tests in round {round}")]
    Execute {
        /// The round being executed.
        round: u32,

        /// The error returned by the engine.
        #[source]
        err: Box<dyn error::Error + Send + Sync>,
    },
}

impl RetryRunError {
    /// Returns the exit code a process reporting this error should use.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::UnretriedTests(_) => RetryExitCode::UNRETRIED_TESTS,
            Self::ProtocolViolation(_) => RetryExitCode::RETRY_PROTOCOL_VIOLATION,
            Self::Execute { .. } => RetryExitCode::EXECUTION_FAILED,
        }
    }
}

impl From<RoundCompletedError> for RetryRunError {
    fn from(err: RoundCompletedError) -> Self {
        Self::ProtocolViolation(err)
    }
}
