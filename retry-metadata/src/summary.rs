// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{RetryExitCode, SummaryReadError};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// A serializable summary of a finished retry run.
///
/// Produced by `retry-runner` once its round loop terminates normally. Runs aborted because of a
/// retry-guarantee violation do not produce a summary; they surface as errors instead.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct RetryRunSummary {
    /// The version of the summary format.
    pub format_version: u32,

    /// How the run ended.
    pub outcome: RunOutcomeSummary,

    /// The number of times the execution engine was invoked.
    pub executions: usize,

    /// One entry per observed round, in execution order.
    ///
    /// Empty if retries were disabled, since events were not observed then.
    pub rounds: Vec<RoundSummary>,

    /// Tests that failed in at least one round but not in the last round executed.
    pub flaky_tests: Vec<TestIdentitySummary>,
}

impl RetryRunSummary {
    /// The format version produced by this crate.
    pub const FORMAT_VERSION: u32 = 1;

    /// Creates a new summary with the current format version.
    pub fn new(
        outcome: RunOutcomeSummary,
        executions: usize,
        rounds: Vec<RoundSummary>,
        flaky_tests: Vec<TestIdentitySummary>,
    ) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            outcome,
            executions,
            rounds,
            flaky_tests,
        }
    }

    /// Returns the exit code a process reporting this run should use.
    ///
    /// Returns `None` if retries were disabled, in which case the exit code is determined by the
    /// downstream consumer of test results.
    pub fn exit_code(&self) -> Option<i32> {
        self.outcome.exit_code()
    }

    /// Serializes this summary to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parses a summary from JSON, checking the format version.
    pub fn from_json(json: &str) -> Result<Self, SummaryReadError> {
        let summary: Self = serde_json::from_str(json).map_err(SummaryReadError::Json)?;
        if summary.format_version != Self::FORMAT_VERSION {
            return Err(SummaryReadError::UnsupportedFormatVersion {
                found: summary.format_version,
                supported: Self::FORMAT_VERSION,
            });
        }
        Ok(summary)
    }
}

/// How a retry run ended.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum RunOutcomeSummary {
    /// Every test passed in the last round executed.
    #[serde(rename_all = "kebab-case")]
    Passed {
        /// True if tests failed in earlier rounds and the configured policy says that should not
        /// fail the run.
        ignore_failures: bool,
    },

    /// Some tests were still failing when the round loop stopped.
    #[serde(rename_all = "kebab-case")]
    Failed {
        /// The tests failing in the final round.
        failed_tests: Vec<TestIdentitySummary>,
    },

    /// Retries were disabled, so the run executed once and its events were not observed.
    RetriesDisabled,

    /// The run was cancelled before the round loop finished.
    Cancelled,
}

impl RunOutcomeSummary {
    /// Returns the exit code corresponding to this outcome, or `None` if the outcome of the
    /// tests was not observed.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Passed { .. } => Some(RetryExitCode::OK),
            Self::Failed { .. } => Some(RetryExitCode::TEST_RUN_FAILED),
            Self::Cancelled => Some(RetryExitCode::RUN_CANCELLED),
            Self::RetriesDisabled => None,
        }
    }
}

/// A summary of one round of execution.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RoundSummary {
    /// The round index. Round 0 is the initial execution.
    pub index: u32,

    /// The number of distinct tests that failed in this round.
    pub failed: usize,

    /// Whether this round was final, i.e. no further retry was attempted after it.
    pub final_round: bool,
}

/// The stable identity of a test method.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestIdentitySummary {
    /// The name of the class (or module, or suite) owning the test.
    pub class_name: SmolStr,

    /// The name of the test method.
    pub method_name: SmolStr,
}

impl fmt::Display for TestIdentitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_name, self.method_name)
    }
}
