// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::identity::TestIdentity;
use retry_metadata::{RetryRunSummary, RoundSummary, RunOutcomeSummary};
use std::collections::BTreeSet;

/// How a retry run ended, when it ended without an error.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RetryRunOutcome {
    /// Every test passed in the last round executed.
    Passed {
        /// True if tests failed in earlier rounds, but the policy says that should not fail the
        /// run. Consumers should not treat the failures reported for earlier rounds as fatal.
        ignore_failures: bool,
    },

    /// Tests were still failing once the retry budget was exhausted or the max-failures cutoff
    /// was reached.
    Failed {
        /// The tests failing in the final round.
        failed_tests: BTreeSet<TestIdentity>,
    },

    /// Retries were disabled: the engine ran once, and its events were passed through without
    /// being observed.
    RetriesDisabled,

    /// The run was cancelled via [`RetryRunner::stop_now`](super::RetryRunner::stop_now).
    Cancelled,
}

impl RetryRunOutcome {
    /// Returns whether this outcome should not fail the run.
    ///
    /// Returns `None` for [`RetriesDisabled`](Self::RetriesDisabled): the runner did not observe
    /// any results then, so success is up to whatever consumed the events downstream.
    pub fn is_success(&self) -> Option<bool> {
        match self {
            Self::Passed { .. } => Some(true),
            Self::Failed { .. } | Self::Cancelled => Some(false),
            Self::RetriesDisabled => None,
        }
    }

    fn to_summary(&self) -> RunOutcomeSummary {
        match self {
            Self::Passed { ignore_failures } => RunOutcomeSummary::Passed {
                ignore_failures: *ignore_failures,
            },
            Self::Failed { failed_tests } => RunOutcomeSummary::Failed {
                failed_tests: failed_tests.iter().map(TestIdentity::to_summary).collect(),
            },
            Self::RetriesDisabled => RunOutcomeSummary::RetriesDisabled,
            Self::Cancelled => RunOutcomeSummary::Cancelled,
        }
    }
}

/// A report on a finished retry run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryRunReport {
    outcome: RetryRunOutcome,
    executions: usize,
    rounds: Vec<RoundSummary>,
    flaky_tests: BTreeSet<TestIdentity>,
}

impl RetryRunReport {
    pub(super) fn new(
        outcome: RetryRunOutcome,
        executions: usize,
        rounds: Vec<RoundSummary>,
        flaky_tests: BTreeSet<TestIdentity>,
    ) -> Self {
        Self {
            outcome,
            executions,
            rounds,
            flaky_tests,
        }
    }

    /// Returns how the run ended.
    pub fn outcome(&self) -> &RetryRunOutcome {
        &self.outcome
    }

    /// Returns the number of times the execution engine was invoked.
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// Returns a summary of each observed round, in execution order.
    ///
    /// Empty if retries were disabled, and missing the interrupted round if the run was
    /// cancelled.
    pub fn rounds(&self) -> &[RoundSummary] {
        &self.rounds
    }

    /// Returns the tests that failed in some round but not in the last round observed.
    pub fn flaky_tests(&self) -> &BTreeSet<TestIdentity> {
        &self.flaky_tests
    }

    /// Converts this report into its serializable form.
    pub fn to_summary(&self) -> RetryRunSummary {
        RetryRunSummary::new(
            self.outcome.to_summary(),
            self.executions,
            self.rounds.clone(),
            self.flaky_tests.iter().map(TestIdentity::to_summary).collect(),
        )
    }
}
