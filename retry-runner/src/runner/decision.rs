// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    collector::RoundResult, config::MaxFailures, errors::UnretriedTestsError,
    filter::RetryabilityFilter, identity::TestIdentity,
};
use std::collections::BTreeSet;
use tracing::debug;

/// The settings that govern how many rounds a run may take.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RoundPolicy {
    /// The number of rounds allowed after the initial one. 0 disables retries altogether.
    pub max_retries: u32,

    /// The per-round failure cutoff.
    pub max_failures: MaxFailures,

    /// If true, tests that only passed after being retried still fail the run.
    pub fail_on_passed_after_retry: bool,
}

/// What to do after a round has finished.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RoundDecision {
    /// Run another round, narrowed down to `tests`.
    Retry {
        /// The tests to run in the next round.
        tests: BTreeSet<TestIdentity>,

        /// True if the next round is the last one the retry budget allows.
        is_last_retry_round: bool,
    },

    /// Every test passed in this round.
    Succeeded {
        /// True if tests failed in earlier rounds and the policy says that should not fail the
        /// run.
        ignore_failures: bool,
    },

    /// Tests are still failing, and no further round will be attempted.
    Failed {
        /// The tests that failed in the final round.
        tests: BTreeSet<TestIdentity>,
    },
}

impl RoundDecision {
    /// Decides what to do after round `round` produced `result`.
    ///
    /// Returns an error if a test that failed in the previous round was not started in this one,
    /// unless `filter` exempts it.
    pub fn decide(
        result: &RoundResult,
        round: u32,
        policy: &RoundPolicy,
        filter: &dyn RetryabilityFilter,
    ) -> Result<Self, UnretriedTestsError> {
        let (exempt, unretried): (Vec<_>, Vec<_>) = result
            .non_retried_tests
            .iter()
            .cloned()
            .partition(|test| filter.is_exempt(test, result.failure_for(test)));
        if !exempt.is_empty() {
            debug!(round, ?exempt, "non-retried tests exempted by filter");
        }
        if !unretried.is_empty() {
            return Err(UnretriedTestsError::new(round, unretried));
        }

        let decision = if result.failed_tests.is_empty() {
            Self::Succeeded {
                ignore_failures: round > 0 && !policy.fail_on_passed_after_retry,
            }
        } else if result.is_final_round {
            Self::Failed {
                tests: result.failed_tests.clone(),
            }
        } else {
            Self::Retry {
                tests: result.failed_tests.clone(),
                is_last_retry_round: round + 1 >= policy.max_retries,
            }
        };
        Ok(decision)
    }
}
