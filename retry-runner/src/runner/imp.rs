// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RetryRunOutcome, RetryRunReport, RoundDecision, RoundPolicy};
use crate::{
    collector::RoundCollector,
    config::{MaxFailures, RetryConfig},
    errors::RetryRunError,
    events::{TestEventSink, TestFailure},
    filter::RetryabilityFilter,
    identity::TestIdentity,
};
use debug_ignore::DebugIgnore;
use itertools::Itertools;
use retry_metadata::RoundSummary;
use std::{
    collections::{BTreeMap, BTreeSet},
    error,
    sync::atomic::{AtomicBool, Ordering},
};
use tracing::{debug, info, warn};

/// An external engine that executes tests.
///
/// The engine is treated as a synchronous, round-scoped operation: `execute` returns only once
/// every test in the round has finished and no more events will be delivered. Internally it may
/// run tests in parallel, delivering events to the sink from several threads at once.
pub trait TestExecuter {
    /// Describes which tests to run and how.
    type Spec;

    /// The error returned if the engine fails to run a round.
    type Error: error::Error + Send + Sync + 'static;

    /// Runs the tests described by `spec`, delivering events to `sink`.
    fn execute(&self, spec: &Self::Spec, sink: &dyn TestEventSink) -> Result<(), Self::Error>;

    /// Requests that the current execution stop as soon as possible.
    ///
    /// This is best-effort, and may be called from a different thread than the one running
    /// `execute`.
    fn stop_now(&self);
}

/// The tests a retry round should be narrowed down to.
#[derive(Clone, Copy, Debug)]
pub struct RetryRequest<'a> {
    /// The index of the round about to be run.
    pub round: u32,

    /// The tests that failed in the previous round.
    pub failed_tests: &'a BTreeSet<TestIdentity>,

    /// The last failure recorded for each test. Frameworks that need to retry at a coarser
    /// granularity than a single method (for example, when a class-level fixture failed) can use
    /// this to decide what to include.
    pub failure_details: &'a BTreeMap<TestIdentity, TestFailure>,
}

/// Builds the spec for a retry round out of the original spec.
///
/// The narrowed spec must be equivalent to the original, except that it is scoped to exactly the
/// requested tests.
pub trait RetrySpecNarrower<Spec> {
    /// Returns a spec running only the tests in `request`.
    fn narrow(&self, original: &Spec, request: &RetryRequest<'_>) -> Spec;
}

impl<Spec, F> RetrySpecNarrower<Spec> for F
where
    F: Fn(&Spec, &RetryRequest<'_>) -> Spec,
{
    fn narrow(&self, original: &Spec, request: &RetryRequest<'_>) -> Spec {
        self(original, request)
    }
}

/// Retry runner options.
#[derive(Debug, Default)]
pub struct RetryRunnerBuilder {
    max_retries: Option<u32>,
    max_failures: Option<MaxFailures>,
    fail_on_passed_after_retry: Option<bool>,
}

impl RetryRunnerBuilder {
    /// Creates a builder initialized from the given config.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: Some(config.max_retries()),
            max_failures: Some(config.max_failures()),
            fail_on_passed_after_retry: Some(config.fail_on_passed_after_retry()),
        }
    }

    /// Sets the number of rounds allowed after the initial one. 0 disables retries.
    pub fn set_max_retries(&mut self, max_retries: u32) -> &mut Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the per-round failure cutoff.
    pub fn set_max_failures(&mut self, max_failures: MaxFailures) -> &mut Self {
        self.max_failures = Some(max_failures);
        self
    }

    /// Sets whether tests that only pass after being retried still fail the run.
    pub fn set_fail_on_passed_after_retry(&mut self, fail: bool) -> &mut Self {
        self.fail_on_passed_after_retry = Some(fail);
        self
    }

    /// Creates a new retry runner.
    pub fn build<E, N, F>(&self, executer: E, narrower: N, filter: F) -> RetryRunner<E, N, F>
    where
        E: TestExecuter,
        N: RetrySpecNarrower<E::Spec>,
        F: RetryabilityFilter,
    {
        let policy = RoundPolicy {
            max_retries: self.max_retries.unwrap_or(0),
            max_failures: self.max_failures.unwrap_or_default(),
            fail_on_passed_after_retry: self.fail_on_passed_after_retry.unwrap_or(false),
        };
        RetryRunner {
            policy,
            executer: DebugIgnore(executer),
            narrower: DebugIgnore(narrower),
            filter: DebugIgnore(filter),
            cancelled: AtomicBool::new(false),
        }
    }
}

/// Runs tests through an execution engine, retrying failed tests in later rounds.
///
/// Created using a [`RetryRunnerBuilder`].
#[derive(Debug)]
pub struct RetryRunner<E, N, F> {
    policy: RoundPolicy,
    executer: DebugIgnore<E>,
    narrower: DebugIgnore<N>,
    filter: DebugIgnore<F>,
    cancelled: AtomicBool,
}

impl<E, N, F> RetryRunner<E, N, F>
where
    E: TestExecuter,
    N: RetrySpecNarrower<E::Spec>,
    F: RetryabilityFilter,
{
    /// Returns the policy this runner applies.
    pub fn policy(&self) -> &RoundPolicy {
        &self.policy
    }

    /// Returns the execution engine.
    pub fn executer(&self) -> &E {
        &self.executer
    }

    /// Executes `spec`, retrying failed tests, and delivers the merged event stream to `sink`.
    ///
    /// Ordinary test failures are reported through the returned [`RetryRunReport`]. An error is
    /// returned if a failed test was not retried, if the engine fails, or if the round protocol
    /// is violated; no further rounds are attempted in those cases.
    pub fn execute<S: TestEventSink>(
        &self,
        spec: &E::Spec,
        sink: S,
    ) -> Result<RetryRunReport, RetryRunError> {
        // A stop only applies to the run in progress.
        self.cancelled.store(false, Ordering::SeqCst);
        if self.policy.max_retries == 0 {
            debug!("retries disabled, passing events through");
            if self.is_cancelled() {
                return Ok(RetryRunReport::new(
                    RetryRunOutcome::Cancelled,
                    0,
                    Vec::new(),
                    BTreeSet::new(),
                ));
            }
            self.execute_round(0, spec, &sink)?;
            let outcome = if self.is_cancelled() {
                RetryRunOutcome::Cancelled
            } else {
                RetryRunOutcome::RetriesDisabled
            };
            return Ok(RetryRunReport::new(outcome, 1, Vec::new(), BTreeSet::new()));
        }

        let mut collector = RoundCollector::new(sink, self.policy.max_failures);
        let mut retry_spec: Option<E::Spec> = None;
        let mut executions = 0;
        let mut rounds = Vec::new();
        let mut ever_failed = BTreeSet::new();

        loop {
            let round = collector.round();
            if self.is_cancelled() {
                return Ok(Self::cancelled_report(executions, rounds));
            }

            info!(round, "starting round");
            executions += 1;
            self.execute_round(round, retry_spec.as_ref().unwrap_or(spec), &collector)?;
            if self.is_cancelled() {
                info!(round, "run cancelled");
                return Ok(Self::cancelled_report(executions, rounds));
            }

            let result = collector.snapshot();
            rounds.push(RoundSummary {
                index: round,
                failed: result.failed_tests.len(),
                final_round: result.is_final_round,
            });
            ever_failed.extend(result.failed_tests.iter().cloned());

            let decision = RoundDecision::decide(&result, round, &self.policy, &*self.filter)
                .inspect_err(|err| {
                    warn!(
                        round,
                        tests = %err.tests().iter().join(", "),
                        "failed tests were not retried",
                    );
                })?;

            match decision {
                RoundDecision::Retry {
                    tests,
                    is_last_retry_round,
                } => {
                    info!(round, failed = tests.len(), "retrying failed tests");
                    let request = RetryRequest {
                        round: round + 1,
                        failed_tests: &tests,
                        failure_details: &result.failure_details,
                    };
                    retry_spec = Some(self.narrower.narrow(spec, &request));
                    collector.reset(is_last_retry_round)?;
                }
                RoundDecision::Succeeded { ignore_failures } => {
                    info!(round, ignore_failures, "all tests passed");
                    return Ok(RetryRunReport::new(
                        RetryRunOutcome::Passed { ignore_failures },
                        executions,
                        rounds,
                        ever_failed,
                    ));
                }
                RoundDecision::Failed { tests } => {
                    info!(round, failed = tests.len(), "tests still failing after final round");
                    let flaky = ever_failed.difference(&tests).cloned().collect();
                    return Ok(RetryRunReport::new(
                        RetryRunOutcome::Failed {
                            failed_tests: tests,
                        },
                        executions,
                        rounds,
                        flaky,
                    ));
                }
            }
        }
    }

    /// Cancels the run.
    ///
    /// The request is forwarded to the execution engine. Once the round in progress returns, no
    /// further rounds are started and [`execute`](Self::execute) reports
    /// [`RetryRunOutcome::Cancelled`]. A later call to `execute` starts a fresh run.
    pub fn stop_now(&self) {
        debug!("stop requested");
        self.cancelled.store(true, Ordering::SeqCst);
        self.executer.stop_now();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn execute_round(
        &self,
        round: u32,
        spec: &E::Spec,
        sink: &dyn TestEventSink,
    ) -> Result<(), RetryRunError> {
        self.executer
            .execute(spec, sink)
            .map_err(|err| RetryRunError::Execute {
                round,
                err: Box::new(err),
            })
    }

    fn cancelled_report(executions: usize, rounds: Vec<RoundSummary>) -> RetryRunReport {
        // Whether earlier failures would have passed is unknown, so nothing is reported as flaky.
        RetryRunReport::new(RetryRunOutcome::Cancelled, executions, rounds, BTreeSet::new())
    }
}
