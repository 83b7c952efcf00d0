// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deciding which non-retried tests are exempt from the retry guarantee.
//!
//! A test that failed in one round must be started again in the next. Some test frameworks break
//! this in a benign way: when a shared setup step throws, they report a failure against each test
//! that would have run, even though none of them started. Retrying the narrowed set then never
//! starts those tests again. A [`RetryabilityFilter`] encodes that framework-specific knowledge.

use crate::{events::TestFailure, identity::TestIdentity};
use std::collections::BTreeSet;

/// Decides whether a test that was not retried is exempt from the retry guarantee.
pub trait RetryabilityFilter: Send + Sync {
    /// Returns true if `test`, which failed in the previous round but was never started in the
    /// current one, should not be treated as an error.
    ///
    /// `failure` is the last recorded failure for the test, if one was recorded.
    fn is_exempt(&self, test: &TestIdentity, failure: Option<&TestFailure>) -> bool;
}

impl<F> RetryabilityFilter for F
where
    F: Fn(&TestIdentity, Option<&TestFailure>) -> bool + Send + Sync,
{
    fn is_exempt(&self, test: &TestIdentity, failure: Option<&TestFailure>) -> bool {
        self(test, failure)
    }
}

/// A filter that exempts nothing: every non-retried test is an error.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExemptions;

impl RetryabilityFilter for NoExemptions {
    fn is_exempt(&self, _test: &TestIdentity, _failure: Option<&TestFailure>) -> bool {
        false
    }
}

/// Exempts tests whose last failure was raised from within a shared fixture method.
///
/// For example, Spock reports a failure in `setupSpec` against every feature of the
/// specification, and a retry of those features never starts them either if the setup keeps
/// failing.
#[derive(Clone, Debug, Default)]
pub struct FixtureFailureFilter {
    fixture_methods: BTreeSet<String>,
}

impl FixtureFailureFilter {
    /// Creates a new filter exempting failures that pass through any of `fixture_methods`.
    pub fn new(fixture_methods: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fixture_methods: fixture_methods.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the fixture methods this filter looks for.
    pub fn fixture_methods(&self) -> impl Iterator<Item = &str> + '_ {
        self.fixture_methods.iter().map(String::as_str)
    }
}

impl RetryabilityFilter for FixtureFailureFilter {
    fn is_exempt(&self, _test: &TestIdentity, failure: Option<&TestFailure>) -> bool {
        let Some(failure) = failure else {
            return false;
        };
        failure
            .stack_trace()
            .iter()
            .any(|frame| self.fixture_methods.contains(frame.method_name.as_str()))
    }
}
