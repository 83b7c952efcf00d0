// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collecting the events of one round of execution.
//!
//! The main structure in this module is [`RoundCollector`].

use crate::{
    config::MaxFailures,
    errors::RoundCompletedError,
    events::{
        NodeRole, TestCompleteEvent, TestDescriptor, TestEventSink, TestFailure, TestId,
        TestOutputEvent, TestStartEvent,
    },
    identity::TestIdentity,
};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Mutex, MutexGuard, OnceLock, PoisonError},
};
use tracing::debug;

/// The outcome of a single round, as observed by a [`RoundCollector`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RoundResult {
    /// Tests that failed while actively running in this round.
    pub failed_tests: BTreeSet<TestIdentity>,

    /// Tests that failed in the previous round but were never started in this one.
    ///
    /// Always disjoint from `failed_tests`.
    pub non_retried_tests: BTreeSet<TestIdentity>,

    /// The last failure seen for each test, across all rounds so far.
    pub failure_details: BTreeMap<TestIdentity, TestFailure>,

    /// True if no further round should be attempted after this one.
    pub is_final_round: bool,
}

impl RoundResult {
    /// Returns the last recorded failure for `test`, if any.
    pub fn failure_for(&self, test: &TestIdentity) -> Option<&TestFailure> {
        self.failure_details.get(test)
    }
}

/// A [`TestEventSink`] that tracks failures across retry rounds and forwards events downstream.
///
/// A single collector is created per run and [`reset`](Self::reset) between rounds. Only tests
/// that were started and are still active when a failure arrives are eligible for retry; every
/// event is still forwarded downstream, except that the root node's start is forwarded only once
/// and its completion only at the end of the terminal round. Downstream therefore observes a
/// single logical run.
///
/// Event methods may be called concurrently from multiple threads. `reset` takes `&mut self`,
/// so it cannot overlap with a round that is still delivering events.
#[derive(Debug)]
pub struct RoundCollector<S> {
    downstream: S,
    max_failures: MaxFailures,
    round: u32,
    is_last_retry_round: bool,
    root: OnceLock<TestId>,
    // Root nodes that showed up in later rounds under a fresh id.
    round_roots: Mutex<HashSet<TestId>>,
    active: Mutex<HashMap<TestId, TestIdentity>>,
    failed: Mutex<BTreeSet<TestIdentity>>,
    carried_over: Mutex<BTreeSet<TestIdentity>>,
    failure_details: Mutex<BTreeMap<TestIdentity, TestFailure>>,
}

impl<S: TestEventSink> RoundCollector<S> {
    /// Creates a new collector for round 0, forwarding events to `downstream`.
    pub fn new(downstream: S, max_failures: MaxFailures) -> Self {
        Self {
            downstream,
            max_failures,
            round: 0,
            is_last_retry_round: false,
            root: OnceLock::new(),
            round_roots: Mutex::new(HashSet::new()),
            active: Mutex::new(HashMap::new()),
            failed: Mutex::new(BTreeSet::new()),
            carried_over: Mutex::new(BTreeSet::new()),
            failure_details: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the index of the current round.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Returns the sink events are forwarded to.
    pub fn downstream(&self) -> &S {
        &self.downstream
    }

    /// Consumes the collector, returning the downstream sink.
    pub fn into_downstream(self) -> S {
        self.downstream
    }

    /// Returns true if no further round should be attempted after the current one.
    ///
    /// That is the case if nothing failed, if this is the last retry round, or if the number of
    /// failures has reached the max-failures cutoff.
    pub fn is_terminal_round(&self) -> bool {
        let failed = lock(&self.failed).len();
        failed == 0 || self.is_last_retry_round || self.max_failures.is_exceeded(failed)
    }

    /// Returns a snapshot of what this round has observed so far.
    pub fn snapshot(&self) -> RoundResult {
        // `is_terminal_round` locks `failed` again, so no guard may outlive its statement.
        let failed_tests = lock(&self.failed).clone();
        let non_retried_tests = lock(&self.carried_over).clone();
        let failure_details = lock(&self.failure_details).clone();
        RoundResult {
            failed_tests,
            non_retried_tests,
            failure_details,
            is_final_round: self.is_terminal_round(),
        }
    }

    /// Moves on to the next round.
    ///
    /// This round's failures become the set of tests expected to start in the next round. Failure
    /// details are kept, so that tests which are never started again can still be classified.
    ///
    /// Returns an error if the current round is terminal.
    pub fn reset(&mut self, is_last_retry_round: bool) -> Result<(), RoundCompletedError> {
        if self.is_terminal_round() {
            return Err(RoundCompletedError::new(lock(&self.failed).len()));
        }

        let failed = std::mem::take(get_mut(&mut self.failed));
        debug!(
            round = self.round,
            failed = failed.len(),
            is_last_retry_round,
            "resetting round collector"
        );
        *get_mut(&mut self.carried_over) = failed;
        get_mut(&mut self.active).clear();
        get_mut(&mut self.round_roots).clear();
        self.is_last_retry_round = is_last_retry_round;
        self.round += 1;
        Ok(())
    }

    fn is_root(&self, id: &TestId) -> bool {
        self.root.get() == Some(id) || lock(&self.round_roots).contains(id)
    }
}

impl<S: TestEventSink> TestEventSink for RoundCollector<S> {
    fn started(&self, descriptor: &TestDescriptor, event: &TestStartEvent) {
        // The test did start this round, so it was retried.
        lock(&self.carried_over).remove(&descriptor.identity);

        if (self.root.get().is_none() || descriptor.role == NodeRole::Root)
            && self.root.set(descriptor.id.clone()).is_ok()
        {
            debug!(id = %descriptor.id, "run started");
            // Engines report failures of the whole run (e.g. a worker that could not start)
            // against the root, so those count as failures of the round.
            lock(&self.active).insert(descriptor.id.clone(), descriptor.identity.clone());
            self.downstream.started(descriptor, event);
            return;
        }

        if descriptor.role == NodeRole::Root || self.root.get() == Some(&descriptor.id) {
            if self.root.get() != Some(&descriptor.id) {
                lock(&self.round_roots).insert(descriptor.id.clone());
            }
            lock(&self.active).insert(descriptor.id.clone(), descriptor.identity.clone());
            debug!(round = self.round, id = %descriptor.id, "suppressing root start");
            return;
        }

        if descriptor.role == NodeRole::Leaf {
            lock(&self.active).insert(descriptor.id.clone(), descriptor.identity.clone());
        }
        self.downstream.started(descriptor, event);
    }

    fn completed(&self, id: &TestId, event: &TestCompleteEvent) {
        lock(&self.active).remove(id);

        if !self.is_root(id) {
            self.downstream.completed(id, event);
        } else if self.is_terminal_round() {
            // Report the completion under the id downstream saw the run start with.
            let root = self.root.get().unwrap_or(id);
            debug!(round = self.round, id = %root, "run finished");
            self.downstream.completed(root, event);
        } else {
            debug!(round = self.round, %id, "suppressing root completion");
        }
    }

    fn output(&self, id: &TestId, event: &TestOutputEvent) {
        self.downstream.output(id, event);
    }

    fn failure(&self, id: &TestId, failure: &TestFailure) {
        let identity = lock(&self.active).get(id).cloned();
        match identity {
            Some(identity) => {
                lock(&self.failed).insert(identity.clone());
                lock(&self.failure_details).insert(identity, failure.clone());
            }
            None => {
                debug!(
                    round = self.round,
                    %id,
                    "failure for a node without an active test, not eligible for retry"
                );
            }
        }
        self.downstream.failure(id, failure);
    }
}

// A panic in one event producer must not prevent the rest of the run from being recorded.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn get_mut<T>(mutex: &mut Mutex<T>) -> &mut T {
    mutex.get_mut().unwrap_or_else(PoisonError::into_inner)
}
