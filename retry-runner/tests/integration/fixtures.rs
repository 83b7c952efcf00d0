// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use retry_runner::{
    events::{
        NodeRole, OutputDestination, StackFrame, TestCompleteEvent, TestDescriptor, TestEventSink,
        TestFailure, TestId, TestOutputEvent, TestResultKind, TestStartEvent,
    },
    identity::TestIdentity,
    runner::{RetryRequest, TestExecuter},
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, Barrier, Mutex, Once,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread,
    time::Duration,
};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().unwrap();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .init();
    });
}

/// How a fixture test behaves across rounds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum FixtureStatus {
    Pass,
    Fail,
    /// Fails until round `pass_round`, then passes.
    Flaky { pass_round: u32 },
    /// Fails in round 0, and is silently dropped from every later round even if requested.
    DroppedOnRetry,
    /// Fails in round 0 because a shared setup fixture threw, and is never started again.
    FixtureFailure,
}

impl FixtureStatus {
    fn fails_in(self, round: u32) -> bool {
        match self {
            Self::Pass => false,
            Self::Fail => true,
            Self::Flaky { pass_round } => round < pass_round,
            Self::DroppedOnRetry | Self::FixtureFailure => round == 0,
        }
    }

    fn starts_in(self, round: u32) -> bool {
        match self {
            Self::DroppedOnRetry | Self::FixtureFailure => round == 0,
            _ => true,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TestFixture {
    pub(crate) class_name: &'static str,
    pub(crate) method_name: &'static str,
    pub(crate) status: FixtureStatus,
}

impl TestFixture {
    pub(crate) const fn new(
        class_name: &'static str,
        method_name: &'static str,
        status: FixtureStatus,
    ) -> Self {
        Self {
            class_name,
            method_name,
            status,
        }
    }

    pub(crate) fn identity(&self) -> TestIdentity {
        TestIdentity::new(self.class_name, self.method_name)
    }
}

/// The spec understood by [`FixtureExecuter`]: the tests to run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct FixtureSpec {
    pub(crate) tests: Vec<TestIdentity>,
}

impl FixtureSpec {
    pub(crate) fn all(fixtures: &[TestFixture]) -> Self {
        Self {
            tests: fixtures.iter().map(TestFixture::identity).collect(),
        }
    }
}

/// Narrows a spec down to the failing tests, keeping the original order.
pub(crate) fn narrow(spec: &FixtureSpec, request: &RetryRequest<'_>) -> FixtureSpec {
    FixtureSpec {
        tests: spec
            .tests
            .iter()
            .filter(|test| request.failed_tests.contains(*test))
            .cloned()
            .collect(),
    }
}

#[derive(Debug)]
pub(crate) struct FixtureEngineError {
    round: u32,
}

impl fmt::Display for FixtureEngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker process crashed in round {}", self.round)
    }
}

impl std::error::Error for FixtureEngineError {}

/// A fake execution engine driven by [`TestFixture`]s.
///
/// Every round is rooted at a node with a fresh id, the way a real engine numbers its nodes per
/// invocation. Tests are grouped under one composite node per class.
#[derive(Debug)]
pub(crate) struct FixtureExecuter {
    fixtures: BTreeMap<TestIdentity, FixtureStatus>,
    workers: usize,
    round: AtomicU32,
    invocations: Mutex<Vec<FixtureSpec>>,
    error_in_round: Option<u32>,
    block_in_round: Option<(u32, Arc<Barrier>)>,
    stopped: AtomicBool,
}

impl FixtureExecuter {
    pub(crate) fn new(fixtures: &[TestFixture]) -> Self {
        Self {
            fixtures: fixtures
                .iter()
                .map(|fixture| (fixture.identity(), fixture.status))
                .collect(),
            workers: 1,
            round: AtomicU32::new(0),
            invocations: Mutex::new(Vec::new()),
            error_in_round: None,
            block_in_round: None,
            stopped: AtomicBool::new(false),
        }
    }

    /// Runs tests on `workers` threads at once.
    pub(crate) fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Returns an error instead of running tests in `round`.
    pub(crate) fn with_error_in_round(mut self, round: u32) -> Self {
        self.error_in_round = Some(round);
        self
    }

    /// In `round`, waits on `barrier` and then until [`TestExecuter::stop_now`] is called.
    pub(crate) fn with_block_in_round(mut self, round: u32, barrier: Arc<Barrier>) -> Self {
        self.block_in_round = Some((round, barrier));
        self
    }

    pub(crate) fn invocations(&self) -> Vec<FixtureSpec> {
        self.invocations.lock().unwrap().clone()
    }

    fn run_test(&self, round: u32, index: usize, test: &TestIdentity, sink: &dyn TestEventSink) {
        let status = self.fixtures[test];
        if !status.starts_in(round) {
            return;
        }

        let id = TestId::new(format!("{round}.{index}"));
        sink.started(
            &TestDescriptor::leaf(id.clone(), test.clone()),
            &TestStartEvent::now(Some(class_id(round, test.class_name()))),
        );
        sink.output(
            &id,
            &TestOutputEvent {
                destination: OutputDestination::Stdout,
                message: format!("running {test} in round {round}\n"),
            },
        );

        let result = if status.fails_in(round) {
            let failure = match status {
                FixtureStatus::FixtureFailure => TestFailure::new("shared setup failed")
                    .with_exception_type("java.lang.IllegalStateException")
                    .with_stack_trace([
                        StackFrame::new(test.class_name(), "setupSpec"),
                        StackFrame::new("org.spockframework.runtime.SpecRunner", "runSetupSpec"),
                    ]),
                _ => TestFailure::new(format!("{test} failed in round {round}"))
                    .with_exception_type("java.lang.AssertionError")
                    .with_stack_trace([StackFrame::new(test.class_name(), test.method_name())]),
            };
            sink.failure(&id, &failure);
            TestResultKind::Failure
        } else {
            TestResultKind::Success
        };
        sink.completed(&id, &TestCompleteEvent::now(Some(result)));
    }
}

impl TestExecuter for FixtureExecuter {
    type Spec = FixtureSpec;
    type Error = FixtureEngineError;

    fn execute(&self, spec: &FixtureSpec, sink: &dyn TestEventSink) -> Result<(), Self::Error> {
        let round = self.round.fetch_add(1, Ordering::SeqCst);
        self.invocations.lock().unwrap().push(spec.clone());
        if self.error_in_round == Some(round) {
            return Err(FixtureEngineError { round });
        }

        let root = TestId::new(format!("root-{round}"));
        sink.started(
            &TestDescriptor::root(root.clone(), "Gradle Test Run"),
            &TestStartEvent::now(None),
        );

        if let Some((block_round, barrier)) = &self.block_in_round
            && *block_round == round
        {
            barrier.wait();
            while !self.stopped.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(1));
            }
            sink.completed(&root, &TestCompleteEvent::now(None));
            return Ok(());
        }

        let mut classes: Vec<&str> = spec.tests.iter().map(TestIdentity::class_name).collect();
        classes.dedup();
        for class_name in &classes {
            let id = class_id(round, class_name);
            sink.started(
                &TestDescriptor::composite(id, *class_name),
                &TestStartEvent::now(Some(root.clone())),
            );
        }

        let tests: Vec<_> = spec.tests.iter().enumerate().collect();
        let chunk_size = tests.len().div_ceil(self.workers).max(1);
        thread::scope(|s| {
            for chunk in tests.chunks(chunk_size) {
                s.spawn(move || {
                    for (index, test) in chunk {
                        self.run_test(round, *index, test, sink);
                    }
                });
            }
        });

        for class_name in &classes {
            let id = class_id(round, class_name);
            sink.completed(&id, &TestCompleteEvent::now(None));
        }
        sink.completed(&root, &TestCompleteEvent::now(None));
        Ok(())
    }

    fn stop_now(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

fn class_id(round: u32, class_name: &str) -> TestId {
    TestId::new(format!("{round}:{class_name}"))
}

/// An event as seen by a downstream consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum RecordedEvent {
    Started(TestId, NodeRole, TestIdentity),
    Completed(TestId),
    Output(TestId),
    Failure(TestId, String),
}

/// A downstream sink that records every event it receives.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn root_starts(&self) -> Vec<TestId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Started(id, NodeRole::Root, _) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn root_completions(&self) -> Vec<TestId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Completed(id) if id.as_str().starts_with("root-") => Some(id),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn failure_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, RecordedEvent::Failure(..)))
            .count()
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TestEventSink for RecordingSink {
    fn started(&self, descriptor: &TestDescriptor, _event: &TestStartEvent) {
        self.push(RecordedEvent::Started(
            descriptor.id.clone(),
            descriptor.role,
            descriptor.identity.clone(),
        ));
    }

    fn completed(&self, id: &TestId, _event: &TestCompleteEvent) {
        self.push(RecordedEvent::Completed(id.clone()));
    }

    fn output(&self, id: &TestId, _event: &TestOutputEvent) {
        self.push(RecordedEvent::Output(id.clone()));
    }

    fn failure(&self, id: &TestId, failure: &TestFailure) {
        self.push(RecordedEvent::Failure(id.clone(), failure.message().to_owned()));
    }
}
