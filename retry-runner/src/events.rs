// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events produced by an execution engine while it runs tests.
//!
//! Events are produced by a [`TestExecuter`](crate::runner::TestExecuter) and consumed by a
//! [`TestEventSink`]. The [`RoundCollector`](crate::collector::RoundCollector) is itself a sink
//! that forwards to a downstream sink, so the same vocabulary is used on both sides of it.

use crate::identity::TestIdentity;
use chrono::{DateTime, FixedOffset, Local};
use smol_str::SmolStr;
use std::{fmt, sync::Arc};

/// An opaque, engine-assigned id for a node in the test tree.
///
/// Ids are only meaningful within the round that produced them: an engine may hand out a
/// different id to the same test in the next round. Use [`TestIdentity`] to correlate tests
/// across rounds.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TestId(SmolStr);

impl TestId {
    /// Creates a new id.
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TestId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// The role a node plays in the test tree.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeRole {
    /// The synthetic node representing the whole run.
    ///
    /// Downstream consumers must see exactly one start and one completion for it, however many
    /// rounds are executed.
    Root,

    /// A grouping node, such as a test class or a worker. Composite nodes are never retried on
    /// their own.
    Composite,

    /// An individual test.
    Leaf,
}

impl NodeRole {
    /// Returns true if this node has children.
    #[inline]
    pub fn is_composite(self) -> bool {
        matches!(self, Self::Root | Self::Composite)
    }
}

/// Describes a node in the test tree as it starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestDescriptor {
    /// The engine-assigned id for this node, valid for the current round.
    pub id: TestId,

    /// The stable identity of this node.
    pub identity: TestIdentity,

    /// The role of this node.
    pub role: NodeRole,
}

impl TestDescriptor {
    /// Creates a descriptor for the synthetic root node.
    pub fn root(id: impl Into<TestId>, name: impl Into<SmolStr>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            identity: TestIdentity::new(name.clone(), name),
            role: NodeRole::Root,
        }
    }

    /// Creates a descriptor for a grouping node, such as a test class.
    pub fn composite(id: impl Into<TestId>, class_name: impl Into<SmolStr>) -> Self {
        let class_name = class_name.into();
        Self {
            id: id.into(),
            identity: TestIdentity::new(class_name.clone(), class_name),
            role: NodeRole::Composite,
        }
    }

    /// Creates a descriptor for an individual test.
    pub fn leaf(id: impl Into<TestId>, identity: TestIdentity) -> Self {
        Self {
            id: id.into(),
            identity,
            role: NodeRole::Leaf,
        }
    }
}

/// Emitted when a node starts.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestStartEvent {
    /// The time at which the node started, including the offset from UTC.
    pub start_time: DateTime<FixedOffset>,

    /// The id of the parent node, if any.
    pub parent_id: Option<TestId>,
}

impl TestStartEvent {
    /// Creates a start event timestamped now.
    pub fn now(parent_id: Option<TestId>) -> Self {
        Self {
            start_time: Local::now().fixed_offset(),
            parent_id,
        }
    }
}

/// Emitted when a node completes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCompleteEvent {
    /// The time at which the node completed, including the offset from UTC.
    pub end_time: DateTime<FixedOffset>,

    /// The result reported by the engine, if it reported one.
    ///
    /// Engines typically leave this unset and let the consumer infer the result from failure
    /// events.
    pub result: Option<TestResultKind>,
}

impl TestCompleteEvent {
    /// Creates a completion event timestamped now.
    pub fn now(result: Option<TestResultKind>) -> Self {
        Self {
            end_time: Local::now().fixed_offset(),
            result,
        }
    }
}

/// The result of a completed node.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum TestResultKind {
    /// The node passed.
    Success,

    /// The node failed.
    Failure,

    /// The node was skipped.
    Skipped,
}

/// A chunk of output produced by a running node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestOutputEvent {
    /// Where the output was written.
    pub destination: OutputDestination,

    /// The output itself.
    pub message: String,
}

/// Where a chunk of test output was written.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OutputDestination {
    /// Standard output.
    Stdout,

    /// Standard error.
    Stderr,
}

/// The cause of a test failure, as reported by the engine.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestFailure {
    exception_type: Option<SmolStr>,
    message: String,
    stack_trace: Vec<StackFrame>,
}

impl TestFailure {
    /// Creates a failure with the given message and no stack trace.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            exception_type: None,
            message: message.into(),
            stack_trace: Vec::new(),
        }
    }

    /// Sets the type of the exception or panic payload that caused the failure.
    pub fn with_exception_type(mut self, exception_type: impl Into<SmolStr>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    /// Sets the stack trace, innermost frame first.
    pub fn with_stack_trace(mut self, frames: impl IntoIterator<Item = StackFrame>) -> Self {
        self.stack_trace = frames.into_iter().collect();
        self
    }

    /// Returns the type of the exception that caused the failure, if known.
    pub fn exception_type(&self) -> Option<&str> {
        self.exception_type.as_deref()
    }

    /// Returns the failure message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the stack trace, innermost frame first.
    pub fn stack_trace(&self) -> &[StackFrame] {
        &self.stack_trace
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exception_type {
            Some(exception_type) => write!(f, "{exception_type}: {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A single frame in a failure's stack trace.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct StackFrame {
    /// The class (or module) executing in this frame.
    pub class_name: SmolStr,

    /// The method (or function) executing in this frame.
    pub method_name: SmolStr,
}

impl StackFrame {
    /// Creates a new stack frame.
    pub fn new(class_name: impl Into<SmolStr>, method_name: impl Into<SmolStr>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }
}

/// Consumes the events produced while running tests.
///
/// Engines may run tests on several workers at once, so every method may be called concurrently
/// from multiple threads. For a given id, events arrive in the order
/// start, output*, failure*, completion; no ordering holds across different ids.
pub trait TestEventSink: Send + Sync {
    /// A node started.
    fn started(&self, descriptor: &TestDescriptor, event: &TestStartEvent);

    /// A node completed.
    fn completed(&self, id: &TestId, event: &TestCompleteEvent);

    /// A node produced output.
    fn output(&self, id: &TestId, event: &TestOutputEvent);

    /// A node failed. A node may fail more than once.
    fn failure(&self, id: &TestId, failure: &TestFailure);
}

impl<T: TestEventSink + ?Sized> TestEventSink for &T {
    fn started(&self, descriptor: &TestDescriptor, event: &TestStartEvent) {
        (**self).started(descriptor, event)
    }

    fn completed(&self, id: &TestId, event: &TestCompleteEvent) {
        (**self).completed(id, event)
    }

    fn output(&self, id: &TestId, event: &TestOutputEvent) {
        (**self).output(id, event)
    }

    fn failure(&self, id: &TestId, failure: &TestFailure) {
        (**self).failure(id, failure)
    }
}

impl<T: TestEventSink + ?Sized> TestEventSink for Box<T> {
    fn started(&self, descriptor: &TestDescriptor, event: &TestStartEvent) {
        (**self).started(descriptor, event)
    }

    fn completed(&self, id: &TestId, event: &TestCompleteEvent) {
        (**self).completed(id, event)
    }

    fn output(&self, id: &TestId, event: &TestOutputEvent) {
        (**self).output(id, event)
    }

    fn failure(&self, id: &TestId, failure: &TestFailure) {
        (**self).failure(id, failure)
    }
}

impl<T: TestEventSink + ?Sized> TestEventSink for Arc<T> {
    fn started(&self, descriptor: &TestDescriptor, event: &TestStartEvent) {
        (**self).started(descriptor, event)
    }

    fn completed(&self, id: &TestId, event: &TestCompleteEvent) {
        (**self).completed(id, event)
    }

    fn output(&self, id: &TestId, event: &TestOutputEvent) {
        (**self).output(id, event)
    }

    fn failure(&self, id: &TestId, failure: &TestFailure) {
        (**self).failure(id, failure)
    }
}
