// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    events::{
        NodeRole, TestCompleteEvent, TestDescriptor, TestEventSink, TestFailure, TestId,
        TestOutputEvent, TestStartEvent,
    },
    identity::TestIdentity,
};
use std::sync::Mutex;

/// An event as seen by a downstream consumer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum RecordedEvent {
    Started(TestId, NodeRole),
    Completed(TestId),
    Output(TestId, String),
    Failure(TestId, String),
}

/// A downstream sink that records every event it receives, in order.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl TestEventSink for RecordingSink {
    fn started(&self, descriptor: &TestDescriptor, _event: &TestStartEvent) {
        self.push(RecordedEvent::Started(descriptor.id.clone(), descriptor.role));
    }

    fn completed(&self, id: &TestId, _event: &TestCompleteEvent) {
        self.push(RecordedEvent::Completed(id.clone()));
    }

    fn output(&self, id: &TestId, event: &TestOutputEvent) {
        self.push(RecordedEvent::Output(id.clone(), event.message.clone()));
    }

    fn failure(&self, id: &TestId, failure: &TestFailure) {
        self.push(RecordedEvent::Failure(
            id.clone(),
            failure.message().to_owned(),
        ));
    }
}

/// Returns a leaf descriptor for `Suite#<method_name>`.
pub(crate) fn test_case_named(id: impl Into<TestId>, method_name: &str) -> TestDescriptor {
    TestDescriptor::leaf(id, TestIdentity::new("Suite", method_name))
}
