// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable identities for tests.

use crate::errors::TestIdentityParseError;
use retry_metadata::TestIdentitySummary;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::{fmt, str::FromStr};

/// The stable identity of a test method: its owning class and its method name.
///
/// Execution engines assign their own ids to tests, but those are only meaningful within a
/// single round. `TestIdentity` is the key used to correlate a test across rounds.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestIdentity {
    class_name: SmolStr,
    method_name: SmolStr,
}

impl TestIdentity {
    /// The separator used between the class and method names in the string form.
    pub const SEPARATOR: char = '#';

    /// Creates a new identity.
    pub fn new(class_name: impl Into<SmolStr>, method_name: impl Into<SmolStr>) -> Self {
        Self {
            class_name: class_name.into(),
            method_name: method_name.into(),
        }
    }

    /// Returns the name of the class owning the test.
    #[inline]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the name of the test method.
    #[inline]
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    /// Converts this identity into its serializable summary form.
    pub fn to_summary(&self) -> TestIdentitySummary {
        TestIdentitySummary {
            class_name: self.class_name.clone(),
            method_name: self.method_name.clone(),
        }
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.class_name, Self::SEPARATOR, self.method_name)
    }
}

impl FromStr for TestIdentity {
    type Err = TestIdentityParseError;

    /// Parses `className#methodName`.
    ///
    /// The split happens at the last `#`, since method names in some frameworks are free-form
    /// strings but class names never contain the separator.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(Self::SEPARATOR) {
            Some((class_name, method_name))
                if !class_name.is_empty() && !method_name.is_empty() =>
            {
                Ok(Self::new(class_name, method_name))
            }
            _ => Err(TestIdentityParseError::new(s)),
        }
    }
}

impl From<&TestIdentity> for TestIdentitySummary {
    fn from(identity: &TestIdentity) -> Self {
        identity.to_summary()
    }
}
