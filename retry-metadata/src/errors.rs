// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while reading a [`RetryRunSummary`](crate::RetryRunSummary).
#[derive(Debug)]
pub enum SummaryReadError {
    /// Error parsing JSON input.
    Json(serde_json::Error),

    /// The summary was produced by an incompatible format version.
    UnsupportedFormatVersion {
        /// The version found in the input.
        found: u32,

        /// The version this crate understands.
        supported: u32,
    },
}

impl fmt::Display for SummaryReadError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Json(_) => write!(f, "error parsing retry run summary JSON"),
            Self::UnsupportedFormatVersion { found, supported } => write!(
                f,
                "retry run summary has format version {found}, \
                 but only version {supported} is supported"
            ),
        }
    }
}

impl error::Error for SummaryReadError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::UnsupportedFormatVersion { .. } => None,
        }
    }
}
