// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::MaxFailuresParseError;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// Type for the max-failures config key.
///
/// Once a round accumulates at least this many distinct failing tests, it is treated as final
/// regardless of the remaining retry budget.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MaxFailures {
    /// Stop retrying once this many tests fail in a single round. Always greater than zero.
    Count(usize),

    /// Retry however many tests fail.
    #[default]
    Unbounded,
}

impl MaxFailures {
    /// Converts a raw count, where 0 means unbounded.
    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            Self::Unbounded
        } else {
            Self::Count(count)
        }
    }

    /// Returns true if a round with `failed` distinct failures has reached the cutoff.
    pub fn is_exceeded(&self, failed: usize) -> bool {
        match self {
            Self::Count(n) => failed >= *n,
            Self::Unbounded => false,
        }
    }
}

impl FromStr for MaxFailures {
    type Err = MaxFailuresParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower == "unbounded" || lower == "all" {
            return Ok(Self::Unbounded);
        }

        match s.parse::<isize>() {
            Err(e) => Err(MaxFailuresParseError::new(format!("error parsing {s:?}: {e}"))),
            Ok(n) if n < 0 => Err(MaxFailuresParseError::new("max-failures may not be negative")),
            Ok(n) => Ok(Self::from_count(n as usize)),
        }
    }
}

impl fmt::Display for MaxFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

impl<'de> Deserialize<'de> for MaxFailures {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = MaxFailures;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(
                    formatter,
                    "a non-negative integer or the string \"unbounded\""
                )
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                MaxFailures::from_str(v).map_err(serde::de::Error::custom)
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &"a non-negative integer",
                    ))
                } else {
                    Ok(MaxFailures::from_count(v as usize))
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(MaxFailures::from_count(v as usize))
            }
        }

        deserializer.deserialize_any(V)
    }
}
