// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The retry runner.
//!
//! The main structure in this module is [`RetryRunner`].

mod decision;
mod imp;
mod report;

pub use decision::*;
pub use imp::*;
pub use report::*;
