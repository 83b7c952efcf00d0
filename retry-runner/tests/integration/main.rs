// Copyright (c) The test-retry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fixtures;
