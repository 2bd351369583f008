// Copyright 2026 rdvwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! rdvwatch library: appointment slot watcher core.
//!
//! This library crate exposes the core modules for integration testing.

pub mod browser;
pub mod config;
pub mod monitor;
pub mod notify;
