// Copyright 2026 Dredge Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dredge library — incremental collector for lazy-loading ledger feeds.
//!
//! This library crate exposes the core modules for integration testing.

#![allow(dead_code, unused_imports, clippy::new_without_default)]

pub mod cli;
pub mod detect;
pub mod engine;
pub mod export;
pub mod extract;
pub mod feed;
pub mod progress;
pub mod record;
