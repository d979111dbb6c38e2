// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # ExApp Gateway Core
//!
//! Trust boundary between the host and registered external applications
//! (ExApps): registry, scope authority, request signing and verification,
//! proxying, and lifecycle coordination.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Wires the DDD layers together for the CLI daemon

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
