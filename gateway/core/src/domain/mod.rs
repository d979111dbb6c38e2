// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Entities, value objects and ports of the gateway. Nothing in here performs
//! I/O; infrastructure adapters implement the traits declared below.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Aggregates (`ExApp`), scope model, auth protocol contract,
//!   repository and cache ports, configuration manifest

pub mod auth;
pub mod cache;
pub mod daemon;
pub mod events;
pub mod exapp;
pub mod gateway_config;
pub mod providers;
pub mod proxy;
pub mod repository;
pub mod scope;
pub mod throttle;
