// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! Use cases built on the domain ports: the registry, scope authority,
//! inbound validation pipeline, lifecycle coordination, init workers and
//! capability providers, plus the composition root wiring them together.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates domain objects; owns no transport or storage code

pub mod exapp_client;
pub mod init_timeout;
pub mod init_worker;
pub mod lifecycle;
pub mod providers;
pub mod registry;
pub mod repository_factory;
pub mod request_validation;
pub mod scope_authority;
pub mod services;

pub use exapp_client::ExAppClient;
pub use lifecycle::LifecycleCoordinator;
pub use registry::AppRegistry;
pub use request_validation::{ExAppSession, RequestValidator, ValidationError};
pub use scope_authority::ScopeAuthority;
pub use services::GatewayServices;
