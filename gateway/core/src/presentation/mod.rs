// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface of the gateway (Axum). No business logic lives here; every
//! handler delegates to [`crate::application::GatewayServices`].
//!
//! | Module | Surface | Description |
//! |--------|---------|-------------|
//! | [`api`] | all | Router assembly, `/health`, error mapping |
//! | [`exapp_api`] | ExApp-facing | Routes guarded by the request validation pipeline |
//! | [`admin_api`] | operators | `/admin/v1` routes behind a bearer token |

pub mod admin_api;
pub mod api;
pub mod exapp_api;

pub use api::{app, ApiError};
