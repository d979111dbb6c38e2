// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cache;
pub mod db;
pub mod event_bus;
pub mod notifier;
pub mod proxy_gateway;
pub mod repositories;
pub mod signing;
pub mod throttle;

pub use event_bus::{DomainEvent, EventBus};
pub use proxy_gateway::HttpProxyGateway;
pub use signing::AuthVerifier;
