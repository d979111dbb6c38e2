// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Throttle Port
//!
//! Failed authentication attempts are counted per client address and claimed
//! app id. A client with recent failures is slowed down, and hard-rejected
//! once it exceeds the attempt ceiling, whatever the failure reason was.

use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("client {addr} exceeded {attempts} failed attempts")]
pub struct Throttled {
    pub addr: IpAddr,
    pub attempts: u32,
}

pub trait Throttler: Send + Sync {
    /// Delay to impose before handling a request from `addr`, or a hard rejection.
    fn delay_for(&self, addr: IpAddr) -> Result<Duration, Throttled>;

    fn register_attempt(&self, addr: IpAddr, app_id: &str);

    /// Forget failures for this client+app pair after a successful request.
    fn reset(&self, addr: IpAddr, app_id: &str);
}
