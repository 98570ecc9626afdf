// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::RelayConfig;
use crate::relay::ConnectionRegistry;

/// State shared by the upgrade handler, every browser connection, every
/// upstream exchange and the keep-alive job.
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<RelayConfig>,
    pub connections: ConnectionRegistry,
    /// Cancelled by `Relay::close`. Connections and exchanges hold child tokens.
    pub shutdown: CancellationToken,
    pub tasks: TaskTracker,
}

impl RelayState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: Arc::new(config),
            connections: ConnectionRegistry::default(),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }
}
