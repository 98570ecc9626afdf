// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Keep-Alive
//!
//! Background task that pings every open browser connection on a fixed
//! interval so idle sockets are not dropped by intermediaries while the user
//! is approving a request on another device.
//!
//! The first sweep happens one interval after start. The task stops when the
//! relay's shutdown token is cancelled.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::relay::ConnectionRegistry;

/// Interval between ping sweeps.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);

pub struct KeepAlive {
    connections: ConnectionRegistry,
    interval: Duration,
}

impl KeepAlive {
    pub fn new(connections: ConnectionRegistry) -> Self {
        Self {
            connections,
            interval: KEEP_ALIVE_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run the ping loop until `shutdown` is cancelled.
    ///
    /// ```rust,ignore
    /// tasks.spawn(KeepAlive::new(connections).run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "keep-alive starting");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("keep-alive shutting down");
                    return;
                }
            }

            self.ping_all().await;
        }
    }

    /// Ping every open connection once. Returns how many pings were queued.
    pub async fn ping_all(&self) -> usize {
        let connections = self.connections.snapshot().await;
        let mut sent = 0;
        for connection in &connections {
            match connection.ping() {
                Ok(()) => sent += 1,
                Err(err) => debug!(connection_id = %connection.id(), %err, "keep-alive ping skipped"),
            }
        }
        if sent > 0 {
            debug!(count = sent, "keep-alive sweep");
        }
        sent
    }
}
