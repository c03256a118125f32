// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::net::SocketAddr;
use std::time::Duration;

/// Whether the session to the broker is currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A ConnectAck with return code `Accepted` arrived.
    Up,

    /// The transport failed or was closed; a reconnect may follow.
    Down,
}

/// Kind of transport carrying the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Tls,
    /// In-process duplex pipe, used by tests.
    InMemory,
}

/// Snapshot of the live connection.
///
/// The stream itself is owned by the connection task and cannot be handed
/// out; subscribers get its coordinates instead.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub transport: TransportKind,
    pub local_addr: Option<SocketAddr>,
    pub peer_addr: Option<SocketAddr>,
}

/// Notifications published per client id.
///
/// Every event is broadcast; subscribers obtain a receiver from
/// [`crate::AsyncClient::events`] or [`crate::registry::subscribe_events`].
#[derive(Debug, Clone)]
pub enum Event {
    /// Session went up or down.
    Status(ConnectionStatus),

    /// A PingResponse arrived; carries the request/response round trip time.
    PingResponse(Duration),

    /// A connection was established; carries its coordinates.
    Connection(ConnectionInfo),
}
