// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::v3::ConnectReturnCode;
use codec::QoS;

use crate::error::Error;
use crate::event::ConnectionStatus;

/// Result of a subscription change, reported per topic filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    /// The server accepted the subscription with this maximum `QoS`.
    Granted(QoS),

    /// The server rejected the subscription.
    Rejected,

    /// The subscription was removed after an Unsubscribe request.
    Removed,
}

/// Reason the connection task stopped.
#[derive(Debug, Clone)]
pub enum Termination {
    /// User requested disconnect, or the client handle was dropped.
    Graceful,

    /// The broker refused the connect request; no retry is performed.
    Rejected(ConnectReturnCode),

    /// A protocol violation or another fatal error ended the session.
    Fatal(Error),
}

/// Application callbacks driven by the connection task.
///
/// Constructing the handler value takes the role of an init hook; the
/// remaining hooks are invoked on the connection task. A hook that blocks
/// stalls inbound dispatch for this client, which is the intended
/// backpressure mechanism.
pub trait Handler: Send {
    /// The session went up or down.
    fn connection(&mut self, _status: ConnectionStatus) {}

    /// An application message arrived on a subscribed topic.
    fn message(&mut self, _topic: &str, _payload: &[u8]) {}

    /// A subscription changed state.
    fn subscription(&mut self, _filter: &str, _status: SubscriptionStatus) {}

    /// The connection task is about to stop.
    fn terminate(&mut self, _reason: &Termination) {}
}

/// Handler that ignores every notification.
impl Handler for () {}
