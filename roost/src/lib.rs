// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

pub mod backoff;
pub mod client;
pub mod connect_options;
mod controller;
mod error;
pub mod event;
pub mod handler;
mod inflight;
pub mod registry;
pub mod status;
pub mod stream;

pub use client::AsyncClient;
pub use codec::v3::{ConnectReturnCode, SubscribeAck};
pub use codec::QoS;
pub use connect_options::{
    ConnectOptions, ConnectType, LastWill, MqttConnect, MqttsConnect, SelfSignedTls, TlsType,
};
pub use error::{Error, ErrorKind};
pub use event::{ConnectionInfo, ConnectionStatus, Event, TransportKind};
pub use handler::{Handler, SubscriptionStatus, Termination};
pub use status::ClientStatus;
