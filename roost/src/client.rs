// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use codec::v3::SubscribeAck;
use codec::QoS;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::connect_options::ConnectOptions;
use crate::controller::Controller;
use crate::error::{Error, ErrorKind};
use crate::event::{ConnectionInfo, Event};
use crate::handler::Handler;
use crate::registry::{self, ClientHandle};

/// Requests sent from the user-facing client to its connection task.
pub(crate) enum Command {
    Publish {
        topic: String,
        qos: QoS,
        payload: Vec<u8>,
        retain: bool,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Subscribe {
        topics: Vec<(String, QoS)>,
        reply: oneshot::Sender<Result<Vec<SubscribeAck>, Error>>,
    },
    Unsubscribe {
        topics: Vec<String>,
        reply: oneshot::Sender<Result<(), Error>>,
    },
    Subscriptions {
        reply: oneshot::Sender<Vec<(String, QoS)>>,
    },
    Connection {
        reply: oneshot::Sender<ConnectionInfo>,
    },
    Disconnect,
}

/// Asynchronous MQTT client.
///
/// Creating a client registers its client id and spawns a connection task
/// which keeps a session to the broker alive until [`Self::disconnect`] is
/// called, the client value is dropped, or a fatal protocol error occurs.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug)]
pub struct AsyncClient {
    client_id: String,
    cmd_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<Event>,
    join_handle: JoinHandle<Result<(), Error>>,
}

impl AsyncClient {
    /// Register `client_id` and spawn the connection task.
    ///
    /// # Errors
    ///
    /// Returns error if another live client already uses this client id.
    pub fn new(options: ConnectOptions, handler: Box<dyn Handler>) -> Result<Self, Error> {
        let (event_tx, _event_rx) = broadcast::channel(64);
        registry::register(options.client_id(), ClientHandle::new(event_tx.clone()))?;

        let client_id = options.client_id().to_string();
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let controller = Controller::new(options, handler, cmd_rx, event_tx.clone());
        let join_handle = tokio::spawn(controller.run());

        Ok(Self {
            client_id,
            cmd_tx,
            events: event_tx,
            join_handle,
        })
    }

    /// Get client id of this connection.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subscribe to lifecycle events of this connection.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Publish `payload` to `topic`.
    ///
    /// For `QoS` 0 this resolves once the packet is handed to the transport.
    /// For `QoS` 1/2 it resolves when the terminal acknowledgement arrives.
    ///
    /// # Errors
    ///
    /// Returns error if the topic is invalid, the packet id pool is
    /// exhausted or the connection task is gone.
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Publish {
            topic: topic.to_string(),
            qos,
            payload: payload.to_vec(),
            retain,
            reply,
        })
        .await?;
        rx.await.map_err(|_err| channel_closed())?
    }

    /// Subscribe to a list of `(topic_filter, requested_qos)` pairs.
    ///
    /// Resolves when the SubscribeAck arrives, carrying the granted `QoS`
    /// or a failure marker per filter, in request order.
    ///
    /// # Errors
    ///
    /// Returns error if a filter is invalid, the packet id pool is
    /// exhausted or the connection task is gone.
    pub async fn subscribe(&self, topics: &[(&str, QoS)]) -> Result<Vec<SubscribeAck>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Subscribe {
            topics: topics
                .iter()
                .map(|(topic, qos)| ((*topic).to_string(), *qos))
                .collect(),
            reply,
        })
        .await?;
        rx.await.map_err(|_err| channel_closed())?
    }

    /// Unsubscribe from a list of topic filters.
    ///
    /// Resolves when the UnsubscribeAck arrives.
    ///
    /// # Errors
    ///
    /// Returns error if a filter is invalid or the connection task is gone.
    pub async fn unsubscribe(&self, topics: &[&str]) -> Result<(), Error> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Unsubscribe {
            topics: topics.iter().map(|topic| (*topic).to_string()).collect(),
            reply,
        })
        .await?;
        rx.await.map_err(|_err| channel_closed())?
    }

    /// Get the current set of `(topic_filter, granted_qos)` subscriptions.
    ///
    /// The set reflects server acknowledgements only.
    ///
    /// # Errors
    ///
    /// Returns error if the connection task is gone.
    pub async fn subscriptions(&self) -> Result<Vec<(String, QoS)>, Error> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Subscriptions { reply }).await?;
        rx.await.map_err(|_err| channel_closed())
    }

    /// Wait up to `wait` for an established connection and return its
    /// coordinates.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if no connection comes up in time, or `Closed` if
    /// the connection task is gone.
    pub async fn connection(&self, wait: Duration) -> Result<ConnectionInfo, Error> {
        let (reply, rx) = oneshot::channel();
        self.send_command(Command::Connection { reply }).await?;
        match timeout(wait, rx).await {
            Ok(Ok(info)) => Ok(info),
            Ok(Err(_recv)) => Err(channel_closed()),
            Err(_elapsed) => Err(Error::new(
                ErrorKind::Timeout,
                "No connection within timeout",
            )),
        }
    }

    /// Gracefully shut the connection down and wait for the task to end.
    ///
    /// # Errors
    ///
    /// Returns the fatal error if the connection task already ended with one.
    pub async fn disconnect(self) -> Result<(), Error> {
        // The task may already be gone; joining still returns its result.
        let _ = self.cmd_tx.send(Command::Disconnect).await;
        Self::join_task(self.join_handle).await
    }

    /// Wait for the connection task to end on its own, e.g. after a
    /// broker refusal.
    ///
    /// # Errors
    ///
    /// Returns the error the connection task ended with.
    pub async fn join(self) -> Result<(), Error> {
        Self::join_task(self.join_handle).await
    }

    async fn join_task(join_handle: JoinHandle<Result<(), Error>>) -> Result<(), Error> {
        match join_handle.await {
            Ok(result) => result,
            Err(err) => Err(Error::from_string(
                ErrorKind::IoError,
                format!("Connection task failed: {err}"),
            )),
        }
    }

    async fn send_command(&self, command: Command) -> Result<(), Error> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_err| channel_closed())
    }
}

fn channel_closed() -> Error {
    Error::new(ErrorKind::Closed, "Connection task is gone")
}
