// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use bytes::BytesMut;

use codec::v3::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, DisconnectPacket, Packet,
    PingRequestPacket, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, SubscribeAck, SubscribePacket, SubscribeTopic, UnsubscribePacket,
};
use codec::{
    ByteArray, DecodeError, DecodePacket, EncodePacket, FixedHeader, PacketType, QoS, SubTopic,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};

use crate::backoff::Backoff;
use crate::client::Command;
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::event::{ConnectionInfo, ConnectionStatus, Event};
use crate::handler::{Handler, SubscriptionStatus, Termination};
use crate::inflight::{Inflight, PendingSubscribe, PendingUnsubscribe};
use crate::registry;
use crate::status::ClientStatus;
use crate::stream::Stream;

/// How a session over one transport connection ended.
enum SessionEnd {
    /// User asked for disconnect, or the client handle was dropped.
    Graceful,

    /// Transport-level failure; the reconnect loop takes over.
    Lost(Error),
}

/// Outcome of waiting for the ConnectAck packet.
enum Handshake {
    Ack(ConnectAckPacket),
    Lost(Error),
    Abandoned,
}

/// Per-client connection task.
///
/// Owns the transport, the in-flight tracker and the user handler. All
/// state transitions go through this task; the user-facing client talks to
/// it over the command channel only.
pub(crate) struct Controller {
    options: ConnectOptions,
    handler: Box<dyn Handler>,
    cmd_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<Event>,

    status: ClientStatus,
    inflight: Inflight,

    /// Authoritative `(filter, granted_qos)` set, updated on SubscribeAck
    /// and UnsubscribeAck only.
    subscriptions: Vec<(String, QoS)>,

    backoff: Backoff,
    first_connect: bool,

    /// Commands received while no session is up; drained after the next
    /// accepted ConnectAck.
    deferred: Vec<Command>,

    /// Live connection coordinates while connected.
    connection_info: Option<ConnectionInfo>,

    /// Callers blocked in `connection()` until a session is up.
    waiting_connection: Vec<oneshot::Sender<ConnectionInfo>>,

    last_write: Instant,
    ping_sent_at: Option<Instant>,
    ping_deadline: Option<Instant>,
}

impl Controller {
    pub fn new(
        options: ConnectOptions,
        handler: Box<dyn Handler>,
        cmd_rx: mpsc::Receiver<Command>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        let backoff = Backoff::new(options.min_backoff(), options.max_backoff());
        Self {
            options,
            handler,
            cmd_rx,
            event_tx,
            status: ClientStatus::Initial,
            inflight: Inflight::new(),
            subscriptions: Vec::new(),
            backoff,
            first_connect: true,
            deferred: Vec::new(),
            connection_info: None,
            waiting_connection: Vec::new(),
            last_write: Instant::now(),
            ping_sent_at: None,
            ping_deadline: None,
        }
    }

    /// Run until graceful disconnect or a fatal error.
    pub async fn run(mut self) -> Result<(), Error> {
        log::info!("mqtt client `{}` starting", self.options.client_id());
        if !self.options.first_connect_delay().is_zero() {
            sleep(self.options.first_connect_delay()).await;
        }

        let result = self.run_loop().await;
        registry::deregister(self.options.client_id());

        let reason = match &result {
            Ok(()) => Termination::Graceful,
            Err(err) => match err.kind() {
                ErrorKind::ConnectionRejected(code) => Termination::Rejected(code),
                _ => Termination::Fatal(err.clone()),
            },
        };
        self.handler.terminate(&reason);
        self.status = ClientStatus::Disconnected;
        if let Err(err) = &result {
            log::error!("mqtt client `{}` stopped: {err}", self.options.client_id());
        }
        result
    }

    async fn run_loop(&mut self) -> Result<(), Error> {
        loop {
            self.status = ClientStatus::Connecting;
            match Stream::connect(&self.options).await {
                Ok(mut stream) => match self.session(&mut stream).await {
                    Ok(SessionEnd::Graceful) => return Ok(()),
                    Ok(SessionEnd::Lost(err)) => {
                        log::warn!("Connection lost: {err}");
                        self.connection_down();
                    }
                    Err(err) => {
                        self.connection_down();
                        return Err(err);
                    }
                },
                // A broken certificate setup will not fix itself by retrying.
                Err(err) if matches!(err.kind(), ErrorKind::TlsError | ErrorKind::CertError) => {
                    return Err(err);
                }
                Err(err) => log::warn!("Connect failed: {err}"),
            }

            self.status = ClientStatus::Backoff;
            if !self.backoff_wait().await {
                return Ok(());
            }
        }
    }

    /// Sleep through the computed backoff delay while staying responsive
    /// to user commands. Returns false on a disconnect request.
    async fn backoff_wait(&mut self) -> bool {
        let delay = self.backoff.next_delay();
        log::info!("Reconnecting in {delay:?}");
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return true,
                command = self.cmd_rx.recv() => match command {
                    None | Some(Command::Disconnect) => return false,
                    Some(command) => self.deferred.push(command),
                },
            }
        }
    }

    /// Drive one transport connection: handshake, replay, dispatch.
    async fn session(&mut self, stream: &mut Stream) -> Result<SessionEnd, Error> {
        let clean_session = self.clean_session_for_attempt();
        if clean_session {
            // Discard local session state before the Connect is sent.
            self.inflight.clear();
            self.subscriptions.clear();
        }

        let connect_packet = self.build_connect(clean_session)?;
        self.ping_sent_at = None;
        self.ping_deadline = None;
        if let Err(err) = self.send_packet(stream, connect_packet).await {
            return Ok(SessionEnd::Lost(err));
        }
        self.status = ClientStatus::AwaitingConnack;

        let mut buf = BytesMut::with_capacity(4096);
        let connack = match self.await_connack(stream, &mut buf).await? {
            Handshake::Ack(connack) => connack,
            Handshake::Lost(err) => return Ok(SessionEnd::Lost(err)),
            Handshake::Abandoned => {
                stream.shutdown().await;
                return Ok(SessionEnd::Graceful);
            }
        };

        if connack.return_code() != ConnectReturnCode::Accepted {
            return Err(Error::from_string(
                ErrorKind::ConnectionRejected(connack.return_code()),
                format!("Broker refused connection: {:?}", connack.return_code()),
            ));
        }
        // A server MUST NOT resume a session after a clean connect
        // [MQTT-3.1.2-6].
        if clean_session && connack.session_present() {
            return Err(Error::new(
                ErrorKind::ProtocolViolation,
                "Session present after clean session connect",
            ));
        }

        let first_connect = self.first_connect;
        self.first_connect = false;
        self.backoff.reset();
        self.connection_up(stream);

        if !clean_session {
            for packet in self.inflight.replay() {
                if let Err(err) = self.send_packet(stream, packet).await {
                    return classify(err);
                }
            }
        }
        if first_connect {
            if let Err(err) = self.subscribe_initial(stream).await {
                return classify(err);
            }
        } else if !connack.session_present() {
            // The broker lost our session; restore subscriptions.
            if let Err(err) = self.resubscribe_known(stream).await {
                return classify(err);
            }
        }

        let deferred: Vec<Command> = self.deferred.drain(..).collect();
        for command in deferred {
            if matches!(command, Command::Disconnect) {
                return Ok(self.graceful_shutdown(stream).await);
            }
            if let Err(err) = self.handle_command(stream, command).await {
                return classify(err);
            }
        }

        self.connected_loop(stream, buf).await
    }

    async fn await_connack(
        &mut self,
        stream: &mut Stream,
        buf: &mut BytesMut,
    ) -> Result<Handshake, Error> {
        let deadline = Instant::now() + self.options.connack_timeout();
        loop {
            if let Some(packet) = try_frame(buf)? {
                return match packet {
                    Packet::ConnectAck(connack) => Ok(Handshake::Ack(connack)),
                    other => Err(protocol_violation(
                        PacketType::ConnectAck,
                        other.packet_type(),
                    )),
                };
            }

            tokio::select! {
                _ = sleep_until(deadline) => {
                    return Ok(Handshake::Lost(Error::new(
                        ErrorKind::Timeout,
                        "No ConnectAck within timeout",
                    )));
                }
                command = self.cmd_rx.recv() => match command {
                    None | Some(Command::Disconnect) => return Ok(Handshake::Abandoned),
                    Some(command) => self.deferred.push(command),
                },
                ret = stream.read_buf(buf) => match ret {
                    Ok(0) => {
                        return Ok(Handshake::Lost(Error::new(
                            ErrorKind::Closed,
                            "Connection closed while waiting for ConnectAck",
                        )));
                    }
                    Ok(_n) => (),
                    Err(err) => return Ok(Handshake::Lost(err)),
                },
            }
        }
    }

    async fn connected_loop(
        &mut self,
        stream: &mut Stream,
        mut buf: BytesMut,
    ) -> Result<SessionEnd, Error> {
        loop {
            // Drain complete frames before waiting for more input, so that
            // packets coalesced into one read are handled in wire order.
            loop {
                match try_frame(&mut buf) {
                    Ok(Some(packet)) => {
                        if let Err(err) = self.handle_packet(stream, packet).await {
                            return classify(err);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => return Err(Error::from(err)),
                }
            }

            let keepalive_deadline = self
                .next_keepalive_deadline()
                .unwrap_or_else(|| Instant::now() + Duration::from_secs(86400 * 365 * 30));

            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    None | Some(Command::Disconnect) => {
                        return Ok(self.graceful_shutdown(stream).await);
                    }
                    Some(command) => {
                        if let Err(err) = self.handle_command(stream, command).await {
                            return classify(err);
                        }
                    }
                },
                ret = stream.read_buf(&mut buf) => match ret {
                    Ok(0) => {
                        return Ok(SessionEnd::Lost(Error::new(
                            ErrorKind::Closed,
                            "Connection closed by peer",
                        )));
                    }
                    Ok(_n) => (),
                    Err(err) => return Ok(SessionEnd::Lost(err)),
                },
                _ = sleep_until(keepalive_deadline) => {
                    if let Err(err) = self.handle_keepalive(stream).await {
                        return classify(err);
                    }
                }
            }
        }
    }

    async fn graceful_shutdown(&mut self, stream: &mut Stream) -> SessionEnd {
        self.status = ClientStatus::Disconnecting;
        if let Err(err) = self.send_packet(stream, DisconnectPacket::new()).await {
            log::warn!("Failed to send Disconnect packet: {err}");
        }
        stream.shutdown().await;
        self.connection_down();
        SessionEnd::Graceful
    }

    async fn handle_command(&mut self, stream: &mut Stream, command: Command) -> Result<(), Error> {
        match command {
            Command::Publish {
                topic,
                qos,
                payload,
                retain,
                reply,
            } => {
                self.handle_publish_command(stream, &topic, qos, &payload, retain, reply)
                    .await
            }
            Command::Subscribe { topics, reply } => {
                self.handle_subscribe_command(stream, &topics, reply).await
            }
            Command::Unsubscribe { topics, reply } => {
                self.handle_unsubscribe_command(stream, &topics, reply).await
            }
            Command::Subscriptions { reply } => {
                let _ = reply.send(self.subscriptions.clone());
                Ok(())
            }
            Command::Connection { reply } => {
                if let Some(info) = &self.connection_info {
                    let _ = reply.send(info.clone());
                } else {
                    self.waiting_connection.push(reply);
                }
                Ok(())
            }
            // Handled by the callers of handle_command.
            Command::Disconnect => Ok(()),
        }
    }

    async fn handle_publish_command(
        &mut self,
        stream: &mut Stream,
        topic: &str,
        qos: QoS,
        payload: &[u8],
        retain: bool,
        reply: oneshot::Sender<Result<(), Error>>,
    ) -> Result<(), Error> {
        let mut packet = match PublishPacket::new(topic, qos, payload) {
            Ok(packet) => packet,
            Err(err) => {
                let _ = reply.send(Err(Error::from(err)));
                return Ok(());
            }
        };
        packet.set_retain(retain);

        if qos == QoS::AtMostOnce {
            let ret = self.send_packet(stream, packet).await;
            let _ = reply.send(ret.clone());
            return ret;
        }

        let packet_id = match self.inflight.alloc_packet_id() {
            Ok(packet_id) => packet_id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return Ok(());
            }
        };
        packet.set_packet_id(packet_id);
        self.inflight.push_publish(packet.clone(), Some(reply));
        self.send_packet(stream, packet).await
    }

    async fn handle_subscribe_command(
        &mut self,
        stream: &mut Stream,
        topics: &[(String, QoS)],
        reply: oneshot::Sender<Result<Vec<SubscribeAck>, Error>>,
    ) -> Result<(), Error> {
        let mut subscribe_topics = Vec::with_capacity(topics.len());
        for (topic, qos) in topics {
            match SubscribeTopic::new(topic, *qos) {
                Ok(subscribe_topic) => subscribe_topics.push(subscribe_topic),
                Err(err) => {
                    let _ = reply.send(Err(Error::from(err)));
                    return Ok(());
                }
            }
        }
        let packet_id = match self.inflight.alloc_packet_id() {
            Ok(packet_id) => packet_id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return Ok(());
            }
        };
        let packet = match SubscribePacket::with_topics(packet_id, subscribe_topics) {
            Ok(packet) => packet,
            Err(err) => {
                let _ = reply.send(Err(Error::from(err)));
                return Ok(());
            }
        };
        self.inflight.push_subscribe(PendingSubscribe {
            packet: packet.clone(),
            notifier: Some(reply),
        });
        self.send_packet(stream, packet).await
    }

    async fn handle_unsubscribe_command(
        &mut self,
        stream: &mut Stream,
        topics: &[String],
        reply: oneshot::Sender<Result<(), Error>>,
    ) -> Result<(), Error> {
        let mut unsubscribe_topics = Vec::with_capacity(topics.len());
        for topic in topics {
            match SubTopic::new(topic) {
                Ok(unsubscribe_topic) => unsubscribe_topics.push(unsubscribe_topic),
                Err(err) => {
                    let _ = reply.send(Err(Error::from(err)));
                    return Ok(());
                }
            }
        }
        let packet_id = match self.inflight.alloc_packet_id() {
            Ok(packet_id) => packet_id,
            Err(err) => {
                let _ = reply.send(Err(err));
                return Ok(());
            }
        };
        let packet = match UnsubscribePacket::with_topics(packet_id, unsubscribe_topics) {
            Ok(packet) => packet,
            Err(err) => {
                let _ = reply.send(Err(Error::from(err)));
                return Ok(());
            }
        };
        self.inflight.push_unsubscribe(PendingUnsubscribe {
            packet: packet.clone(),
            notifier: Some(reply),
        });
        self.send_packet(stream, packet).await
    }

    async fn handle_packet(&mut self, stream: &mut Stream, packet: Packet) -> Result<(), Error> {
        match packet {
            Packet::Publish(publish) => self.handle_inbound_publish(stream, publish).await,
            Packet::PublishAck(ack) => {
                self.inflight.ack_publish(ack.packet_id());
                Ok(())
            }
            Packet::PublishReceived(received) => {
                if let Some(release) = self.inflight.receive_pubrec(received.packet_id()) {
                    self.send_packet(stream, release).await
                } else {
                    log::warn!(
                        "No QoS2 publish found for PublishReceived {}",
                        received.packet_id()
                    );
                    Ok(())
                }
            }
            Packet::PublishComplete(complete) => {
                self.inflight.complete_publish(complete.packet_id())
            }
            Packet::PublishRelease(release) => {
                let packet_id = release.packet_id();
                self.send_packet(stream, PublishCompletePacket::new(packet_id))
                    .await?;
                if let Some(held) = self.inflight.release_incoming(packet_id) {
                    self.handler.message(held.topic(), held.message());
                } else {
                    log::warn!("No held publish found for PublishRelease {packet_id}");
                }
                Ok(())
            }
            Packet::SubscribeAck(suback) => self.handle_suback(&suback),
            Packet::UnsubscribeAck(unsuback) => {
                self.handle_unsuback(unsuback.packet_id());
                Ok(())
            }
            Packet::PingResponse(_pong) => {
                self.ping_deadline = None;
                if let Some(sent_at) = self.ping_sent_at.take() {
                    let rtt = sent_at.elapsed();
                    log::debug!("PingResponse rtt: {rtt:?}");
                    let _ = self.event_tx.send(Event::PingResponse(rtt));
                }
                Ok(())
            }
            other => Err(Error::from_string(
                ErrorKind::ProtocolViolation,
                format!(
                    "Unexpected {:?} packet in connected state",
                    other.packet_type()
                ),
            )),
        }
    }

    /// Deliver an inbound publish according to its `QoS`.
    ///
    /// QoS 0: deliver. QoS 1: deliver, then acknowledge, so that a handler
    /// panic prevents the ack. QoS 2: hold until the server releases the
    /// message; acknowledge receipt either way.
    async fn handle_inbound_publish(
        &mut self,
        stream: &mut Stream,
        publish: PublishPacket,
    ) -> Result<(), Error> {
        match publish.qos() {
            QoS::AtMostOnce => {
                self.handler.message(publish.topic(), publish.message());
                Ok(())
            }
            QoS::AtLeastOnce => {
                let packet_id = publish.packet_id();
                self.handler.message(publish.topic(), publish.message());
                self.send_packet(stream, PublishAckPacket::new(packet_id))
                    .await
            }
            QoS::ExactOnce => {
                let packet_id = publish.packet_id();
                if !self.inflight.hold_incoming(publish) {
                    log::info!("Duplicate QoS2 publish {packet_id}, not delivered again");
                }
                self.send_packet(stream, PublishReceivedPacket::new(packet_id))
                    .await
            }
        }
    }

    fn handle_suback(&mut self, suback: &codec::v3::SubscribeAckPacket) -> Result<(), Error> {
        let Some(pending) = self.inflight.take_subscribe(suback.packet_id()) else {
            log::warn!("No pending subscribe found for {}", suback.packet_id());
            return Ok(());
        };

        let topics = pending.packet.topics();
        let acks = suback.acknowledgements();
        if topics.len() != acks.len() {
            return Err(Error::from_string(
                ErrorKind::ProtocolViolation,
                format!(
                    "SubscribeAck {} carries {} acks for {} filters",
                    suback.packet_id(),
                    acks.len(),
                    topics.len()
                ),
            ));
        }

        for (topic, ack) in topics.iter().zip(acks) {
            match ack {
                SubscribeAck::QoS(qos) => {
                    self.record_subscription(topic.topic(), *qos);
                    self.handler
                        .subscription(topic.topic(), SubscriptionStatus::Granted(*qos));
                }
                SubscribeAck::Failed => {
                    log::warn!("Subscription to `{}` failed", topic.topic());
                    self.handler
                        .subscription(topic.topic(), SubscriptionStatus::Rejected);
                }
            }
        }

        if let Some(notifier) = pending.notifier {
            let _ = notifier.send(Ok(acks.to_vec()));
        }
        Ok(())
    }

    fn handle_unsuback(&mut self, packet_id: codec::PacketId) {
        let Some(pending) = self.inflight.take_unsubscribe(packet_id) else {
            log::warn!("No pending unsubscribe found for {packet_id}");
            return;
        };
        for topic in pending.packet.topics() {
            self.subscriptions
                .retain(|(filter, _qos)| filter != topic.as_ref());
            self.handler
                .subscription(topic.as_ref(), SubscriptionStatus::Removed);
        }
        if let Some(notifier) = pending.notifier {
            let _ = notifier.send(Ok(()));
        }
    }

    /// A subscription to an already-known filter replaces the old grant.
    fn record_subscription(&mut self, filter: &str, qos: QoS) {
        if let Some(entry) = self
            .subscriptions
            .iter_mut()
            .find(|(known, _qos)| known == filter)
        {
            entry.1 = qos;
        } else {
            self.subscriptions.push((filter.to_string(), qos));
        }
    }

    /// Send the `subscriptions` configured in the options, right after the
    /// first accepted ConnectAck.
    async fn subscribe_initial(&mut self, stream: &mut Stream) -> Result<(), Error> {
        let topics: Vec<(String, QoS)> = self.options.subscriptions().to_vec();
        if topics.is_empty() {
            return Ok(());
        }
        self.send_engine_subscribe(stream, &topics).await
    }

    /// Restore granted subscriptions after the broker reported a fresh
    /// session on a resumed connect.
    async fn resubscribe_known(&mut self, stream: &mut Stream) -> Result<(), Error> {
        let topics = std::mem::take(&mut self.subscriptions);
        if topics.is_empty() {
            return Ok(());
        }
        log::info!("Restoring {} subscriptions", topics.len());
        self.send_engine_subscribe(stream, &topics).await
    }

    async fn send_engine_subscribe(
        &mut self,
        stream: &mut Stream,
        topics: &[(String, QoS)],
    ) -> Result<(), Error> {
        let mut subscribe_topics = Vec::with_capacity(topics.len());
        for (topic, qos) in topics {
            subscribe_topics.push(SubscribeTopic::new(topic, *qos)?);
        }
        let packet_id = self.inflight.alloc_packet_id()?;
        let packet = SubscribePacket::with_topics(packet_id, subscribe_topics)?;
        self.inflight.push_subscribe(PendingSubscribe {
            packet: packet.clone(),
            notifier: None,
        });
        self.send_packet(stream, packet).await
    }

    async fn handle_keepalive(&mut self, stream: &mut Stream) -> Result<(), Error> {
        let keep_alive = self.options.keep_alive();
        let now = Instant::now();
        if let Some(deadline) = self.ping_deadline {
            if now >= deadline {
                return Err(Error::new(
                    ErrorKind::Timeout,
                    "No PingResponse within keep alive interval",
                ));
            }
        } else if now >= self.last_write + keep_alive {
            log::debug!("Sending PingRequest");
            self.send_packet(stream, PingRequestPacket::new()).await?;
            self.ping_sent_at = Some(now);
            self.ping_deadline = Some(now + keep_alive);
        }
        Ok(())
    }

    fn next_keepalive_deadline(&self) -> Option<Instant> {
        if self.options.keep_alive().is_zero() {
            return None;
        }
        Some(
            self.ping_deadline
                .unwrap_or(self.last_write + self.options.keep_alive()),
        )
    }

    /// Clean-session flag for the next connect attempt.
    ///
    /// The first attempt honors the configured value. Reconnects resume the
    /// session with `clean_session=false`, unless clean was requested
    /// explicitly, which keeps every reconnect clean as well.
    fn clean_session_for_attempt(&self) -> bool {
        if self.first_connect || self.options.clean_session_explicit() {
            self.options.clean_session()
        } else {
            false
        }
    }

    fn build_connect(&self, clean_session: bool) -> Result<ConnectPacket, Error> {
        let mut packet = ConnectPacket::new(self.options.client_id())?;
        packet.set_clean_session(clean_session);
        #[allow(clippy::cast_possible_truncation)]
        packet.set_keep_alive(self.options.keep_alive().as_secs().min(u64::from(u16::MAX)) as u16);
        if let Some(will) = self.options.will() {
            packet.set_will(&will.topic, &will.message, will.qos, will.retain)?;
        }
        if let Some(username) = self.options.username() {
            packet.set_username(username)?;
        }
        if let Some(password) = self.options.password() {
            packet.set_password(password)?;
        }
        Ok(packet)
    }

    async fn send_packet<P: EncodePacket>(
        &mut self,
        stream: &mut Stream,
        packet: P,
    ) -> Result<(), Error> {
        let mut buf = Vec::new();
        packet.encode(&mut buf)?;
        stream.write_all(&buf).await?;
        self.last_write = Instant::now();
        Ok(())
    }

    fn connection_up(&mut self, stream: &Stream) {
        self.status = ClientStatus::Connected;
        log::info!("mqtt client `{}` connected", self.options.client_id());
        self.handler.connection(ConnectionStatus::Up);
        let _ = self.event_tx.send(Event::Status(ConnectionStatus::Up));

        let info = stream.connection_info();
        let _ = self.event_tx.send(Event::Connection(info.clone()));
        for waiting in self.waiting_connection.drain(..) {
            let _ = waiting.send(info.clone());
        }
        self.connection_info = Some(info);
    }

    fn connection_down(&mut self) {
        if matches!(
            self.status,
            ClientStatus::Connected | ClientStatus::Disconnecting
        ) {
            self.handler.connection(ConnectionStatus::Down);
            let _ = self.event_tx.send(Event::Status(ConnectionStatus::Down));
        }
        self.connection_info = None;
        self.status = ClientStatus::Backoff;
    }
}

/// Map an error to either a reconnectable session end or a fatal exit.
fn classify(err: Error) -> Result<SessionEnd, Error> {
    if is_transport_error(err.kind()) {
        Ok(SessionEnd::Lost(err))
    } else {
        Err(err)
    }
}

const fn is_transport_error(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::IoError
            | ErrorKind::Closed
            | ErrorKind::Timeout
            | ErrorKind::ConnectionRefused
            | ErrorKind::HostUnreachable
            | ErrorKind::NameResolutionFailed
    )
}

fn protocol_violation(expected: PacketType, got: PacketType) -> Error {
    Error::from_string(
        ErrorKind::ProtocolViolation,
        format!("Expected {expected:?}, got {got:?}"),
    )
}

/// Cut one complete packet off the front of `buf`.
///
/// Returns `None` while the buffer holds only part of a packet; the caller
/// keeps reading. Packets coalesced into one read are returned one by one.
fn try_frame(buf: &mut BytesMut) -> Result<Option<Packet>, DecodeError> {
    if buf.is_empty() {
        return Ok(None);
    }
    let mut ba = ByteArray::new(&buf[..]);
    let fixed_header = match FixedHeader::decode(&mut ba) {
        Ok(fixed_header) => fixed_header,
        // The length prefix itself is still incomplete.
        Err(DecodeError::PayloadTooShort) => return Ok(None),
        Err(err) => return Err(err),
    };
    let total = ba.offset() + fixed_header.remaining_length();
    if buf.len() < total {
        return Ok(None);
    }

    let frame = buf.split_to(total);
    let mut ba = ByteArray::new(&frame);
    Packet::decode(&mut ba).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::PacketId;

    fn encode<P: EncodePacket>(packet: &P) -> Vec<u8> {
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_try_frame_partial_packet() {
        let bytes = encode(&PublishAckPacket::new(PacketId::new(3)));
        let mut buf = BytesMut::new();

        // Feed the packet one byte at a time.
        for byte in &bytes[..bytes.len() - 1] {
            buf.extend_from_slice(&[*byte]);
            assert!(try_frame(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(&bytes[bytes.len() - 1..]);
        let packet = try_frame(&mut buf).unwrap().unwrap();
        assert_eq!(
            packet,
            Packet::PublishAck(PublishAckPacket::new(PacketId::new(3)))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_try_frame_coalesced_packets() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(&PublishAckPacket::new(PacketId::new(1))));
        buf.extend_from_slice(&encode(&PingRequestPacket::new()));

        let first = try_frame(&mut buf).unwrap().unwrap();
        assert_eq!(
            first,
            Packet::PublishAck(PublishAckPacket::new(PacketId::new(1)))
        );
        let second = try_frame(&mut buf).unwrap().unwrap();
        assert_eq!(second, Packet::PingRequest(PingRequestPacket::new()));
        assert!(try_frame(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_try_frame_rejects_garbage() {
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(try_frame(&mut buf).is_err());
    }

    #[test]
    fn test_try_frame_publish_with_payload() {
        let mut publish = PublishPacket::new("a/b", QoS::AtLeastOnce, b"payload").unwrap();
        publish.set_packet_id(PacketId::new(5));
        let bytes = encode(&publish);

        // Split in the middle of the payload.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&bytes[..6]);
        assert!(try_frame(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[6..]);
        let packet = try_frame(&mut buf).unwrap().unwrap();
        assert_eq!(packet, Packet::Publish(publish));
    }
}
