// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::collections::HashMap;

use codec::v3::{
    Packet, PublishPacket, PublishReleasePacket, SubscribeAck, SubscribePacket, UnsubscribePacket,
};
use codec::{PacketId, QoS};
use tokio::sync::oneshot;

use crate::error::{Error, ErrorKind};

/// A Subscribe packet waiting for its SubscribeAck.
pub(crate) struct PendingSubscribe {
    pub packet: SubscribePacket,

    /// Resolves the caller waiting on this exchange; absent for
    /// engine-initiated subscriptions.
    pub notifier: Option<oneshot::Sender<Result<Vec<SubscribeAck>, Error>>>,
}

/// An Unsubscribe packet waiting for its UnsubscribeAck.
pub(crate) struct PendingUnsubscribe {
    pub packet: UnsubscribePacket,
    pub notifier: Option<oneshot::Sender<Result<(), Error>>>,
}

/// Delivery stage of an outbound QoS 1/2 publish.
///
/// QoS 1: `Published -> (PublishAck) -> done`.
/// QoS 2: `Published -> (PublishReceived) -> Released -> (PublishComplete) -> done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishStage {
    /// Publish packet was sent, terminal ack still missing.
    Published,

    /// PublishReceived arrived and PublishRelease was sent.
    Released,
}

struct OutboundPublish {
    packet: PublishPacket,
    stage: PublishStage,
    notifier: Option<oneshot::Sender<Result<(), Error>>>,
}

/// Per-session bookkeeping of every exchange that has not reached its
/// terminal packet yet.
///
/// Outbound publishes are kept in submission order; replay after a resumed
/// session re-sends them in exactly that order.
pub(crate) struct Inflight {
    next_packet_id: u16,
    outbound: Vec<OutboundPublish>,
    subscribing: HashMap<PacketId, PendingSubscribe>,
    unsubscribing: HashMap<PacketId, PendingUnsubscribe>,

    /// Inbound QoS 2 publishes held back until the server releases them.
    incoming: HashMap<PacketId, PublishPacket>,
}

impl Inflight {
    pub fn new() -> Self {
        Self {
            next_packet_id: 1,
            outbound: Vec::new(),
            subscribing: HashMap::new(),
            unsubscribing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    /// Allocate the next free packet id.
    ///
    /// Ids wrap at 0xffff, skip zero and skip ids still occupied by a
    /// pending exchange.
    ///
    /// # Errors
    ///
    /// Returns `PacketIdExhausted` if every id is occupied.
    pub fn alloc_packet_id(&mut self) -> Result<PacketId, Error> {
        for _ in 0..u16::MAX {
            let candidate = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.wrapping_add(1);
            if self.next_packet_id == 0 {
                self.next_packet_id = 1;
            }
            let candidate = PacketId::new(candidate);
            if candidate.value() != 0 && !self.is_in_use(candidate) {
                return Ok(candidate);
            }
        }
        Err(Error::new(
            ErrorKind::PacketIdExhausted,
            "All packet identifiers are in flight",
        ))
    }

    fn is_in_use(&self, packet_id: PacketId) -> bool {
        self.subscribing.contains_key(&packet_id)
            || self.unsubscribing.contains_key(&packet_id)
            || self
                .outbound
                .iter()
                .any(|outbound| outbound.packet.packet_id() == packet_id)
    }

    /// Number of outbound publishes without a terminal ack.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Track an outbound QoS 1/2 publish. The packet id must be set.
    pub fn push_publish(
        &mut self,
        packet: PublishPacket,
        notifier: Option<oneshot::Sender<Result<(), Error>>>,
    ) {
        debug_assert!(packet.qos() != QoS::AtMostOnce);
        self.outbound.push(OutboundPublish {
            packet,
            stage: PublishStage::Published,
            notifier,
        });
    }

    /// Handle PublishAck for an outbound QoS 1 publish.
    pub fn ack_publish(&mut self, packet_id: PacketId) {
        let index = self.outbound.iter().position(|outbound| {
            outbound.packet.packet_id() == packet_id && outbound.packet.qos() == QoS::AtLeastOnce
        });
        if let Some(index) = index {
            let outbound = self.outbound.remove(index);
            log::info!("Topic `{}` publish confirmed", outbound.packet.topic());
            if let Some(notifier) = outbound.notifier {
                let _ = notifier.send(Ok(()));
            }
        } else {
            log::warn!("inflight: no QoS1 publish found for PublishAck {packet_id}");
        }
    }

    /// Handle PublishReceived for an outbound QoS 2 publish.
    ///
    /// Returns the PublishRelease packet to send, or None if the id is
    /// unknown.
    pub fn receive_pubrec(&mut self, packet_id: PacketId) -> Option<PublishReleasePacket> {
        let outbound = self.outbound.iter_mut().find(|outbound| {
            outbound.packet.packet_id() == packet_id && outbound.packet.qos() == QoS::ExactOnce
        })?;
        if outbound.stage == PublishStage::Released {
            // Duplicate PublishReceived; answer with PublishRelease again.
            return Some(PublishReleasePacket::new(packet_id));
        }
        outbound.stage = PublishStage::Released;
        Some(PublishReleasePacket::new(packet_id))
    }

    /// Handle PublishComplete for an outbound QoS 2 publish.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if PublishComplete arrives for a publish
    /// whose PublishReceived was never seen.
    pub fn complete_publish(&mut self, packet_id: PacketId) -> Result<(), Error> {
        let index = self.outbound.iter().position(|outbound| {
            outbound.packet.packet_id() == packet_id && outbound.packet.qos() == QoS::ExactOnce
        });
        let Some(index) = index else {
            log::warn!("inflight: no QoS2 publish found for PublishComplete {packet_id}");
            return Ok(());
        };
        if self.outbound[index].stage != PublishStage::Released {
            return Err(Error::from_string(
                ErrorKind::ProtocolViolation,
                format!("PublishComplete {packet_id} not preceded by PublishReceived"),
            ));
        }
        let outbound = self.outbound.remove(index);
        log::info!("Topic `{}` publish completed", outbound.packet.topic());
        if let Some(notifier) = outbound.notifier {
            let _ = notifier.send(Ok(()));
        }
        Ok(())
    }

    pub fn push_subscribe(&mut self, pending: PendingSubscribe) {
        self.subscribing.insert(pending.packet.packet_id(), pending);
    }

    pub fn take_subscribe(&mut self, packet_id: PacketId) -> Option<PendingSubscribe> {
        self.subscribing.remove(&packet_id)
    }

    pub fn push_unsubscribe(&mut self, pending: PendingUnsubscribe) {
        self.unsubscribing
            .insert(pending.packet.packet_id(), pending);
    }

    pub fn take_unsubscribe(&mut self, packet_id: PacketId) -> Option<PendingUnsubscribe> {
        self.unsubscribing.remove(&packet_id)
    }

    /// Hold an inbound QoS 2 publish until the server releases it.
    ///
    /// Returns false if this id is already held, which happens when the
    /// server re-sends the publish before the exchange finished. The held
    /// copy stays authoritative, so the message is delivered only once.
    pub fn hold_incoming(&mut self, packet: PublishPacket) -> bool {
        let packet_id = packet.packet_id();
        if self.incoming.contains_key(&packet_id) {
            return false;
        }
        self.incoming.insert(packet_id, packet);
        true
    }

    /// Release an inbound QoS 2 publish for delivery.
    pub fn release_incoming(&mut self, packet_id: PacketId) -> Option<PublishPacket> {
        self.incoming.remove(&packet_id)
    }

    /// Packets to re-send after a session was resumed.
    ///
    /// Publishes without a terminal ack are re-sent in submission order with
    /// the dup flag set; publishes past the PublishReceived stage re-send
    /// their PublishRelease instead. Pending subscribe/unsubscribe requests
    /// are repeated afterwards, ordered by packet id.
    pub fn replay(&self) -> Vec<Packet> {
        let mut packets = Vec::new();
        for outbound in &self.outbound {
            match outbound.stage {
                PublishStage::Published => {
                    let mut packet = outbound.packet.clone();
                    if let Err(err) = packet.set_dup(true) {
                        log::error!("inflight: failed to set dup flag: {err:?}");
                    }
                    packets.push(Packet::Publish(packet));
                }
                PublishStage::Released => {
                    packets.push(Packet::PublishRelease(PublishReleasePacket::new(
                        outbound.packet.packet_id(),
                    )));
                }
            }
        }

        let mut subscribes: Vec<&PendingSubscribe> = self.subscribing.values().collect();
        subscribes.sort_by_key(|pending| pending.packet.packet_id());
        for pending in subscribes {
            packets.push(Packet::Subscribe(pending.packet.clone()));
        }

        let mut unsubscribes: Vec<&PendingUnsubscribe> = self.unsubscribing.values().collect();
        unsubscribes.sort_by_key(|pending| pending.packet.packet_id());
        for pending in unsubscribes {
            packets.push(Packet::Unsubscribe(pending.packet.clone()));
        }

        packets
    }

    /// Drop all session state, failing every pending exchange.
    ///
    /// Used before a clean-session connect discards the server-side session.
    pub fn clear(&mut self) {
        for outbound in self.outbound.drain(..) {
            if let Some(notifier) = outbound.notifier {
                let _ = notifier.send(Err(Error::new(
                    ErrorKind::Closed,
                    "Session state discarded by clean session",
                )));
            }
        }
        for (_id, pending) in self.subscribing.drain() {
            if let Some(notifier) = pending.notifier {
                let _ = notifier.send(Err(Error::new(
                    ErrorKind::Closed,
                    "Session state discarded by clean session",
                )));
            }
        }
        for (_id, pending) in self.unsubscribing.drain() {
            if let Some(notifier) = pending.notifier {
                let _ = notifier.send(Err(Error::new(
                    ErrorKind::Closed,
                    "Session state discarded by clean session",
                )));
            }
        }
        self.incoming.clear();
    }
}
