// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use codec::v3::{
    ConnectAckPacket, ConnectReturnCode, Packet, PublishAckPacket, PublishCompletePacket,
    PublishPacket, PublishReceivedPacket, PublishReleasePacket,
};
use codec::{PacketId, QoS};
use roost::{AsyncClient, ConnectOptions, Handler};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

mod common;
use common::{init_logging, Action, Broker, Kind, Session};

struct MessageRecorder {
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
}

impl Handler for MessageRecorder {
    fn message(&mut self, topic: &str, payload: &[u8]) {
        let _ = self.tx.send((topic.to_string(), payload.to_vec()));
    }
}

fn accepted(session_present: bool) -> Action {
    Action::Send(Packet::ConnectAck(ConnectAckPacket::new(
        session_present,
        ConnectReturnCode::Accepted,
    )))
}

#[tokio::test]
async fn test_publish_qos0() {
    init_logging();
    let mut broker = Broker::start(vec![Session::Serve(vec![
        Action::Expect(Kind::Connect),
        accepted(false),
        Action::Expect(Kind::Publish),
        Action::Expect(Kind::Disconnect),
    ])])
    .await;

    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options.set_client_id("t-pub0");
    let client = AsyncClient::new(options, Box::new(())).unwrap();

    client
        .publish("metrics/load", QoS::AtMostOnce, b"0.42", false)
        .await
        .unwrap();

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::Publish(publish) => {
            assert_eq!(publish.topic(), "metrics/load");
            assert_eq!(publish.qos(), QoS::AtMostOnce);
            assert_eq!(publish.message(), b"0.42");
            assert!(!publish.dup());
        }
        other => panic!("expected Publish, got {other:?}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_publish_qos1_resolves_on_ack() {
    init_logging();
    let mut broker = Broker::start(vec![Session::Serve(vec![
        Action::Expect(Kind::Connect),
        accepted(false),
        Action::Expect(Kind::Publish),
        Action::Send(Packet::PublishAck(PublishAckPacket::new(PacketId::new(1)))),
        Action::Expect(Kind::Disconnect),
    ])])
    .await;

    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options.set_client_id("t-pub1");
    let client = AsyncClient::new(options, Box::new(())).unwrap();

    timeout(
        Duration::from_secs(10),
        client.publish("jobs/done", QoS::AtLeastOnce, b"1", false),
    )
    .await
    .expect("publish must resolve once the PublishAck arrives")
    .unwrap();

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::Publish(publish) => {
            assert_eq!(publish.packet_id(), PacketId::new(1));
            assert_eq!(publish.qos(), QoS::AtLeastOnce);
        }
        other => panic!("expected Publish, got {other:?}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_publish_qos2_full_exchange() {
    init_logging();
    let mut broker = Broker::start(vec![Session::Serve(vec![
        Action::Expect(Kind::Connect),
        accepted(false),
        Action::Expect(Kind::Publish),
        Action::Send(Packet::PublishReceived(PublishReceivedPacket::new(
            PacketId::new(1),
        ))),
        Action::Expect(Kind::PublishRelease),
        Action::Send(Packet::PublishComplete(PublishCompletePacket::new(
            PacketId::new(1),
        ))),
        Action::Expect(Kind::Disconnect),
    ])])
    .await;

    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options.set_client_id("t-pub2");
    let client = AsyncClient::new(options, Box::new(())).unwrap();

    timeout(
        Duration::from_secs(10),
        client.publish("exact/once", QoS::ExactOnce, b"2", false),
    )
    .await
    .expect("publish must resolve once the PublishComplete arrives")
    .unwrap();

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::Publish(publish) => assert_eq!(publish.qos(), QoS::ExactOnce),
        other => panic!("expected Publish, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::PublishRelease(release) => {
            assert_eq!(release.packet_id(), PacketId::new(1));
        }
        other => panic!("expected PublishRelease, got {other:?}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_unacked_publish_replayed_with_dup() {
    init_logging();
    let mut broker = Broker::start(vec![
        // The connection dies before the PublishAck is sent.
        Session::Serve(vec![
            Action::Expect(Kind::Connect),
            accepted(false),
            Action::Expect(Kind::Publish),
            Action::Close,
        ]),
        Session::Serve(vec![
            Action::Expect(Kind::Connect),
            accepted(true),
            Action::Expect(Kind::Publish),
            Action::Send(Packet::PublishAck(PublishAckPacket::new(PacketId::new(1)))),
            Action::Expect(Kind::Disconnect),
        ]),
    ])
    .await;

    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options
        .set_client_id("t-replay")
        .set_backoff(Duration::from_millis(10), Duration::from_millis(50));
    let client = AsyncClient::new(options, Box::new(())).unwrap();

    // The publish handle resolves only after the reconnect delivered the
    // re-sent packet and its ack arrived.
    timeout(
        Duration::from_secs(10),
        client.publish("replayed", QoS::AtLeastOnce, b"x", false),
    )
    .await
    .expect("publish must survive the reconnect")
    .unwrap();

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    let first_id = match broker.expect_received().await {
        Packet::Publish(publish) => {
            assert!(!publish.dup());
            publish.packet_id()
        }
        other => panic!("expected Publish, got {other:?}"),
    };
    match broker.expect_received().await {
        Packet::Connect(connect) => assert!(!connect.clean_session()),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::Publish(publish) => {
            assert!(publish.dup());
            assert_eq!(publish.packet_id(), first_id);
        }
        other => panic!("expected Publish, got {other:?}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_inbound_qos1_delivered_then_acked() {
    init_logging();
    let mut publish = PublishPacket::new("in/light", QoS::AtLeastOnce, b"on").unwrap();
    publish.set_packet_id(PacketId::new(9));

    let mut broker = Broker::start(vec![Session::Serve(vec![
        Action::Expect(Kind::Connect),
        accepted(false),
        Action::Send(Packet::Publish(publish)),
        Action::Expect(Kind::PublishAck),
        Action::Expect(Kind::Disconnect),
    ])])
    .await;

    let (tx, mut messages) = mpsc::unbounded_channel();
    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options.set_client_id("t-in1");
    let client = AsyncClient::new(options, Box::new(MessageRecorder { tx })).unwrap();

    let (topic, payload) = timeout(Duration::from_secs(10), messages.recv())
        .await
        .expect("timed out waiting for delivery")
        .unwrap();
    assert_eq!(topic, "in/light");
    assert_eq!(payload, b"on");

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::PublishAck(ack) => assert_eq!(ack.packet_id(), PacketId::new(9)),
        other => panic!("expected PublishAck, got {other:?}"),
    }

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_inbound_qos2_delivered_exactly_once() {
    init_logging();
    let mut publish = PublishPacket::new("in/meter", QoS::ExactOnce, b"7").unwrap();
    publish.set_packet_id(PacketId::new(5));
    let mut duplicate = publish.clone();
    duplicate.set_dup(true).unwrap();

    let mut broker = Broker::start(vec![Session::Serve(vec![
        Action::Expect(Kind::Connect),
        accepted(false),
        Action::Send(Packet::Publish(publish)),
        Action::Expect(Kind::PublishReceived),
        // The server re-sends before releasing; no second delivery.
        Action::Send(Packet::Publish(duplicate)),
        Action::Expect(Kind::PublishReceived),
        Action::Send(Packet::PublishRelease(PublishReleasePacket::new(
            PacketId::new(5),
        ))),
        Action::Expect(Kind::PublishComplete),
        Action::Expect(Kind::Disconnect),
    ])])
    .await;

    let (tx, mut messages) = mpsc::unbounded_channel();
    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options.set_client_id("t-in2");
    let client = AsyncClient::new(options, Box::new(MessageRecorder { tx })).unwrap();

    let (topic, payload) = timeout(Duration::from_secs(10), messages.recv())
        .await
        .expect("timed out waiting for delivery")
        .unwrap();
    assert_eq!(topic, "in/meter");
    assert_eq!(payload, b"7");

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::PublishReceived(received) => {
            assert_eq!(received.packet_id(), PacketId::new(5));
        }
        other => panic!("expected PublishReceived, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::PublishReceived(_received) => (),
        other => panic!("expected PublishReceived, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::PublishComplete(complete) => {
            assert_eq!(complete.packet_id(), PacketId::new(5));
        }
        other => panic!("expected PublishComplete, got {other:?}"),
    }

    // No second delivery for the duplicate.
    sleep(Duration::from_millis(100)).await;
    assert!(messages.try_recv().is_err());

    client.disconnect().await.unwrap();
}
