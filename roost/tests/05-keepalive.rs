// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use codec::v3::{ConnectAckPacket, ConnectReturnCode, Packet, PingResponsePacket};
use roost::{AsyncClient, ConnectOptions, Event};
use tokio::time::timeout;

mod common;
use common::{init_logging, Action, Broker, Kind, Session};

#[tokio::test]
async fn test_ping_exchange_and_rtt_event() {
    init_logging();
    let mut broker = Broker::start(vec![Session::Serve(vec![
        Action::Expect(Kind::Connect),
        Action::Send(Packet::ConnectAck(ConnectAckPacket::new(
            false,
            ConnectReturnCode::Accepted,
        ))),
        Action::Expect(Kind::PingRequest),
        Action::Send(Packet::PingResponse(PingResponsePacket::new())),
        Action::Expect(Kind::Disconnect),
    ])])
    .await;

    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options
        .set_client_id("t-keepalive")
        .set_keep_alive(Duration::from_secs(1));
    let client = AsyncClient::new(options, Box::new(())).unwrap();
    let mut events = client.events();

    // The keep alive interval went out in the Connect packet.
    match broker.expect_received().await {
        Packet::Connect(connect) => assert_eq!(connect.keep_alive(), 1),
        other => panic!("expected Connect, got {other:?}"),
    }

    // One idle interval later the client pings on its own.
    match broker.expect_received().await {
        Packet::PingRequest(_ping) => (),
        other => panic!("expected PingRequest, got {other:?}"),
    }

    let rtt = loop {
        let event = timeout(Duration::from_secs(10), events.recv())
            .await
            .expect("timed out waiting for the ping response event")
            .unwrap();
        if let Event::PingResponse(rtt) = event {
            break rtt;
        }
    };
    assert!(rtt < Duration::from_secs(5));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_missing_ping_response_drops_connection() {
    init_logging();
    let mut broker = Broker::start(vec![
        // A server that never answers pings.
        Session::Serve(vec![
            Action::Expect(Kind::Connect),
            Action::Send(Packet::ConnectAck(ConnectAckPacket::new(
                false,
                ConnectReturnCode::Accepted,
            ))),
            Action::Expect(Kind::PingRequest),
        ]),
        Session::Serve(vec![
            Action::Expect(Kind::Connect),
            Action::Send(Packet::ConnectAck(ConnectAckPacket::new(
                true,
                ConnectReturnCode::Accepted,
            ))),
            Action::Expect(Kind::Disconnect),
        ]),
    ])
    .await;

    let mut options = ConnectOptions::new("127.0.0.1", broker.port);
    options
        .set_client_id("t-deadpeer")
        .set_keep_alive(Duration::from_secs(1))
        .set_backoff(Duration::from_millis(10), Duration::from_millis(50));
    let client = AsyncClient::new(options, Box::new(())).unwrap();

    match broker.expect_received().await {
        Packet::Connect(_connect) => (),
        other => panic!("expected Connect, got {other:?}"),
    }
    match broker.expect_received().await {
        Packet::PingRequest(_ping) => (),
        other => panic!("expected PingRequest, got {other:?}"),
    }

    // The silent connection is torn down and re-established.
    match timeout(Duration::from_secs(10), broker.expect_received()).await {
        Ok(Packet::Connect(connect)) => assert!(!connect.clean_session()),
        Ok(other) => panic!("expected Connect, got {other:?}"),
        Err(_elapsed) => panic!("client never reconnected"),
    }
    // Wait until the second handshake finished before shutting down, so
    // the Disconnect packet goes out over the new session.
    client.connection(Duration::from_secs(5)).await.unwrap();

    client.disconnect().await.unwrap();
}
