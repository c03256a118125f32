// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

#![allow(dead_code)]

use std::time::Duration;

use bytes::BytesMut;
use codec::v3::Packet;
use codec::{ByteArray, DecodeError, DecodePacket, EncodePacket, FixedHeader};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Packet kinds a scripted broker can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Connect,
    Publish,
    PublishAck,
    PublishReceived,
    PublishRelease,
    PublishComplete,
    Subscribe,
    Unsubscribe,
    PingRequest,
    Disconnect,
}

fn kind_of(packet: &Packet) -> Option<Kind> {
    match packet {
        Packet::Connect(_) => Some(Kind::Connect),
        Packet::Publish(_) => Some(Kind::Publish),
        Packet::PublishAck(_) => Some(Kind::PublishAck),
        Packet::PublishReceived(_) => Some(Kind::PublishReceived),
        Packet::PublishRelease(_) => Some(Kind::PublishRelease),
        Packet::PublishComplete(_) => Some(Kind::PublishComplete),
        Packet::Subscribe(_) => Some(Kind::Subscribe),
        Packet::Unsubscribe(_) => Some(Kind::Unsubscribe),
        Packet::PingRequest(_) => Some(Kind::PingRequest),
        Packet::Disconnect(_) => Some(Kind::Disconnect),
        _ => None,
    }
}

/// One step of a scripted connection.
pub enum Action {
    /// Read one packet, assert its kind and forward it to the test.
    Expect(Kind),

    /// Write one packet to the client.
    Send(Packet),

    /// Close the socket.
    Close,
}

/// Script for one accepted connection.
pub enum Session {
    /// Play the listed actions, then keep the socket open until the client
    /// closes it.
    Serve(Vec<Action>),

    /// Accept and immediately drop the socket, simulating a server that is
    /// not ready to talk yet.
    Refuse,
}

/// A broker double that plays back a fixed script, one [`Session`] per
/// accepted connection. Every packet read from the client is forwarded to
/// the test in wire order.
pub struct Broker {
    pub port: u16,
    received: mpsc::UnboundedReceiver<Packet>,
}

impl Broker {
    pub async fn start(script: Vec<Session>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            for session in script {
                let (mut socket, _peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(err) => panic!("broker: accept failed: {err}"),
                };
                match session {
                    Session::Refuse => drop(socket),
                    Session::Serve(actions) => {
                        run_connection(&mut socket, actions, &tx).await;
                    }
                }
            }
        });

        Self { port, received: rx }
    }

    /// Next packet the broker read from the client.
    pub async fn expect_received(&mut self) -> Packet {
        timeout(Duration::from_secs(10), self.received.recv())
            .await
            .expect("broker: timed out waiting for a packet")
            .expect("broker: script finished early")
    }

    /// Returns true if the broker read no further packet.
    pub fn no_more_received(&mut self) -> bool {
        self.received.try_recv().is_err()
    }
}

async fn run_connection(
    socket: &mut TcpStream,
    actions: Vec<Action>,
    tx: &mpsc::UnboundedSender<Packet>,
) {
    let mut buf = BytesMut::new();
    for action in actions {
        match action {
            Action::Expect(kind) => {
                let packet = read_packet(socket, &mut buf).await;
                assert_eq!(
                    kind_of(&packet),
                    Some(kind),
                    "broker: unexpected packet {packet:?}"
                );
                tx.send(packet).unwrap();
            }
            Action::Send(packet) => {
                let mut bytes = Vec::new();
                packet.encode(&mut bytes).unwrap();
                socket.write_all(&bytes).await.unwrap();
            }
            Action::Close => {
                let _ = socket.shutdown().await;
                return;
            }
        }
    }

    // Script done; hold the socket open until the client hangs up.
    let mut sink = [0_u8; 256];
    loop {
        match socket.read(&mut sink).await {
            Ok(0) | Err(_) => return,
            Ok(_n) => (),
        }
    }
}

async fn read_packet(socket: &mut TcpStream, buf: &mut BytesMut) -> Packet {
    loop {
        if let Some(packet) = try_frame(buf) {
            return packet;
        }
        let n = timeout(Duration::from_secs(10), socket.read_buf(buf))
            .await
            .expect("broker: timed out reading")
            .expect("broker: read failed");
        assert!(n > 0, "broker: client closed mid-script");
    }
}

fn try_frame(buf: &mut BytesMut) -> Option<Packet> {
    if buf.is_empty() {
        return None;
    }
    let mut ba = ByteArray::new(&buf[..]);
    let fixed_header = match FixedHeader::decode(&mut ba) {
        Ok(fixed_header) => fixed_header,
        Err(DecodeError::PayloadTooShort) => return None,
        Err(err) => panic!("broker: invalid packet header: {err:?}"),
    };
    let total = ba.offset() + fixed_header.remaining_length();
    if buf.len() < total {
        return None;
    }
    let frame = buf.split_to(total);
    let mut ba = ByteArray::new(&frame);
    Some(Packet::decode(&mut ba).expect("broker: invalid packet"))
}

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
