// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use bytes::BytesMut;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::timeout;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;

use crate::connect_options::{ConnectOptions, ConnectType, MqttsConnect, TlsType};
use crate::error::{Error, ErrorKind};
use crate::event::{ConnectionInfo, TransportKind};

/// Each Stream represents a duplex byte connection to the server.
#[derive(Debug)]
pub enum Stream {
    Tcp(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),

    /// In-process pipe implementing the same interface, used as a test
    /// transport.
    Duplex(DuplexStream),
}

impl Stream {
    /// Establish a transport connection described by `options`.
    ///
    /// # Errors
    ///
    /// Returns error if name resolution, the TCP connect or the TLS
    /// handshake fails.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, Error> {
        let address = (options.host(), options.port());
        let mut addrs = lookup_host(address).await.map_err(|err| {
            Error::from_string(
                ErrorKind::NameResolutionFailed,
                format!("Failed to resolve {}: {err}", options.host()),
            )
        })?;
        let Some(addr) = addrs.next() else {
            return Err(Error::from_string(
                ErrorKind::NameResolutionFailed,
                format!("No address found for {}", options.host()),
            ));
        };

        let tcp_stream = match timeout(options.connect_timeout(), TcpStream::connect(addr)).await
        {
            Ok(ret) => ret.map_err(Error::from)?,
            Err(_elapsed) => {
                return Err(Error::from_string(
                    ErrorKind::Timeout,
                    format!("Timed out connecting to {addr}"),
                ));
            }
        };

        match options.connect_type() {
            ConnectType::Mqtt(_) => Ok(Self::Tcp(tcp_stream)),
            ConnectType::Mqtts(mqtts_connect) => Self::tls_handshake(tcp_stream, mqtts_connect).await,
        }
    }

    async fn tls_handshake(
        tcp_stream: TcpStream,
        mqtts_connect: &MqttsConnect,
    ) -> Result<Self, Error> {
        let mut root_store = RootCertStore::empty();
        match &mqtts_connect.tls_type {
            TlsType::CASigned => {
                root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                    OwnedTrustAnchor::from_subject_spki_name_constraints(
                        ta.subject,
                        ta.spki,
                        ta.name_constraints,
                    )
                }));
            }
            TlsType::SelfSigned(self_signed) => {
                let root_ca_fd = File::open(&self_signed.root_ca_pem).map_err(|err| {
                    Error::from_string(
                        ErrorKind::CertError,
                        format!("Failed to open {}: {err}", self_signed.root_ca_pem),
                    )
                })?;
                let mut root_ca_buf = BufReader::new(root_ca_fd);
                let certs = rustls_pemfile::certs(&mut root_ca_buf).map_err(|err| {
                    Error::from_string(ErrorKind::CertError, format!("Invalid pem file: {err}"))
                })?;
                for cert in certs {
                    root_store.add(&rustls::Certificate(cert)).map_err(|err| {
                        Error::from_string(
                            ErrorKind::CertError,
                            format!("Invalid root cert: {err}"),
                        )
                    })?;
                }
            }
        }

        let config = rustls::ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(mqtts_connect.domain.as_str()).map_err(|err| {
            Error::from_string(
                ErrorKind::CertError,
                format!("Invalid server name {}: {err}", mqtts_connect.domain),
            )
        })?;

        let tls_stream = connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|err| {
                Error::from_string(ErrorKind::TlsError, format!("TLS handshake failed: {err}"))
            })?;
        Ok(Self::Tls(Box::new(tls_stream)))
    }

    /// Read from stream into `buf`.
    ///
    /// Returns number of bytes read; zero means the peer closed the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns error if stream/socket gets error.
    pub async fn read_buf(&mut self, buf: &mut BytesMut) -> Result<usize, Error> {
        match self {
            Self::Tcp(tcp_stream) => Ok(tcp_stream.read_buf(buf).await?),
            Self::Tls(tls_stream) => Ok(tls_stream.read_buf(buf).await?),
            Self::Duplex(pipe) => Ok(pipe.read_buf(buf).await?),
        }
    }

    /// Write whole buffer to stream.
    ///
    /// # Errors
    ///
    /// Returns error if socket/stream gets error.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self {
            Self::Tcp(tcp_stream) => Ok(tcp_stream.write_all(buf).await?),
            Self::Tls(tls_stream) => Ok(tls_stream.write_all(buf).await?),
            Self::Duplex(pipe) => Ok(pipe.write_all(buf).await?),
        }
    }

    /// Shut down the write side of the stream.
    pub async fn shutdown(&mut self) {
        let ret = match self {
            Self::Tcp(tcp_stream) => tcp_stream.shutdown().await,
            Self::Tls(tls_stream) => tls_stream.shutdown().await,
            Self::Duplex(pipe) => pipe.shutdown().await,
        };
        if let Err(err) = ret {
            log::warn!("stream: shutdown error: {err}");
        }
    }

    /// Get coordinates of this connection.
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        match self {
            Self::Tcp(tcp_stream) => ConnectionInfo {
                transport: TransportKind::Tcp,
                local_addr: tcp_stream.local_addr().ok(),
                peer_addr: tcp_stream.peer_addr().ok(),
            },
            Self::Tls(tls_stream) => {
                let (tcp_stream, _conn) = tls_stream.get_ref();
                ConnectionInfo {
                    transport: TransportKind::Tls,
                    local_addr: tcp_stream.local_addr().ok(),
                    peer_addr: tcp_stream.peer_addr().ok(),
                }
            }
            Self::Duplex(_pipe) => ConnectionInfo {
                transport: TransportKind::InMemory,
                local_addr: None,
                peer_addr: None,
            },
        }
    }
}
