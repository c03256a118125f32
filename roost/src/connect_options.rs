// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::time::Duration;

use codec::utils::random_string;
use codec::QoS;

/// Generated self signed ca file with `openssl` or other tools.
#[derive(Clone, Debug)]
pub struct SelfSignedTls {
    /// Path to the root ca file in pem format.
    pub root_ca_pem: String,
}

#[derive(Clone, Debug)]
pub enum TlsType {
    /// Signed by a Root CA in the system trust set, like `Let's Encrypt`.
    CASigned,

    /// Generated self signed ca file with `openssl` or other tools.
    SelfSigned(SelfSignedTls),
}

#[derive(Clone, Debug)]
pub struct MqttConnect {}

#[derive(Clone, Debug)]
pub struct MqttsConnect {
    /// Server name sent in SNI and checked against the certificate.
    pub domain: String,
    pub tls_type: TlsType,
}

#[derive(Clone, Debug)]
pub enum ConnectType {
    Mqtt(MqttConnect),
    Mqtts(MqttsConnect),
}

/// Last will stored on the server and published by it when the connection
/// is closed abnormally.
#[derive(Clone, Debug)]
pub struct LastWill {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

#[derive(Clone, Debug)]
pub struct ConnectOptions {
    host: String,
    port: u16,
    connect_type: ConnectType,
    client_id: String,
    clean_session: bool,
    clean_session_explicit: bool,
    keep_alive: Duration,
    connect_timeout: Duration,
    connack_timeout: Duration,
    will: Option<LastWill>,
    username: Option<String>,
    password: Option<Vec<u8>>,
    subscriptions: Vec<(String, QoS)>,
    min_backoff: Duration,
    max_backoff: Duration,
    first_connect_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            connect_type: ConnectType::Mqtt(MqttConnect {}),
            client_id: random_string(8),
            clean_session: true,
            clean_session_explicit: false,
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            connack_timeout: Duration::from_secs(60),
            will: None,
            username: None,
            password: None,
            subscriptions: Vec::new(),
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            first_connect_delay: Duration::ZERO,
        }
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            ..Self::default()
        }
    }

    pub fn set_address(&mut self, host: &str, port: u16) -> &mut Self {
        self.host = host.to_string();
        self.port = port;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    pub fn set_connect_type(&mut self, connect_type: ConnectType) -> &mut Self {
        self.connect_type = connect_type;
        self
    }

    #[must_use]
    pub const fn connect_type(&self) -> &ConnectType {
        &self.connect_type
    }

    pub fn set_client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_id = client_id.to_string();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Update clean-session flag used on the first connect.
    ///
    /// Reconnects switch to `clean_session=false` so the server resumes
    /// the session, unless `true` was explicitly requested here, in which
    /// case every reconnect starts clean as well.
    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self.clean_session_explicit = true;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Returns true if the user called [`Self::set_clean_session`] rather
    /// than relying on the default.
    #[must_use]
    pub const fn clean_session_explicit(&self) -> bool {
        self.clean_session_explicit
    }

    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Update time to wait for a ConnectAck packet after the Connect packet
    /// was sent.
    pub fn set_connack_timeout(&mut self, connack_timeout: Duration) -> &mut Self {
        self.connack_timeout = connack_timeout;
        self
    }

    #[must_use]
    pub const fn connack_timeout(&self) -> Duration {
        self.connack_timeout
    }

    pub fn set_will(&mut self, will: LastWill) -> &mut Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<&LastWill> {
        self.will.as_ref()
    }

    pub fn set_username(&mut self, username: &str) -> &mut Self {
        self.username = Some(username.to_string());
        self
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_password(&mut self, password: &[u8]) -> &mut Self {
        self.password = Some(password.to_vec());
        self
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    /// Update topic filters subscribed right after the first ConnectAck.
    pub fn set_subscriptions(&mut self, subscriptions: &[(&str, QoS)]) -> &mut Self {
        self.subscriptions = subscriptions
            .iter()
            .map(|(topic, qos)| ((*topic).to_string(), *qos))
            .collect();
        self
    }

    #[must_use]
    pub fn subscriptions(&self) -> &[(String, QoS)] {
        &self.subscriptions
    }

    /// Update reconnect backoff interval range.
    pub fn set_backoff(&mut self, min_interval: Duration, max_interval: Duration) -> &mut Self {
        self.min_backoff = min_interval;
        self.max_backoff = max_interval;
        self
    }

    #[must_use]
    pub const fn min_backoff(&self) -> Duration {
        self.min_backoff
    }

    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Update delay applied before the very first connect attempt, used to
    /// stagger startup of client fleets.
    pub fn set_first_connect_delay(&mut self, delay: Duration) -> &mut Self {
        self.first_connect_delay = delay;
        self
    }

    #[must_use]
    pub const fn first_connect_delay(&self) -> Duration {
        self.first_connect_delay
    }
}
