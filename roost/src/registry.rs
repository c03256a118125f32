// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use tokio::sync::broadcast;

use crate::error::{Error, ErrorKind};
use crate::event::Event;

/// Process-wide registry of running connections, keyed by client id.
///
/// Two live connections with the same client id in one process are
/// forbidden; registration happens when a client starts and the entry is
/// removed when its connection task exits.
#[derive(Clone)]
pub struct ClientHandle {
    events: broadcast::Sender<Event>,
}

impl ClientHandle {
    #[must_use]
    pub(crate) fn new(events: broadcast::Sender<Event>) -> Self {
        Self { events }
    }

    /// Subscribe to the event stream of this client.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }
}

fn registry() -> &'static Mutex<HashMap<String, ClientHandle>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, ClientHandle>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register a new live connection.
///
/// # Errors
///
/// Returns `DuplicateClientId` if a connection with this client id is
/// already registered.
pub(crate) fn register(client_id: &str, handle: ClientHandle) -> Result<(), Error> {
    let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
    if map.contains_key(client_id) {
        return Err(Error::from_string(
            ErrorKind::DuplicateClientId,
            format!("Client id `{client_id}` is already connected"),
        ));
    }
    map.insert(client_id.to_string(), handle);
    Ok(())
}

/// Remove a connection when its task exits.
pub(crate) fn deregister(client_id: &str) {
    let mut map = registry().lock().unwrap_or_else(PoisonError::into_inner);
    map.remove(client_id);
}

/// Look up a running connection by client id.
#[must_use]
pub fn lookup(client_id: &str) -> Option<ClientHandle> {
    let map = registry().lock().unwrap_or_else(PoisonError::into_inner);
    map.get(client_id).cloned()
}

/// Subscribe to the event stream of a running connection.
///
/// # Errors
///
/// Returns `UnknownConnection` if no connection with this client id is
/// registered.
pub fn subscribe_events(client_id: &str) -> Result<broadcast::Receiver<Event>, Error> {
    lookup(client_id).map(|handle| handle.events()).ok_or_else(|| {
        Error::from_string(
            ErrorKind::UnknownConnection,
            format!("No connection registered for client id `{client_id}`"),
        )
    })
}
