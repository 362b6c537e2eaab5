//! Session facade.
//!
//! The sync engine never looks up the connection ambiently; it is handed a
//! [`SessionLink`] and talks to the server only through it.

use std::sync::Arc;

use cowatch_core::{Error, InboundMessage, OutboundMessage, Result, SyncPermission};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Capacity of the inbound event fan-out.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened on the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Message(InboundMessage),
}

/// What the sync engine needs from the session.
pub trait SessionLink: Send + Sync {
    /// Queue a message for the server.
    fn send(&self, message: OutboundMessage) -> Result<()>;

    /// Rights of the local participant as last announced by the server.
    fn current_permissions(&self) -> SyncPermission;

    /// Receive connection changes and inbound messages.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

#[derive(Debug, Default)]
struct SessionState {
    permission: SyncPermission,
    proxy_enabled: bool,
}

/// An in-process session with an explicit connect/disconnect lifecycle.
///
/// Outgoing messages land on the receiver returned by [`LocalSession::new`];
/// inbound frames are injected with [`LocalSession::deliver`].
pub struct LocalSession {
    state: RwLock<SessionState>,
    outgoing: mpsc::UnboundedSender<OutboundMessage>,
    events: broadcast::Sender<SessionEvent>,
}

impl LocalSession {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let session = Arc::new(Self {
            state: RwLock::new(SessionState::default()),
            outgoing,
            events,
        });
        (session, outgoing_rx)
    }

    pub fn connect(&self) {
        self.state.write().permission.is_connected = true;
        info!("Session connected");
        let _ = self.events.send(SessionEvent::Connected);
    }

    pub fn disconnect(&self) {
        self.state.write().permission.is_connected = false;
        info!("Session disconnected");
        let _ = self.events.send(SessionEvent::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().permission.is_connected
    }

    pub fn proxy_enabled(&self) -> bool {
        self.state.read().proxy_enabled
    }

    /// Inject a message as if it came from the server.
    pub fn deliver(&self, message: InboundMessage) {
        {
            let mut state = self.state.write();
            let connected = state.permission.is_connected;
            if let Some((permission, proxy)) = message.permission(connected) {
                state.permission = permission;
                state.proxy_enabled = proxy;
            }
        }
        let _ = self.events.send(SessionEvent::Message(message));
    }

    /// Parse and inject a raw JSON frame.
    pub fn deliver_frame(&self, frame: &str) -> Result<()> {
        self.deliver(InboundMessage::from_json(frame)?);
        Ok(())
    }
}

impl SessionLink for LocalSession {
    fn send(&self, message: OutboundMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::transport("session is not connected"));
        }
        debug!(kind = message.kind(), "Sending message");
        self.outgoing
            .send(message)
            .map_err(|_| Error::transport("outgoing channel closed"))
    }

    fn current_permissions(&self) -> SyncPermission {
        self.state.read().permission
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
