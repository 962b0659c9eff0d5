use session::{ConnectionRole, SessionId, SessionOutput};
use tokio::sync::mpsc;

use crate::protocol::ClientEvent;

/// Messages from connection tasks to the relay task.
#[derive(Debug)]
pub enum NetToRelay {
    /// Handshake finished and a role was assigned.
    Connected {
        session_id: SessionId,
        role: ConnectionRole,
    },
    /// A decoded inbound event.
    Event {
        session_id: SessionId,
        event: ClientEvent,
    },
    /// Connection closed.
    Disconnected {
        session_id: SessionId,
    },
}

/// Sender from connection tasks to the relay task.
pub type RelayTx = mpsc::UnboundedSender<NetToRelay>;
/// Receiver in the relay task.
pub type RelayRx = mpsc::UnboundedReceiver<NetToRelay>;

/// Sender from the relay (and command channel) to the output router.
pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
/// Receiver in the output router for outgoing frames.
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Per-session write channel (output router -> session task).
pub type SessionWriteTx = mpsc::UnboundedSender<String>;
pub type SessionWriteRx = mpsc::UnboundedReceiver<String>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterSession {
    pub session_id: SessionId,
    pub role: ConnectionRole,
    pub write_tx: SessionWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterSession>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterSession>;

pub type UnregisterTx = mpsc::UnboundedSender<SessionId>;
pub type UnregisterRx = mpsc::UnboundedReceiver<SessionId>;

/// Sender halves a connection task needs.
#[derive(Debug, Clone)]
pub struct ConnectionChannels {
    pub relay_tx: RelayTx,
    pub register_tx: RegisterTx,
    pub unregister_tx: UnregisterTx,
}
