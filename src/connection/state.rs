//! Connection state machine

/// Lifecycle of a handed-out connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Established and being watched
    Open,

    /// The watcher hit a read error and stopped; the stream was not closed
    Broken,

    /// The peer closed its side and the watcher closed ours
    PeerClosed,

    /// Closed by the owner of the handle
    Closed,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Open, Broken) | (Open, PeerClosed) | (Open, Closed) | (Broken, Closed)
        )
    }

    /// Whether writes can no longer succeed
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::PeerClosed | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Broken => write!(f, "broken"),
            Self::PeerClosed => write!(f, "peer_closed"),
            Self::Closed => write!(f, "closed"),
        }
    }
}
