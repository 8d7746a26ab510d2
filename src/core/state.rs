use std::fmt;

/// Lifecycle of the broker connection owned by the
/// [`ConnectionManager`](crate::ConnectionManager).
///
/// ```text
/// Disconnected ─► Connecting ─► Subscribed ─► Reconnecting ─┬─► Subscribed
///       ▲              │                                    └─► Disconnected (budget spent)
///       └── failed ────┘             any ─► Closed (close called)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live session.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Session open and subscription bound.
    Subscribed,
    /// Link lost; the reconnect loop owns the connection.
    Reconnecting,
    /// Closed for good.
    Closed,
}

impl ConnectionState {
    /// Short lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
