use crate::api::ApiError;

/// Failures surfaced to callers of the sync core.
///
/// Transient reconnect errors are internal to the transport and only
/// visible through the connection status channel; they never appear
/// here individually.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A send was attempted with no live connection. The caller decides
    /// whether to queue or drop; the core does not retry sends.
    #[error("not connected")]
    NotConnected,

    /// The reconnect budget is exhausted. Terminal until the user layer
    /// asks for a fresh session.
    #[error("connection lost after {attempts} reconnect attempts")]
    ConnectionLost { attempts: u32 },

    /// A poll tick failed to fetch a snapshot. Retried on the next
    /// tick; never fatal.
    #[error("snapshot fetch failed: {0}")]
    SnapshotFetchFailed(#[source] ApiError),

    /// The server rejected a mark-read/remove mutation. Optimistic
    /// local state has already been rolled back.
    #[error("mutation rejected: {0}")]
    MutationRejected(#[source] ApiError),

    /// Mutation referencing a notification id this session does not
    /// hold.
    #[error("unknown notification id {0}")]
    UnknownNotification(u64),

    /// The session was closed; no further operations are possible.
    #[error("session closed")]
    Closed,
}
