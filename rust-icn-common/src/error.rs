//! Error types for the ICN forwarder.

use thiserror::Error;

/// All possible errors that can occur within the forwarder.
#[derive(Error, Debug)]
pub enum Error {
    /// An outbound channel was dropped by its receiver.
    #[error("channel closed: {0}")]
    ChannelClosed(String),

    /// A frame from the link layer could not be turned into a `[face, packet]` pair.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
