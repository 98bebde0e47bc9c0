//! The error type returned from every fallible operation in this crate.
//!
//! Maps onto the error kinds of the node runtime: `Transport` and `Protocol`
//! failures surface here (to a call's completion, not necessarily to the
//! application directly); `Capacity` and an analog of `Fatal` are returned
//! synchronously from register/enqueue calls; `Master-loss` is handled
//! internally by the node actor and never constructed as an `Error` the
//! application sees.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure: a socket could not be opened, connected, read, or
    /// written, or a peer closed the connection unexpectedly.
    #[error("no connection to ROS master or peer: {0}")]
    Disconnected(String),

    /// An xmlrpc call did not complete within its deadline.
    #[error("call to {0} timed out")]
    Timeout(String),

    /// Malformed xmlrpc, a missing required TCPROS header field, an
    /// md5sum/type mismatch, or an unknown method.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The master or a peer's xmlrpc handler reported a failure status.
    #[error("master or peer reported failure: {0}")]
    ServerFault(String),

    /// A registry or process pool is at its configured capacity.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// A topic, service, or caller id did not meet ROS naming requirements.
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// Underlying IO failure not otherwise classified above.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A message failed to serialize or deserialize to the wire format.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// xmlrpc encoding/decoding failure from the external codec.
    #[error("xmlrpc error: {0}")]
    Xmlrpc(String),

    /// The node has been shut down; no further calls can be made.
    #[error("node has shut down")]
    ShuttingDown,

    /// Catch-all for errors that don't cleanly fit another variant.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_xmlrpc::Error> for Error {
    fn from(value: serde_xmlrpc::Error) -> Self {
        Error::Xmlrpc(value.to_string())
    }
}

impl From<roslibrust_serde_rosmsg::Error> for Error {
    fn from(value: roslibrust_serde_rosmsg::Error) -> Self {
        Error::Serialization(value.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Disconnected(value.to_string())
    }
}

impl From<Error> for roslibrust_common::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::Disconnected(_) | Error::ShuttingDown => roslibrust_common::Error::Disconnected,
            Error::Timeout(m) => roslibrust_common::Error::Timeout(m),
            Error::Protocol(m) | Error::ServerFault(m) | Error::Xmlrpc(m) => {
                roslibrust_common::Error::ServerError(m)
            }
            Error::Serialization(m) => roslibrust_common::Error::SerializationError(m),
            Error::Capacity(m) => roslibrust_common::Error::Unexpected(anyhow::anyhow!(m)),
            Error::InvalidName(m) => roslibrust_common::Error::InvalidName(m),
            Error::Io(e) => roslibrust_common::Error::IoError(e),
            Error::Unexpected(e) => roslibrust_common::Error::Unexpected(e),
        }
    }
}
