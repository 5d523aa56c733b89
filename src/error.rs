//! Error types for ShardCache

use thiserror::Error;

/// Main error type for ShardCache
#[derive(Error, Debug)]
pub enum ShardCacheError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Wire protocol errors, both for inbound commands and for replies read by the client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid flags")]
    InvalidFlags,

    #[error("Invalid exptime")]
    InvalidExptime,

    #[error("Invalid bytes length")]
    InvalidBytesLength,

    #[error("Key too long (max 250 bytes)")]
    KeyTooLong,

    #[error("Unexpected data")]
    UnexpectedData,

    #[error("Connection closed mid-reply")]
    UnexpectedEof,

    #[error("Reply line not terminated by CRLF: {0:?}")]
    MissingTerminator(String),

    #[error("Malformed VALUE header: {0:?}")]
    InvalidValueHeader(String),
}

/// Errors surfaced by a `Storage` backend
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Can't connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Deadline exceeded talking to {addr}")]
    Timeout { addr: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Server rejected {command}: {response:?}")]
    Rejected {
        command: &'static str,
        response: String,
    },

    #[error("Key not usable with the text protocol: {0:?}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage is shut down")]
    Closed,
}

impl StorageError {
    /// True for dial or I/O deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, StorageError::Timeout { .. })
    }

    /// True when no connection to the shard could be opened
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, StorageError::ConnectFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, ShardCacheError>;
